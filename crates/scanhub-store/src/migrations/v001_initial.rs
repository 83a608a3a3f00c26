//! v001 -- Initial schema creation.
//!
//! Creates the three agent tables: `scans`, `unsent_messages`, and
//! `barcode_device_mapping`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Scan history
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS scans (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id   TEXT NOT NULL,
    barcode     TEXT NOT NULL,
    quantity    INTEGER NOT NULL DEFAULT 1,
    timestamp   TEXT NOT NULL,               -- RFC-3339, millisecond precision, UTC
    sent_to_hub INTEGER NOT NULL DEFAULT 0   -- boolean 0/1
);

CREATE INDEX IF NOT EXISTS idx_scans_device_ts ON scans(device_id, timestamp);

-- ----------------------------------------------------------------
-- Retry queue
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS unsent_messages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id   TEXT NOT NULL,
    message     TEXT NOT NULL,               -- serialized MessageKind (JSON)
    timestamp   TEXT NOT NULL,
    sent_to_hub INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_unsent_pending ON unsent_messages(sent_to_hub, id);

-- ----------------------------------------------------------------
-- Barcode -> device identity
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS barcode_device_mapping (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    barcode             TEXT UNIQUE NOT NULL,
    device_id           TEXT UNIQUE NOT NULL,
    created_at          TEXT NOT NULL,
    last_used           TEXT NOT NULL,
    registration_status TEXT NOT NULL DEFAULT 'pending',
    connection_string   TEXT,
    azure_registered    INTEGER NOT NULL DEFAULT 0
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
