//! Scan history: append-only log of every barcode scanned.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use rusqlite::{params, OptionalExtension};

use scanhub_shared::types::{format_timestamp, parse_timestamp};
use scanhub_shared::{Barcode, DeviceId};

use crate::database::{text_column_error, Store};
use crate::error::Result;
use crate::models::ScanRecord;

const SCAN_COLUMNS: &str = "id, device_id, barcode, quantity, timestamp, sent_to_hub";

impl Store {
    /// Append a scan and return its canonical timestamp.
    ///
    /// Timestamps are millisecond-precision UTC. If the clock has not moved
    /// past the device's latest scan (same millisecond, or the clock stepped
    /// backwards) the new scan is stamped 1 ms after it, keeping timestamps
    /// strictly increasing per device.
    pub fn save_scan(
        &self,
        device_id: &DeviceId,
        barcode: &Barcode,
        quantity: u32,
    ) -> Result<DateTime<Utc>> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let latest: Option<String> = tx
            .query_row(
                "SELECT MAX(timestamp) FROM scans WHERE device_id = ?1",
                params![device_id.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        let now = Utc::now().trunc_subsecs(3);
        let timestamp = match latest.as_deref().map(parse_timestamp).transpose()? {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };

        tx.execute(
            "INSERT INTO scans (device_id, barcode, quantity, timestamp, sent_to_hub)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![
                device_id.as_str(),
                barcode.as_str(),
                quantity,
                format_timestamp(&timestamp),
            ],
        )?;
        tx.commit()?;

        tracing::debug!(device_id = %device_id, barcode = %barcode, quantity, "scan saved");
        Ok(timestamp)
    }

    /// Most recent scans first, for diagnostics.
    pub fn get_recent_scans(&self, limit: u32) -> Result<Vec<ScanRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans ORDER BY timestamp DESC, id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit], row_to_scan)?;

        let mut scans = Vec::new();
        for row in rows {
            scans.push(row?);
        }
        Ok(scans)
    }

    /// Scans the hub has not acknowledged, oldest first.
    pub fn get_unsent_scans(&self) -> Result<Vec<ScanRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans WHERE sent_to_hub = 0 ORDER BY timestamp ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], row_to_scan)?;

        let mut scans = Vec::new();
        for row in rows {
            scans.push(row?);
        }
        Ok(scans)
    }

    /// Flag a scan as delivered. Returns `true` if a matching scan exists.
    pub fn mark_scan_sent(
        &self,
        device_id: &DeviceId,
        barcode: &Barcode,
        timestamp: &DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.connect()?.execute(
            "UPDATE scans SET sent_to_hub = 1
             WHERE device_id = ?1 AND barcode = ?2 AND timestamp = ?3",
            params![
                device_id.as_str(),
                barcode.as_str(),
                format_timestamp(timestamp)
            ],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_scan(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScanRecord> {
    let id: i64 = row.get(0)?;
    let device_id: String = row.get(1)?;
    let barcode: String = row.get(2)?;
    let quantity: u32 = row.get(3)?;
    let ts_str: String = row.get(4)?;
    let sent_to_hub: bool = row.get(5)?;

    Ok(ScanRecord {
        id,
        device_id: DeviceId::new(device_id).map_err(|e| text_column_error(1, e))?,
        barcode: Barcode::parse(&barcode).map_err(|e| text_column_error(2, e))?,
        quantity,
        timestamp: parse_timestamp(&ts_str).map_err(|e| text_column_error(4, e))?,
        sent_to_hub,
    })
}
