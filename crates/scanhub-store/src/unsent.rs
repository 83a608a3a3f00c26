//! Durable retry queue for messages that could not be delivered.

use rusqlite::params;

use scanhub_shared::types::{format_timestamp, parse_timestamp};
use scanhub_shared::{DeviceId, MessageKind};

use crate::database::{text_column_error, Store};
use crate::error::Result;
use crate::models::UnsentMessage;

impl Store {
    /// Append a message to the retry queue and return its id.
    ///
    /// On error nothing is written and the caller still owns `message`; it
    /// may try again.
    pub fn save_unsent_message(&self, message: &MessageKind) -> Result<i64> {
        let payload = message.to_json()?;
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO unsent_messages (device_id, message, timestamp, sent_to_hub)
             VALUES (?1, ?2, ?3, 0)",
            params![
                message.device_id().as_str(),
                payload,
                format_timestamp(&message.timestamp()),
            ],
        )?;
        let id = conn.last_insert_rowid();

        tracing::info!(
            id,
            device_id = %message.device_id(),
            message_type = message.message_type(),
            "message queued for retry"
        );
        Ok(id)
    }

    /// Up to `limit` undelivered messages in insertion order.
    ///
    /// Rows whose payload no longer decodes are logged and skipped; they
    /// stay in the table for inspection.
    pub fn get_unsent_messages(&self, limit: usize) -> Result<Vec<UnsentMessage>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, device_id, message, timestamp, sent_to_hub
             FROM unsent_messages
             WHERE sent_to_hub = 0
             ORDER BY id ASC
             LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], row_to_unsent)?;

        let mut messages = Vec::new();
        for row in rows {
            match row {
                Ok(message) => messages.push(message),
                Err(e @ rusqlite::Error::FromSqlConversionFailure(..)) => {
                    tracing::warn!(error = %e, "skipping undecodable queued message");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(messages)
    }

    /// Mark one queued message delivered. Idempotent; returns `false` only
    /// when no message has that id.
    pub fn mark_sent(&self, id: i64) -> Result<bool> {
        let affected = self.connect()?.execute(
            "UPDATE unsent_messages SET sent_to_hub = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(affected > 0)
    }

    pub fn count_unsent_messages(&self) -> Result<u64> {
        let count: i64 = self.connect()?.query_row(
            "SELECT COUNT(*) FROM unsent_messages WHERE sent_to_hub = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

fn row_to_unsent(row: &rusqlite::Row<'_>) -> rusqlite::Result<UnsentMessage> {
    let id: i64 = row.get(0)?;
    let device_id: String = row.get(1)?;
    let payload: String = row.get(2)?;
    let ts_str: String = row.get(3)?;
    let sent_to_hub: bool = row.get(4)?;

    Ok(UnsentMessage {
        id,
        device_id: DeviceId::new(device_id).map_err(|e| text_column_error(1, e))?,
        message: MessageKind::from_json(&payload).map_err(|e| text_column_error(2, e))?,
        timestamp: parse_timestamp(&ts_str).map_err(|e| text_column_error(3, e))?,
        sent_to_hub,
    })
}
