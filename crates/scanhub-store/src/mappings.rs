//! CRUD operations for [`BarcodeDeviceMapping`] records.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};

use scanhub_shared::types::{format_timestamp, parse_timestamp};
use scanhub_shared::{Barcode, ConnectionDescriptor, DeviceId};

use crate::database::{text_column_error, Store};
use crate::error::Result;
use crate::models::{BarcodeDeviceMapping, MappingStats, RegistrationStatus};

const MAPPING_COLUMNS: &str = "barcode, device_id, created_at, last_used, \
                               registration_status, connection_string, azure_registered";

impl Store {
    // ------------------------------------------------------------------
    // Create / touch
    // ------------------------------------------------------------------

    /// Insert a pending mapping, or refresh `last_used` if the barcode is
    /// already mapped. Returns the stored row, whose `device_id` is the one
    /// recorded first for that barcode.
    pub fn upsert_mapping(
        &self,
        barcode: &Barcode,
        device_id: &DeviceId,
        now: DateTime<Utc>,
    ) -> Result<BarcodeDeviceMapping> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let now = format_timestamp(&now);
        tx.execute(
            "INSERT INTO barcode_device_mapping
                 (barcode, device_id, created_at, last_used, registration_status)
             VALUES (?1, ?2, ?3, ?3, 'pending')
             ON CONFLICT(barcode) DO UPDATE SET last_used = excluded.last_used",
            params![barcode.as_str(), device_id.as_str(), now],
        )?;
        let mapping = tx.query_row(
            &format!("SELECT {MAPPING_COLUMNS} FROM barcode_device_mapping WHERE barcode = ?1"),
            params![barcode.as_str()],
            row_to_mapping,
        )?;
        tx.commit()?;
        Ok(mapping)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_mapping(&self, barcode: &Barcode) -> Result<Option<BarcodeDeviceMapping>> {
        let mapping = self
            .connect()?
            .query_row(
                &format!("SELECT {MAPPING_COLUMNS} FROM barcode_device_mapping WHERE barcode = ?1"),
                params![barcode.as_str()],
                row_to_mapping,
            )
            .optional()?;
        Ok(mapping)
    }

    pub fn get_mapping_by_device(&self, device_id: &DeviceId) -> Result<Option<BarcodeDeviceMapping>> {
        let mapping = self
            .connect()?
            .query_row(
                &format!("SELECT {MAPPING_COLUMNS} FROM barcode_device_mapping WHERE device_id = ?1"),
                params![device_id.as_str()],
                row_to_mapping,
            )
            .optional()?;
        Ok(mapping)
    }

    /// Whether the barcode has never been mapped.
    pub fn is_new_barcode(&self, barcode: &Barcode) -> Result<bool> {
        let count: i64 = self.connect()?.query_row(
            "SELECT COUNT(*) FROM barcode_device_mapping WHERE barcode = ?1",
            params![barcode.as_str()],
            |row| row.get(0),
        )?;
        Ok(count == 0)
    }

    /// Stored descriptor for a barcode, only once the device is registered
    /// in the cloud.
    pub fn get_connection_descriptor_for_barcode(
        &self,
        barcode: &Barcode,
    ) -> Result<Option<ConnectionDescriptor>> {
        Ok(self
            .get_mapping(barcode)?
            .filter(|m| m.cloud_registered)
            .and_then(|m| m.connection_descriptor))
    }

    /// Mappings ordered by most recent use.
    pub fn list_mappings(&self, limit: u32) -> Result<Vec<BarcodeDeviceMapping>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MAPPING_COLUMNS} FROM barcode_device_mapping
             ORDER BY last_used DESC
             LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit], row_to_mapping)?;

        let mut mappings = Vec::new();
        for row in rows {
            mappings.push(row?);
        }
        Ok(mappings)
    }

    pub fn mapping_stats(&self) -> Result<MappingStats> {
        let since = format_timestamp(&(Utc::now() - Duration::days(1)));
        let conn = self.connect()?;
        let stats = conn.query_row(
            "SELECT
                 COUNT(*),
                 COALESCE(SUM(azure_registered = 1), 0),
                 COALESCE(SUM(registration_status = 'pending'), 0),
                 COALESCE(SUM(last_used > ?1), 0)
             FROM barcode_device_mapping",
            params![since],
            |row| {
                Ok(MappingStats {
                    total_mappings: row.get::<_, i64>(0)? as u64,
                    registered_devices: row.get::<_, i64>(1)? as u64,
                    pending_registrations: row.get::<_, i64>(2)? as u64,
                    recent_activity: row.get::<_, i64>(3)? as u64,
                })
            },
        )?;
        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Record the outcome of a cloud registration for `barcode`.
    ///
    /// `cloud_registered = true` moves the mapping to `registered`; `false`
    /// keeps it `pending` (a degraded descriptor is still stored so the send
    /// path can exercise it). Returns `false` if the barcode is unmapped.
    pub fn update_device_registration(
        &self,
        barcode: &Barcode,
        descriptor: &ConnectionDescriptor,
        cloud_registered: bool,
    ) -> Result<bool> {
        let status = if cloud_registered {
            RegistrationStatus::Registered
        } else {
            RegistrationStatus::Pending
        };
        let affected = self.connect()?.execute(
            "UPDATE barcode_device_mapping
             SET connection_string = ?1, azure_registered = ?2, registration_status = ?3
             WHERE barcode = ?4",
            params![
                descriptor.to_string(),
                cloud_registered,
                status.as_str(),
                barcode.as_str(),
            ],
        )?;

        if affected == 0 {
            tracing::warn!(barcode = %barcode, "no mapping to update registration for");
        } else {
            tracing::info!(barcode = %barcode, cloud_registered, "device registration updated");
        }
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Remove never-registered mappings unused for `days_old` days.
    /// Registered mappings are kept forever so ids are never reassigned.
    pub fn cleanup_stale_mappings(&self, days_old: u32) -> Result<usize> {
        let cutoff = format_timestamp(&(Utc::now() - Duration::days(i64::from(days_old))));
        let deleted = self.connect()?.execute(
            "DELETE FROM barcode_device_mapping
             WHERE last_used < ?1 AND azure_registered = 0",
            params![cutoff],
        )?;
        tracing::info!(deleted, days_old, "cleaned up stale barcode mappings");
        Ok(deleted)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_mapping(row: &rusqlite::Row<'_>) -> rusqlite::Result<BarcodeDeviceMapping> {
    let barcode: String = row.get(0)?;
    let device_id: String = row.get(1)?;
    let created_str: String = row.get(2)?;
    let used_str: String = row.get(3)?;
    let status_str: String = row.get(4)?;
    let descriptor_str: Option<String> = row.get(5)?;
    let cloud_registered: bool = row.get(6)?;

    let registration_status = status_str.parse::<RegistrationStatus>().map_err(|e| {
        text_column_error(4, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;

    let connection_descriptor = descriptor_str
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<ConnectionDescriptor>())
        .transpose()
        .map_err(|e| text_column_error(5, e))?;

    Ok(BarcodeDeviceMapping {
        barcode: Barcode::parse(&barcode).map_err(|e| text_column_error(0, e))?,
        device_id: DeviceId::new(device_id).map_err(|e| text_column_error(1, e))?,
        created_at: parse_timestamp(&created_str).map_err(|e| text_column_error(2, e))?,
        last_used: parse_timestamp(&used_str).map_err(|e| text_column_error(3, e))?,
        registration_status,
        connection_descriptor,
        cloud_registered,
    })
}
