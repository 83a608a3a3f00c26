//! Domain records persisted in the local SQLite database.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scanhub_shared::{Barcode, ConnectionDescriptor, DeviceId, MessageKind};

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

/// One barcode scan. Created on every scan; `sent_to_hub` flips once the
/// cloud has acknowledged it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanRecord {
    pub id: i64,
    pub device_id: DeviceId,
    pub barcode: Barcode,
    pub quantity: u32,
    /// Strictly increasing per device.
    pub timestamp: DateTime<Utc>,
    pub sent_to_hub: bool,
}

// ---------------------------------------------------------------------------
// Unsent message
// ---------------------------------------------------------------------------

/// A message waiting in the retry queue.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsentMessage {
    /// Surrogate key; insertion order.
    pub id: i64,
    pub device_id: DeviceId,
    pub message: MessageKind,
    pub timestamp: DateTime<Utc>,
    pub sent_to_hub: bool,
}

// ---------------------------------------------------------------------------
// Barcode mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Registered,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Registered => "registered",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RegistrationStatus::Pending),
            "registered" => Ok(RegistrationStatus::Registered),
            other => Err(format!("unknown registration status {other:?}")),
        }
    }
}

/// Persistent barcode ↔ device identity link. Never reassigned once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeDeviceMapping {
    pub barcode: Barcode,
    pub device_id: DeviceId,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub registration_status: RegistrationStatus,
    pub connection_descriptor: Option<ConnectionDescriptor>,
    pub cloud_registered: bool,
}

/// Aggregate view over the mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MappingStats {
    pub total_mappings: u64,
    pub registered_devices: u64,
    pub pending_registrations: u64,
    /// Mappings used within the last 24 hours.
    pub recent_activity: u64,
}
