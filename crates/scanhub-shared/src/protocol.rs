use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::types::{format_timestamp, Barcode, DeviceId, Signal};

/// Every message the agent delivers to the hub, queued or not.
///
/// The retry queue stores the serialized form of this enum, so the send
/// path and the queue work on one closed type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageKind {
    /// A barcode was scanned on a device.
    BarcodeScan {
        device_id: DeviceId,
        barcode: Barcode,
        quantity: u32,
        timestamp: DateTime<Utc>,
    },

    /// A barcode's device identity was provisioned in the cloud registry.
    RegistrationConfirmation {
        device_id: DeviceId,
        barcode: Barcode,
        registered_at: DateTime<Utc>,
    },

    /// A connectivity signal changed state.
    ConnectivityAlert {
        device_id: DeviceId,
        signal: Signal,
        up: bool,
        timestamp: DateTime<Utc>,
    },
}

impl MessageKind {
    pub fn device_id(&self) -> &DeviceId {
        match self {
            MessageKind::BarcodeScan { device_id, .. }
            | MessageKind::RegistrationConfirmation { device_id, .. }
            | MessageKind::ConnectivityAlert { device_id, .. } => device_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MessageKind::BarcodeScan { timestamp, .. }
            | MessageKind::ConnectivityAlert { timestamp, .. } => *timestamp,
            MessageKind::RegistrationConfirmation { registered_at, .. } => *registered_at,
        }
    }

    /// The `messageType` value the hub-side consumers switch on.
    pub fn message_type(&self) -> &'static str {
        match self {
            MessageKind::BarcodeScan { .. } => "barcode_scan",
            MessageKind::RegistrationConfirmation { .. } => "device_registration",
            MessageKind::ConnectivityAlert { .. } => "connectivity_alert",
        }
    }

    /// Serialize for the retry queue.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize a retry-queue payload.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Body of the device-to-cloud message.
    pub fn hub_payload(&self) -> serde_json::Value {
        let ts = format_timestamp(&self.timestamp());
        match self {
            MessageKind::BarcodeScan {
                device_id,
                barcode,
                quantity,
                ..
            } => json!({
                "scannedBarcode": barcode.as_str(),
                "deviceId": device_id.as_str(),
                "quantity": quantity,
                "messageType": self.message_type(),
                "timestamp": ts,
            }),
            MessageKind::RegistrationConfirmation {
                device_id, barcode, ..
            } => json!({
                "scannedBarcode": barcode.as_str(),
                "deviceId": device_id.as_str(),
                "messageType": self.message_type(),
                "status": "registered",
                "timestamp": ts,
            }),
            MessageKind::ConnectivityAlert {
                device_id,
                signal,
                up,
                ..
            } => json!({
                "deviceId": device_id.as_str(),
                "messageType": self.message_type(),
                "signal": signal,
                "status": if *up { "online" } else { "offline" },
                "timestamp": ts,
            }),
        }
    }
}
