//! Per-device connection descriptor (`HostName=..;DeviceId=..;SharedAccessKey=..`).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::DescriptorError;
use crate::types::DeviceId;

/// Everything a device client needs to open a session: hub endpoint,
/// device id, and the device's shared access key.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host_name: String,
    pub device_id: DeviceId,
    pub shared_access_key: String,
}

impl ConnectionDescriptor {
    pub fn new(host_name: impl Into<String>, device_id: DeviceId, key: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
            device_id,
            shared_access_key: key.into(),
        }
    }
}

/// Split a `key=value;key=value` string into its fields.
///
/// Values may themselves contain `=` (base64 padding), so each segment is
/// split on the first `=` only.
pub fn parse_segments(raw: &str) -> Result<HashMap<String, String>, DescriptorError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DescriptorError::Empty);
    }
    raw.split(';')
        .filter(|segment| !segment.trim().is_empty())
        .map(|segment| {
            segment
                .split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| DescriptorError::MalformedSegment(segment.to_string()))
        })
        .collect()
}

impl FromStr for ConnectionDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = parse_segments(s)?;
        let mut take = |key: &'static str| {
            parts
                .remove(key)
                .filter(|v| !v.is_empty())
                .ok_or(DescriptorError::MissingField(key))
        };
        let host_name = take("HostName")?;
        let device_id = DeviceId::new(take("DeviceId")?)?;
        let shared_access_key = take("SharedAccessKey")?;
        Ok(Self {
            host_name,
            device_id,
            shared_access_key,
        })
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HostName={};DeviceId={};SharedAccessKey={}",
            self.host_name, self.device_id, self.shared_access_key
        )
    }
}

// The key never reaches logs through `{:?}`.
impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host_name", &self.host_name)
            .field("device_id", &self.device_id)
            .field("shared_access_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        let raw = "HostName=hub.azure-devices.net;DeviceId=scanner-abc;SharedAccessKey=a2V5PT0=";
        let d: ConnectionDescriptor = raw.parse().unwrap();
        assert_eq!(d.host_name, "hub.azure-devices.net");
        assert_eq!(d.device_id.as_str(), "scanner-abc");
        assert_eq!(d.shared_access_key, "a2V5PT0=");
        assert_eq!(d.to_string(), raw);
    }

    #[test]
    fn test_missing_field() {
        let err = "HostName=h;SharedAccessKey=k"
            .parse::<ConnectionDescriptor>()
            .unwrap_err();
        assert_eq!(err, DescriptorError::MissingField("DeviceId"));
    }

    #[test]
    fn test_malformed_segment() {
        assert!(matches!(
            parse_segments("HostName=h;garbage"),
            Err(DescriptorError::MalformedSegment(_))
        ));
        assert_eq!(parse_segments(""), Err(DescriptorError::Empty));
    }

    #[test]
    fn test_debug_redacts_key() {
        let d = ConnectionDescriptor::new("h", DeviceId::new("d").unwrap(), "secret");
        assert!(!format!("{d:?}").contains("secret"));
    }
}
