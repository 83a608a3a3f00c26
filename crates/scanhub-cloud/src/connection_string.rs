//! Owner (service-policy) connection string for the hub registry.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};

use scanhub_shared::descriptor::parse_segments;
use scanhub_shared::DescriptorError;

/// `HostName=<hub>;SharedAccessKeyName=<policy>;SharedAccessKey=<base64>`
#[derive(Clone, PartialEq, Eq)]
pub struct HubConnectionString {
    pub host_name: String,
    pub shared_access_key_name: String,
    pub shared_access_key: String,
}

impl HubConnectionString {
    /// Best-effort host extraction from a string that may not parse as a
    /// whole, so degraded descriptors can still point at the right hub.
    pub fn host_hint(raw: &str) -> Option<String> {
        raw.split(';').find_map(|segment| {
            segment
                .trim()
                .strip_prefix("HostName=")
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
        })
    }
}

impl FromStr for HubConnectionString {
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
        let shared_access_key_name = take("SharedAccessKeyName")?;
        let shared_access_key = take("SharedAccessKey")?;

        if STANDARD.decode(&shared_access_key).is_err() {
            return Err(DescriptorError::MalformedSegment(
                "SharedAccessKey=<not base64>".to_string(),
            ));
        }

        Ok(Self {
            host_name,
            shared_access_key_name,
            shared_access_key,
        })
    }
}

impl fmt::Debug for HubConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubConnectionString")
            .field("host_name", &self.host_name)
            .field("shared_access_key_name", &self.shared_access_key_name)
            .field("shared_access_key", &"<redacted>")
            .finish()
    }
}
