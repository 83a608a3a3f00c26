use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_BARCODE_LEN;
use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Barcode
// ---------------------------------------------------------------------------

/// Symbologies recognised from the digit count alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarcodeFormat {
    Ean8,
    UpcA,
    Ean13,
    Gtin14,
    /// Any other numeric code up to 14 digits.
    Other,
}

/// A scanned barcode that passed validation: trimmed, non-empty, ASCII
/// digits only, at most 14 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Barcode(String);

impl Barcode {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyBarcode);
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::NonNumericBarcode(trimmed.to_string()));
        }
        if trimmed.len() > MAX_BARCODE_LEN {
            return Err(ValidationError::BarcodeTooLong(trimmed.len()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn format(&self) -> BarcodeFormat {
        match self.0.len() {
            8 => BarcodeFormat::Ean8,
            12 => BarcodeFormat::UpcA,
            13 => BarcodeFormat::Ean13,
            14 => BarcodeFormat::Gtin14,
            _ => BarcodeFormat::Other,
        }
    }

    /// Verify the trailing GS1 check digit.
    ///
    /// Only meaningful for the fixed-length GS1 formats; `Other` barcodes
    /// always return `false`. Scans are not rejected on a bad check digit,
    /// since shop-internal codes frequently skip it.
    pub fn has_valid_check_digit(&self) -> bool {
        if self.format() == BarcodeFormat::Other {
            return false;
        }
        let digits: Vec<u32> = self.0.bytes().map(|b| u32::from(b - b'0')).collect();
        let Some((check, body)) = digits.split_last() else {
            return false;
        };
        // Weights alternate 3,1,3,... starting from the digit next to the check digit.
        let sum: u32 = body
            .iter()
            .rev()
            .enumerate()
            .map(|(i, d)| if i % 2 == 0 { d * 3 } else { *d })
            .sum();
        (10 - sum % 10) % 10 == *check
    }
}

impl fmt::Display for Barcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Barcode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Barcode> for String {
    fn from(value: Barcode) -> Self {
        value.0
    }
}

// ---------------------------------------------------------------------------
// DeviceId
// ---------------------------------------------------------------------------

/// Identifier used by the cloud registry to address a device.
///
/// IoT Hub accepts up to 128 ASCII alphanumerics plus `-.+%_#*?!(),:=@$'`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyDeviceId);
        }
        let allowed = |c: char| c.is_ascii_alphanumeric() || "-.+%_#*?!(),:=@$'".contains(c);
        if trimmed.len() > 128 || !trimmed.chars().all(allowed) {
            return Err(ValidationError::InvalidDeviceId(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(value: DeviceId) -> Self {
        value.0
    }
}

// ---------------------------------------------------------------------------
// Connectivity signals
// ---------------------------------------------------------------------------

/// The three independent reachability signals gating a cloud send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Internet,
    Hub,
    Peer,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Internet, Signal::Hub, Signal::Peer];

    pub fn label(&self) -> &'static str {
        match self {
            Signal::Internet => "Internet",
            Signal::Hub => "IoT Hub",
            Signal::Peer => "Raspberry Pi",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Render a timestamp in the canonical wire/storage form,
/// e.g. `2025-05-09T10:34:17.353Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp written by [`format_timestamp`] (any RFC 3339 form is accepted).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barcode_is_trimmed() {
        let b = Barcode::parse("  40123456 \n").unwrap();
        assert_eq!(b.as_str(), "40123456");
        assert_eq!(b.format(), BarcodeFormat::Ean8);
    }

    #[test]
    fn test_barcode_rejections() {
        assert_eq!(Barcode::parse("   "), Err(ValidationError::EmptyBarcode));
        assert!(matches!(
            Barcode::parse("40A23456"),
            Err(ValidationError::NonNumericBarcode(_))
        ));
        assert_eq!(
            Barcode::parse("123456789012345"),
            Err(ValidationError::BarcodeTooLong(15))
        );
    }

    #[test]
    fn test_check_digit() {
        // Real EAN-13 and EAN-8 codes.
        assert!(Barcode::parse("4006381333931").unwrap().has_valid_check_digit());
        assert!(Barcode::parse("96385074").unwrap().has_valid_check_digit());
        assert!(!Barcode::parse("4006381333932").unwrap().has_valid_check_digit());
        assert!(!Barcode::parse("12345").unwrap().has_valid_check_digit());
    }

    #[test]
    fn test_device_id_validation() {
        assert!(DeviceId::new("scanner-0a1b2c3d4e5f").is_ok());
        assert_eq!(DeviceId::new(""), Err(ValidationError::EmptyDeviceId));
        assert!(DeviceId::new("has space").is_err());
        assert!(DeviceId::new("a/b").is_err());
    }

    #[test]
    fn test_timestamp_format() {
        let ts = parse_timestamp("2025-05-09T10:34:17.353Z").unwrap();
        assert_eq!(format_timestamp(&ts), "2025-05-09T10:34:17.353Z");
    }
}
