use thiserror::Error;

/// Input rejected before it reaches the store or the cloud.
///
/// These are never queued: a message that can never be valid would be
/// retried forever.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Barcode cannot be empty")]
    EmptyBarcode,

    #[error("Barcode must be numeric, got {0:?}")]
    NonNumericBarcode(String),

    #[error("Barcode too long: {0} digits (maximum 14)")]
    BarcodeTooLong(usize),

    #[error("Device id cannot be empty")]
    EmptyDeviceId,

    #[error("Invalid device id {0:?}")]
    InvalidDeviceId(String),

    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i64),
}

/// Errors produced while parsing a `key=value;...` connection string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Connection string is empty")]
    Empty,

    #[error("Malformed segment {0:?} (expected key=value)")]
    MalformedSegment(String),

    #[error("Missing required field {0}")]
    MissingField(&'static str),

    #[error("Invalid device id in connection string: {0}")]
    DeviceId(#[from] ValidationError),
}
