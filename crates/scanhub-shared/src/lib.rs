//! # scanhub-shared
//!
//! Types shared by every scanhub crate: validated barcodes, device
//! identities, connection descriptors, and the closed [`MessageKind`]
//! union that flows through the send path and the retry queue.

pub mod constants;
pub mod descriptor;
pub mod error;
pub mod identity;
pub mod protocol;
pub mod types;

pub use descriptor::ConnectionDescriptor;
pub use error::{DescriptorError, ValidationError};
pub use protocol::MessageKind;
pub use types::{Barcode, BarcodeFormat, DeviceId, Signal};
