//! # scanhub-cloud
//!
//! Everything that talks to the outside world on behalf of a device:
//!
//! - **Registry**: look up or create device identities with symmetric keys
//!   (IoT Hub service REST API, authorised by the owner connection string)
//! - **Device client**: connect / send / disconnect for one device,
//!   authorised by its own connection descriptor
//! - **Registration service**: plug-and-play provisioning of barcode-derived
//!   devices, degrading to non-functional descriptors when the registry
//!   cannot be initialised
//! - **REST API client** for the upstream inventory service
//! - **Retry policy**: bounded exponential backoff around all of the above

pub mod api;
pub mod connection_string;
pub mod device_client;
pub mod registration;
pub mod registry;
pub mod retry;
pub mod sas;

mod error;

pub use api::{ApiClient, ApiResponse, DEFAULT_API_URL};
pub use connection_string::HubConnectionString;
pub use device_client::{DeviceClient, DeviceSender, HttpDeviceSender};
pub use error::{CloudError, Result};
pub use registration::{DeviceConnection, RegistrationService};
pub use registry::{DeviceRegistry, HubRegistryClient, RegistryDevice};
pub use retry::RetryPolicy;
