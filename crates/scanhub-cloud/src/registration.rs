//! Plug-and-play provisioning of barcode-derived devices.
//!
//! Each barcode maps to a device id (see `scanhub_store::DeviceMapper`).
//! The first time a device needs to talk to the hub it is looked up in the
//! registry and created if missing; its connection descriptor is then kept
//! in the mapping table so later scans skip the registry entirely.
//!
//! Without a usable owner connection string the service runs degraded: it
//! still hands out descriptors so the rest of the pipeline keeps working,
//! but their keys are random and the hub will refuse them. Messages sent
//! with them fail and stay in the retry queue.

use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{error, info, warn};

use scanhub_shared::constants::UNCONFIGURED_HUB_HOST;
use scanhub_shared::identity::generate_device_key;
use scanhub_shared::{Barcode, ConnectionDescriptor, DeviceId};
use scanhub_store::DeviceMapper;

use crate::connection_string::HubConnectionString;
use crate::error::{CloudError, Result};
use crate::registry::{DeviceRegistry, HubRegistryClient};
use crate::retry::RetryPolicy;

/// A device ready to send, as resolved from a barcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConnection {
    pub device_id: DeviceId,
    pub descriptor: ConnectionDescriptor,
    /// True only on the call that registered the device in the cloud.
    pub first_registration: bool,
}

pub struct RegistrationService {
    registry: Option<Arc<dyn DeviceRegistry>>,
    fallback_host: String,
    mapper: DeviceMapper,
    retry: RetryPolicy,
}

impl RegistrationService {
    pub fn new(mapper: DeviceMapper, registry: Arc<dyn DeviceRegistry>) -> Self {
        let fallback_host = registry.host_name().to_string();
        Self {
            registry: Some(registry),
            fallback_host,
            mapper,
            retry: RetryPolicy::default(),
        }
    }

    /// Service without a registry. Descriptors point at `host`.
    pub fn degraded(mapper: DeviceMapper, host: impl Into<String>) -> Self {
        Self {
            registry: None,
            fallback_host: host.into(),
            mapper,
            retry: RetryPolicy::default(),
        }
    }

    /// Build from the owner connection string, falling back to degraded
    /// mode when it is absent or malformed.
    pub fn from_connection_string(
        http: reqwest::Client,
        mapper: DeviceMapper,
        raw: Option<&str>,
    ) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            warn!("No hub connection string configured; device registration disabled");
            return Self::degraded(mapper, UNCONFIGURED_HUB_HOST);
        };

        match raw.parse::<HubConnectionString>() {
            Ok(credentials) => {
                info!(host = %credentials.host_name, "Hub registry client initialised");
                Self::new(mapper, Arc::new(HubRegistryClient::new(http, credentials)))
            }
            Err(e) => {
                let host = HubConnectionString::host_hint(raw)
                    .unwrap_or_else(|| UNCONFIGURED_HUB_HOST.to_string());
                warn!(error = %e, host = %host, "Invalid hub connection string; device registration disabled");
                Self::degraded(mapper, host)
            }
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_degraded(&self) -> bool {
        self.registry.is_none()
    }

    pub fn host_name(&self) -> &str {
        &self.fallback_host
    }

    pub fn mapper(&self) -> &DeviceMapper {
        &self.mapper
    }

    /// Make sure `device_id` exists in the registry and return its
    /// descriptor. Safe to call repeatedly: an existing device is reused,
    /// never recreated.
    ///
    /// `None` when the registry could not be reached or refused the call.
    pub async fn register_device_with_cloud(
        &self,
        device_id: &DeviceId,
    ) -> Option<ConnectionDescriptor> {
        let Some(registry) = &self.registry else {
            warn!(device_id = %device_id, "Registry unavailable; issuing unregistered descriptor");
            return Some(ConnectionDescriptor::new(
                self.fallback_host.clone(),
                device_id.clone(),
                generate_device_key(),
            ));
        };

        match self.get_or_create(registry.as_ref(), device_id).await {
            Ok(key) => Some(ConnectionDescriptor::new(
                registry.host_name(),
                device_id.clone(),
                key,
            )),
            Err(e) => {
                error!(device_id = %device_id, error = %e, "Device registration failed");
                None
            }
        }
    }

    async fn get_or_create(
        &self,
        registry: &dyn DeviceRegistry,
        device_id: &DeviceId,
    ) -> Result<String> {
        let existing = self
            .retry
            .run("registry lookup", || registry.get_device(device_id))
            .await?;
        if let Some(device) = existing {
            info!(device_id = %device_id, "Device already registered");
            return Ok(device.primary_key);
        }

        let primary = generate_device_key();
        let secondary = generate_device_key();
        let created = self
            .retry
            .run("registry create", || {
                registry.create_device(device_id, &primary, &secondary)
            })
            .await;

        match created {
            Ok(device) => {
                info!(device_id = %device_id, "Device registered");
                Ok(device.primary_key)
            }
            // Another agent created it between our lookup and create.
            Err(CloudError::Status { status, .. }) if status == StatusCode::CONFLICT => registry
                .get_device(device_id)
                .await?
                .map(|d| d.primary_key)
                .ok_or(CloudError::IncompleteResponse("device after conflict")),
            Err(e) => Err(e),
        }
    }

    /// Resolve a barcode to a device that can send.
    ///
    /// A descriptor already stored for a registered device is returned
    /// without touching the registry. Otherwise the device is registered
    /// and the descriptor persisted. `Ok(None)` means registration failed
    /// and the caller should queue its message; `Err` is a local storage
    /// failure.
    pub async fn get_device_connection_for_barcode(
        &self,
        barcode: &Barcode,
    ) -> Result<Option<DeviceConnection>> {
        let lookup_barcode = barcode.clone();
        let mapping = self
            .with_mapper(move |mapper| mapper.lookup(&lookup_barcode))
            .await?;

        if let Some(descriptor) = mapping.connection_descriptor {
            if mapping.cloud_registered || self.is_degraded() {
                return Ok(Some(DeviceConnection {
                    device_id: mapping.device_id,
                    descriptor,
                    first_registration: false,
                }));
            }
        }

        let Some(descriptor) = self.register_device_with_cloud(&mapping.device_id).await else {
            return Ok(None);
        };

        let registered = !self.is_degraded();
        let store_barcode = barcode.clone();
        let store_descriptor = descriptor.clone();
        self.with_mapper(move |mapper| {
            mapper.update_device_registration(&store_barcode, &store_descriptor, registered)
        })
        .await?;

        Ok(Some(DeviceConnection {
            device_id: mapping.device_id,
            descriptor,
            first_registration: registered,
        }))
    }

    async fn with_mapper<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&DeviceMapper) -> scanhub_store::Result<T> + Send + 'static,
    {
        let mapper = self.mapper.clone();
        let result = tokio::task::spawn_blocking(move || f(&mapper))
            .await
            .map_err(|e| CloudError::Task(e.to_string()))?;
        Ok(result?)
    }
}
