//! Cloud device registry: look up or create device identities.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use scanhub_shared::constants::{REGISTRY_API_VERSION, SAS_TOKEN_TTL_SECS};
use scanhub_shared::DeviceId;

use crate::connection_string::HubConnectionString;
use crate::error::{CloudError, Result};
use crate::sas::sas_token_from_now;

/// A device as the registry reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryDevice {
    pub device_id: DeviceId,
    pub primary_key: String,
    pub enabled: bool,
}

/// The registry operations the registration service relies on.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Hub host name that device descriptors should point at.
    fn host_name(&self) -> &str;

    /// `Ok(None)` when the registry has no such device.
    async fn get_device(&self, device_id: &DeviceId) -> Result<Option<RegistryDevice>>;

    /// Create a device authenticated by the given symmetric keys.
    async fn create_device(
        &self,
        device_id: &DeviceId,
        primary_key: &str,
        secondary_key: &str,
    ) -> Result<RegistryDevice>;
}

// ---------------------------------------------------------------------------
// REST implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceBody {
    device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authentication: Option<AuthenticationBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    capabilities: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticationBody {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    symmetric_key: Option<SymmetricKeyBody>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymmetricKeyBody {
    #[serde(default)]
    primary_key: Option<String>,
    #[serde(default)]
    secondary_key: Option<String>,
}

impl DeviceBody {
    fn into_device(self) -> Result<RegistryDevice> {
        let primary_key = self
            .authentication
            .and_then(|a| a.symmetric_key)
            .and_then(|k| k.primary_key)
            .filter(|k| !k.is_empty())
            .ok_or(CloudError::IncompleteResponse("authentication.symmetricKey.primaryKey"))?;
        let device_id = DeviceId::new(self.device_id)
            .map_err(|_| CloudError::IncompleteResponse("deviceId"))?;
        Ok(RegistryDevice {
            device_id,
            primary_key,
            enabled: self.status.as_deref() != Some("disabled"),
        })
    }
}

/// Registry client for the IoT Hub service REST API.
#[derive(Debug, Clone)]
pub struct HubRegistryClient {
    http: reqwest::Client,
    credentials: HubConnectionString,
    base_url: String,
}

impl HubRegistryClient {
    pub fn new(http: reqwest::Client, credentials: HubConnectionString) -> Self {
        let base_url = format!("https://{}", credentials.host_name);
        Self {
            http,
            credentials,
            base_url,
        }
    }

    /// Point requests at another base URL while keeping the hub host in
    /// signatures and descriptors (local emulators, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn device_url(&self, device_id: &DeviceId) -> String {
        format!(
            "{}/devices/{}?api-version={REGISTRY_API_VERSION}",
            self.base_url, device_id
        )
    }

    fn authorization(&self) -> Result<String> {
        sas_token_from_now(
            &self.credentials.host_name,
            &self.credentials.shared_access_key,
            Some(&self.credentials.shared_access_key_name),
            SAS_TOKEN_TTL_SECS,
        )
    }
}

async fn status_error(resp: reqwest::Response) -> CloudError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    CloudError::Status { status, body }
}

#[async_trait]
impl DeviceRegistry for HubRegistryClient {
    fn host_name(&self) -> &str {
        &self.credentials.host_name
    }

    async fn get_device(&self, device_id: &DeviceId) -> Result<Option<RegistryDevice>> {
        let resp = self
            .http
            .get(self.device_url(device_id))
            .header(reqwest::header::AUTHORIZATION, self.authorization()?)
            .send()
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => {
                debug!(device_id = %device_id, "device not in registry");
                Ok(None)
            }
            s if s.is_success() => {
                let body: DeviceBody = resp.json().await?;
                Ok(Some(body.into_device()?))
            }
            _ => Err(status_error(resp).await),
        }
    }

    async fn create_device(
        &self,
        device_id: &DeviceId,
        primary_key: &str,
        secondary_key: &str,
    ) -> Result<RegistryDevice> {
        let body = DeviceBody {
            device_id: device_id.to_string(),
            status: Some("enabled".to_string()),
            authentication: Some(AuthenticationBody {
                kind: "sas".to_string(),
                symmetric_key: Some(SymmetricKeyBody {
                    primary_key: Some(primary_key.to_string()),
                    secondary_key: Some(secondary_key.to_string()),
                }),
            }),
            capabilities: Some(serde_json::json!({ "iotEdge": false })),
        };

        let resp = self
            .http
            .put(self.device_url(device_id))
            .header(reqwest::header::AUTHORIZATION, self.authorization()?)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        let created: DeviceBody = resp.json().await?;
        let device = created.into_device()?;
        info!(device_id = %device.device_id, "device created in registry");
        Ok(device)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::get;
    use axum::{Json, Router};

    use super::*;

    type Devices = Arc<Mutex<HashMap<String, serde_json::Value>>>;

    async fn get_handler(
        State(devices): State<Devices>,
        headers: HeaderMap,
        Path(id): Path<String>,
    ) -> std::result::Result<Json<serde_json::Value>, AxumStatus> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !auth.starts_with("SharedAccessSignature sr=fleet.azure-devices.net&") {
            return Err(AxumStatus::UNAUTHORIZED);
        }
        devices
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .map(Json)
            .ok_or(AxumStatus::NOT_FOUND)
    }

    async fn put_handler(
        State(devices): State<Devices>,
        Path(id): Path<String>,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        devices.lock().unwrap().insert(id, body.clone());
        Json(body)
    }

    /// Serve a minimal registry on an ephemeral local port.
    pub(crate) async fn spawn_registry() -> (String, Devices) {
        let devices: Devices = Arc::default();
        let app = Router::new()
            .route("/devices/:id", get(get_handler).put(put_handler))
            .with_state(devices.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), devices)
    }

    pub(crate) fn owner() -> HubConnectionString {
        "HostName=fleet.azure-devices.net;SharedAccessKeyName=iothubowner;SharedAccessKey=c2VjcmV0a2V5"
            .parse()
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_then_create() {
        let (base, devices) = spawn_registry().await;
        let client = HubRegistryClient::new(reqwest::Client::new(), owner()).with_base_url(base);
        let id = DeviceId::new("scanner-0123456789ab").unwrap();

        assert_eq!(client.host_name(), "fleet.azure-devices.net");
        assert!(client.get_device(&id).await.unwrap().is_none());

        let created = client.create_device(&id, "cHJpbWFyeQ==", "c2Vjb25kYXJ5").await.unwrap();
        assert_eq!(created.primary_key, "cHJpbWFyeQ==");
        assert!(created.enabled);
        assert_eq!(
            devices.lock().unwrap()[id.as_str()]["authentication"]["type"],
            "sas"
        );

        let fetched = client.get_device(&id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    /// In-memory registry counting creations.
    #[derive(Default)]
    pub(crate) struct FakeRegistry {
        pub devices: Mutex<HashMap<DeviceId, RegistryDevice>>,
        pub creates: AtomicUsize,
        pub fail: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl DeviceRegistry for FakeRegistry {
        fn host_name(&self) -> &str {
            "fleet.azure-devices.net"
        }

        async fn get_device(&self, device_id: &DeviceId) -> Result<Option<RegistryDevice>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(CloudError::Status {
                    status: StatusCode::UNAUTHORIZED,
                    body: "denied".into(),
                });
            }
            Ok(self.devices.lock().unwrap().get(device_id).cloned())
        }

        async fn create_device(
            &self,
            device_id: &DeviceId,
            primary_key: &str,
            _secondary_key: &str,
        ) -> Result<RegistryDevice> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            let device = RegistryDevice {
                device_id: device_id.clone(),
                primary_key: primary_key.to_string(),
                enabled: true,
            };
            self.devices
                .lock()
                .unwrap()
                .insert(device_id.clone(), device.clone());
            Ok(device)
        }
    }
}
