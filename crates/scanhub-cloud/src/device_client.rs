//! Device-to-cloud messaging over the hub's HTTPS endpoint.

use async_trait::async_trait;
use tracing::debug;

use scanhub_shared::constants::{DEVICE_API_VERSION, SAS_TOKEN_TTL_SECS};
use scanhub_shared::{ConnectionDescriptor, MessageKind};

use crate::error::{CloudError, Result};
use crate::sas::sas_token_from_now;

/// Deliver one message on behalf of one device.
///
/// `Ok(())` means the hub acknowledged the message; callers may then mark
/// it sent.
#[async_trait]
pub trait DeviceSender: Send + Sync {
    async fn send(&self, descriptor: &ConnectionDescriptor, message: &MessageKind) -> Result<()>;
}

/// Session for a single device. Opened by [`DeviceClient::connect`],
/// closed by [`DeviceClient::disconnect`] or by dropping it.
pub struct DeviceClient {
    http: reqwest::Client,
    events_url: String,
    authorization: String,
}

impl DeviceClient {
    /// Open a session against `base_url` (normally `https://<host>`).
    pub fn connect(
        http: reqwest::Client,
        descriptor: &ConnectionDescriptor,
        base_url: &str,
    ) -> Result<Self> {
        let resource = format!("{}/devices/{}", descriptor.host_name, descriptor.device_id);
        let authorization = sas_token_from_now(
            &resource,
            &descriptor.shared_access_key,
            None,
            SAS_TOKEN_TTL_SECS,
        )?;
        let events_url = format!(
            "{}/devices/{}/messages/events?api-version={DEVICE_API_VERSION}",
            base_url.trim_end_matches('/'),
            descriptor.device_id
        );
        Ok(Self {
            http,
            events_url,
            authorization,
        })
    }

    pub async fn send_message(&self, message: &MessageKind) -> Result<()> {
        let body = serde_json::to_vec(&message.hub_payload())?;
        let resp = self
            .http
            .post(&self.events_url)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("iothub-messageid", uuid::Uuid::new_v4().to_string())
            .header("iothub-contenttype", "application/json")
            .header("iothub-contentencoding", "utf-8")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            debug!(kind = message.message_type(), %status, "message accepted by hub");
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(CloudError::Status { status, body })
        }
    }

    /// End the session. The client owns no socket of its own (connections
    /// live in the shared `reqwest` pool), so this only drops the token.
    pub fn disconnect(self) {
        debug!("device session closed");
    }
}

/// [`DeviceSender`] that opens a fresh [`DeviceClient`] per message.
#[derive(Debug, Clone, Default)]
pub struct HttpDeviceSender {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl HttpDeviceSender {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: None,
        }
    }

    /// Send to a fixed base URL instead of `https://<descriptor host>`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

#[async_trait]
impl DeviceSender for HttpDeviceSender {
    async fn send(&self, descriptor: &ConnectionDescriptor, message: &MessageKind) -> Result<()> {
        let base_url = match &self.base_url {
            Some(url) => url.clone(),
            None => format!("https://{}", descriptor.host_name),
        };
        let client = DeviceClient::connect(self.http.clone(), descriptor, &base_url)?;
        let result = client.send_message(message).await;
        client.disconnect();
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use chrono::Utc;

    use scanhub_shared::{Barcode, DeviceId};

    use super::*;

    #[derive(Default)]
    struct Received {
        messages: Vec<(String, HeaderMap, serde_json::Value)>,
    }

    type Shared = Arc<Mutex<Received>>;

    async fn events(
        State(shared): State<Shared>,
        Path(id): Path<String>,
        headers: HeaderMap,
        body: String,
    ) -> StatusCode {
        if id == "scanner-broken" {
            return StatusCode::SERVICE_UNAVAILABLE;
        }
        let value = serde_json::from_str(&body).unwrap();
        shared.lock().unwrap().messages.push((id, headers, value));
        StatusCode::NO_CONTENT
    }

    async fn spawn_hub() -> (String, Shared) {
        let shared: Shared = Arc::default();
        let app = Router::new()
            .route("/devices/:id/messages/events", post(events))
            .with_state(shared.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), shared)
    }

    fn descriptor(id: &str) -> ConnectionDescriptor {
        ConnectionDescriptor::new(
            "fleet.azure-devices.net",
            DeviceId::new(id).unwrap(),
            "ZGV2aWNla2V5",
        )
    }

    fn scan(id: &str) -> MessageKind {
        MessageKind::BarcodeScan {
            device_id: DeviceId::new(id).unwrap(),
            barcode: Barcode::parse("40123456").unwrap(),
            quantity: 2,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_send_posts_payload_with_device_token() {
        let (base, shared) = spawn_hub().await;
        let sender = HttpDeviceSender::new(reqwest::Client::new()).with_base_url(base);

        sender
            .send(&descriptor("scanner-a1"), &scan("scanner-a1"))
            .await
            .unwrap();

        let received = shared.lock().unwrap();
        assert_eq!(received.messages.len(), 1);
        let (id, headers, body) = &received.messages[0];
        assert_eq!(id, "scanner-a1");
        assert_eq!(body["scannedBarcode"], "40123456");
        assert_eq!(body["quantity"], 2);

        let auth = headers["authorization"].to_str().unwrap();
        assert!(auth.starts_with(
            "SharedAccessSignature sr=fleet.azure-devices.net%2Fdevices%2Fscanner-a1&"
        ));
        assert!(!auth.contains("skn="));
        assert!(headers.contains_key("iothub-messageid"));
    }

    #[tokio::test]
    async fn test_send_reports_rejection_as_transient() {
        let (base, _shared) = spawn_hub().await;
        let sender = HttpDeviceSender::new(reqwest::Client::new()).with_base_url(base);

        let err = sender
            .send(&descriptor("scanner-broken"), &scan("scanner-broken"))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Status { status, .. } if status.as_u16() == 503));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_bad_device_key_fails_before_network() {
        let mut desc = descriptor("scanner-a1");
        desc.shared_access_key = "not base64!".to_string();
        let sender = HttpDeviceSender::new(reqwest::Client::new())
            .with_base_url("http://127.0.0.1:9");

        let err = sender.send(&desc, &scan("scanner-a1")).await.unwrap_err();
        assert!(matches!(err, CloudError::InvalidKey(_)));
        assert!(!err.is_transient());
    }
}
