//! Client for the upstream inventory REST API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use scanhub_shared::Barcode;

use crate::error::{CloudError, Result};

pub const DEFAULT_API_URL: &str = "https://api2.caleffionline.it/api/v1";

/// Envelope the inventory API wraps every answer in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    #[serde(default)]
    pub response_code: Option<i64>,
    #[serde(default)]
    pub response_message: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn is_ok(&self) -> bool {
        self.response_code.map_or(true, |code| code == 200)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveBarcodeRequest<'a> {
    scanned_barcode: &'a str,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("scanhub-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Report a scanned barcode to the inventory service.
    pub async fn save_device_barcode(&self, barcode: &Barcode) -> Result<ApiResponse> {
        self.post(
            "/raspberry/saveDeviceId",
            &SaveBarcodeRequest {
                scanned_barcode: barcode.as_str(),
            },
        )
        .await
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        let url = format!("{}{path}", self.base_url);
        let resp = self.http.post(&url).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CloudError::Status { status, body });
        }
        let parsed: ApiResponse = resp.json().await?;
        debug!(url = %url, code = ?parsed.response_code, "inventory API answered");
        Ok(parsed)
    }
}
