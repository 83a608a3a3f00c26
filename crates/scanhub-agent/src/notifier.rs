//! Best-effort scan notifications to the inventory service.

use async_trait::async_trait;

use scanhub_cloud::{ApiClient, CloudError};
use scanhub_shared::Barcode;

#[async_trait]
pub trait ScanNotifier: Send + Sync {
    /// Tell the upstream service about a scan. Returns its status message.
    async fn notify_scan(&self, barcode: &Barcode) -> Result<String, CloudError>;
}

#[async_trait]
impl ScanNotifier for ApiClient {
    async fn notify_scan(&self, barcode: &Barcode) -> Result<String, CloudError> {
        let resp = self.save_device_barcode(barcode).await?;
        let message = resp
            .response_message
            .clone()
            .unwrap_or_else(|| "Saved".to_string());
        if resp.is_ok() {
            Ok(message)
        } else {
            Err(CloudError::Status {
                status: reqwest::StatusCode::from_u16(
                    resp.response_code
                        .and_then(|c| u16::try_from(c).ok())
                        .unwrap_or(500),
                )
                .unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
                body: message,
            })
        }
    }
}
