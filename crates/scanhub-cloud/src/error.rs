use reqwest::StatusCode;
use thiserror::Error;

use scanhub_shared::DescriptorError;
use scanhub_store::StoreError;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Invalid connection string: {0}")]
    ConnectionString(#[from] DescriptorError),

    #[error("Invalid shared access key: {0}")]
    InvalidKey(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Registry response missing {0}")]
    IncompleteResponse(&'static str),

    /// Local storage failed underneath a cloud operation.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl CloudError {
    /// Whether repeating the same call may succeed.
    ///
    /// Configuration mistakes and 4xx answers (other than throttling and
    /// timeouts) will fail the same way every time.
    pub fn is_transient(&self) -> bool {
        match self {
            CloudError::Http(_) => true,
            CloudError::Status { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
