use thiserror::Error;

use scanhub_cloud::CloudError;
use scanhub_shared::{DeviceId, ValidationError};
use scanhub_store::StoreError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    #[error("No cloud connection available for device {0}")]
    Unregistered(DeviceId),

    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl AgentError {
    /// Failures of the local machine rather than of the network. These
    /// propagate to the caller instead of being turned into a queued send.
    pub fn is_local(&self) -> bool {
        match self {
            AgentError::Store(_) | AgentError::Validation(_) | AgentError::Task(_) => true,
            AgentError::Cloud(CloudError::Store(_) | CloudError::Task(_)) => true,
            AgentError::Cloud(_) | AgentError::Unregistered(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
