use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Connection to {target} timed out after {timeout:?}")]
    Timeout { target: String, timeout: Duration },

    #[error("Connection to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
