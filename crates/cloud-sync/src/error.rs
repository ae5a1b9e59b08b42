//! Cloud Sync Error Types

use thiserror::Error;

/// Cloud sync error types
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid desired config: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for CloudError {
    fn from(err: serde_json::Error) -> Self {
        CloudError::Serialization(err.to_string())
    }
}
