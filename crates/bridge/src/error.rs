//! Bridge Error Types

use thiserror::Error;

/// Errors raised while setting up the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Settings sources could not be read or merged
    #[error("Failed to load settings: {0}")]
    Settings(#[from] config::ConfigError),

    /// Settings were read but are not usable
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}
