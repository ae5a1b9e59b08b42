//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur while talking to the bus
#[derive(Debug, Error)]
pub enum ObdError {
    /// Frame could not be written to the bus
    #[error("Bus transport error: {0}")]
    Transport(String),

    /// Bus interface could not be opened
    #[error("Failed to open bus interface {interface}: {reason}")]
    BusOpen { interface: String, reason: String },

    /// Frame payload exceeds the classic CAN limit
    #[error("Invalid frame: {0} data bytes (max 8)")]
    InvalidFrame(usize),

    /// Identifier does not fit in 11 bits
    #[error("Invalid standard identifier {0:#X}")]
    InvalidId(u32),
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::Transport(err.to_string())
    }
}

/// Reasons a received frame could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// First frame of an ISO-TP multi-frame response
    #[error("Multi-frame response from {id:#05X} is not supported")]
    MultiFrame { id: u16 },

    /// Frame is shorter than the bytes the decode rule reads
    #[error("Truncated frame from {id:#05X}: need {needed} bytes, got {len}")]
    Truncated { id: u16, needed: usize, len: usize },
}
