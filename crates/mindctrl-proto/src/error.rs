//! Error types for protocol operations

use thiserror::Error;

/// Protocol-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Outbound value could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Inbound payload is not a well formed packet
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}

impl ProtocolError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFrame(message.into())
    }
}
