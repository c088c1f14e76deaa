//! Error types for the mindctrl library

use mindctrl_broker::BrokerError;
use mindctrl_proto::ProtocolError;
use std::time::Duration;
use thiserror::Error;

/// Main error type for mindctrl operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MindctrlError {
    /// Broker could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// Broker refused the session
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// Broker refused a subscription
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Server is unreachable or announced that it is dead
    #[error("Server is dead")]
    ServerDead,

    /// Inbound frame could not be decoded
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Outbound payload could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Server ran the method and reported a failure
    #[error("Method failed: {0}")]
    MethodFailure(String),

    /// Operation used outside its lifecycle
    #[error("Operation error: {0}")]
    Operation(String),

    /// Broker broke the MQTT protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Timeout errors
    #[error("Timeout after {duration:?}")]
    Timeout {
        /// Duration that was exceeded
        duration: Duration,
    },
}

impl From<BrokerError> for MindctrlError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Connection(msg) => Self::Connection(msg),
            BrokerError::Io(e) => Self::Connection(e.to_string()),
            BrokerError::Closed => Self::Connection("connection closed".to_string()),
            e @ BrokerError::Rejected { .. } => Self::Handshake(e.to_string()),
            e @ BrokerError::Subscription { .. } => Self::Subscription(e.to_string()),
            e @ (BrokerError::Protocol(_) | BrokerError::PacketTooLarge { .. }) => {
                Self::Protocol(e.to_string())
            }
            BrokerError::Timeout => Self::Handshake("broker did not answer in time".to_string()),
        }
    }
}

impl From<ProtocolError> for MindctrlError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Serialization(msg) => Self::Serialization(msg),
            ProtocolError::MalformedFrame(msg) => Self::MalformedFrame(msg),
        }
    }
}

impl From<serde_json::Error> for MindctrlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON error: {}", err))
    }
}

impl MindctrlError {
    /// Whether the error ends the session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Handshake(_)
                | Self::Subscription(_)
                | Self::ServerDead
                | Self::Protocol(_)
                | Self::Timeout { .. }
        )
    }
}
