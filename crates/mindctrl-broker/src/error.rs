//! Broker-specific error types

use std::io;
use thiserror::Error;

/// Broker transport errors
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Stream could not be opened
    #[error("Broker connection error: {0}")]
    Connection(String),

    /// Broker refused the session
    #[error("Broker rejected connection with reason code {reason_code:#04x}")]
    Rejected {
        /// CONNACK reason code
        reason_code: u8,
    },

    /// Broker refused one or more subscriptions
    #[error("Subscription to {topic} failed with reason code {reason_code:#04x}")]
    Subscription {
        /// Topic that was refused
        topic: String,
        /// SUBACK reason code
        reason_code: u8,
    },

    /// Peer sent something that is not valid MQTT
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Inbound packet exceeds the configured ceiling
    #[error("Packet too large: {size} bytes (max: {max})")]
    PacketTooLarge {
        /// Declared packet size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Broker did not answer in time
    #[error("Operation timed out")]
    Timeout,

    /// Connection is gone
    #[error("Connection closed")]
    Closed,
}

impl BrokerError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}
