//! # Mindctrl Protocol
//!
//! Wire packets, topic names, status sentinels and method names shared by
//! mindctrl clients and the browser extension they control.

#![warn(missing_docs)]

/// Request and response packets
pub mod packet;

/// Broker topic names
pub mod topic;

/// Server status sentinels
pub mod status;

/// Broker client identifiers
pub mod id;

/// Remote method names and common result shapes
pub mod method;

/// Error types for protocol operations
pub mod error;

pub use packet::{
    decode_request, decode_response, encode_request, encode_response, RequestPacket,
    ResponsePacket,
};
pub use topic::{client_topic, is_status_topic, server_topic, status_topic};
pub use status::{is_alive, is_dead, ServerStatus};
pub use id::generate_client_id;
pub use method::MethodOutput;
pub use error::ProtocolError;

/// Call identifier carried in the `id` field of every packet
pub type CallId = u64;
