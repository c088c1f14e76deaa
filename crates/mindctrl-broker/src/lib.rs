//! # Mindctrl Broker Transport
//!
//! Streaming connection to the MQTT broker that relays mindctrl traffic:
//! TCP and WebSocket connectors, the MQTT 5 packet codec and the broker
//! client.

#![warn(missing_docs)]

/// Connector abstraction and implementations
pub mod transport;

/// MQTT over WebSocket
pub mod websocket;

/// Broker client over an established stream
pub mod connection;

/// MQTT control packets
pub mod packet;

/// Packet codec for async streams
pub mod codec;

/// Broker-specific error types
pub mod error;

pub use transport::{
    connector_for_url, BrokerAddress, BrokerStream, Connector, StreamConnector, TcpConnector,
};
pub use websocket::{MessageStream, WebSocketConnector};
pub use connection::{BrokerClient, ConnectOptions};
pub use packet::{ConnAck, Connect, Packet, Publish, QoS, SubAck, Subscribe};
pub use codec::PacketCodec;
pub use error::BrokerError;
