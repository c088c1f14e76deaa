//! Connector abstraction and implementations

use crate::websocket::WebSocketConnector;
use crate::BrokerError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Default MQTT port
pub const DEFAULT_PORT: u16 = 1883;

/// Byte stream carrying MQTT packets
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Boxed stream handed out by connectors
pub type BrokerStream = Box<dyn AsyncStream>;

/// Opens streaming connections to a broker
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new stream to the broker
    async fn connect(&self) -> Result<BrokerStream, BrokerError>;

    /// Describe the endpoint for logs
    fn endpoint(&self) -> String;
}

/// Broker host and port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    /// Hostname or IP
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl BrokerAddress {
    /// Parse `[mqtt://|tcp://]host[:port]`
    pub fn parse(url: &str) -> Result<Self, BrokerError> {
        let rest = match url.split_once("://") {
            Some(("mqtt", rest)) | Some(("tcp", rest)) => rest,
            Some((scheme, _)) => {
                return Err(BrokerError::Connection(format!(
                    "unsupported broker scheme: {}",
                    scheme
                )));
            }
            None => url,
        };
        Self::from_authority(rest.trim_end_matches('/'), DEFAULT_PORT, url)
    }

    /// Parse `host[:port]` taken from `url`
    pub(crate) fn from_authority(
        rest: &str,
        default_port: u16,
        url: &str,
    ) -> Result<Self, BrokerError> {
        if rest.is_empty() {
            return Err(BrokerError::Connection(format!("missing broker host in {:?}", url)));
        }

        // Bracketed IPv6 literal: [::1]:1883
        if let Some(stripped) = rest.strip_prefix('[') {
            let (host, tail) = stripped.split_once(']').ok_or_else(|| {
                BrokerError::Connection(format!("invalid broker address {:?}", url))
            })?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port, url)?,
                None if tail.is_empty() => default_port,
                None => {
                    return Err(BrokerError::Connection(format!(
                        "invalid broker address {:?}",
                        url
                    )));
                }
            };
            return Ok(Self { host: host.to_string(), port });
        }

        match rest.rsplit_once(':') {
            Some((host, port)) => Ok(Self {
                host: host.to_string(),
                port: parse_port(port, url)?,
            }),
            None => Ok(Self {
                host: rest.to_string(),
                port: default_port,
            }),
        }
    }
}

fn parse_port(port: &str, url: &str) -> Result<u16, BrokerError> {
    port.parse()
        .map_err(|_| BrokerError::Connection(format!("invalid broker port in {:?}", url)))
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Plain TCP connector
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: BrokerAddress,
}

impl TcpConnector {
    /// Create a connector for the given address
    pub fn new(address: BrokerAddress) -> Self {
        Self { address }
    }

    /// Create a connector from a broker URL
    pub fn from_url(url: &str) -> Result<Self, BrokerError> {
        Ok(Self::new(BrokerAddress::parse(url)?))
    }

    /// Target address
    pub fn address(&self) -> &BrokerAddress {
        &self.address
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<BrokerStream, BrokerError> {
        info!("Connecting to broker at {}", self.address);

        let stream = TcpStream::connect((self.address.host.as_str(), self.address.port))
            .await
            .map_err(|e| {
                BrokerError::Connection(format!("failed to connect to {}: {}", self.address, e))
            })?;
        stream.set_nodelay(true)?;

        debug!("TCP connection to {} established", self.address);
        Ok(Box::new(stream))
    }

    fn endpoint(&self) -> String {
        self.address.to_string()
    }
}

/// Connector for a broker URL
///
/// `ws://` URLs get a [`WebSocketConnector`] reading frames of at most
/// `max_frame_size` bytes, anything else a [`TcpConnector`].
pub fn connector_for_url(
    url: &str,
    max_frame_size: usize,
) -> Result<Box<dyn Connector>, BrokerError> {
    if url.starts_with("ws://") {
        let connector = WebSocketConnector::from_url(url)?.with_max_frame_size(max_frame_size);
        Ok(Box::new(connector))
    } else {
        Ok(Box::new(TcpConnector::from_url(url)?))
    }
}

/// Connector that hands out a stream opened elsewhere, such as a TLS
/// stream set up by the caller. It can be used once.
pub struct StreamConnector {
    stream: Mutex<Option<BrokerStream>>,
    label: String,
}

impl StreamConnector {
    /// Wrap an already established stream
    pub fn new<S: AsyncStream + 'static>(stream: S, label: impl Into<String>) -> Self {
        Self {
            stream: Mutex::new(Some(Box::new(stream))),
            label: label.into(),
        }
    }
}

#[async_trait]
impl Connector for StreamConnector {
    async fn connect(&self) -> Result<BrokerStream, BrokerError> {
        let taken = match self.stream.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        taken.ok_or_else(|| {
            BrokerError::Connection(format!("stream for {} was already used", self.label))
        })
    }

    fn endpoint(&self) -> String {
        self.label.clone()
    }
}
