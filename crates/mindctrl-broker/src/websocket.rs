//! MQTT over WebSocket
//!
//! Brokers that front MQTT with a WebSocket listener expect the `mqtt`
//! subprotocol and carry packets in binary messages. [`MessageStream`]
//! turns such a connection back into a byte stream, so the rest of the
//! client does not care which transport it runs on.

use crate::transport::{BrokerAddress, BrokerStream, Connector};
use crate::BrokerError;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Sink, Stream};
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

/// Default WebSocket port
pub const DEFAULT_WS_PORT: u16 = 80;

/// Subprotocol offered during the upgrade
pub const MQTT_SUBPROTOCOL: &str = "mqtt";

/// Default limit on inbound messages and frames
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Connector for `ws://host[:port][/path]` broker URLs
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    address: BrokerAddress,
    path: String,
    max_frame_size: usize,
}

impl WebSocketConnector {
    /// Create a connector from a `ws://` URL
    pub fn from_url(url: &str) -> Result<Self, BrokerError> {
        let rest = match url.split_once("://") {
            Some(("ws", rest)) => rest,
            Some((scheme, _)) => {
                return Err(BrokerError::Connection(format!(
                    "unsupported broker scheme: {}",
                    scheme
                )));
            }
            None => {
                return Err(BrokerError::Connection(format!(
                    "not a WebSocket URL: {:?}",
                    url
                )));
            }
        };

        let (authority, path) = match rest.find('/') {
            Some(at) => rest.split_at(at),
            None => (rest, "/"),
        };

        Ok(Self {
            address: BrokerAddress::from_authority(authority, DEFAULT_WS_PORT, url)?,
            path: path.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        })
    }

    /// Refuse inbound messages larger than `size` bytes
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Target address
    pub fn address(&self) -> &BrokerAddress {
        &self.address
    }

    /// Inbound message limit
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn url(&self) -> String {
        format!("ws://{}{}", self.address, self.path)
    }

    fn config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_frame_size);
        config.max_frame_size = Some(self.max_frame_size);
        config
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<BrokerStream, BrokerError> {
        let url = self.url();
        info!("Connecting to broker at {}", url);

        let mut request = url.as_str().into_client_request().map_err(|e| {
            BrokerError::Connection(format!("invalid WebSocket URL {}: {}", url, e))
        })?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(MQTT_SUBPROTOCOL));

        let stream = TcpStream::connect((self.address.host.as_str(), self.address.port))
            .await
            .map_err(|e| {
                BrokerError::Connection(format!("failed to connect to {}: {}", self.address, e))
            })?;
        stream.set_nodelay(true)?;

        let (socket, _) =
            tokio_tungstenite::client_async_with_config(request, stream, Some(self.config()))
                .await
                .map_err(|e| {
                    BrokerError::Connection(format!("WebSocket upgrade to {} failed: {}", url, e))
                })?;

        debug!("WebSocket connection to {} established", url);
        Ok(Box::new(MessageStream::new(socket)))
    }

    fn endpoint(&self) -> String {
        self.url()
    }
}

/// Byte stream over binary WebSocket messages
///
/// Every write becomes one message. Reads hand out message payloads in
/// order, skipping control messages. A close message reads as EOF.
pub struct MessageStream<S> {
    socket: WebSocketStream<S>,
    pending: Bytes,
}

impl<S> MessageStream<S> {
    /// Wrap an upgraded connection
    pub fn new(socket: WebSocketStream<S>) -> Self {
        Self {
            socket,
            pending: Bytes::new(),
        }
    }
}

fn to_io(e: WsError) -> io::Error {
    match e {
        WsError::Io(e) => e,
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            io::Error::new(io::ErrorKind::BrokenPipe, e)
        }
        e => io::Error::new(io::ErrorKind::InvalidData, e),
    }
}

impl<S> AsyncRead for MessageStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            if !self.pending.is_empty() {
                let n = self.pending.len().min(buf.remaining());
                let chunk = self.pending.split_to(n);
                buf.put_slice(&chunk);
                return Poll::Ready(Ok(()));
            }

            match ready!(Pin::new(&mut self.socket).poll_next(cx)) {
                Some(Ok(Message::Binary(data))) => self.pending = Bytes::from(data),
                Some(Ok(Message::Close(frame))) => {
                    debug!("WebSocket closed by broker: {:?}", frame);
                    return Poll::Ready(Ok(()));
                }
                Some(Ok(Message::Text(_))) => {
                    warn!("Text message on an MQTT connection");
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "text message on an MQTT connection",
                    )));
                }
                // ping, pong and raw frames
                Some(Ok(_)) => {}
                Some(Err(e)) => return Poll::Ready(Err(to_io(e))),
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}

impl<S> AsyncWrite for MessageStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        ready!(Pin::new(&mut self.socket).poll_ready(cx)).map_err(to_io)?;
        Pin::new(&mut self.socket)
            .start_send(Message::Binary(buf.to_vec()))
            .map_err(to_io)?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.socket).poll_flush(cx).map_err(to_io)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match ready!(Pin::new(&mut self.socket).poll_close(cx)) {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => {
                Poll::Ready(Ok(()))
            }
            Err(e) => Poll::Ready(Err(to_io(e))),
        }
    }
}
