//! Session establishment
//!
//! A session goes through `Establishing` (stream, handshake, subscriptions)
//! and `ProbingLiveness` before it becomes `Ready`. The probe relies on the
//! server publishing `alive` and `dead` as retained messages on its status
//! topic: a server that is up redelivers `alive` as soon as we subscribe,
//! so silence for the whole probe window means it is not there.

use crate::{Codec, MindctrlError, Result, Router, TransportOptions};
use mindctrl_broker::{connector_for_url, BrokerClient, BrokerError, Connector};
use mindctrl_proto::{client_topic, generate_client_id, is_status_topic, status_topic, ServerStatus};
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

/// How long to wait for the server status
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for the stream and the broker handshake
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Opening the stream, handshaking and subscribing
    Establishing,
    /// Waiting for the server status
    ProbingLiveness,
    /// Calls may be issued
    Ready,
    /// Server died or the connection dropped; terminal
    Invalidated,
}

/// Session builder for configuring connections
pub struct SessionBuilder {
    /// Broker endpoint, used when no connector is given
    url: String,
    /// Calling side name
    client: String,
    /// Serving side name
    server: String,
    /// Transport options
    options: TransportOptions,
    /// Custom stream source
    connector: Option<Box<dyn Connector>>,
    /// Liveness probe window
    probe_timeout: Duration,
    /// Stream and handshake timeout
    connect_timeout: Duration,
}

impl SessionBuilder {
    /// Create a new session builder
    pub fn new(
        url: impl Into<String>,
        client: impl Into<String>,
        server: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            client: client.into(),
            server: server.into(),
            options: TransportOptions::default(),
            connector: None,
            probe_timeout: PROBE_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Set transport options
    pub fn with_options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    /// Use `connector` instead of connecting to the URL
    pub fn with_connector<C: Connector + 'static>(mut self, connector: C) -> Self {
        self.connector = Some(Box::new(connector));
        self
    }

    /// Set the liveness probe window
    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Set the stream and handshake timeout
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Open the session and wrap it in a [`Router`]
    pub async fn connect(self) -> Result<Router> {
        Ok(Router::new(self.establish().await?))
    }

    /// Open the session and return the codec once the server is alive
    pub async fn establish(self) -> Result<Codec> {
        let connector = match self.connector {
            Some(connector) => connector,
            None => connector_for_url(&self.url, self.options.max_frame_size()).map_err(|e| {
                MindctrlError::Connection(format!("invalid broker address {}: {}", self.url, e))
            })?,
        };

        debug!("Session {} -> {}: {:?}", self.client, self.server, SessionState::Establishing);
        info!("Connecting to broker at {}", connector.endpoint());

        let stream = match timeout(self.connect_timeout, connector.connect()).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(MindctrlError::Connection(e.to_string())),
            Err(_) => {
                return Err(MindctrlError::Timeout {
                    duration: self.connect_timeout,
                })
            }
        };

        let client_id = generate_client_id(&self.client);
        let connect_options = self.options.connect_options(client_id, self.connect_timeout);

        let mut broker = match BrokerClient::connect(stream, &connect_options).await {
            Ok(broker) => broker,
            Err(BrokerError::Io(e)) => return Err(MindctrlError::Connection(e.to_string())),
            Err(e) => return Err(MindctrlError::Handshake(e.to_string())),
        };

        let topics = [client_topic(&self.client), status_topic(&self.server)];
        if let Err(e) = broker.subscribe(&topics).await {
            warn!("Failed to subscribe to {:?}: {}", topics, e);
            close_quietly(broker).await;
            return Err(MindctrlError::Subscription(e.to_string()));
        }

        debug!("Session {} -> {}: {:?}", self.client, self.server, SessionState::ProbingLiveness);

        match probe(&mut broker, self.probe_timeout).await {
            Ok(()) => {
                info!("Server {} is alive", self.server);
                Ok(Codec::new(broker, self.client, self.server))
            }
            Err(e) => {
                warn!("Server {} is not reachable", self.server);
                close_quietly(broker).await;
                Err(e)
            }
        }
    }
}

/// Wait for a status message until `window` elapses
async fn probe(broker: &mut BrokerClient, window: Duration) -> Result<()> {
    let deadline = Instant::now() + window;

    loop {
        let message = match timeout_at(deadline, broker.recv()).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("Connection closed while probing");
                return Err(MindctrlError::ServerDead);
            }
            Err(_) => {
                debug!("No status message within {:?}", window);
                return Err(MindctrlError::ServerDead);
            }
        };

        if !is_status_topic(&message.topic) {
            debug!("Ignoring message on {} while probing", message.topic);
            continue;
        }

        match ServerStatus::parse(&message.payload) {
            Some(ServerStatus::Alive) => return Ok(()),
            Some(ServerStatus::Dead) => return Err(MindctrlError::ServerDead),
            None => debug!("Ignoring unknown status on {}", message.topic),
        }
    }
}

async fn close_quietly(broker: BrokerClient) {
    if let Err(e) = broker.disconnect().await {
        debug!("Disconnect after failed establishment: {}", e);
    }
}
