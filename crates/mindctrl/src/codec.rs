//! Request/response correlation
//!
//! [`Codec`] turns "write a call" and "read its response" into publishes on
//! the server inbox and reads from the inbound queue. It handles one frame
//! at a time and keeps the last accepted response until its body is read.
//! A `dead` status, or the inbound stream ending, invalidates the codec for
//! good: from then on every operation fails with
//! [`MindctrlError::ServerDead`] without touching the network.

use crate::{MindctrlError, Result, SessionState};
use mindctrl_broker::BrokerClient;
use mindctrl_proto::{
    decode_response, encode_request, is_dead, is_status_topic, server_topic, CallId, ResponsePacket,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identity of an accepted response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Call identifier
    pub id: CallId,
    /// Remote method name
    pub method: String,
}

/// Correlation engine for one Ready session
pub struct Codec {
    /// Broker session
    broker: BrokerClient,
    /// Local identifier used in logs
    session_id: Uuid,
    /// Calling side name
    client: String,
    /// Serving side name
    server: String,
    /// Server inbox
    request_topic: String,
    /// Set once the server is gone
    invalidated: bool,
    /// Last accepted response
    response: Option<ResponsePacket>,
}

impl Codec {
    pub(crate) fn new(broker: BrokerClient, client: String, server: String) -> Self {
        let session_id = Uuid::new_v4();
        info!("Session {} ready: {} -> {}", session_id, client, server);

        Self {
            broker,
            session_id,
            request_topic: server_topic(&server),
            client,
            server,
            invalidated: false,
            response: None,
        }
    }

    /// Local session identifier
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Calling side name
    pub fn client(&self) -> &str {
        &self.client
    }

    /// Serving side name
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        if self.invalidated {
            SessionState::Invalidated
        } else {
            SessionState::Ready
        }
    }

    /// Publish a request frame to the server inbox
    pub async fn write_request<I>(&mut self, id: CallId, method: &str, input: &I) -> Result<()>
    where
        I: Serialize + ?Sized,
    {
        self.ensure_ready()?;

        let payload = encode_request(id, method, &self.client, &self.server, input)?;
        debug!("Session {}: request {} {} ({} bytes)", self.session_id, id, method, payload.len());

        self.broker.publish(&self.request_topic, payload).await?;
        Ok(())
    }

    /// Wait for the next response addressed to this session
    ///
    /// Status messages other than `dead`, undecodable frames and responses
    /// for another client/server pair are dropped. The accepted response
    /// stays cached until the next call to this method.
    pub async fn read_response(&mut self) -> Result<ResponseHeader> {
        self.ensure_ready()?;

        while let Some(message) = self.broker.recv().await {
            if is_status_topic(&message.topic) {
                if is_dead(&message.payload) {
                    warn!("Session {}: server {} is dead", self.session_id, self.server);
                    self.invalidate();
                    return Err(MindctrlError::ServerDead);
                }
                debug!("Session {}: ignoring status on {}", self.session_id, message.topic);
                continue;
            }

            let packet = match decode_response(&message.payload) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!(
                        "Session {}: discarding frame on {}: {}",
                        self.session_id, message.topic, e
                    );
                    continue;
                }
            };

            if packet.client != self.client || packet.server != self.server {
                warn!(
                    "Session {}: discarding response {} for {} -> {}",
                    self.session_id, packet.id, packet.client, packet.server
                );
                continue;
            }

            debug!("Session {}: response {} {}", self.session_id, packet.id, packet.method);
            let header = ResponseHeader {
                id: packet.id,
                method: packet.method.clone(),
            };
            self.response = Some(packet);
            return Ok(header);
        }

        info!("Session {}: inbound stream closed", self.session_id);
        self.invalidate();
        Err(MindctrlError::ServerDead)
    }

    /// Decode the cached response output
    pub fn read_response_body<T: DeserializeOwned>(&self) -> Result<T> {
        self.ensure_ready()?;

        match &self.response {
            Some(packet) => Ok(packet.output()?),
            None => Err(MindctrlError::MalformedFrame("no response has been read".to_string())),
        }
    }

    /// Drop the cached response output
    pub fn discard_response_body(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.response = None;
        Ok(())
    }

    /// Hand the cached response over undecoded
    pub(crate) fn take_response(&mut self) -> Result<ResponsePacket> {
        self.ensure_ready()?;
        self.response
            .take()
            .ok_or_else(|| MindctrlError::MalformedFrame("no response has been read".to_string()))
    }

    /// Disconnect from the broker
    pub async fn close(self) -> Result<()> {
        info!("Closing session {}", self.session_id);
        self.broker.disconnect().await?;
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.invalidated {
            Err(MindctrlError::ServerDead)
        } else {
            Ok(())
        }
    }

    fn invalidate(&mut self) {
        self.invalidated = true;
        self.response = None;
    }
}

#[cfg(test)]
mod tests;
