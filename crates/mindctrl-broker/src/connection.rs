//! Broker client over an established stream
//!
//! [`BrokerClient`] owns one MQTT session. A background pump reads packets
//! from the stream, pushes application messages into a bounded queue and
//! answers keep-alive and QoS 1 obligations. The client itself only writes
//! and pulls from the queue, so a caller consumes inbound messages at its
//! own pace.
//!
//! The keep-alive period is the one requested in CONNECT unless the broker
//! imposes its own in CONNACK. A PINGREQ left unanswered for a whole period
//! stops the pump, which closes the queue.

use crate::codec::DEFAULT_MAX_PACKET_SIZE;
use crate::transport::BrokerStream;
use crate::{BrokerError, ConnAck, Connect, Packet, PacketCodec, Publish, SubAck, Subscribe};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, Interval};
use tracing::{debug, error, info, warn};

/// Default inbound queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default time to wait for CONNACK and SUBACK
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Session parameters for [`BrokerClient::connect`]
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Client identifier presented to the broker
    pub client_id: String,
    /// Username
    pub username: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Keep-alive interval in seconds, 0 disables pings
    pub keep_alive: u16,
    /// Largest inbound packet accepted
    pub max_packet_size: usize,
    /// Capacity of the inbound message queue
    pub queue_capacity: usize,
    /// Time to wait for broker acknowledgements
    pub ack_timeout: Duration,
}

impl ConnectOptions {
    /// Options with defaults for everything but the client identifier
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            username: None,
            password: None,
            keep_alive: 0,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

/// Write side of the stream shared by the client and the pump
struct PacketSink {
    writer: WriteHalf<BrokerStream>,
    codec: PacketCodec,
}

impl PacketSink {
    async fn send(&mut self, packet: &Packet) -> Result<(), BrokerError> {
        debug!("Sending {}", packet.name());
        self.codec.write_packet(&mut self.writer, packet).await
    }
}

/// MQTT session with a broker
pub struct BrokerClient {
    /// Shared write side
    sink: Arc<Mutex<PacketSink>>,
    /// Application messages from the pump
    inbound: mpsc::Receiver<Publish>,
    /// CONNACK and SUBACK packets from the pump
    acks: mpsc::Receiver<Packet>,
    /// Background reader task
    pump: JoinHandle<()>,
    /// Next SUBSCRIBE packet identifier
    next_packet_id: u16,
    /// Time to wait for acknowledgements
    ack_timeout: Duration,
}

impl BrokerClient {
    /// Perform the MQTT handshake over `stream`
    pub async fn connect(
        stream: BrokerStream,
        options: &ConnectOptions,
    ) -> Result<Self, BrokerError> {
        let (reader, writer) = tokio::io::split(stream);
        let sink = Arc::new(Mutex::new(PacketSink {
            writer,
            codec: PacketCodec::new(),
        }));

        let (inbound_tx, inbound) = mpsc::channel(options.queue_capacity.max(1));
        let (acks_tx, acks) = mpsc::channel(8);

        let keep_alive = match options.keep_alive {
            0 => None,
            seconds => Some(Duration::from_secs(seconds as u64)),
        };

        let pump = InboundPump {
            reader,
            codec: PacketCodec::with_max_packet_size(options.max_packet_size),
            sink: sink.clone(),
            inbound_tx,
            acks_tx,
            keep_alive,
            ticker: ticker(keep_alive),
            ping_outstanding: false,
        };
        let pump = tokio::spawn(pump.run());

        let mut client = Self {
            sink,
            inbound,
            acks,
            pump,
            next_packet_id: 1,
            ack_timeout: options.ack_timeout,
        };

        let connect = Connect {
            client_id: options.client_id.clone(),
            clean_start: true,
            keep_alive: options.keep_alive,
            username: options.username.clone(),
            password: options.password.clone().map(Bytes::from),
            max_packet_size: u32::try_from(options.max_packet_size).ok(),
        };
        let ack = match client.send(&Packet::Connect(connect)).await {
            Ok(()) => client.wait_ack().await,
            Err(e) => Err(e),
        };
        let ack = match ack {
            Ok(ack) => ack,
            Err(e) => {
                client.shutdown().await;
                return Err(e);
            }
        };

        match ack {
            Packet::ConnAck(ConnAck { reason_code: 0, .. }) => {
                info!("Broker accepted session {}", options.client_id);
                Ok(client)
            }
            Packet::ConnAck(ConnAck { reason_code, reason_string, .. }) => {
                warn!(
                    "Broker rejected session {}: {:#04x} {}",
                    options.client_id,
                    reason_code,
                    reason_string.unwrap_or_default()
                );
                client.shutdown().await;
                Err(BrokerError::Rejected { reason_code })
            }
            other => {
                client.shutdown().await;
                Err(BrokerError::protocol(format!("expected CONNACK, got {}", other.name())))
            }
        }
    }

    /// Subscribe to `topics` at QoS 0
    pub async fn subscribe(&mut self, topics: &[String]) -> Result<(), BrokerError> {
        let packet_id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);

        self.send(&Packet::Subscribe(Subscribe {
            packet_id,
            topics: topics.to_vec(),
        }))
        .await?;

        match self.wait_ack().await? {
            Packet::SubAck(SubAck { packet_id: acked, reason_codes }) if acked == packet_id => {
                if reason_codes.len() != topics.len() {
                    return Err(BrokerError::protocol(format!(
                        "SUBACK carries {} reason codes for {} topics",
                        reason_codes.len(),
                        topics.len()
                    )));
                }
                for (topic, reason_code) in topics.iter().zip(reason_codes) {
                    if reason_code >= 0x80 {
                        return Err(BrokerError::Subscription {
                            topic: topic.clone(),
                            reason_code,
                        });
                    }
                }
                debug!("Subscribed to {:?}", topics);
                Ok(())
            }
            other => Err(BrokerError::protocol(format!(
                "unexpected {} while waiting for SUBACK {}",
                other.name(),
                packet_id
            ))),
        }
    }

    /// Publish a QoS 0, non-retained message
    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> Result<(), BrokerError> {
        self.send(&Packet::Publish(Publish::new(topic, payload))).await
    }

    /// Next application message, or `None` once the connection is gone
    pub async fn recv(&mut self) -> Option<Publish> {
        self.inbound.recv().await
    }

    /// Send DISCONNECT and release the connection
    pub async fn disconnect(mut self) -> Result<(), BrokerError> {
        let result = self.send(&Packet::Disconnect { reason_code: 0 }).await;
        self.shutdown().await;
        info!("Disconnected from broker");
        result
    }

    async fn send(&self, packet: &Packet) -> Result<(), BrokerError> {
        self.sink.lock().await.send(packet).await
    }

    async fn wait_ack(&mut self) -> Result<Packet, BrokerError> {
        match timeout(self.ack_timeout, self.acks.recv()).await {
            Ok(Some(packet)) => Ok(packet),
            Ok(None) => Err(BrokerError::Closed),
            Err(_) => Err(BrokerError::Timeout),
        }
    }

    async fn shutdown(&mut self) {
        self.pump.abort();
        self.inbound.close();
        if let Err(e) = self.sink.lock().await.writer.shutdown().await {
            debug!("Stream shutdown failed: {}", e);
        }
    }
}

impl Drop for BrokerClient {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Reads packets off the stream and routes them
struct InboundPump {
    reader: ReadHalf<BrokerStream>,
    codec: PacketCodec,
    sink: Arc<Mutex<PacketSink>>,
    inbound_tx: mpsc::Sender<Publish>,
    acks_tx: mpsc::Sender<Packet>,
    keep_alive: Option<Duration>,
    ticker: Interval,
    ping_outstanding: bool,
}

/// Keep-alive timer. With keep-alive disabled it is never polled.
fn ticker(keep_alive: Option<Duration>) -> Interval {
    let period = keep_alive.unwrap_or(Duration::from_secs(3600));
    interval_at(Instant::now() + period, period)
}

impl InboundPump {
    async fn run(mut self) {
        debug!("Starting inbound pump");

        loop {
            tokio::select! {
                result = self.codec.read_packet(&mut self.reader) => {
                    match result {
                        Ok(Some(packet)) => {
                            if !self.route(packet).await {
                                break;
                            }
                        }
                        Ok(None) => {
                            debug!("Broker closed the connection");
                            break;
                        }
                        Err(e) => {
                            error!("Failed to read packet: {}", e);
                            break;
                        }
                    }
                }

                _ = self.ticker.tick(), if self.keep_alive.is_some() => {
                    if !self.ping().await {
                        break;
                    }
                }
            }
        }

        debug!("Inbound pump stopped");
    }

    /// Send PINGREQ, or give up when the previous one went unanswered
    async fn ping(&mut self) -> bool {
        if self.ping_outstanding {
            error!(
                "No PINGRESP within {:?}, dropping the connection",
                self.ticker.period()
            );
            return false;
        }

        if let Err(e) = self.sink.lock().await.send(&Packet::PingReq).await {
            error!("Failed to send keep-alive: {}", e);
            return false;
        }
        self.ping_outstanding = true;
        true
    }

    fn adopt_keep_alive(&mut self, seconds: u16) {
        info!("Broker set keep-alive to {}s", seconds);
        self.keep_alive = match seconds {
            0 => None,
            seconds => Some(Duration::from_secs(seconds as u64)),
        };
        self.ticker = ticker(self.keep_alive);
        self.ping_outstanding = false;
    }

    /// Route one packet. Returns false when the pump should stop.
    async fn route(&mut self, packet: Packet) -> bool {
        match packet {
            Packet::Publish(publish) => {
                debug!("Received message on {} ({} bytes)", publish.topic, publish.payload.len());

                if let Some(packet_id) = publish.packet_id {
                    let ack = Packet::PubAck { packet_id };
                    if let Err(e) = self.sink.lock().await.send(&ack).await {
                        error!("Failed to acknowledge message {}: {}", packet_id, e);
                        return false;
                    }
                }

                if self.inbound_tx.send(publish).await.is_err() {
                    debug!("Inbound queue closed");
                    return false;
                }
                true
            }
            Packet::ConnAck(ack) => {
                if let Some(seconds) = ack.server_keep_alive {
                    self.adopt_keep_alive(seconds);
                }
                if self.acks_tx.send(Packet::ConnAck(ack)).await.is_err() {
                    debug!("Acknowledgement receiver dropped");
                }
                true
            }
            packet @ Packet::SubAck(_) => {
                if self.acks_tx.send(packet).await.is_err() {
                    debug!("Acknowledgement receiver dropped");
                }
                true
            }
            Packet::PingResp => {
                debug!("Keep-alive acknowledged");
                self.ping_outstanding = false;
                true
            }
            Packet::Disconnect { reason_code } => {
                warn!("Broker ended the session with reason code {:#04x}", reason_code);
                false
            }
            other => {
                warn!("Ignoring unexpected {} from broker", other.name());
                true
            }
        }
    }
}
