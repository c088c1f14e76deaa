//! In-memory broker for tests
//!
//! [`MockBroker`] sits on the far end of a duplex stream and speaks just
//! enough MQTT for a session to be established and driven from a test.

use crate::{Codec, Router, SessionBuilder};
use mindctrl_broker::{
    ConnAck, Connect, Packet, PacketCodec, Publish, QoS, StreamConnector, SubAck,
};
use mindctrl_proto::{decode_request, encode_response, status_topic, CallId, RequestPacket};
use serde::Serialize;
use tokio::io::DuplexStream;

/// Far end of a session under test
pub struct MockBroker {
    stream: DuplexStream,
    codec: PacketCodec,
}

/// Connector handing out the near end, and the broker on the far end
pub fn pair() -> (StreamConnector, MockBroker) {
    let (near, far) = tokio::io::duplex(256 * 1024);
    let broker = MockBroker {
        stream: far,
        codec: PacketCodec::new(),
    };
    (StreamConnector::new(near, "mock"), broker)
}

/// Builder for `client` -> `server` over a fresh mock broker
pub fn builder(client: &str, server: &str) -> (SessionBuilder, MockBroker) {
    let (connector, broker) = pair();
    let builder = SessionBuilder::new("mqtt://mock", client, server).with_connector(connector);
    (builder, broker)
}

/// Codec for a session whose server reported `alive`
pub async fn ready_codec(client: &str, server: &str) -> (Codec, MockBroker) {
    let (builder, mut broker) = builder(client, server);
    let (codec, _) = tokio::join!(builder.establish(), async {
        broker.handshake().await;
        broker.send_status(server, b"alive").await;
    });
    (codec.expect("session should be ready"), broker)
}

/// Router for a session whose server reported `alive`
pub async fn ready_router(client: &str, server: &str) -> (Router, MockBroker) {
    let (codec, broker) = ready_codec(client, server).await;
    (Router::new(codec), broker)
}

impl MockBroker {
    /// Next packet from the client, or `None` once it hung up
    pub async fn next_packet(&mut self) -> Option<Packet> {
        self.codec.read_packet(&mut self.stream).await.expect("client sent garbage")
    }

    /// Write `packet` to the client
    pub async fn send(&mut self, packet: Packet) {
        self.codec
            .write_packet(&mut self.stream, &packet)
            .await
            .expect("client end is gone");
    }

    /// Answer CONNECT with CONNACK carrying `reason_code`
    pub async fn accept_connect(&mut self, reason_code: u8) -> Connect {
        match self.next_packet().await {
            Some(Packet::Connect(connect)) => {
                self.send(Packet::ConnAck(ConnAck {
                    session_present: false,
                    reason_code,
                    reason_string: None,
                    server_keep_alive: None,
                }))
                .await;
                connect
            }
            other => panic!("expected CONNECT, got {:?}", other),
        }
    }

    /// Answer SUBSCRIBE with one SUBACK reason code per topic
    pub async fn accept_subscribe(&mut self, reason_code: u8) -> Vec<String> {
        match self.next_packet().await {
            Some(Packet::Subscribe(subscribe)) => {
                let reason_codes = vec![reason_code; subscribe.topics.len()];
                self.send(Packet::SubAck(SubAck {
                    packet_id: subscribe.packet_id,
                    reason_codes,
                }))
                .await;
                subscribe.topics
            }
            other => panic!("expected SUBSCRIBE, got {:?}", other),
        }
    }

    /// Accept the connection and its subscriptions
    pub async fn handshake(&mut self) -> (Connect, Vec<String>) {
        let connect = self.accept_connect(0).await;
        let topics = self.accept_subscribe(0).await;
        (connect, topics)
    }

    /// Deliver a retained status message for `server`
    pub async fn send_status(&mut self, server: &str, payload: &[u8]) {
        let publish = Publish::new(status_topic(server), payload.to_vec()).retained();
        self.send(Packet::Publish(publish)).await;
    }

    /// Deliver an arbitrary message
    pub async fn send_raw(&mut self, topic: &str, payload: &[u8]) {
        self.send(Packet::Publish(Publish::new(topic, payload.to_vec()))).await;
    }

    /// Deliver a response frame to `client`'s inbox
    pub async fn send_response<T: Serialize>(
        &mut self,
        id: CallId,
        method: &str,
        client: &str,
        server: &str,
        output: &T,
    ) {
        let payload =
            encode_response(id, method, client, server, output).expect("response encodes");
        let topic = mindctrl_proto::client_topic(client);
        self.send_raw(&topic, &payload).await;
    }

    /// Next PUBLISH from the client, skipping keep-alive pings
    pub async fn expect_publish(&mut self) -> Publish {
        loop {
            match self.next_packet().await {
                Some(Packet::Publish(publish)) => {
                    assert_eq!(publish.qos, QoS::AtMostOnce);
                    assert!(!publish.retain);
                    return publish;
                }
                Some(Packet::PingReq) => self.send(Packet::PingResp).await,
                other => panic!("expected PUBLISH, got {:?}", other),
            }
        }
    }

    /// Next request frame from the client
    pub async fn expect_request(&mut self) -> (String, RequestPacket) {
        let publish = self.expect_publish().await;
        let request = decode_request(&publish.payload).expect("client sent a valid request");
        (publish.topic, request)
    }

    /// Next packet must be DISCONNECT, followed by the end of the stream
    pub async fn expect_disconnect(&mut self) {
        match self.next_packet().await {
            Some(Packet::Disconnect { reason_code: 0 }) => {}
            other => panic!("expected DISCONNECT, got {:?}", other),
        }
        assert!(self.next_packet().await.is_none());
    }
}
