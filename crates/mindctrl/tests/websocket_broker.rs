//! Calls through a broker reached over WebSocket

use mindctrl::proto::{client_topic, decode_request, encode_response, status_topic};
use mindctrl::{get_browser_info, ping, SessionBuilder, SessionState, TransportOptions};
use mindctrl_broker::{ConnAck, MessageStream, Packet, PacketCodec, Publish, SubAck};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};

const SERVER: &str = "chrome";

type Stream = MessageStream<TcpStream>;

fn upgrade(request: &Request, mut response: Response) -> Result<Response, ErrorResponse> {
    let offered = request.headers().get(SEC_WEBSOCKET_PROTOCOL).cloned();
    if let Some(protocol) = offered {
        response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
    }
    Ok(response)
}

/// Broker speaking MQTT inside binary WebSocket messages
async fn serve(listener: TcpListener) -> anyhow::Result<Option<HeaderValue>> {
    let (stream, _) = listener.accept().await?;
    let mut protocol = None;
    let callback = |request: &Request, response: Response| {
        protocol = request.headers().get(SEC_WEBSOCKET_PROTOCOL).cloned();
        upgrade(request, response)
    };
    let socket = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let mut stream = MessageStream::new(socket);
    let mut codec = PacketCodec::new();

    while let Some(packet) = codec.read_packet(&mut stream).await? {
        match packet {
            Packet::Connect(_) => {
                let ack = ConnAck {
                    session_present: false,
                    reason_code: 0,
                    reason_string: None,
                    server_keep_alive: Some(600),
                };
                send(&codec, &mut stream, Packet::ConnAck(ack)).await?;
            }
            Packet::Subscribe(subscribe) => {
                let ack = SubAck {
                    packet_id: subscribe.packet_id,
                    reason_codes: vec![0; subscribe.topics.len()],
                };
                send(&codec, &mut stream, Packet::SubAck(ack)).await?;

                let status = Publish::new(status_topic(SERVER), &b"alive"[..]).retained();
                send(&codec, &mut stream, Packet::Publish(status)).await?;
            }
            Packet::Publish(publish) => {
                let request = decode_request(&publish.payload)?;
                let output = match request.method.as_str() {
                    "info.get_browser" => json!({
                        "success": true,
                        "result": {"name": "Chrome", "version": "129.0"}
                    }),
                    _ => json!({"success": true}),
                };

                let payload = encode_response(
                    request.id,
                    &request.method,
                    &request.client,
                    &request.server,
                    &output,
                )?;
                let reply = Publish::new(client_topic(&request.client), payload);
                send(&codec, &mut stream, Packet::Publish(reply)).await?;
            }
            Packet::PingReq => send(&codec, &mut stream, Packet::PingResp).await?,
            Packet::Disconnect { .. } => break,
            _ => {}
        }
    }

    Ok(protocol)
}

async fn send(codec: &PacketCodec, stream: &mut Stream, packet: Packet) -> anyhow::Result<()> {
    codec.write_packet(stream, &packet).await?;
    Ok(())
}

#[tokio::test]
async fn test_calls_over_websocket() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    let broker = tokio::spawn(serve(listener));

    let url = format!("ws://{}/mqtt", address);
    let mut router = SessionBuilder::new(url, "ws-client", SERVER)
        .with_options(TransportOptions::new().with_max_frame_size(64 * 1024))
        .connect()
        .await?;
    assert_eq!(router.state(), SessionState::Ready);

    tokio_test::assert_ok!(ping().execute(&mut router).await);

    let (tx, mut rx) = mpsc::unbounded_channel();
    get_browser_info().start_channel(&mut router, tx).await?;
    assert!(!router.dispatch().await);

    let done = rx.recv().await.expect("operation was not delivered");
    let info = done.into_result()?;
    assert_eq!(info.name, "Chrome");
    assert_eq!(info.version, "129.0");

    router.close().await?;
    let protocol = broker.await??;
    assert_eq!(protocol, Some(HeaderValue::from_static("mqtt")));
    Ok(())
}
