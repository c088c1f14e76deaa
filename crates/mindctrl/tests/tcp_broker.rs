//! End-to-end calls through a broker reached over TCP

use mindctrl::proto::{client_topic, decode_request, encode_response, status_topic};
use mindctrl::{get_browser_info, ping, MindctrlError, Operation, SessionBuilder, SessionState};
use mindctrl_broker::{ConnAck, Packet, PacketCodec, Publish, SubAck};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};

const SERVER: &str = "firefox";

/// Minimal broker that also plays the extension
async fn serve(listener: TcpListener) -> anyhow::Result<()> {
    let (mut stream, _) = listener.accept().await?;
    let mut codec = PacketCodec::new();

    while let Some(packet) = codec.read_packet(&mut stream).await? {
        match packet {
            Packet::Connect(_) => {
                let ack = ConnAck {
                    session_present: false,
                    reason_code: 0,
                    reason_string: None,
                    server_keep_alive: None,
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
                    "ping" => json!({"success": true, "message": ""}),
                    "info.get_browser" => json!({
                        "success": true,
                        "message": "",
                        "result": {"name": "Firefox", "version": "130.0"}
                    }),
                    "tabs.get" => json!({
                        "success": true,
                        "message": "",
                        "result": request.input::<Value>()?
                    }),
                    other => json!({
                        "success": false,
                        "message": format!("unknown method {}", other)
                    }),
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

    Ok(())
}

async fn send(codec: &PacketCodec, stream: &mut TcpStream, packet: Packet) -> anyhow::Result<()> {
    codec.write_packet(stream, &packet).await?;
    Ok(())
}

#[tokio::test]
async fn test_calls_over_tcp() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    let broker = tokio::spawn(serve(listener));

    let mut router = SessionBuilder::new(format!("mqtt://{}", address), "it-client", SERVER)
        .connect()
        .await?;
    assert_eq!(router.state(), SessionState::Ready);

    tokio_test::assert_ok!(ping().execute(&mut router).await);

    let mut browser = get_browser_info();
    let info = browser.execute(&mut router).await?;
    assert_eq!(info.name, "Firefox");
    assert_eq!(info.version, "130.0");

    let mut unknown = Operation::<Value, Value>::new("tabs.explode", json!({}));
    assert_eq!(
        unknown.execute(&mut router).await,
        Err(MindctrlError::MethodFailure("unknown method tabs.explode".to_string()))
    );

    let tabs = Arc::new(Mutex::new(Vec::new()));
    for tab in [3, 4] {
        let sink = tabs.clone();
        Operation::<Value, Value>::new("tabs.get", json!({"tab": tab}))
            .start(&mut router, move |op| {
                sink.lock().unwrap().push(op.into_result());
            })
            .await?;
    }

    assert!(router.dispatch().await);
    assert!(!router.dispatch().await);
    assert_eq!(
        *tabs.lock().unwrap(),
        vec![Ok(json!({"tab": 3})), Ok(json!({"tab": 4}))]
    );

    router.close().await?;
    broker.await??;
    Ok(())
}
