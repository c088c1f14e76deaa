//! Unit tests for the correlation engine

use super::*;
use crate::test_utils::{builder, ready_codec};
use crate::TransportOptions;
use mindctrl_broker::Packet;
use mindctrl_proto::MethodOutput;
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[tokio::test]
async fn test_write_request() {
    let (mut codec, mut broker) = ready_codec("c1", "s1").await;

    codec
        .write_request(1, "tabs.get", &json!({"tab": 42}))
        .await
        .unwrap();

    let (topic, request) = broker.expect_request().await;
    assert_eq!(topic, "mindctrl/servers/s1");
    assert_eq!(request.id, 1);
    assert_eq!(request.method, "tabs.get");
    assert_eq!(request.client, "c1");
    assert_eq!(request.server, "s1");
    assert_eq!(request.input::<Value>().unwrap(), json!({"tab": 42}));
}

#[tokio::test]
async fn test_requests_keep_write_order() {
    let (mut codec, mut broker) = ready_codec("c1", "s1").await;

    for id in 1..=3 {
        codec.write_request(id, "ping", &json!({})).await.unwrap();
    }

    for id in 1..=3 {
        assert_eq!(broker.expect_request().await.1.id, id);
    }
}

#[tokio::test]
async fn test_write_request_unserializable_input() {
    let (mut codec, _broker) = ready_codec("c1", "s1").await;

    let mut input = BTreeMap::new();
    input.insert(vec![1u8], 1u8);

    let result = codec.write_request(1, "ping", &input).await;
    assert!(matches!(result, Err(MindctrlError::Serialization(_))));
    assert_eq!(codec.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_ping_response() {
    let (mut codec, mut broker) = ready_codec("c1", "s1").await;

    broker
        .send_raw(
            "mindctrl/clients/c1",
            br#"{"type":"response","id":"1","method":"ping","client":"c1","server":"s1","result":{"success":true,"message":""}}"#,
        )
        .await;

    let header = codec.read_response().await.unwrap();
    assert_eq!(
        header,
        ResponseHeader {
            id: 1,
            method: "ping".to_string()
        }
    );

    let output: MethodOutput<()> = codec.read_response_body().unwrap();
    assert!(output.success);
    assert_eq!(output.message, "");
}

#[tokio::test]
async fn test_read_response_discards_noise() {
    let (mut codec, mut broker) = ready_codec("c1", "s1").await;

    broker.send_status("s1", b"alive").await;
    broker.send_status("s1", b"unknown").await;
    broker.send_raw("mindctrl/clients/c1", b"not json").await;
    broker
        .send_raw(
            "mindctrl/clients/c1",
            br#"{"type":"request","id":"3","method":"ping","client":"c1","server":"s1","params":{}}"#,
        )
        .await;
    broker
        .send_raw(
            "mindctrl/clients/c1",
            br#"{"type":"response","id":"x3","method":"ping","client":"c1","server":"s1","result":{}}"#,
        )
        .await;
    broker.send_response(4, "ping", "c2", "s1", &json!({})).await;
    broker.send_response(5, "ping", "c1", "s2", &json!({})).await;
    broker
        .send_response(6, "info.get_browser", "c1", "s1", &json!({"success": true}))
        .await;

    let header = codec.read_response().await.unwrap();
    assert_eq!(header.id, 6);
    assert_eq!(header.method, "info.get_browser");
    assert_eq!(codec.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_dead_status_invalidates() {
    let (mut codec, mut broker) = ready_codec("c1", "s1").await;

    broker.send_status("s1", b"dead").await;
    assert_eq!(codec.read_response().await, Err(MindctrlError::ServerDead));
    assert_eq!(codec.state(), SessionState::Invalidated);

    // Queued responses are never looked at again.
    broker.send_response(1, "ping", "c1", "s1", &json!({})).await;

    assert_eq!(
        codec.write_request(1, "ping", &json!({})).await,
        Err(MindctrlError::ServerDead)
    );
    assert_eq!(codec.read_response().await, Err(MindctrlError::ServerDead));
    assert_eq!(codec.read_response_body::<Value>(), Err(MindctrlError::ServerDead));
    assert_eq!(codec.discard_response_body(), Err(MindctrlError::ServerDead));
    assert_eq!(codec.state(), SessionState::Invalidated);

    // Nothing was published after the dead status.
    let (closed, _) = tokio::join!(codec.close(), broker.expect_disconnect());
    assert!(closed.is_ok());
}

#[tokio::test]
async fn test_cached_body_unavailable_after_dead() {
    let (mut codec, mut broker) = ready_codec("c1", "s1").await;

    broker.send_response(1, "ping", "c1", "s1", &json!({"success": true})).await;
    broker.send_status("s1", b"dead").await;

    codec.read_response().await.unwrap();
    assert!(codec.read_response_body::<Value>().is_ok());

    assert_eq!(codec.read_response().await, Err(MindctrlError::ServerDead));
    assert_eq!(codec.read_response_body::<Value>(), Err(MindctrlError::ServerDead));
}

#[tokio::test]
async fn test_connection_loss_invalidates() {
    let (mut codec, broker) = ready_codec("c1", "s1").await;
    drop(broker);

    assert_eq!(codec.read_response().await, Err(MindctrlError::ServerDead));
    assert_eq!(codec.state(), SessionState::Invalidated);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_keep_alive_invalidates() {
    let (builder, mut broker) = builder("c1", "s1");
    let builder = builder.with_options(TransportOptions::new().with_keep_alive(300));

    let (codec, _) = tokio::join!(builder.establish(), async {
        broker.handshake().await;
        broker.send_status("s1", b"alive").await;
    });
    let mut codec = codec.unwrap();

    // The broker stays connected but never answers PINGREQ
    let started = tokio::time::Instant::now();
    assert_eq!(codec.read_response().await, Err(MindctrlError::ServerDead));
    assert_eq!(codec.state(), SessionState::Invalidated);
    assert!(started.elapsed() >= std::time::Duration::from_secs(600));
    assert_eq!(broker.next_packet().await, Some(Packet::PingReq));
}

#[tokio::test]
async fn test_oversized_frame_ends_session() {
    let (builder, mut broker) = builder("c1", "s1");
    let builder = builder.with_options(TransportOptions::new().with_max_frame_size(32 * 1024));

    let (codec, _) = tokio::join!(builder.establish(), async {
        broker.handshake().await;
        broker.send_status("s1", b"alive").await;
    });
    let mut codec = codec.unwrap();

    let blob = "x".repeat(40 * 1024);
    broker.send_response(1, "ping", "c1", "s1", &json!({"blob": blob})).await;

    assert_eq!(codec.read_response().await, Err(MindctrlError::ServerDead));
}

#[tokio::test]
async fn test_response_body() {
    let (mut codec, mut broker) = ready_codec("c1", "s1").await;

    broker
        .send_response(
            2,
            "info.get_platform",
            "c1",
            "s1",
            &json!({"success": true, "message": "", "result": {"os": "linux", "arch": "x86-64"}}),
        )
        .await;
    codec.read_response().await.unwrap();

    let output: MethodOutput<mindctrl_proto::method::PlatformInfo> =
        codec.read_response_body().unwrap();
    assert_eq!(output.result.os, "linux");
    assert_eq!(output.result.arch, "x86-64");

    // Wrong shape is a decode failure, not a dead session.
    let mismatch = codec.read_response_body::<Vec<u32>>();
    assert!(matches!(mismatch, Err(MindctrlError::MalformedFrame(_))));
    assert_eq!(codec.state(), SessionState::Ready);

    codec.discard_response_body().unwrap();
    assert!(matches!(
        codec.read_response_body::<Value>(),
        Err(MindctrlError::MalformedFrame(_))
    ));
}

#[tokio::test]
async fn test_response_without_result() {
    let (mut codec, mut broker) = ready_codec("c1", "s1").await;

    broker
        .send_raw(
            "mindctrl/clients/c1",
            br#"{"type":"response","id":"9","method":"ping","client":"c1","server":"s1"}"#,
        )
        .await;

    assert_eq!(codec.read_response().await.unwrap().id, 9);
    assert_eq!(codec.read_response_body::<Value>().unwrap(), Value::Null);
}
