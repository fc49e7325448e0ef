//! End-to-end session flow over a real socket: pair, heartbeat, feature
//! fan-out, broadcast, disconnect.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use phonelink::config::Settings;
use phonelink::core::PhoneLinkBuilder;
use phonelink::domain::device::Identity;
use phonelink::infrastructure::security::CryptoEngine;
use phonelink::infrastructure::web::MessageCategory;
use phonelink::message::{types, Envelope};
use serial_test::serial;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn start_engine() -> (phonelink::PhoneLink, u16) {
    let mut settings = Settings::default();
    settings.network.server_port = 0;

    let engine = PhoneLinkBuilder::new(settings)
        .with_identity(Identity {
            device_id: "pc-test-1".to_string(),
            display_name: "Test Desktop".to_string(),
        })
        .without_persistence()
        .build()
        .unwrap();
    engine.start().await.unwrap();
    let port = engine.server_addr().await.unwrap().port();
    (engine, port)
}

async fn connect(port: u16) -> WsStream {
    let url = format!("ws://127.0.0.1:{}/phonelink", port);
    let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

async fn next_envelope(ws: &mut WsStream) -> Envelope {
    loop {
        let msg = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .expect("transport error");
        if let Message::Text(text) = msg {
            return Envelope::from_json(&text).unwrap();
        }
    }
}

async fn send_envelope(ws: &mut WsStream, envelope: &Envelope) {
    ws.send(Message::Text(envelope.to_json().unwrap()))
        .await
        .unwrap();
}

async fn pair(ws: &mut WsStream, code: &str, device_id: &str) -> Envelope {
    let peer_crypto = CryptoEngine::new();
    let public_key = peer_crypto.generate_key_pair().await;
    let request = Envelope::new(types::PAIRING_REQUEST)
        .set("code", code)
        .set("deviceId", device_id)
        .set("deviceName", "Integration Phone")
        .set("deviceModel", "android")
        .set("publicKey", public_key);
    send_envelope(ws, &request).await;
    next_envelope(ws).await
}

#[tokio::test]
#[serial]
async fn test_pair_heartbeat_and_broadcast() {
    let (engine, port) = start_engine().await;
    let (code, _) = engine.generate_pairing_code().await;

    let mut ws = connect(port).await;
    let response = pair(&mut ws, &code, "phone-1").await;
    assert_eq!(response.message_type, types::PAIRING_RESPONSE);
    assert_eq!(response.data_bool("success"), Some(true));
    assert_eq!(response.data_str("deviceId"), Some("pc-test-1"));
    assert!(engine.is_connected());

    // Heartbeat with a string battery level draws an immediate reply
    send_envelope(
        &mut ws,
        &Envelope::new(types::HEARTBEAT).set("battery", "73"),
    )
    .await;
    let reply = next_envelope(&mut ws).await;
    assert_eq!(reply.message_type, types::HEARTBEAT);
    assert!(reply.data_i64("timestamp").is_some());
    assert_eq!(engine.status().battery, Some(73));
    assert_eq!(engine.status().device_name.as_deref(), Some("Integration Phone"));

    // Feature frames fan out to subscribers
    let mut notifications = engine.subscribe_messages(MessageCategory::Notification);
    send_envelope(
        &mut ws,
        &Envelope::new(types::NOTIFICATION).set("title", "Ping"),
    )
    .await;
    let published = timeout(WAIT, notifications.recv()).await.unwrap().unwrap();
    assert_eq!(published.data_str("title"), Some("Ping"));

    // Broadcast from the engine reaches the client
    engine
        .send_message(None, &Envelope::new(types::CLIPBOARD).set("content", "hi"))
        .unwrap();
    let received = next_envelope(&mut ws).await;
    assert_eq!(received.message_type, types::CLIPBOARD);
    assert_eq!(received.data_str("content"), Some("hi"));

    // Closing the client removes the session
    ws.close(None).await.unwrap();
    let mut connected = engine.subscribe_connected();
    timeout(WAIT, async {
        while *connected.borrow() {
            connected.changed().await.unwrap();
        }
    })
    .await
    .expect("session was not removed after close");
    assert!(!engine.is_connected());

    engine.stop().await;
}

#[tokio::test]
#[serial]
async fn test_pairing_code_is_single_use_across_connections() {
    let (engine, port) = start_engine().await;
    let (code, _) = engine.generate_pairing_code().await;

    let mut first = connect(port).await;
    let response = pair(&mut first, &code, "phone-1").await;
    assert_eq!(response.data_bool("success"), Some(true));

    let mut second = connect(port).await;
    let response = pair(&mut second, &code, "phone-2").await;
    assert_eq!(response.data_bool("success"), Some(false));
    assert!(response.data_str("deviceId").is_none());

    engine.stop().await;
}

#[tokio::test]
#[serial]
async fn test_reconnect_replaces_previous_session() {
    let (engine, port) = start_engine().await;

    let (code, _) = engine.generate_pairing_code().await;
    let mut first = connect(port).await;
    assert_eq!(
        pair(&mut first, &code, "phone-1").await.data_bool("success"),
        Some(true)
    );

    // Same device pairs again over a new connection
    let (code, _) = engine.generate_pairing_code().await;
    let mut second = connect(port).await;
    assert_eq!(
        pair(&mut second, &code, "phone-1").await.data_bool("success"),
        Some(true)
    );

    // The superseded connection is closed by the registry
    let closed = timeout(WAIT, async {
        loop {
            match first.next().await {
                None => break,
                Some(Ok(Message::Close(_))) => break,
                Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "superseded connection was never closed");

    // The replacement still receives unicasts
    engine
        .send_message(
            Some("phone-1"),
            &Envelope::new(types::NOTIFICATION).set("title", "still here"),
        )
        .unwrap();
    let received = next_envelope(&mut second).await;
    assert_eq!(received.data_str("title"), Some("still here"));

    engine.stop().await;
}

#[tokio::test]
#[serial]
async fn test_malformed_frame_is_dropped_not_fatal() {
    let (engine, port) = start_engine().await;
    let (code, _) = engine.generate_pairing_code().await;

    let mut ws = connect(port).await;
    ws.send(Message::Text("{this is not json".to_string()))
        .await
        .unwrap();

    // The connection survives and pairing still works afterwards
    let response = pair(&mut ws, &code, "phone-1").await;
    assert_eq!(response.data_bool("success"), Some(true));

    engine.stop().await;
}

#[tokio::test]
#[serial]
async fn test_double_start_is_noop() {
    let (engine, port) = start_engine().await;
    engine.start().await.unwrap();
    assert_eq!(engine.server_addr().await.unwrap().port(), port);
    engine.stop().await;
    // Stop is idempotent too
    engine.stop().await;
}
