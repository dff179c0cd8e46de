//! Console listener against a local DevTools-like WebSocket server.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use sigrelay_bridge::{bridge_channel, DevToolsConfig, ConsoleListener, ConnectionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

fn console_event(value: &str) -> String {
    json!({
        "method": "Runtime.consoleAPICalled",
        "params": {"type": "log", "args": [{"type": "string", "value": value}]}
    })
    .to_string()
}

/// Accept one connection, wait for `Runtime.enable`, replay `events`, then idle.
async fn serve_once(events: Vec<String>) -> (String, tokio::sync::oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (first_tx, first_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (mut write, mut read) = ws.split();

        if let Some(Ok(Message::Text(first))) = read.next().await {
            let _ = first_tx.send(first);
        }
        let _ = write
            .send(Message::Text(json!({"id": 1, "result": {}}).to_string()))
            .await;
        for event in events {
            let _ = write.send(Message::Text(event)).await;
        }
        while let Some(Ok(msg)) = read.next().await {
            if msg.is_close() {
                break;
            }
        }
    });

    (format!("ws://{addr}"), first_rx)
}

#[tokio::test]
async fn test_listener_forwards_message_records() {
    let record = r#"{"type":"DISCORD_MESSAGE","author":"TraderJoe","content":"BTC long","timestamp":"2024-01-15T10:30:00.000Z","channel":"signals"}"#;
    let (url, first_rx) = serve_once(vec![
        console_event("[injector] observer attached"),
        console_event(record),
    ])
    .await;

    let (tx, mut rx) = bridge_channel();
    let token = CancellationToken::new();
    let listener = Arc::new(ConsoleListener::new(
        DevToolsConfig {
            endpoint: url,
            ..DevToolsConfig::default()
        },
        tx,
        token.clone(),
    ));
    let handle = {
        let listener = listener.clone();
        tokio::spawn(async move { listener.run().await })
    };

    let enable = tokio::time::timeout(Duration::from_secs(5), first_rx)
        .await
        .expect("enable timeout")
        .expect("enable frame");
    assert!(enable.contains("Runtime.enable"));

    let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("message timeout")
        .expect("message");
    assert_eq!(msg.author(), "TraderJoe");
    assert_eq!(msg.channel(), "signals");
    assert_eq!(listener.state(), ConnectionState::Connected);
    assert_eq!(rx.stats().dropped(), 1);

    token.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("shutdown timeout")
        .expect("join");
    assert!(result.is_ok());
    assert_eq!(listener.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_listener_gives_up_after_max_attempts() {
    // Nothing listens on this port once the listener is dropped.
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };

    let (tx, _rx) = bridge_channel();
    let listener = ConsoleListener::new(
        DevToolsConfig {
            endpoint: format!("ws://127.0.0.1:{port}"),
            max_reconnect_attempts: 1,
            reconnect_base_delay_ms: 10,
            reconnect_max_delay_ms: 10,
            connect_timeout_ms: 1000,
        },
        tx,
        CancellationToken::new(),
    );

    let result = tokio::time::timeout(Duration::from_secs(5), listener.run())
        .await
        .expect("run timeout");
    assert!(result.is_err());
    assert_eq!(listener.state(), ConnectionState::Disconnected);
}
