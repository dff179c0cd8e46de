//! DevTools intake to dispatch, end to end.
//!
//! A mock DevTools endpoint replays console lines (bridge records mixed with
//! page noise) into the console listener; the bridge receiver feeds the
//! pipeline, which dispatches to a recording venue.

mod integration;
use integration::common::fakes::{signal_reply, RecordingVenue, ScriptedReasoning};
use integration::common::mock_cdp::MockCdpServer;

use rust_decimal_macros::dec;
use serde_json::json;
use sigrelay_bot::Pipeline;
use sigrelay_bridge::{bridge_channel, DevToolsConfig, ConsoleListener, ConnectionState};
use sigrelay_core::{TradeSide, TradingPolicy, VenueId};
use sigrelay_executor::DispatchGatekeeper;
use sigrelay_risk::ChannelFilter;
use sigrelay_signal::SignalGenerator;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn record(author: &str, content: &str, channel: &str) -> String {
    json!({
        "type": "DISCORD_MESSAGE",
        "author": author,
        "content": content,
        "timestamp": "2024-01-15T10:30:00.000Z",
        "channel": channel,
    })
    .to_string()
}

#[tokio::test]
async fn test_console_records_flow_to_venue() {
    let server = MockCdpServer::start(vec![
        "[observer] container attached".to_string(),
        record("TraderJoe", "BTC long here", "signals"),
        r#"{"type":"OTHER","author":"x","content":"y","timestamp":"t","channel":"signals"}"#
            .to_string(),
        record("Lurker", "BTC long here", "general"),
        record("TraderJoe", "gm", "signals"),
    ])
    .await;

    let policy = TradingPolicy::new(70, dec!(100), Some(dec!(30)), [VenueId::Binance]).unwrap();
    let gatekeeper = Arc::new(DispatchGatekeeper::new(policy, Duration::from_secs(5)));
    let venue = Arc::new(RecordingVenue::new(VenueId::Binance));
    gatekeeper.register(venue.clone());
    let reasoning =
        Arc::new(ScriptedReasoning::new().on("BTC long", signal_reply("BTC/USDT", "BUY", 88)));
    let pipeline = Pipeline::new(
        ChannelFilter::new(["signals"]),
        SignalGenerator::new(reasoning.clone(), Duration::from_secs(5)),
        gatekeeper,
        false,
        Duration::from_secs(5),
    );

    let (sender, mut receiver) = bridge_channel();
    let token = CancellationToken::new();
    let listener = Arc::new(ConsoleListener::new(
        DevToolsConfig {
            endpoint: server.url(),
            ..DevToolsConfig::default()
        },
        sender,
        token.clone(),
    ));
    let handle = {
        let listener = listener.clone();
        tokio::spawn(async move { listener.run().await })
    };

    // Three records decode; the noise line and the foreign type are dropped.
    let mut submitted = 0;
    for _ in 0..3 {
        let msg = timeout(Duration::from_secs(5), receiver.recv())
            .await
            .expect("record timeout")
            .expect("bridge open");
        if pipeline.submit(msg) {
            submitted += 1;
        }
    }
    assert_eq!(submitted, 2);
    assert_eq!(receiver.stats().dropped(), 2);
    assert_eq!(listener.state(), ConnectionState::Connected);

    token.cancel();
    receiver.close();
    pipeline.shutdown().await;
    let result = timeout(Duration::from_secs(5), handle)
        .await
        .expect("listener shutdown timeout")
        .expect("join");
    assert!(result.is_ok());

    assert_eq!(reasoning.calls(), 2);
    assert_eq!(
        venue.orders(),
        vec![("BTC/USDT".to_string(), TradeSide::Buy, dec!(30))]
    );

    let frames = server.received_frames().await;
    assert!(frames.iter().any(|f| f.contains("Runtime.enable")));
    assert_eq!(server.connection_count().await, 1);
    server.shutdown().await;
}

#[tokio::test]
async fn test_listener_stops_cleanly_on_shutdown() {
    let server = MockCdpServer::start(vec![]).await;

    let (sender, _receiver) = bridge_channel();
    let token = CancellationToken::new();
    let listener = Arc::new(ConsoleListener::new(
        DevToolsConfig {
            endpoint: server.url(),
            reconnect_base_delay_ms: 10,
            reconnect_max_delay_ms: 10,
            ..DevToolsConfig::default()
        },
        sender,
        token.clone(),
    ));
    let handle = {
        let listener = listener.clone();
        tokio::spawn(async move { listener.run().await })
    };

    let connected = timeout(Duration::from_secs(5), async {
        loop {
            if server.connection_count().await > 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(connected.is_ok(), "should connect within timeout");

    token.cancel();
    let result = timeout(Duration::from_secs(5), handle)
        .await
        .expect("shutdown timeout")
        .expect("join");
    assert!(result.is_ok());
    assert_eq!(listener.state(), ConnectionState::Disconnected);
    server.shutdown().await;
}
