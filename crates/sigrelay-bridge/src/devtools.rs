//! DevTools endpoint plumbing shared by every CDP session.
//!
//! Target discovery over `/json/list`, the timed WebSocket handshake and the
//! frame shape of commands, replies and events.

use crate::error::{BridgeError, BridgeResult};
use crate::reconnect::ReconnectPolicy;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tracing::info;

pub type DevToolsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection settings for a DevTools session.
#[derive(Debug, Clone)]
pub struct DevToolsConfig {
    /// DevTools HTTP base (`http://127.0.0.1:9222`) or a page WebSocket URL.
    pub endpoint: String,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    /// Budget for discovery plus WebSocket handshake.
    pub connect_timeout_ms: u64,
}

impl Default for DevToolsConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9222".to_string(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60000,
            connect_timeout_ms: 30000,
        }
    }
}

impl DevToolsConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TargetInfo {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    ws_url: Option<String>,
}

/// One inbound CDP frame: a reply when `id` is set, an event otherwise.
#[derive(Debug, Deserialize)]
pub struct CdpFrame {
    pub id: Option<u64>,
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub result: Value,
    pub error: Option<Value>,
}

impl CdpFrame {
    pub fn parse(text: &str) -> BridgeResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// True for events that end the session.
    pub fn is_detach(&self) -> bool {
        matches!(
            self.method.as_deref(),
            Some("Inspector.detached") | Some("Inspector.targetCrashed")
        )
    }
}

/// Outbound command frame.
pub fn command(id: u64, method: &str, params: Value) -> Message {
    Message::Text(json!({ "id": id, "method": method, "params": params }).to_string())
}

/// Resolve the WebSocket debugger URL of the first page target.
pub async fn discover_page_ws_url(http_base: &str) -> BridgeResult<String> {
    let url = format!("{}/json/list", http_base.trim_end_matches('/'));
    let targets: Vec<TargetInfo> = reqwest::get(&url)
        .await
        .map_err(|e| BridgeError::Discovery(e.to_string()))?
        .error_for_status()
        .map_err(|e| BridgeError::Discovery(e.to_string()))?
        .json()
        .await
        .map_err(|e| BridgeError::Discovery(e.to_string()))?;

    targets
        .into_iter()
        .filter(|t| t.kind == "page")
        .find_map(|t| t.ws_url)
        .ok_or_else(|| BridgeError::Discovery(format!("no page target at {url}")))
}

async fn resolve_ws_url(endpoint: &str) -> BridgeResult<String> {
    let endpoint = endpoint.trim();
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        Ok(endpoint.to_string())
    } else {
        discover_page_ws_url(endpoint).await
    }
}

/// Discover (if needed) and open the page WebSocket within the configured budget.
pub async fn connect_devtools(config: &DevToolsConfig) -> BridgeResult<DevToolsStream> {
    let timeout_ms = config.connect_timeout_ms;
    let handshake = async {
        let url = resolve_ws_url(&config.endpoint).await?;
        info!(%url, "Connecting to DevTools");
        let (stream, _response) = connect_async_tls_with_config(&url, None, true, None).await?;
        BridgeResult::Ok(stream)
    };
    tokio::time::timeout(Duration::from_millis(timeout_ms), handshake)
        .await
        .map_err(|_| BridgeError::ConnectTimeout(timeout_ms))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DevToolsConfig::default();
        assert_eq!(config.max_reconnect_attempts, 0);
        assert_eq!(config.connect_timeout_ms, 30000);
        let policy = config.reconnect_policy();
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_frame_kinds() {
        let reply = CdpFrame::parse(r#"{"id":3,"result":{"root":{}}}"#).unwrap();
        assert_eq!(reply.id, Some(3));
        assert!(reply.result.get("root").is_some());

        let event = CdpFrame::parse(r#"{"method":"Inspector.detached","params":{"reason":"x"}}"#).unwrap();
        assert!(event.id.is_none());
        assert!(event.is_detach());

        assert!(CdpFrame::parse("not json").is_err());
    }

    #[test]
    fn test_command_frame() {
        let Message::Text(text) = command(7, "DOM.getDocument", json!({"depth": -1})) else {
            panic!("expected text frame");
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "DOM.getDocument");
        assert_eq!(value["params"]["depth"], -1);
    }

    #[tokio::test]
    async fn test_connect_times_out_on_silent_endpoint() {
        // Accepts TCP but never answers the WebSocket handshake.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let config = DevToolsConfig {
            endpoint: format!("ws://{addr}"),
            connect_timeout_ms: 100,
            ..DevToolsConfig::default()
        };
        match connect_devtools(&config).await {
            Err(BridgeError::ConnectTimeout(ms)) => assert_eq!(ms, 100),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("handshake should not complete"),
        }
    }
}
