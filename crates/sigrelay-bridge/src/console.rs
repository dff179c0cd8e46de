//! CDP console listener.
//!
//! Attaches to the desktop client's DevTools endpoint, enables the `Runtime`
//! domain and forwards the first string argument of every console call into
//! the bridge. Reconnects with exponential backoff until shutdown.

use crate::devtools::{command, connect_devtools, CdpFrame, DevToolsConfig};
use crate::error::{BridgeError, BridgeResult};
use crate::transport::{BridgeSender, BridgeSink};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

const RUNTIME_ENABLE_ID: u64 = 1;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// First string argument of a `Runtime.consoleAPICalled` event.
fn console_line(params: &Value) -> Option<&str> {
    params
        .get("args")?
        .as_array()?
        .first()?
        .get("value")?
        .as_str()
}

/// DevTools console listener feeding a bridge sender.
pub struct ConsoleListener {
    config: DevToolsConfig,
    state: RwLock<ConnectionState>,
    sink: BridgeSender,
    shutdown_token: CancellationToken,
}

impl ConsoleListener {
    pub fn new(config: DevToolsConfig, sink: BridgeSender, shutdown_token: CancellationToken) -> Self {
        Self {
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            sink,
            shutdown_token,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    /// Run until shutdown or until the reconnect budget is exhausted.
    pub async fn run(&self) -> BridgeResult<()> {
        let policy = self.config.reconnect_policy();
        let mut attempt = 0u32;

        loop {
            if self.shutdown_token.is_cancelled() {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);

            match self.session().await {
                Ok(()) => info!("DevTools session closed"),
                Err(e) => error!(error = %e, "DevTools session error"),
            }
            // A session that got connected starts a fresh backoff sequence.
            if self.state() == ConnectionState::Connected {
                attempt = 0;
            }

            if self.shutdown_token.is_cancelled() {
                info!("Shutdown requested after disconnect, not reconnecting");
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            attempt += 1;
            if policy.exhausted(attempt) {
                error!(attempt, "Max reconnection attempts reached");
                self.set_state(ConnectionState::Disconnected);
                return Err(BridgeError::ConnectionFailed(
                    "Max reconnection attempts reached".to_string(),
                ));
            }

            self.set_state(ConnectionState::Reconnecting);
            warn!(attempt, "Reconnecting to DevTools");
            if !policy.wait(attempt, &self.shutdown_token).await {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }
        }
    }

    async fn session(&self) -> BridgeResult<()> {
        let ws_stream = connect_devtools(&self.config).await?;
        let (mut write, mut read) = ws_stream.split();

        write
            .send(command(RUNTIME_ENABLE_ID, "Runtime.enable", json!({})))
            .await?;

        self.set_state(ConnectionState::Connected);
        info!("DevTools connected, Runtime domain enabled");

        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !self.handle_text_message(&text) {
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "DevTools closed the session");
                            return Err(BridgeError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            warn!("DevTools stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Handle one CDP frame. Returns `false` when the session should end.
    fn handle_text_message(&self, text: &str) -> bool {
        let frame = match CdpFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "Unparseable DevTools frame");
                return true;
            }
        };

        if let Some(id) = frame.id {
            if let Some(err) = frame.error {
                warn!(id, error = %err, "DevTools command failed");
            } else {
                trace!(id, "DevTools command acknowledged");
            }
            return true;
        }

        if frame.is_detach() {
            let reason = frame.params.get("reason").and_then(Value::as_str).unwrap_or("");
            warn!(%reason, "DevTools target detached");
            return false;
        }

        if frame.method.as_deref() == Some("Runtime.consoleAPICalled") {
            if let Some(line) = console_line(&frame.params) {
                self.sink.emit(line.to_string());
            }
        }
        true
    }
}
