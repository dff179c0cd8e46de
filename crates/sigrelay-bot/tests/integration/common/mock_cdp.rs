//! Mock DevTools WebSocket server for integration tests.
//!
//! Provides a page-target endpoint that can:
//! - Accept connections
//! - Acknowledge commands by `id`
//! - Replay console lines as `Runtime.consoleAPICalled` events once the
//!   `Runtime` domain is enabled
//! - Serve a scripted document over the `DOM` domain and push child
//!   insertions once the message list is observed
//! - Record received frames

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// `Runtime.consoleAPICalled` event carrying one string argument.
pub fn console_event(line: &str) -> String {
    json!({
        "method": "Runtime.consoleAPICalled",
        "params": {
            "type": "log",
            "args": [{"type": "string", "value": line}],
            "executionContextId": 1,
            "timestamp": 1705314600000.0
        }
    })
    .to_string()
}

/// Element node as `DOM.getDocument` reports it.
pub fn dom_element(id: i64, tag: &str, attrs: &[&str], children: Vec<Value>) -> Value {
    json!({
        "nodeId": id,
        "nodeType": 1,
        "nodeName": tag.to_ascii_uppercase(),
        "localName": tag,
        "attributes": attrs,
        "childNodeCount": children.len(),
        "children": children,
    })
}

pub fn dom_text(id: i64, value: &str) -> Value {
    json!({"nodeId": id, "nodeType": 3, "nodeName": "#text", "nodeValue": value})
}

/// Scripted page for the `DOM` domain.
#[derive(Debug, Clone)]
pub struct DomPage {
    /// Root returned by `DOM.getDocument`.
    pub document: Value,
    /// Node whose `DOM.requestChildNodes` triggers `inserts`.
    pub container: i64,
    /// `DOM.childNodeInserted` params, sent once per connection.
    pub inserts: Vec<Value>,
    /// `DOM.setChildNodes` payloads keyed by the requested node id.
    pub children: Vec<(i64, Vec<Value>)>,
    /// Geometry reported for every `Runtime.evaluate`.
    pub scroll: Value,
}

enum Script {
    Console(Vec<String>),
    Page(DomPage),
}

/// A mock DevTools page endpoint.
pub struct MockCdpServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    frames: Arc<Mutex<VecDeque<String>>>,
    connections: Arc<Mutex<u32>>,
}

impl MockCdpServer {
    /// Start on an available port; every connection replays `console_lines`.
    pub async fn start(console_lines: Vec<String>) -> Self {
        Self::serve(Script::Console(console_lines)).await
    }

    /// Start on an available port; every connection serves `page`.
    pub async fn start_page(page: DomPage) -> Self {
        Self::serve(Script::Page(page)).await
    }

    async fn serve(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let frames: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(VecDeque::new()));
        let connections: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let script = Arc::new(script);

        let frames_clone = frames.clone();
        let connections_clone = connections.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        tokio::spawn(handle_connection(
                            stream,
                            script.clone(),
                            frames_clone.clone(),
                            connections_clone.clone(),
                        ));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            frames,
            connections,
        }
    }

    /// Page WebSocket URL.
    pub fn url(&self) -> String {
        format!("ws://{}/devtools/page/MOCK", self.addr)
    }

    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    /// Frames received from clients, in arrival order.
    pub async fn received_frames(&self) -> Vec<String> {
        self.frames.lock().await.iter().cloned().collect()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    script: Arc<Script>,
    frames: Arc<Mutex<VecDeque<String>>>,
    connections: Arc<Mutex<u32>>,
) {
    {
        let mut count = connections.lock().await;
        *count += 1;
    }

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let mut inserted = false;

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                {
                    let mut received = frames.lock().await;
                    received.push_back(text.clone());
                }

                let Ok(parsed) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                let id = parsed.get("id").cloned().unwrap_or(Value::Null);
                let method = parsed.get("method").and_then(Value::as_str).unwrap_or("");
                let mut replies = Vec::new();

                match script.as_ref() {
                    Script::Console(lines) => {
                        replies.push(json!({"id": id, "result": {}}).to_string());
                        if method == "Runtime.enable" {
                            replies.extend(lines.iter().map(|line| console_event(line)));
                        }
                    }
                    Script::Page(page) => match method {
                        "DOM.getDocument" => {
                            replies.push(json!({"id": id, "result": {"root": page.document}}).to_string());
                        }
                        "Runtime.evaluate" => {
                            replies.push(
                                json!({"id": id, "result": {"result": {"type": "object", "value": page.scroll}}})
                                    .to_string(),
                            );
                        }
                        "DOM.requestChildNodes" => {
                            replies.push(json!({"id": id, "result": {}}).to_string());
                            let node = parsed["params"]["nodeId"].as_i64().unwrap_or_default();
                            if node == page.container && !inserted {
                                inserted = true;
                                replies.extend(page.inserts.iter().map(|params| {
                                    json!({"method": "DOM.childNodeInserted", "params": params}).to_string()
                                }));
                            }
                            if let Some((_, nodes)) = page.children.iter().find(|(n, _)| *n == node) {
                                replies.push(
                                    json!({"method": "DOM.setChildNodes", "params": {"parentId": node, "nodes": nodes}})
                                        .to_string(),
                                );
                            }
                        }
                        _ => replies.push(json!({"id": id, "result": {}}).to_string()),
                    },
                }

                for reply in replies {
                    let _ = write.send(Message::Text(reply)).await;
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }
}
