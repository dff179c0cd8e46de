//! DevTools-backed [`DomHost`].
//!
//! A [`CdpDomSession`] owns the WebSocket to the page. It loads the document
//! with `DOM.getDocument`, keeps a [`DocumentMirror`] current from `DOM.*`
//! events and measures the scroller with `Runtime.evaluate`. The
//! [`CdpDomHost`] handed to the watcher reads that shared state synchronously
//! and queues commands back to the session.
//!
//! Elements inserted under the observed container become [`MutationBatch`]es.
//! An insert that arrives without its subtree is held back until
//! `DOM.setChildNodes` delivers the rest.

use crate::dom::DomNode;
use crate::error::{WatchError, WatchResult};
use crate::extract::PageContext;
use crate::mirror::{DocumentMirror, NodeId};
use crate::watcher::{ContainerQuery, DomHost, MutationBatch, ScrollMetrics};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use sigrelay_bridge::{command, connect_devtools, BridgeResult, CdpFrame, DevToolsConfig};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Scroll geometry refresh period while a container is observed.
pub const SCROLL_REFRESH: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct PageState {
    mirror: DocumentMirror,
    /// Bumped whenever node ids stop being valid.
    generation: u64,
    observed: Option<NodeId>,
    scroll: Option<ScrollMetrics>,
}

impl PageState {
    fn invalidate(&mut self) {
        self.mirror.clear();
        self.generation += 1;
        self.observed = None;
        self.scroll = None;
    }
}

#[derive(Debug)]
enum HostCommand {
    Observe(NodeId),
    ScrollToBottom,
}

/// Container handle; stale once the document it came from is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CdpContainer {
    node: NodeId,
    generation: u64,
}

/// Synchronous view of the page for the watcher.
#[derive(Clone)]
pub struct CdpDomHost {
    state: Arc<Mutex<PageState>>,
    commands: mpsc::UnboundedSender<HostCommand>,
}

impl DomHost for CdpDomHost {
    type Container = CdpContainer;

    fn query_container(&self, query: ContainerQuery) -> Option<CdpContainer> {
        let state = self.state.lock();
        state
            .mirror
            .find_element(|n| query.matches(n))
            .map(|node| CdpContainer {
                node,
                generation: state.generation,
            })
    }

    fn is_attached(&self, container: &CdpContainer) -> bool {
        let state = self.state.lock();
        state.generation == container.generation && state.mirror.is_connected(container.node)
    }

    fn observe(&self, container: &CdpContainer) -> WatchResult<()> {
        {
            let mut state = self.state.lock();
            if state.generation != container.generation
                || !state.mirror.is_connected(container.node)
            {
                return Err(WatchError::Observe("container left the document".to_string()));
            }
            state.observed = Some(container.node);
            state.scroll = None;
        }
        self.commands
            .send(HostCommand::Observe(container.node))
            .map_err(|_| WatchError::HostUnavailable("DevTools session ended".to_string()))
    }

    fn scroll_metrics(&self, _container: &CdpContainer) -> Option<ScrollMetrics> {
        self.state.lock().scroll
    }

    fn scroll_to_bottom(&self, _container: &CdpContainer) {
        if self.commands.send(HostCommand::ScrollToBottom).is_err() {
            trace!("DevTools session ended, scroll skipped");
        }
    }

    fn page_context(&self) -> PageContext {
        let state = self.state.lock();
        PageContext {
            title: state.mirror.title(),
            header: state.mirror.page_heading(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Document,
    Scroll,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrollReport {
    scroll_top: f64,
    scroll_height: f64,
    client_height: f64,
}

/// Evaluated in the page: locate the container with the watcher's selectors,
/// climb to the nearest scrollable ancestor, optionally pin it to the
/// bottom, and report its geometry.
fn scroller_expression(scroll: bool) -> String {
    let selectors: Vec<&str> = ContainerQuery::ALL.iter().map(|q| q.selector()).collect();
    let selectors = serde_json::to_string(&selectors).unwrap_or_else(|_| "[]".to_string());
    let action = if scroll { "el.scrollTop = el.scrollHeight;" } else { "" };
    format!(
        "(() => {{ let el = null; for (const s of {selectors}) {{ el = document.querySelector(s); if (el) break; }} \
         while (el && el.scrollHeight <= el.clientHeight) el = el.parentElement; \
         if (!el) return null; {action} \
         return {{ scrollTop: el.scrollTop, scrollHeight: el.scrollHeight, clientHeight: el.clientHeight }}; }})()"
    )
}

fn scroll_report(result: &Value) -> Option<ScrollMetrics> {
    let report = ScrollReport::deserialize(result.get("result")?.get("value")?).ok()?;
    Some(ScrollMetrics {
        scroll_top: report.scroll_top,
        scroll_height: report.scroll_height,
        client_height: report.client_height,
    })
}

/// Per-connection protocol state.
#[derive(Default)]
struct Exchange {
    next_id: u64,
    pending: HashMap<u64, Pending>,
    /// Inserted message candidates still waiting for their subtree.
    incomplete: HashSet<NodeId>,
}

impl Exchange {
    fn request(&mut self, method: &str, params: Value, pending: Option<Pending>) -> Message {
        self.next_id += 1;
        if let Some(kind) = pending {
            self.pending.insert(self.next_id, kind);
        }
        command(self.next_id, method, params)
    }
}

/// Owns the DevTools connection behind a [`CdpDomHost`].
pub struct CdpDomSession {
    config: DevToolsConfig,
    state: Arc<Mutex<PageState>>,
    commands: mpsc::UnboundedReceiver<HostCommand>,
    batches: mpsc::UnboundedSender<MutationBatch>,
    shutdown_token: CancellationToken,
}

impl CdpDomSession {
    /// Create the session, the host view over it and the batch stream for
    /// a [`crate::WatchDriver`].
    pub fn new(
        config: DevToolsConfig,
        shutdown_token: CancellationToken,
    ) -> (Self, CdpDomHost, mpsc::UnboundedReceiver<MutationBatch>) {
        let state = Arc::new(Mutex::new(PageState::default()));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        let host = CdpDomHost {
            state: state.clone(),
            commands: command_tx,
        };
        let session = Self {
            config,
            state,
            commands: command_rx,
            batches: batch_tx,
            shutdown_token,
        };
        (session, host, batch_rx)
    }

    /// Run until shutdown or until the reconnect budget is exhausted.
    ///
    /// The batch stream closes when this returns.
    pub async fn run(mut self) -> WatchResult<()> {
        let policy = self.config.reconnect_policy();
        let mut attempt = 0u32;

        loop {
            if self.shutdown_token.is_cancelled() {
                return Ok(());
            }

            let mut loaded = false;
            match self.session(&mut loaded).await {
                Ok(()) => info!("DOM session closed"),
                Err(e) => error!(error = %e, "DOM session error"),
            }
            self.state.lock().invalidate();
            if loaded {
                attempt = 0;
            }

            if self.shutdown_token.is_cancelled() {
                return Ok(());
            }

            attempt += 1;
            if policy.exhausted(attempt) {
                error!(attempt, "Max DOM session reconnection attempts reached");
                return Err(WatchError::HostUnavailable(
                    "max reconnection attempts reached".to_string(),
                ));
            }
            warn!(attempt, "Reconnecting DOM session");
            if !policy.wait(attempt, &self.shutdown_token).await {
                return Ok(());
            }
        }
    }

    async fn session(&mut self, loaded: &mut bool) -> BridgeResult<()> {
        let ws_stream = connect_devtools(&self.config).await?;
        let (mut write, mut read) = ws_stream.split();
        let mut exchange = Exchange::default();

        write.send(exchange.request("DOM.enable", json!({}), None)).await?;
        write
            .send(exchange.request(
                "DOM.getDocument",
                json!({"depth": -1, "pierce": false}),
                Some(Pending::Document),
            ))
            .await?;
        info!("DOM session connected, loading document");

        let mut refresh = interval(SCROLL_REFRESH);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                Some(cmd) = self.commands.recv() => {
                    let frame = match cmd {
                        HostCommand::Observe(node) => exchange.request(
                            "DOM.requestChildNodes",
                            json!({"nodeId": node, "depth": -1}),
                            None,
                        ),
                        HostCommand::ScrollToBottom => exchange.request(
                            "Runtime.evaluate",
                            json!({"expression": scroller_expression(true), "returnByValue": true}),
                            Some(Pending::Scroll),
                        ),
                    };
                    write.send(frame).await?;
                }

                _ = refresh.tick() => {
                    let observing = self.state.lock().observed.is_some();
                    if observing {
                        let frame = exchange.request(
                            "Runtime.evaluate",
                            json!({"expression": scroller_expression(false), "returnByValue": true}),
                            Some(Pending::Scroll),
                        );
                        write.send(frame).await?;
                    }
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let frame = match CdpFrame::parse(&text) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    debug!(error = %e, "Unparseable DevTools frame");
                                    continue;
                                }
                            };
                            if frame.is_detach() {
                                warn!("DevTools target detached");
                                return Ok(());
                            }
                            for out in self.handle_frame(frame, &mut exchange, loaded) {
                                write.send(out).await?;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("DevTools closed the DOM session");
                            return Ok(());
                        }
                        Some(Err(e)) => return Err(e.into()),
                        _ => {}
                    }
                }
            }
        }
    }

    /// Apply one frame; returns follow-up commands to send.
    fn handle_frame(
        &self,
        frame: CdpFrame,
        exchange: &mut Exchange,
        loaded: &mut bool,
    ) -> Vec<Message> {
        if let Some(id) = frame.id {
            if let Some(err) = &frame.error {
                warn!(id, error = %err, "DevTools command failed");
            }
            match exchange.pending.remove(&id) {
                Some(Pending::Document) => {
                    let mut state = self.state.lock();
                    state.invalidate();
                    if state.mirror.reset(&frame.result["root"]) {
                        *loaded = true;
                        info!("Document loaded");
                    } else {
                        warn!("Document reply without a usable root");
                    }
                }
                Some(Pending::Scroll) => {
                    if let Some(metrics) = scroll_report(&frame.result) {
                        self.state.lock().scroll = Some(metrics);
                    }
                }
                None => trace!(id, "DevTools command acknowledged"),
            }
            return Vec::new();
        }

        let params = &frame.params;
        let node_id = |key: &str| params.get(key).and_then(Value::as_i64);
        let text = |key: &str| params.get(key).and_then(Value::as_str).unwrap_or("");

        match frame.method.as_deref() {
            Some("DOM.documentUpdated") => {
                debug!("Document replaced, reloading");
                self.state.lock().invalidate();
                exchange.incomplete.clear();
                vec![exchange.request(
                    "DOM.getDocument",
                    json!({"depth": -1, "pierce": false}),
                    Some(Pending::Document),
                )]
            }
            Some("DOM.setChildNodes") => {
                let Some(parent) = node_id("parentId") else {
                    return Vec::new();
                };
                let mut state = self.state.lock();
                state.mirror.set_children(parent, &params["nodes"]);
                let ready: Vec<NodeId> = exchange
                    .incomplete
                    .iter()
                    .copied()
                    .filter(|id| state.mirror.subtree_loaded(*id))
                    .collect();
                let mut added = Vec::with_capacity(ready.len());
                for id in ready {
                    exchange.incomplete.remove(&id);
                    added.extend(state.mirror.snapshot(id));
                }
                drop(state);
                self.forward(added);
                Vec::new()
            }
            Some("DOM.childNodeInserted") => {
                let (Some(parent), Some(previous)) =
                    (node_id("parentNodeId"), node_id("previousNodeId"))
                else {
                    return Vec::new();
                };
                let node = &params["node"];
                let mut state = self.state.lock();
                let Some(id) = state.mirror.insert(parent, previous, node) else {
                    return Vec::new();
                };
                let watched = state
                    .observed
                    .is_some_and(|container| state.mirror.is_within(parent, container));
                if !watched {
                    return Vec::new();
                }
                if state.mirror.subtree_loaded(id) {
                    drop(state);
                    self.forward(DomNode::from_cdp(node).into_iter().collect());
                    Vec::new()
                } else {
                    exchange.incomplete.insert(id);
                    vec![exchange.request(
                        "DOM.requestChildNodes",
                        json!({"nodeId": id, "depth": -1}),
                        None,
                    )]
                }
            }
            Some("DOM.childNodeRemoved") => {
                if let Some(id) = node_id("nodeId") {
                    self.state.lock().mirror.remove(id);
                    exchange.incomplete.remove(&id);
                }
                Vec::new()
            }
            Some("DOM.attributeModified") => {
                if let Some(id) = node_id("nodeId") {
                    self.state
                        .lock()
                        .mirror
                        .set_attribute(id, text("name"), text("value"));
                }
                Vec::new()
            }
            Some("DOM.attributeRemoved") => {
                if let Some(id) = node_id("nodeId") {
                    self.state.lock().mirror.remove_attribute(id, text("name"));
                }
                Vec::new()
            }
            Some("DOM.characterDataModified") => {
                if let Some(id) = node_id("nodeId") {
                    self.state.lock().mirror.set_text(id, text("characterData"));
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn forward(&self, added: Vec<DomNode>) {
        if added.is_empty() {
            return;
        }
        if self.batches.send(MutationBatch { added }).is_err() {
            debug!("Watcher gone, mutation batch discarded");
        }
    }
}
