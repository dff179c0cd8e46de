//! Mutation watcher.
//!
//! Finds the message-list container, subscribes to structural changes on it,
//! and turns added message-nodes into bridge records. All handlers are
//! synchronous and do no I/O; timers and batch delivery live in
//! [`crate::driver`].
//!
//! Container loss is never pushed by the host. It is noticed lazily when the
//! drift check re-validates the container, which moves the watcher back to
//! `Searching`.

use crate::dom::DomNode;
use crate::error::WatchResult;
use crate::extract::{extract_message, is_message_node, PageContext};
use sigrelay_bridge::{encode, BridgeSink};
use sigrelay_telemetry::Metrics;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Retry delay while the container is absent.
pub const SEARCH_RETRY: Duration = Duration::from_secs(2);
/// Minimum spacing between drift checks.
pub const DRIFT_CHECK_INTERVAL: Duration = Duration::from_secs(5);
/// Distance from the bottom tolerated before forcing a scroll.
pub const DRIFT_SLACK: f64 = 50.0;

/// Container lookup strategies, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerQuery {
    ChatMessagesList,
    MessagesRoleList,
    ScrollerList,
}

impl ContainerQuery {
    pub const ALL: [ContainerQuery; 3] = [
        ContainerQuery::ChatMessagesList,
        ContainerQuery::MessagesRoleList,
        ContainerQuery::ScrollerList,
    ];

    /// CSS selector for hosts backed by a real document.
    pub fn selector(&self) -> &'static str {
        match self {
            Self::ChatMessagesList => r#"[data-list-id="chat-messages"]"#,
            Self::MessagesRoleList => r#"[role="list"][aria-label*="Messages"]"#,
            Self::ScrollerList => r#"ol[class*="scrollerInner"]"#,
        }
    }

    /// Same predicate as [`selector`](Self::selector), for snapshot trees.
    pub fn matches(&self, node: &DomNode) -> bool {
        match self {
            Self::ChatMessagesList => node.attr("data-list-id") == Some("chat-messages"),
            Self::MessagesRoleList => {
                node.attr("role") == Some("list") && node.attr_contains("aria-label", "Messages")
            }
            Self::ScrollerList => node.tag() == "ol" && node.attr_contains("class", "scrollerInner"),
        }
    }
}

/// Scroll geometry of the container's nearest scrollable ancestor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    pub fn distance_from_bottom(&self) -> f64 {
        self.scroll_height - self.scroll_top - self.client_height
    }
}

/// Host document capabilities consumed by the watcher.
pub trait DomHost {
    /// Handle to a live container element.
    type Container: Clone;

    fn query_container(&self, query: ContainerQuery) -> Option<Self::Container>;

    /// True while `container` is still part of the document.
    fn is_attached(&self, container: &Self::Container) -> bool;

    /// Subscribe to child-list/subtree changes on `container`.
    fn observe(&self, container: &Self::Container) -> WatchResult<()>;

    fn scroll_metrics(&self, container: &Self::Container) -> Option<ScrollMetrics>;

    /// Force the nearest scrollable ancestor to its maximum offset.
    fn scroll_to_bottom(&self, container: &Self::Container);

    fn page_context(&self) -> PageContext;
}

/// Structural changes delivered together by the host.
#[derive(Debug, Clone, Default)]
pub struct MutationBatch {
    /// Added element nodes; text nodes are not delivered.
    pub added: Vec<DomNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Searching,
    Attached,
    Observing,
}

impl WatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Searching => "searching",
            Self::Attached => "attached",
            Self::Observing => "observing",
        }
    }
}

/// Result of one drift check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftCheck {
    /// Less than the check interval since the previous check.
    Throttled,
    /// Not observing anything.
    Idle,
    /// Within slack, nothing done.
    InPlace,
    /// Scrolled back to bottom.
    Corrected,
    /// Container is gone; back to searching.
    ContainerLost,
}

/// Watches one container and emits one bridge record per extracted message.
pub struct Watcher<H: DomHost, S: BridgeSink> {
    host: H,
    sink: S,
    state: WatchState,
    container: Option<H::Container>,
    last_drift_check: Option<Instant>,
    extracted: u64,
}

impl<H: DomHost, S: BridgeSink> Watcher<H, S> {
    pub fn new(host: H, sink: S) -> Self {
        Metrics::watcher_state_set(WatchState::Searching.as_str());
        Self {
            host,
            sink,
            state: WatchState::Searching,
            container: None,
            last_drift_check: None,
            extracted: 0,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Messages emitted so far.
    pub fn extracted(&self) -> u64 {
        self.extracted
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn set_state(&mut self, state: WatchState) {
        if self.state != state {
            debug!(from = self.state.as_str(), to = state.as_str(), "Watcher state change");
            self.state = state;
        }
        Metrics::watcher_state_set(state.as_str());
    }

    /// One search attempt. No-op unless `Searching`.
    pub fn tick_search(&mut self) -> WatchState {
        if self.state != WatchState::Searching {
            return self.state;
        }

        let found = ContainerQuery::ALL
            .iter()
            .find_map(|q| self.host.query_container(*q).map(|c| (*q, c)));
        let Some((query, container)) = found else {
            debug!("Message container not found, retrying");
            return self.state;
        };

        self.set_state(WatchState::Attached);
        self.host.scroll_to_bottom(&container);

        match self.host.observe(&container) {
            Ok(()) => {
                info!(selector = query.selector(), "Observing message container");
                self.container = Some(container);
                self.set_state(WatchState::Observing);
            }
            Err(e) => {
                warn!(error = %e, "Failed to observe container, searching again");
                self.set_state(WatchState::Searching);
            }
        }
        self.state
    }

    /// Extract every message-node in the batch. Returns the number emitted.
    pub fn on_mutations(&mut self, batch: &MutationBatch) -> usize {
        if self.state != WatchState::Observing {
            return 0;
        }

        let page = self.host.page_context();
        let mut emitted = 0;
        for added in &batch.added {
            let candidates = std::iter::once(added)
                .filter(|n| is_message_node(n))
                .chain(added.descendants().filter(|n| is_message_node(n)));
            for node in candidates {
                let Some(msg) = extract_message(node, &page) else {
                    continue;
                };
                if let Some(line) = encode(&msg) {
                    self.sink.emit(line);
                    emitted += 1;
                }
            }
        }
        self.extracted += emitted as u64;
        emitted
    }

    /// Re-validate the container and correct scroll drift.
    ///
    /// At most one effective check per [`DRIFT_CHECK_INTERVAL`].
    pub fn on_drift_check(&mut self, now: Instant) -> DriftCheck {
        if let Some(last) = self.last_drift_check {
            if now.saturating_duration_since(last) < DRIFT_CHECK_INTERVAL {
                return DriftCheck::Throttled;
            }
        }
        self.last_drift_check = Some(now);

        let Some(container) = self.container.as_ref() else {
            return DriftCheck::Idle;
        };

        if !self.host.is_attached(container) {
            warn!("Message container detached, searching again");
            self.container = None;
            self.set_state(WatchState::Searching);
            return DriftCheck::ContainerLost;
        }

        match self.host.scroll_metrics(container) {
            Some(metrics) if metrics.distance_from_bottom() > DRIFT_SLACK => {
                debug!(distance = metrics.distance_from_bottom(), "Correcting scroll drift");
                self.host.scroll_to_bottom(container);
                DriftCheck::Corrected
            }
            _ => DriftCheck::InPlace,
        }
    }
}
