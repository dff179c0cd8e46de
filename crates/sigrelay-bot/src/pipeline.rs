//! Message pipeline.
//!
//! Channel filter → signal generator → dispatch gatekeeper, one task per
//! accepted message. Messages are not ordered relative to each other; calls
//! to the same venue are serialized by the gatekeeper.

use sigrelay_core::{ChatMessage, TradeSignal, VenueId};
use sigrelay_executor::{DispatchGatekeeper, DispatchOutcome};
use sigrelay_risk::{ChannelFilter, FilterOutcome};
use sigrelay_signal::SignalGenerator;
use sigrelay_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// What happened to one message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// Channel not allow-listed.
    Filtered,
    /// Analyzed without producing a signal.
    NoSignal,
    /// Signal detected while read-only; nothing dispatched.
    ReadOnly(TradeSignal),
    /// Per-venue dispatch results, in venue order.
    Dispatched(Vec<(VenueId, DispatchOutcome)>),
}

struct Stages {
    filter: ChannelFilter,
    generator: SignalGenerator,
    gatekeeper: Arc<DispatchGatekeeper>,
    read_only: bool,
}

impl Stages {
    async fn analyze_and_dispatch(&self, msg: ChatMessage) -> MessageOutcome {
        let Some(signal) = self.generator.analyze(&msg).await else {
            return MessageOutcome::NoSignal;
        };

        if self.read_only {
            info!(
                side = %signal.side(),
                symbol = signal.symbol(),
                confidence = signal.confidence(),
                "Read-only mode: signal detected, order skipped"
            );
            return MessageOutcome::ReadOnly(signal);
        }

        let venues: Vec<VenueId> = self.gatekeeper.policy().enabled_venues().collect();
        let mut results = Vec::with_capacity(venues.len());
        for venue in venues {
            let outcome = self.gatekeeper.place_order(&signal, venue).await;
            if let Some(receipt) = outcome.receipt() {
                info!(%receipt, "Order placed");
            }
            results.push((venue, outcome));
        }
        MessageOutcome::Dispatched(results)
    }
}

/// Owns the per-message tasks and their shutdown.
pub struct Pipeline {
    stages: Arc<Stages>,
    tracker: TaskTracker,
    /// Cancelled when shutdown begins; no new tasks after that.
    intake: CancellationToken,
    /// Cancelled when the grace period runs out.
    abort: CancellationToken,
    shutdown_grace: Duration,
}

impl Pipeline {
    pub fn new(
        filter: ChannelFilter,
        generator: SignalGenerator,
        gatekeeper: Arc<DispatchGatekeeper>,
        read_only: bool,
        shutdown_grace: Duration,
    ) -> Self {
        if filter.is_closed() {
            warn!("target_channels is empty: every message will be rejected");
        }
        Self {
            stages: Arc::new(Stages {
                filter,
                generator,
                gatekeeper,
                read_only,
            }),
            tracker: TaskTracker::new(),
            intake: CancellationToken::new(),
            abort: CancellationToken::new(),
            shutdown_grace,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.stages.read_only
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    fn accept(&self, msg: ChatMessage) -> Option<ChatMessage> {
        Metrics::message_received();

        match self.stages.filter.filter_message(msg) {
            FilterOutcome::Pass(msg) => {
                Metrics::message_filtered(true);
                Some(msg)
            }
            FilterOutcome::Rejected => {
                Metrics::message_filtered(false);
                None
            }
        }
    }

    /// Run one message to completion on the caller's task.
    pub async fn process(&self, msg: ChatMessage) -> MessageOutcome {
        match self.accept(msg) {
            Some(msg) => self.stages.analyze_and_dispatch(msg).await,
            None => MessageOutcome::Filtered,
        }
    }

    /// Filter synchronously and hand accepted messages to a new task.
    ///
    /// Returns false when the message was filtered or shutdown has begun.
    pub fn submit(&self, msg: ChatMessage) -> bool {
        if self.intake.is_cancelled() {
            debug!("Pipeline closed, message ignored");
            return false;
        }
        let Some(msg) = self.accept(msg) else {
            return false;
        };

        let stages = Arc::clone(&self.stages);
        let abort = self.abort.clone();
        Metrics::inflight_inc();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = stages.analyze_and_dispatch(msg) => {}
                () = abort.cancelled() => {
                    warn!("Message task cancelled at shutdown");
                }
            }
            Metrics::inflight_dec();
        });
        true
    }

    /// Stop intake, drain within the grace period, then release venues.
    pub async fn shutdown(&self) {
        self.intake.cancel();
        self.tracker.close();

        let pending = self.tracker.len();
        if pending > 0 {
            info!(pending, grace_ms = self.shutdown_grace.as_millis() as u64, "Draining in-flight messages");
        }
        if tokio::time::timeout(self.shutdown_grace, self.tracker.wait())
            .await
            .is_err()
        {
            error!(
                remaining = self.tracker.len(),
                "Shutdown grace period elapsed, cancelling in-flight messages"
            );
            self.abort.cancel();
            self.tracker.wait().await;
        }

        self.stages.gatekeeper.release().await;
    }
}
