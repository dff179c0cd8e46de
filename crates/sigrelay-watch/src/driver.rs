//! Async driver for a [`Watcher`].
//!
//! Owns the search retry timer, the drift timer and the mutation batch
//! stream. Everything runs on the caller's task, so the watcher's handlers
//! never overlap.

use crate::watcher::{DomHost, MutationBatch, WatchState, Watcher, DRIFT_CHECK_INTERVAL, SEARCH_RETRY};
use sigrelay_bridge::BridgeSink;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct WatchDriver<H: DomHost, S: BridgeSink> {
    watcher: Watcher<H, S>,
    batches: mpsc::UnboundedReceiver<MutationBatch>,
    shutdown_token: CancellationToken,
}

impl<H: DomHost, S: BridgeSink> WatchDriver<H, S> {
    pub fn new(
        watcher: Watcher<H, S>,
        batches: mpsc::UnboundedReceiver<MutationBatch>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            watcher,
            batches,
            shutdown_token,
        }
    }

    /// Run until shutdown or until the host stops delivering batches.
    ///
    /// Returns the watcher so callers can inspect its final state.
    pub async fn run(mut self) -> Watcher<H, S> {
        let mut search = interval(SEARCH_RETRY);
        search.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut drift = interval(DRIFT_CHECK_INTERVAL);
        drift.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let searching = self.watcher.state() == WatchState::Searching;

            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!("Watcher shutdown requested");
                    break;
                }

                batch = self.batches.recv() => {
                    match batch {
                        Some(batch) => {
                            let emitted = self.watcher.on_mutations(&batch);
                            if emitted > 0 {
                                debug!(emitted, "Mutation batch processed");
                            }
                        }
                        None => {
                            info!("Mutation stream closed");
                            break;
                        }
                    }
                }

                _ = search.tick(), if searching => {
                    self.watcher.tick_search();
                }

                _ = drift.tick() => {
                    self.watcher.on_drift_check(Instant::now());
                }
            }
        }

        drop(drift);
        debug!("Drift timer cancelled");
        self.watcher
    }
}
