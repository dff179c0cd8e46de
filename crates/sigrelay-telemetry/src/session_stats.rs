//! End-of-session summary.
//!
//! Reads the process-wide counters and writes one summary block to the log
//! when the bot shuts down.

use crate::metrics::{
    ANALYSIS_TOTAL, MESSAGES_FILTERED_TOTAL, MESSAGES_RECEIVED_TOTAL, ORDERS_PLACED_TOTAL,
    ORDER_FAILURES_TOTAL,
};
use chrono::{DateTime, Utc};
use prometheus::core::Collector;
use prometheus::CounterVec;
use tracing::info;

/// Counter snapshot for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub messages_received: u64,
    pub messages_passed: u64,
    pub messages_rejected: u64,
    pub signals: u64,
    pub no_signal: u64,
    pub analysis_failures: u64,
    pub orders_placed: u64,
    pub order_failures: u64,
}

impl SessionStats {
    /// Difference against an earlier snapshot.
    pub fn since(&self, earlier: &SessionStats) -> SessionStats {
        SessionStats {
            messages_received: self.messages_received.saturating_sub(earlier.messages_received),
            messages_passed: self.messages_passed.saturating_sub(earlier.messages_passed),
            messages_rejected: self.messages_rejected.saturating_sub(earlier.messages_rejected),
            signals: self.signals.saturating_sub(earlier.signals),
            no_signal: self.no_signal.saturating_sub(earlier.no_signal),
            analysis_failures: self.analysis_failures.saturating_sub(earlier.analysis_failures),
            orders_placed: self.orders_placed.saturating_sub(earlier.orders_placed),
            order_failures: self.order_failures.saturating_sub(earlier.order_failures),
        }
    }
}

/// Session statistics reporter.
pub struct SessionStatsReporter {
    start_time: DateTime<Utc>,
    baseline: SessionStats,
}

impl Default for SessionStatsReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStatsReporter {
    /// Start a session at the current counter values.
    pub fn new() -> Self {
        Self {
            start_time: Utc::now(),
            baseline: Self::snapshot(),
        }
    }

    /// Current counter values.
    pub fn snapshot() -> SessionStats {
        SessionStats {
            messages_received: MESSAGES_RECEIVED_TOTAL.get(),
            messages_passed: counter_value(&MESSAGES_FILTERED_TOTAL, &["pass"]),
            messages_rejected: counter_value(&MESSAGES_FILTERED_TOTAL, &["rejected"]),
            signals: counter_value(&ANALYSIS_TOTAL, &["signal"]),
            no_signal: counter_value(&ANALYSIS_TOTAL, &["no_signal"]),
            analysis_failures: counter_value(&ANALYSIS_TOTAL, &["failed"])
                + counter_value(&ANALYSIS_TOTAL, &["timeout"])
                + counter_value(&ANALYSIS_TOTAL, &["invalid"]),
            orders_placed: counter_sum(&ORDERS_PLACED_TOTAL),
            order_failures: counter_sum(&ORDER_FAILURES_TOTAL),
        }
    }

    /// Counters accumulated since this reporter was created.
    pub fn stats(&self) -> SessionStats {
        Self::snapshot().since(&self.baseline)
    }

    pub fn output_summary(&self) {
        let s = self.stats();
        let duration = Utc::now() - self.start_time;

        info!("========== Session Summary ==========");
        info!(
            "Started: {} ({} hours {} minutes)",
            self.start_time.format("%Y-%m-%d %H:%M:%S UTC"),
            duration.num_hours(),
            duration.num_minutes() % 60
        );
        info!(
            "  Messages: {} received, {} passed filter, {} rejected",
            s.messages_received, s.messages_passed, s.messages_rejected
        );
        info!(
            "  Analyses: {} signals, {} without signal, {} failed",
            s.signals, s.no_signal, s.analysis_failures
        );
        info!(
            "  Orders: {} placed, {} failed",
            s.orders_placed, s.order_failures
        );
        info!("=====================================");
    }
}

fn counter_value(counter: &CounterVec, labels: &[&str]) -> u64 {
    counter.with_label_values(labels).get() as u64
}

/// Sum over every label combination seen so far.
fn counter_sum(counter: &CounterVec) -> u64 {
    counter
        .collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}
