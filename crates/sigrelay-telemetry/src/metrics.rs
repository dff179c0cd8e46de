//! Prometheus metrics for sigrelay.
//!
//! Covers every stage of the pipeline:
//! - DevTools console connection
//! - Bridge line accounting
//! - Watcher state
//! - Channel filter
//! - Signal analysis
//! - Dispatch decisions and venue orders
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means duplicate metric
//! names, which is a programming error that must crash at startup. It can
//! only happen during static initialization.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    register_int_counter, register_int_gauge, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec,
    IntCounter, IntGauge, TextEncoder,
};

/// DevTools console connection (1 = connected).
pub static CONSOLE_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "sigrelay_console_connected",
        "DevTools console connection state (1=connected)"
    )
    .unwrap()
});

/// DevTools listener state machine.
/// Labels: state (disconnected/connecting/connected/reconnecting)
pub static CONSOLE_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "sigrelay_console_state",
        "DevTools listener current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Bridge line totals, mirrored from the bridge's own counters.
/// Labels: outcome (accepted/dropped/lost)
pub static BRIDGE_LINES: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "sigrelay_bridge_lines",
        "Bridge lines by outcome since start",
        &["outcome"]
    )
    .unwrap()
});

/// Watcher state machine.
/// Labels: state (searching/attached/observing)
pub static WATCHER_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "sigrelay_watcher_state",
        "Mutation watcher current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Messages received from the bridge.
pub static MESSAGES_RECEIVED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "sigrelay_messages_received_total",
        "Chat messages received from the bridge"
    )
    .unwrap()
});

/// Channel filter results.
/// Labels: result (pass/rejected)
pub static MESSAGES_FILTERED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigrelay_messages_filtered_total",
        "Channel filter results",
        &["result"]
    )
    .unwrap()
});

/// Analyses by outcome.
/// Labels: outcome (signal/no_signal/invalid/failed/timeout)
pub static ANALYSIS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigrelay_analysis_total",
        "Signal analyses by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Reasoning service round-trip in milliseconds.
pub static ANALYSIS_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "sigrelay_analysis_latency_ms",
        "Reasoning service latency in milliseconds",
        &["outcome"],
        vec![100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 30000.0]
    )
    .unwrap()
});

/// Dispatch decisions.
/// Labels: venue, reason
pub static DISPATCH_DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigrelay_dispatch_decisions_total",
        "Dispatch decisions by venue and reason",
        &["venue", "reason"]
    )
    .unwrap()
});

/// Orders accepted by a venue.
/// Labels: venue, side
pub static ORDERS_PLACED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigrelay_orders_placed_total",
        "Orders accepted by a venue",
        &["venue", "side"]
    )
    .unwrap()
});

/// Venue order failures (API error or timeout).
/// Labels: venue, kind (error/timeout)
pub static ORDER_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sigrelay_order_failures_total",
        "Venue order failures",
        &["venue", "kind"]
    )
    .unwrap()
});

/// Venue session state.
/// Labels: venue, state (disconnected/connected/reconnecting)
pub static VENUE_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "sigrelay_venue_state",
        "Venue session current state (1=active, 0=inactive)",
        &["venue", "state"]
    )
    .unwrap()
});

/// Message tasks currently in flight.
pub static INFLIGHT_TASKS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "sigrelay_inflight_tasks",
        "Message tasks currently in flight"
    )
    .unwrap()
});

fn set_exclusive<'a>(gauge: &GaugeVec, prefix: &[&'a str], states: &[&'a str], active: &'a str) {
    for s in states {
        let mut labels = prefix.to_vec();
        labels.push(*s);
        gauge.with_label_values(&labels).set(0.0);
    }
    let mut labels = prefix.to_vec();
    labels.push(active);
    gauge.with_label_values(&labels).set(1.0);
}

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    pub fn console_state_set(state: &str) {
        set_exclusive(
            &CONSOLE_STATE,
            &[],
            &["disconnected", "connecting", "connected", "reconnecting"],
            state,
        );
        CONSOLE_CONNECTED.set(if state == "connected" { 1.0 } else { 0.0 });
    }

    pub fn bridge_lines(accepted: u64, dropped: u64, lost: u64) {
        BRIDGE_LINES.with_label_values(&["accepted"]).set(accepted as f64);
        BRIDGE_LINES.with_label_values(&["dropped"]).set(dropped as f64);
        BRIDGE_LINES.with_label_values(&["lost"]).set(lost as f64);
    }

    pub fn watcher_state_set(state: &str) {
        set_exclusive(
            &WATCHER_STATE,
            &[],
            &["searching", "attached", "observing"],
            state,
        );
    }

    pub fn message_received() {
        MESSAGES_RECEIVED_TOTAL.inc();
    }

    /// Record a channel filter result.
    pub fn message_filtered(passed: bool) {
        let result = if passed { "pass" } else { "rejected" };
        MESSAGES_FILTERED_TOTAL.with_label_values(&[result]).inc();
    }

    pub fn analysis(outcome: &str, latency_ms: f64) {
        ANALYSIS_TOTAL.with_label_values(&[outcome]).inc();
        ANALYSIS_LATENCY_MS
            .with_label_values(&[outcome])
            .observe(latency_ms);
    }

    pub fn dispatch_decision(venue: &str, reason: &str) {
        DISPATCH_DECISIONS_TOTAL
            .with_label_values(&[venue, reason])
            .inc();
    }

    pub fn order_placed(venue: &str, side: &str) {
        ORDERS_PLACED_TOTAL.with_label_values(&[venue, side]).inc();
    }

    pub fn order_failed(venue: &str, kind: &str) {
        ORDER_FAILURES_TOTAL.with_label_values(&[venue, kind]).inc();
    }

    pub fn venue_state_set(venue: &str, state: &str) {
        set_exclusive(
            &VENUE_STATE,
            &[venue],
            &["disconnected", "connected", "reconnecting"],
            state,
        );
    }

    pub fn inflight_inc() {
        INFLIGHT_TASKS.inc();
    }

    pub fn inflight_dec() {
        INFLIGHT_TASKS.dec();
    }

    /// Render the default registry in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
