//! Channel allow-list and dispatch gates.
//!
//! Both stages return decisions, never errors:
//! - ChannelFilter: message origin must be an allow-listed channel
//! - DispatchGate: confidence threshold, per-order notional cap, venue enablement

pub mod filter;
pub mod gates;

pub use filter::{ChannelFilter, FilterOutcome};
pub use gates::{DispatchDecision, DispatchGate, DispatchReason, GateResult};
