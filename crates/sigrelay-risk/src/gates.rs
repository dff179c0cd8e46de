//! Dispatch gates.
//!
//! Evaluated in order for every signal and venue:
//! - Confidence: `confidence >= threshold` proceeds
//! - Amount: `notional <= max_trade_amount` proceeds
//! - Venue: venue must be enabled by the policy
//!
//! A blocked gate is a logged decision, not an error.

use rust_decimal::Decimal;
use serde::Serialize;
use sigrelay_core::{TradeSignal, TradingPolicy, VenueId};
use std::fmt;
use tracing::debug;

/// Why a dispatch did or did not proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchReason {
    Approved,
    BelowConfidence,
    OverLimit,
    VenueDisabled,
    VenueUnavailable,
}

impl DispatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::BelowConfidence => "BELOW_CONFIDENCE",
            Self::OverLimit => "OVER_LIMIT",
            Self::VenueDisabled => "VENUE_DISABLED",
            Self::VenueUnavailable => "VENUE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for DispatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived decision; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchDecision {
    pub proceed: bool,
    pub reason: DispatchReason,
}

impl DispatchDecision {
    pub fn approve() -> Self {
        Self {
            proceed: true,
            reason: DispatchReason::Approved,
        }
    }

    pub fn reject(reason: DispatchReason) -> Self {
        Self {
            proceed: false,
            reason,
        }
    }
}

/// Outcome of a single gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateResult {
    Pass,
    Block(DispatchReason),
}

/// Policy-driven gates applied before any venue call.
#[derive(Debug, Clone)]
pub struct DispatchGate {
    policy: TradingPolicy,
}

impl DispatchGate {
    pub fn new(policy: TradingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TradingPolicy {
        &self.policy
    }

    pub fn check_confidence(&self, signal: &TradeSignal) -> GateResult {
        let threshold = self.policy.confidence_threshold();
        if signal.confidence() >= threshold {
            GateResult::Pass
        } else {
            debug!(
                symbol = signal.symbol(),
                confidence = signal.confidence(),
                threshold,
                "Confidence gate blocked"
            );
            GateResult::Block(DispatchReason::BelowConfidence)
        }
    }

    pub fn check_amount(&self, amount: Decimal) -> GateResult {
        let limit = self.policy.max_trade_amount();
        if amount <= limit {
            GateResult::Pass
        } else {
            debug!(%amount, %limit, "Amount gate blocked");
            GateResult::Block(DispatchReason::OverLimit)
        }
    }

    pub fn check_venue(&self, venue: VenueId) -> GateResult {
        if self.policy.is_enabled(venue) {
            GateResult::Pass
        } else {
            debug!(%venue, "Venue gate blocked");
            GateResult::Block(DispatchReason::VenueDisabled)
        }
    }

    /// Evaluate the gates for the policy's intended notional.
    pub fn evaluate(&self, signal: &TradeSignal, venue: VenueId) -> DispatchDecision {
        self.evaluate_with_amount(signal, venue, self.policy.intended_notional())
    }

    /// Evaluate the gates in order for an explicit notional.
    pub fn evaluate_with_amount(
        &self,
        signal: &TradeSignal,
        venue: VenueId,
        amount: Decimal,
    ) -> DispatchDecision {
        let confidence = || self.check_confidence(signal);
        let notional = || self.check_amount(amount);
        let enabled = || self.check_venue(venue);
        let gates: [&dyn Fn() -> GateResult; 3] = [&confidence, &notional, &enabled];
        // Stop at the first block; later gates are not consulted.
        for gate in gates {
            if let GateResult::Block(reason) = gate() {
                return DispatchDecision::reject(reason);
            }
        }
        DispatchDecision::approve()
    }
}
