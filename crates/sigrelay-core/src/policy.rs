//! Trading policy and venue identifiers.
//!
//! The policy is supplied by configuration and is read-only to the pipeline.

use crate::error::{CoreError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Exchange backend reachable through the uniform order API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueId {
    Binance,
    Bybit,
    Mexc,
}

impl VenueId {
    pub const ALL: [VenueId; 3] = [VenueId::Binance, VenueId::Bybit, VenueId::Mexc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Bybit => "bybit",
            Self::Mexc => "mexc",
        }
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VenueId {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "bybit" => Ok(Self::Bybit),
            "mexc" => Ok(Self::Mexc),
            _ => Err(CoreError::UnknownVenue(raw.to_string())),
        }
    }
}

/// Dispatch policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingPolicy {
    /// Minimum accepted confidence (inclusive).
    confidence_threshold: u8,
    /// Per-order notional cap in quote currency (inclusive).
    max_trade_amount: Decimal,
    /// Intended per-order notional. Falls back to `max_trade_amount`.
    trade_amount: Option<Decimal>,
    enabled_venues: BTreeSet<VenueId>,
}

impl TradingPolicy {
    /// Build a policy, rejecting out-of-range values.
    pub fn new(
        confidence_threshold: u8,
        max_trade_amount: Decimal,
        trade_amount: Option<Decimal>,
        enabled_venues: impl IntoIterator<Item = VenueId>,
    ) -> Result<Self> {
        if confidence_threshold > 100 {
            return Err(CoreError::InvalidPolicy(format!(
                "confidence_threshold must be within 0-100, got {confidence_threshold}"
            )));
        }
        if max_trade_amount <= Decimal::ZERO {
            return Err(CoreError::InvalidPolicy(format!(
                "max_trade_amount must be positive, got {max_trade_amount}"
            )));
        }
        if let Some(amount) = trade_amount {
            if amount <= Decimal::ZERO {
                return Err(CoreError::InvalidPolicy(format!(
                    "trade_amount must be positive, got {amount}"
                )));
            }
        }
        Ok(Self {
            confidence_threshold,
            max_trade_amount,
            trade_amount,
            enabled_venues: enabled_venues.into_iter().collect(),
        })
    }

    pub fn confidence_threshold(&self) -> u8 {
        self.confidence_threshold
    }

    pub fn max_trade_amount(&self) -> Decimal {
        self.max_trade_amount
    }

    /// Notional the dispatcher intends to place for one signal.
    pub fn intended_notional(&self) -> Decimal {
        self.trade_amount.unwrap_or(self.max_trade_amount)
    }

    pub fn enabled_venues(&self) -> impl Iterator<Item = VenueId> + '_ {
        self.enabled_venues.iter().copied()
    }

    pub fn is_enabled(&self, venue: VenueId) -> bool {
        self.enabled_venues.contains(&venue)
    }
}
