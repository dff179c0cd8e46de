//! Validated trade signal.

use crate::error::{CoreError, Result};
use crate::order::TradeSide;
use serde::Serialize;
use std::fmt;

/// Trade signal derived from one chat message.
///
/// Invariants (enforced by [`TradeSignal::new`]):
/// - `symbol` is non-blank
/// - `confidence` is within 0..=100
/// - `summary` is non-blank
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeSignal {
    symbol: String,
    side: TradeSide,
    confidence: u8,
    summary: String,
}

impl TradeSignal {
    /// Validate raw fields into a signal.
    ///
    /// All violations are reported together.
    pub fn new(
        symbol: impl Into<String>,
        side: TradeSide,
        confidence: i64,
        summary: impl Into<String>,
    ) -> Result<Self> {
        let symbol = symbol.into();
        let summary = summary.into();

        let mut violations = Vec::new();
        if symbol.trim().is_empty() {
            violations.push("symbol must not be empty".to_string());
        }
        if !(0..=100).contains(&confidence) {
            violations.push(format!("confidence must be within 0-100, got {confidence}"));
        }
        if summary.trim().is_empty() {
            violations.push("summary must not be empty".to_string());
        }
        if !violations.is_empty() {
            return Err(CoreError::InvalidSignal(violations.join("; ")));
        }

        Ok(Self {
            symbol: symbol.trim().to_string(),
            side,
            confidence: confidence as u8,
            summary,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn side(&self) -> TradeSide {
        self.side
    }

    pub fn confidence(&self) -> u8 {
        self.confidence
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }
}

impl fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (confidence {}%): {}",
            self.side, self.symbol, self.confidence, self.summary
        )
    }
}
