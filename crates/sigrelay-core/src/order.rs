//! Order-related types and identifiers.
//!
//! Provides the trade side, venue order receipts, and client order IDs
//! for the dispatch stage.

use crate::error::CoreError;
use crate::policy::VenueId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Trade direction: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Wire form used by signals and Binance-style venues.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeSide {
    type Err = CoreError;

    /// Strict parse: only the exact upper-case forms are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(CoreError::InvalidSide(other.to_string())),
        }
    }
}

/// Client order ID for idempotency.
///
/// Every venue request carries one so a retried HTTP call cannot create a
/// second order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Create a new unique client order ID.
    ///
    /// Format: `sr_{timestamp_ms}_{uuid_short}`
    pub fn new() -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().simple().to_string()[..8];
        Self(format!("sr_{ts}_{uuid_short}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ClientOrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Result of a successfully placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub venue: VenueId,
    /// Venue-assigned order identifier.
    pub order_id: String,
    pub client_order_id: ClientOrderId,
    pub symbol: String,
    pub side: TradeSide,
    /// Notional requested in quote currency.
    pub requested_amount: Decimal,
    /// Filled base quantity, when the venue reports it synchronously.
    pub filled_amount: Option<Decimal>,
    /// Average fill price, when the venue reports it synchronously.
    pub price: Option<Decimal>,
}

impl fmt::Display for OrderReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filled = self
            .filled_amount
            .map(|d| d.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        let price = self
            .price
            .map(|d| d.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        write!(
            f,
            "{} id={} {} {} requested={} filled={} price={}",
            self.venue, self.order_id, self.side, self.symbol, self.requested_amount, filled, price
        )
    }
}
