//! Uniform venue API.

use crate::error::ExecutorResult;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sigrelay_core::{OrderReceipt, TradeSide, VenueId};
use std::fmt;

/// Order placement on one exchange.
///
/// Implementations perform a single attempt per call; the gatekeeper owns
/// timeouts and reconnection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VenueClient: Send + Sync {
    fn venue(&self) -> VenueId;

    /// Market order for `amount` of quote currency.
    async fn place_order(
        &self,
        symbol: &str,
        side: TradeSide,
        amount: Decimal,
    ) -> ExecutorResult<OrderReceipt>;

    /// Re-establish the session. `Ok` means the venue answered.
    async fn reconnect(&self) -> ExecutorResult<()>;

    /// Release any held connection.
    async fn close(&self) {}
}

/// Venue session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VenueState {
    #[default]
    Disconnected,
    Connected,
    Reconnecting,
}

impl VenueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for VenueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
