//! Dispatch gatekeeper.
//!
//! Applies the policy gates to a signal and, when every gate passes, places
//! one market order on the requested venue.
//!
//! # Check order
//!
//! 1. Confidence          → Rejected(BelowConfidence)
//! 2. Notional cap        → Rejected(OverLimit)
//! 3. Venue enabled       → Rejected(VenueDisabled)
//! 4. Venue registered    → Rejected(VenueDisabled)
//! 5. Venue connected     → one reconnect, else Rejected(VenueUnavailable)
//! 6. (all passed)        → place_order under the venue lock
//!
//! Calls to the same venue are serialized; different venues proceed in
//! parallel.

use crate::error::ExecutorError;
use crate::venue::{VenueClient, VenueState};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use sigrelay_core::{OrderReceipt, TradeSignal, TradingPolicy, VenueId};
use sigrelay_risk::{DispatchGate, DispatchReason};
use sigrelay_telemetry::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default bound on a single venue call.
pub const DEFAULT_VENUE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of one dispatch attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Order accepted by the venue.
    Placed(OrderReceipt),
    /// A gate or venue availability check stopped the order.
    Rejected(DispatchReason),
    /// The venue call failed or timed out.
    Failed(String),
}

impl DispatchOutcome {
    pub fn receipt(&self) -> Option<&OrderReceipt> {
        match self {
            Self::Placed(receipt) => Some(receipt),
            _ => None,
        }
    }

    pub fn into_receipt(self) -> Option<OrderReceipt> {
        match self {
            Self::Placed(receipt) => Some(receipt),
            _ => None,
        }
    }
}

struct VenueSlot {
    client: Arc<dyn VenueClient>,
    state: Mutex<VenueState>,
    dispatch: tokio::sync::Mutex<()>,
}

impl VenueSlot {
    fn state(&self) -> VenueState {
        *self.state.lock()
    }

    fn set_state(&self, venue: VenueId, state: VenueState) {
        let old = std::mem::replace(&mut *self.state.lock(), state);
        if old != state {
            debug!(%venue, from = %old, to = %state, "Venue state changed");
        }
        Metrics::venue_state_set(venue.as_str(), state.as_str());
    }
}

/// Policy gates in front of a set of venue clients.
pub struct DispatchGatekeeper {
    gate: DispatchGate,
    venues: DashMap<VenueId, Arc<VenueSlot>>,
    venue_timeout: Duration,
}

impl DispatchGatekeeper {
    pub fn new(policy: TradingPolicy, venue_timeout: Duration) -> Self {
        Self {
            gate: DispatchGate::new(policy),
            venues: DashMap::new(),
            venue_timeout,
        }
    }

    /// Attach a venue client. The venue starts `Disconnected`.
    pub fn register(&self, client: Arc<dyn VenueClient>) {
        let venue = client.venue();
        let slot = Arc::new(VenueSlot {
            client,
            state: Mutex::new(VenueState::Disconnected),
            dispatch: tokio::sync::Mutex::new(()),
        });
        slot.set_state(venue, VenueState::Disconnected);
        if self.venues.insert(venue, slot).is_some() {
            warn!(%venue, "Replaced existing venue client");
        }
    }

    pub fn policy(&self) -> &TradingPolicy {
        self.gate.policy()
    }

    pub fn venue_state(&self, venue: VenueId) -> Option<VenueState> {
        self.venues.get(&venue).map(|slot| slot.state())
    }

    pub fn registered_venues(&self) -> Vec<VenueId> {
        let mut venues: Vec<VenueId> = self.venues.iter().map(|e| *e.key()).collect();
        venues.sort();
        venues
    }

    /// Try every registered venue once. Returns how many answered.
    pub async fn connect_all(&self) -> usize {
        let mut connected = 0;
        for (venue, slot) in self.slots() {
            let _guard = slot.dispatch.lock().await;
            if self.reconnect(venue, &slot).await {
                connected += 1;
            }
        }
        info!(
            connected,
            total = self.venues.len(),
            "Venue connections established"
        );
        connected
    }

    /// Close every venue session.
    pub async fn release(&self) {
        for (venue, slot) in self.slots() {
            let _guard = slot.dispatch.lock().await;
            slot.client.close().await;
            slot.set_state(venue, VenueState::Disconnected);
        }
        info!("Venue connections released");
    }

    /// Dispatch at the policy's intended notional.
    pub async fn place_order(&self, signal: &TradeSignal, venue: VenueId) -> DispatchOutcome {
        let amount = self.gate.policy().intended_notional();
        self.place_order_with_amount(signal, venue, amount).await
    }

    /// Dispatch an explicit notional. Non-positive amounts use the cap.
    pub async fn place_order_with_amount(
        &self,
        signal: &TradeSignal,
        venue: VenueId,
        amount: Decimal,
    ) -> DispatchOutcome {
        let amount = if amount <= Decimal::ZERO {
            self.gate.policy().max_trade_amount()
        } else {
            amount
        };

        let decision = self.gate.evaluate_with_amount(signal, venue, amount);
        if !decision.proceed {
            return self.reject(signal, venue, decision.reason);
        }

        let Some(slot) = self.venues.get(&venue).map(|e| Arc::clone(e.value())) else {
            debug!(%venue, "No client registered for enabled venue");
            return self.reject(signal, venue, DispatchReason::VenueDisabled);
        };

        let _guard = slot.dispatch.lock().await;

        if slot.state() != VenueState::Connected && !self.reconnect(venue, &slot).await {
            return self.reject(signal, venue, DispatchReason::VenueUnavailable);
        }

        Metrics::dispatch_decision(venue.as_str(), DispatchReason::Approved.as_str());
        info!(
            %venue,
            symbol = signal.symbol(),
            side = %signal.side(),
            confidence = signal.confidence(),
            %amount,
            "Dispatching order"
        );

        let call = slot
            .client
            .place_order(signal.symbol(), signal.side(), amount);
        let result = match tokio::time::timeout(self.venue_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::Timeout(self.venue_timeout.as_millis() as u64)),
        };

        match result {
            Ok(receipt) => {
                Metrics::order_placed(venue.as_str(), receipt.side.as_str());
                DispatchOutcome::Placed(receipt)
            }
            Err(e) => {
                error!(
                    %venue,
                    symbol = signal.symbol(),
                    side = %signal.side(),
                    error = %e,
                    "Order placement failed"
                );
                Metrics::order_failed(venue.as_str(), e.kind());
                slot.set_state(venue, VenueState::Reconnecting);
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }

    fn reject(&self, signal: &TradeSignal, venue: VenueId, reason: DispatchReason) -> DispatchOutcome {
        info!(
            %venue,
            symbol = signal.symbol(),
            side = %signal.side(),
            confidence = signal.confidence(),
            %reason,
            "Dispatch rejected"
        );
        Metrics::dispatch_decision(venue.as_str(), reason.as_str());
        DispatchOutcome::Rejected(reason)
    }

    /// Single reconnect attempt; the caller holds the venue lock.
    async fn reconnect(&self, venue: VenueId, slot: &VenueSlot) -> bool {
        slot.set_state(venue, VenueState::Reconnecting);
        let result = match tokio::time::timeout(self.venue_timeout, slot.client.reconnect()).await
        {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::Timeout(self.venue_timeout.as_millis() as u64)),
        };
        match result {
            Ok(()) => {
                slot.set_state(venue, VenueState::Connected);
                true
            }
            Err(e) => {
                warn!(%venue, error = %e, "Venue reconnect failed");
                slot.set_state(venue, VenueState::Disconnected);
                false
            }
        }
    }

    fn slots(&self) -> Vec<(VenueId, Arc<VenueSlot>)> {
        let mut slots: Vec<_> = self
            .venues
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();
        slots.sort_by_key(|(venue, _)| *venue);
        slots
    }
}
