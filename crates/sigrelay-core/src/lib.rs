//! Core domain types for the sigrelay chat-signal pipeline.
//!
//! This crate provides the values that flow between pipeline stages:
//! - `ChatMessage`: one structured chat message lifted out of the observed DOM
//! - `TradeSignal`, `TradeSide`: validated output of the reasoning stage
//! - `TradingPolicy`, `VenueId`: read-only dispatch configuration
//! - `OrderReceipt`, `ClientOrderId`: venue order results and idempotency keys
//! - `Credentials`: venue API secrets (zeroized on drop)

pub mod credentials;
pub mod error;
pub mod message;
pub mod order;
pub mod policy;
pub mod signal;

pub use credentials::Credentials;
pub use error::{CoreError, Result};
pub use message::ChatMessage;
pub use order::{ClientOrderId, OrderReceipt, TradeSide};
pub use policy::{TradingPolicy, VenueId};
pub use signal::TradeSignal;
