//! Gated order dispatch for sigrelay.
//!
//! Turns validated trade signals into market orders on the enabled venues.
//!
//! # Key Components
//!
//! - [`DispatchGatekeeper`]: policy gates, per-venue serialization, reconnects
//! - [`VenueClient`]: uniform order API implemented per exchange
//! - [`BinanceStyleClient`], [`BybitClient`]: REST clients for the supported venues

pub mod error;
pub mod gatekeeper;
pub mod rest;
pub mod venue;

pub use error::{ExecutorError, ExecutorResult};
pub use gatekeeper::{DispatchGatekeeper, DispatchOutcome, DEFAULT_VENUE_TIMEOUT};
pub use rest::{build_client, normalize_symbol, sign_hex, BinanceStyleClient, BybitClient};
pub use venue::{VenueClient, VenueState};
