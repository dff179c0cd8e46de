//! Trade signal generation through an external reasoning service.
//!
//! A chat message is embedded in a prompt, the service replies with a small
//! JSON document, and the reply becomes a validated [`TradeSignal`] or
//! nothing. Service failures never reach the caller.
//!
//! [`TradeSignal`]: sigrelay_core::TradeSignal

pub mod client;
pub mod config;
pub mod error;
pub mod generator;

pub use client::{OpenAiClient, ReasoningClient};
pub use config::LlmConfig;
pub use error::{SignalError, SignalResult};
pub use generator::{build_prompt, parse_reply, Analysis, SignalGenerator};
