//! Integration tests for sigrelay-bot.
//!
//! These tests verify the interaction between components:
//! - DevTools intake (DOM watcher and console listener) through the bridge
//! - Channel filter, signal analysis and gated dispatch
//! - Shutdown draining

pub mod common;
