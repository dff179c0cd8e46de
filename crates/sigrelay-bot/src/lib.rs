//! sigrelay application.
//!
//! Orchestrates the pipeline:
//! - DevTools intake (DOM watcher or console listener) into the event bridge
//! - Channel allow-list
//! - Signal analysis through the reasoning service
//! - Gated order dispatch (skipped in read-only mode)

pub mod app;
pub mod config;
pub mod error;
pub mod pipeline;

pub use app::Application;
pub use config::{AppConfig, IntakeMode};
pub use error::{AppError, AppResult};
pub use pipeline::{MessageOutcome, Pipeline};
