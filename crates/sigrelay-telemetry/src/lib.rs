//! Prometheus metrics and structured logging for sigrelay.
//!
//! - Prometheus counters for each pipeline stage
//! - Structured logging with tracing (JSON in production)
//! - Session summary written at shutdown

pub mod error;
pub mod logging;
pub mod metrics;
pub mod session_stats;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use session_stats::{SessionStats, SessionStatsReporter};
