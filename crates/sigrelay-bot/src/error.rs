//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),

    #[error("Bridge error: {0}")]
    Bridge(#[from] sigrelay_bridge::BridgeError),

    #[error("Watch error: {0}")]
    Watch(#[from] sigrelay_watch::WatchError),

    #[error("Signal error: {0}")]
    Signal(#[from] sigrelay_signal::SignalError),

    #[error("Executor error: {0}")]
    Executor(#[from] sigrelay_executor::ExecutorError),

    #[error("Core error: {0}")]
    Core(#[from] sigrelay_core::CoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] sigrelay_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
