//! Error types for sigrelay-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Invalid trading policy: {0}")]
    InvalidPolicy(String),

    #[error("Unknown venue: {0}")]
    UnknownVenue(String),

    #[error("Invalid side: {0}")]
    InvalidSide(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
