//! Executor error types.

use sigrelay_core::VenueId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("{venue} rejected order: {message} (code {code})")]
    OrderRejected {
        venue: VenueId,
        code: i64,
        message: String,
    },

    #[error("{venue} unreachable: {message}")]
    Connection { venue: VenueId, message: String },

    #[error("Venue call timed out after {0}ms")]
    Timeout(u64),

    #[error("Unexpected venue response: {0}")]
    InvalidResponse(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ExecutorError {
    /// Metric label for this failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OrderRejected { .. } => "rejected",
            Self::Connection { .. } | Self::Http(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::InvalidResponse(_) | Self::Signing(_) => "error",
        }
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
