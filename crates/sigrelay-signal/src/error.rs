//! Signal generation error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Reasoning service not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Reasoning service error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Reasoning service returned no content")]
    EmptyReply,

    #[error("Reasoning service timed out after {0}ms")]
    Timeout(u64),
}

pub type SignalResult<T> = Result<T, SignalError>;
