//! Watch error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Observe failed: {0}")]
    Observe(String),

    #[error("Host unavailable: {0}")]
    HostUnavailable(String),
}

pub type WatchResult<T> = Result<T, WatchError>;
