//! Lock error types.

use thiserror::Error;

/// Errors surfaced by lock acquisition.
#[derive(Debug, Clone, Error)]
pub enum LockError {
    /// The lock could not be acquired within the wait timeout.
    ///
    /// Retryable: the caller should surface a "processing, try again"
    /// condition rather than a permanent failure.
    #[error("timed out acquiring lock '{key}' after {waited_ms}ms")]
    Timeout { key: String, waited_ms: u64 },
}

impl LockError {
    /// Returns the contended key.
    pub fn key(&self) -> &str {
        match self {
            LockError::Timeout { key, .. } => key,
        }
    }
}
