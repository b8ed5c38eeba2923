//! Checkout error type.

use ledger::LedgerError;
use lock::LockError;
use thiserror::Error;

/// Errors surfaced by order placement.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("order must contain at least one line")]
    EmptyOrder,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("lock acquisition failed: {0}")]
    Lock(#[from] LockError),
}

impl CheckoutError {
    /// True when the caller may retry the request as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::EmptyOrder => false,
            Self::Ledger(e) => e.is_retryable(),
            Self::Lock(_) => true,
        }
    }
}
