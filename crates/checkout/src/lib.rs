//! Order placement workflow.
//!
//! Composes the stock, coupon and balance ledgers into one atomic checkout:
//! a multi-key lock serializes stock reservation across the order's products,
//! and explicit compensation unwinds partial work when a later step fails.

mod error;
mod workflow;

pub use error::CheckoutError;
pub use workflow::{OrderLine, OrderWorkflow, PlaceOrder};

/// Convenience alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
