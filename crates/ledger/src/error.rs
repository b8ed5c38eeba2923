//! Ledger error taxonomy.
//!
//! Business-rule failures are typed and not retryable; optimistic-lock
//! conflicts and lock timeouts are retryable and distinguishable so a caller
//! can decide whether to try again.

use common::{CouponId, Money, PolicyCode, ProductId, UserId};
use lock::LockError;
use thiserror::Error;

/// Errors raised by the ledgers and their repositories.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Product row missing.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// Coupon row missing.
    #[error("coupon not found: {0}")]
    CouponNotFound(CouponId),

    /// Coupon policy code unknown.
    #[error("coupon policy not found: {0}")]
    PolicyNotFound(PolicyCode),

    /// Balance holder missing.
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// Caller bug: quantity must be positive.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(u32),

    /// Caller bug: amount must be positive.
    #[error("invalid amount: {0}")]
    InvalidAmount(Money),

    /// Caller bug: malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Requested more units than the product has.
    #[error("insufficient stock for product {product_id}: {stock} on hand, {requested} requested")]
    InsufficientStock {
        product_id: ProductId,
        stock: u32,
        requested: u32,
    },

    /// Balance cannot cover the amount.
    #[error("insufficient balance: {balance} available, {required} required")]
    InsufficientBalance { balance: Money, required: Money },

    /// Every coupon under the policy has been issued.
    #[error("coupons sold out for policy {code} ({max_count} issued)")]
    SoldOut { code: PolicyCode, max_count: u32 },

    /// The user already holds a coupon for this policy.
    #[error("coupon already issued to user {user_id} for policy {code}")]
    AlreadyIssued { user_id: UserId, code: PolicyCode },

    /// The user already has an issuance request in flight.
    #[error("issuance already pending for user {user_id} on policy {code}")]
    AlreadyPending { user_id: UserId, code: PolicyCode },

    /// The coupon was used before.
    #[error("coupon already used: {0}")]
    AlreadyUsed(CouponId),

    /// The coupon is past its expiration date.
    #[error("coupon expired: {0}")]
    Expired(CouponId),

    /// The coupon belongs to a different user.
    #[error("coupon {0} is not owned by the requesting user")]
    NotOwner(CouponId),

    /// Optimistic version check failed on write.
    ///
    /// Retryable a bounded number of times with backoff.
    #[error("concurrent update on {entity} {id}")]
    ConcurrentUpdate { entity: &'static str, id: i64 },

    /// Distributed lock contention.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Storage backend failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl LedgerError {
    /// True for transient failures a client may retry (lock contention,
    /// optimistic conflicts), false for business rules and caller bugs.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::ConcurrentUpdate { .. } | LedgerError::Lock(_)
        )
    }
}
