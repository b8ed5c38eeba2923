//! Repository traits over the durable store.
//!
//! Every mutating operation is atomic at the storage layer: a conditional
//! UPDATE in PostgreSQL, a single critical section in memory. Multi-step
//! read-modify-write sections are serialized by the distributed lock held by
//! the caller, so plain reads are safe inside those sections.

use async_trait::async_trait;
use common::{CouponId, Money, PolicyCode, ProductId, UserId};

use crate::Result;
use crate::model::{Coupon, CouponPolicy, NewCoupon, Order, OrderItem, Product, User};

/// Authoritative per-product stock rows.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Loads a product, `ProductNotFound` if absent.
    async fn find_product(&self, id: ProductId) -> Result<Product>;

    /// Lists the catalog.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Creates a product row (catalog seeding).
    async fn insert_product(&self, name: &str, price: Money, stock: u32) -> Result<Product>;

    /// Atomically checks and decrements stock. Never drives stock negative:
    /// `InsufficientStock` when `quantity` exceeds the row's stock.
    async fn decrease_stock(&self, id: ProductId, quantity: u32) -> Result<Product>;

    /// Atomically increments stock (compensation path).
    async fn increase_stock(&self, id: ProductId, quantity: u32) -> Result<Product>;
}

/// Per-user point balances.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Loads a user, `UserNotFound` if absent.
    async fn find_user(&self, id: UserId) -> Result<User>;

    /// Creates a balance row (test/admin seeding).
    async fn insert_user(&self, initial_point: Money) -> Result<User>;

    /// Atomically debits, failing with `InsufficientBalance` when the row
    /// cannot cover `amount`.
    async fn debit_points(&self, id: UserId, amount: Money) -> Result<User>;

    /// Atomically credits `amount`.
    async fn credit_points(&self, id: UserId, amount: Money) -> Result<User>;

    /// Writes the full row iff its version still matches `user.version`,
    /// bumping the version; `ConcurrentUpdate` otherwise.
    async fn save_user_versioned(&self, user: &User) -> Result<User>;
}

/// Coupon policy templates.
#[async_trait]
pub trait CouponPolicyRepository: Send + Sync {
    /// Loads a policy by code, `PolicyNotFound` if absent.
    async fn find_policy(&self, code: &PolicyCode) -> Result<CouponPolicy>;

    /// Creates a policy (administrative seeding). The code must be unique.
    async fn insert_policy(
        &self,
        code: &PolicyCode,
        discount_rate: u8,
        max_count: u32,
    ) -> Result<CouponPolicy>;

    /// Lists all policies (used by the reconciliation pass).
    async fn list_policies(&self) -> Result<Vec<CouponPolicy>>;
}

/// The durable record of issued coupons — the source of truth for both the
/// count-by-policy cap and the per-user dedup check.
#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// Persists an issuance. Enforces the (user, code) uniqueness invariant,
    /// failing with `AlreadyIssued`.
    async fn insert_coupon(&self, new: NewCoupon) -> Result<Coupon>;

    /// Loads a coupon, `CouponNotFound` if absent.
    async fn find_coupon(&self, id: CouponId) -> Result<Coupon>;

    /// All coupons held by a user.
    async fn find_user_coupons(&self, user_id: UserId) -> Result<Vec<Coupon>>;

    /// Number of coupons issued under a policy code.
    async fn count_by_code(&self, code: &PolicyCode) -> Result<u32>;

    /// True when the user already holds a coupon for the code.
    async fn exists_for_user(&self, user_id: UserId, code: &PolicyCode) -> Result<bool>;

    /// Sets the used flag iff the row version still matches
    /// `expected_version`, bumping the version; `ConcurrentUpdate` otherwise.
    async fn set_used_versioned(
        &self,
        id: CouponId,
        used: bool,
        expected_version: i64,
    ) -> Result<Coupon>;
}

/// Placed orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists an order and its items atomically.
    async fn insert_order(
        &self,
        user_id: UserId,
        items: Vec<OrderItem>,
        total_amount: Money,
    ) -> Result<Order>;

    /// Loads a user's orders with their items, newest first.
    async fn find_user_orders(&self, user_id: UserId) -> Result<Vec<Order>>;
}

/// Marker for a backend implementing every repository.
///
/// Lets orchestration code and HTTP handlers take one storage parameter
/// instead of five.
pub trait LedgerStore:
    ProductRepository
    + UserRepository
    + CouponPolicyRepository
    + CouponRepository
    + OrderRepository
    + Clone
    + Send
    + Sync
    + 'static
{
}

impl<T> LedgerStore for T where
    T: ProductRepository
        + UserRepository
        + CouponPolicyRepository
        + CouponRepository
        + OrderRepository
        + Clone
        + Send
        + Sync
        + 'static
{
}
