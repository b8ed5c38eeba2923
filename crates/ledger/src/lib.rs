//! Durable ledgers for the commerce core.
//!
//! Three authoritative stores — stock, coupons, balances — over a common
//! repository seam with in-memory and PostgreSQL backends, plus the
//! asynchronous coupon issuance front-end (counter + admission queue)
//! that is reconciled against the durable coupon ledger.

pub mod balance;
pub mod coupons;
pub mod error;
pub mod issuance;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod repository;
pub mod stock;

pub use balance::BalanceLedger;
pub use coupons::CouponLedger;
pub use error::LedgerError;
pub use issuance::{AsyncCouponIssuer, InventoryCounter, IssuanceQueue};
pub use memory::InMemoryLedger;
pub use model::{Coupon, CouponPolicy, NewCoupon, Order, OrderItem, Product, User};
pub use postgres::PgLedger;
pub use repository::{
    CouponPolicyRepository, CouponRepository, LedgerStore, OrderRepository, ProductRepository,
    UserRepository,
};
pub use stock::StockLedger;

/// Convenience alias for ledger results.
pub type Result<T> = std::result::Result<T, LedgerError>;
