//! Route handlers and shared application state.

pub mod coupons;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;
pub mod users;

use cache::InMemoryCache;
use checkout::OrderWorkflow;
use ledger::{AsyncCouponIssuer, BalanceLedger, CouponLedger, LedgerStore, StockLedger};
use lock::LockClient;

/// Shared application state accessible from all handlers.
pub struct AppState<S: LedgerStore, C: LockClient + Clone> {
    pub stock: StockLedger<S>,
    pub balance: BalanceLedger<S>,
    pub coupons: CouponLedger<C, S>,
    pub issuer: AsyncCouponIssuer<InMemoryCache, C, S>,
    pub workflow: OrderWorkflow<C, S>,
    pub store: S,
}
