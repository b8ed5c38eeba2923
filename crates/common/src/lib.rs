//! Shared types for the commerce core.

mod ids;
mod money;

pub use ids::{CouponId, OrderId, PolicyCode, ProductId, UserId};
pub use money::Money;
