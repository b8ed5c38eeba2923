//! Domain entities.

mod coupon;
mod order;
mod product;
mod user;

pub use coupon::{Coupon, CouponPolicy, NewCoupon, COUPON_VALIDITY_DAYS};
pub use order::{Order, OrderItem};
pub use product::Product;
pub use user::User;
