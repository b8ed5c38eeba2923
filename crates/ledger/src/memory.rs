//! In-memory ledger backend.
//!
//! Provides the same interface and atomicity guarantees as the PostgreSQL
//! implementation: every repository operation runs under one write lock, so
//! conditional mutations are single critical sections.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CouponId, Money, OrderId, PolicyCode, ProductId, UserId};
use tokio::sync::RwLock;

use crate::Result;
use crate::error::LedgerError;
use crate::model::{Coupon, CouponPolicy, NewCoupon, Order, OrderItem, Product, User};
use crate::repository::{
    CouponPolicyRepository, CouponRepository, OrderRepository, ProductRepository, UserRepository,
};

#[derive(Debug, Default)]
struct MemState {
    products: HashMap<i64, Product>,
    users: HashMap<i64, User>,
    policies: HashMap<String, CouponPolicy>,
    coupons: HashMap<i64, Coupon>,
    orders: Vec<Order>,
    next_product_id: i64,
    next_user_id: i64,
    next_policy_id: i64,
    next_coupon_id: i64,
    next_order_id: i64,
}

/// In-memory implementation of every repository, for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<RwLock<MemState>>,
}

impl InMemoryLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of persisted orders (test helper).
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Total number of persisted coupons (test helper).
    pub async fn coupon_count(&self) -> usize {
        self.state.read().await.coupons.len()
    }
}

#[async_trait]
impl ProductRepository for InMemoryLedger {
    async fn find_product(&self, id: ProductId) -> Result<Product> {
        let state = self.state.read().await;
        state
            .products
            .get(&id.as_i64())
            .cloned()
            .ok_or(LedgerError::ProductNotFound(id))
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<_> = state.products.values().cloned().collect();
        products.sort_by_key(|p| p.id);
        Ok(products)
    }

    async fn insert_product(&self, name: &str, price: Money, stock: u32) -> Result<Product> {
        let mut state = self.state.write().await;
        state.next_product_id += 1;
        let product = Product {
            id: ProductId::new(state.next_product_id),
            name: name.to_string(),
            price,
            stock,
            version: 0,
        };
        state.products.insert(product.id.as_i64(), product.clone());
        Ok(product)
    }

    async fn decrease_stock(&self, id: ProductId, quantity: u32) -> Result<Product> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&id.as_i64())
            .ok_or(LedgerError::ProductNotFound(id))?;
        product.decrease_stock(quantity)?;
        Ok(product.clone())
    }

    async fn increase_stock(&self, id: ProductId, quantity: u32) -> Result<Product> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&id.as_i64())
            .ok_or(LedgerError::ProductNotFound(id))?;
        product.increase_stock(quantity)?;
        Ok(product.clone())
    }
}

#[async_trait]
impl UserRepository for InMemoryLedger {
    async fn find_user(&self, id: UserId) -> Result<User> {
        let state = self.state.read().await;
        state
            .users
            .get(&id.as_i64())
            .cloned()
            .ok_or(LedgerError::UserNotFound(id))
    }

    async fn insert_user(&self, initial_point: Money) -> Result<User> {
        let mut state = self.state.write().await;
        state.next_user_id += 1;
        let user = User {
            id: UserId::new(state.next_user_id),
            point: initial_point,
            version: 0,
        };
        state.users.insert(user.id.as_i64(), user.clone());
        Ok(user)
    }

    async fn debit_points(&self, id: UserId, amount: Money) -> Result<User> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&id.as_i64())
            .ok_or(LedgerError::UserNotFound(id))?;
        user.use_points(amount)?;
        user.version += 1;
        Ok(user.clone())
    }

    async fn credit_points(&self, id: UserId, amount: Money) -> Result<User> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&id.as_i64())
            .ok_or(LedgerError::UserNotFound(id))?;
        user.charge(amount)?;
        user.version += 1;
        Ok(user.clone())
    }

    async fn save_user_versioned(&self, user: &User) -> Result<User> {
        let mut state = self.state.write().await;
        let row = state
            .users
            .get_mut(&user.id.as_i64())
            .ok_or(LedgerError::UserNotFound(user.id))?;
        if row.version != user.version {
            return Err(LedgerError::ConcurrentUpdate {
                entity: "user",
                id: user.id.as_i64(),
            });
        }
        row.point = user.point;
        row.version += 1;
        Ok(row.clone())
    }
}

#[async_trait]
impl CouponPolicyRepository for InMemoryLedger {
    async fn find_policy(&self, code: &PolicyCode) -> Result<CouponPolicy> {
        let state = self.state.read().await;
        state
            .policies
            .get(code.as_str())
            .cloned()
            .ok_or_else(|| LedgerError::PolicyNotFound(code.clone()))
    }

    async fn insert_policy(
        &self,
        code: &PolicyCode,
        discount_rate: u8,
        max_count: u32,
    ) -> Result<CouponPolicy> {
        CouponPolicy::validate(discount_rate, max_count)?;
        let mut state = self.state.write().await;
        if state.policies.contains_key(code.as_str()) {
            return Err(LedgerError::InvalidArgument(format!(
                "policy code already exists: {code}"
            )));
        }
        state.next_policy_id += 1;
        let policy = CouponPolicy {
            id: state.next_policy_id,
            code: code.clone(),
            discount_rate,
            max_count,
        };
        state
            .policies
            .insert(code.as_str().to_string(), policy.clone());
        Ok(policy)
    }

    async fn list_policies(&self) -> Result<Vec<CouponPolicy>> {
        let state = self.state.read().await;
        let mut policies: Vec<_> = state.policies.values().cloned().collect();
        policies.sort_by_key(|p| p.id);
        Ok(policies)
    }
}

#[async_trait]
impl CouponRepository for InMemoryLedger {
    async fn insert_coupon(&self, new: NewCoupon) -> Result<Coupon> {
        let mut state = self.state.write().await;
        let duplicate = state
            .coupons
            .values()
            .any(|c| c.user_id == new.user_id && c.code == new.code);
        if duplicate {
            return Err(LedgerError::AlreadyIssued {
                user_id: new.user_id,
                code: new.code,
            });
        }
        state.next_coupon_id += 1;
        let coupon = Coupon {
            id: CouponId::new(state.next_coupon_id),
            user_id: new.user_id,
            code: new.code,
            discount_rate: new.discount_rate,
            used: false,
            issued_at: new.issued_at,
            expiration_date: new.expiration_date,
            version: 0,
        };
        state.coupons.insert(coupon.id.as_i64(), coupon.clone());
        Ok(coupon)
    }

    async fn find_coupon(&self, id: CouponId) -> Result<Coupon> {
        let state = self.state.read().await;
        state
            .coupons
            .get(&id.as_i64())
            .cloned()
            .ok_or(LedgerError::CouponNotFound(id))
    }

    async fn find_user_coupons(&self, user_id: UserId) -> Result<Vec<Coupon>> {
        let state = self.state.read().await;
        let mut coupons: Vec<_> = state
            .coupons
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        coupons.sort_by_key(|c| c.id);
        Ok(coupons)
    }

    async fn count_by_code(&self, code: &PolicyCode) -> Result<u32> {
        let state = self.state.read().await;
        Ok(state.coupons.values().filter(|c| &c.code == code).count() as u32)
    }

    async fn exists_for_user(&self, user_id: UserId, code: &PolicyCode) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state
            .coupons
            .values()
            .any(|c| c.user_id == user_id && &c.code == code))
    }

    async fn set_used_versioned(
        &self,
        id: CouponId,
        used: bool,
        expected_version: i64,
    ) -> Result<Coupon> {
        let mut state = self.state.write().await;
        let coupon = state
            .coupons
            .get_mut(&id.as_i64())
            .ok_or(LedgerError::CouponNotFound(id))?;
        if coupon.version != expected_version {
            return Err(LedgerError::ConcurrentUpdate {
                entity: "coupon",
                id: id.as_i64(),
            });
        }
        coupon.used = used;
        coupon.version += 1;
        Ok(coupon.clone())
    }
}

#[async_trait]
impl OrderRepository for InMemoryLedger {
    async fn insert_order(
        &self,
        user_id: UserId,
        items: Vec<OrderItem>,
        total_amount: Money,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        state.next_order_id += 1;
        let order = Order {
            id: OrderId::new(state.next_order_id),
            user_id,
            total_amount,
            created_at: Utc::now(),
            items,
        };
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn find_user_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(orders)
    }
}
