//! The order placement workflow.

use common::{CouponId, Money, ProductId, UserId};
use ledger::{
    BalanceLedger, Coupon, CouponLedger, LedgerError, LedgerStore, Order, OrderItem,
    OrderRepository, StockLedger,
};
use lock::{LockClient, LockConfig, LockManager};
use tracing::{error, info, instrument};

use crate::Result;
use crate::error::CheckoutError;

fn stock_lock_key(id: ProductId) -> String {
    format!("stock:{id}")
}

/// One requested order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// An order placement request.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    pub coupon_id: Option<CouponId>,
}

/// Orchestrates checkout across the stock, coupon and balance ledgers.
///
/// All stock movement for one order happens under a multi-key lock over the
/// order's products, so concurrent orders with overlapping products serialize
/// and the reserve/rollback pairs stay consistent.
#[derive(Clone)]
pub struct OrderWorkflow<C, R> {
    lock: LockManager<C>,
    stock: StockLedger<R>,
    coupons: CouponLedger<C, R>,
    balance: BalanceLedger<R>,
    store: R,
}

impl<C, R> OrderWorkflow<C, R>
where
    C: LockClient + Clone,
    R: LedgerStore,
{
    pub fn new(client: C, store: R) -> Self {
        Self {
            lock: LockManager::with_config(client.clone(), LockConfig::multi_key()),
            stock: StockLedger::new(store.clone()),
            coupons: CouponLedger::new(LockManager::new(client), store.clone()),
            balance: BalanceLedger::new(store.clone()),
            store,
        }
    }

    /// Places an order: reserve stock per line, apply an optional coupon,
    /// debit the balance, persist. Any failure after stock was reserved rolls
    /// the reserved stock back before the error propagates.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, lines = request.lines.len()))]
    pub async fn place_order(&self, request: PlaceOrder) -> Result<Order> {
        if request.lines.is_empty() {
            return Err(CheckoutError::EmptyOrder);
        }
        for line in &request.lines {
            if line.quantity == 0 {
                return Err(LedgerError::InvalidQuantity(line.quantity).into());
            }
        }

        let keys: Vec<String> = request
            .lines
            .iter()
            .map(|l| stock_lock_key(l.product_id))
            .collect();

        let result = self
            .lock
            .with_multi_lock(&keys, || self.place_order_locked(&request))
            .await;

        match &result {
            Ok(order) => {
                metrics::counter!("orders_placed_total").increment(1);
                metrics::histogram!("order_total_cents").record(order.total_amount.cents() as f64);
            }
            Err(_) => metrics::counter!("orders_failed_total").increment(1),
        }
        result
    }

    /// The lock-protected section: everything that touches stock rows.
    async fn place_order_locked(&self, request: &PlaceOrder) -> Result<Order> {
        let mut reserved: Vec<(ProductId, u32)> = Vec::with_capacity(request.lines.len());
        let mut items: Vec<OrderItem> = Vec::with_capacity(request.lines.len());

        for line in &request.lines {
            match self.stock.reserve(line.product_id, line.quantity).await {
                Ok(product) => {
                    reserved.push((line.product_id, line.quantity));
                    items.push(OrderItem::new(line.product_id, line.quantity, product.price));
                }
                Err(e) => {
                    self.rollback_stock(&reserved).await;
                    return Err(e.into());
                }
            }
        }

        let gross: Money = items.iter().map(OrderItem::total_price).sum();

        let (total, used_coupon) = match request.coupon_id {
            Some(coupon_id) => {
                match self
                    .coupons
                    .use_and_discount(coupon_id, request.user_id, gross)
                    .await
                {
                    Ok((discounted, coupon)) => (discounted, Some(coupon)),
                    Err(e) => {
                        self.rollback_stock(&reserved).await;
                        return Err(e.into());
                    }
                }
            }
            None => (gross, None),
        };

        // A consumed coupon is deliberately not restored here: the user asked
        // to spend it and the shortfall is theirs to fix.
        if let Err(e) = self.balance.use_points(request.user_id, total).await {
            self.rollback_stock(&reserved).await;
            return Err(e.into());
        }

        match self.store.insert_order(request.user_id, items, total).await {
            Ok(order) => {
                info!(order_id = %order.id, total = %order.total_amount, "order placed");
                Ok(order)
            }
            Err(e) => {
                self.rollback_stock(&reserved).await;
                self.refund_balance(request.user_id, total).await;
                if let Some(coupon) = used_coupon {
                    self.rollback_coupon(&coupon).await;
                }
                Err(e.into())
            }
        }
    }

    /// A user's placed orders, newest first.
    pub async fn user_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.store.find_user_orders(user_id).await?)
    }

    /// Compensation failures are logged, never surfaced: the triggering
    /// error must reach the caller.
    async fn rollback_stock(&self, reserved: &[(ProductId, u32)]) {
        for (id, quantity) in reserved.iter().rev() {
            if let Err(e) = self.stock.restore(*id, *quantity).await {
                error!(product_id = %id, quantity, error = %e, "stock rollback failed");
            }
        }
    }

    async fn refund_balance(&self, user_id: UserId, amount: Money) {
        if let Err(e) = self.balance.refund(user_id, amount).await {
            error!(user_id = %user_id, amount = %amount, error = %e, "balance refund failed");
        }
    }

    async fn rollback_coupon(&self, coupon: &Coupon) {
        if let Err(e) = self.coupons.rollback_use(coupon.id).await {
            error!(coupon_id = %coupon.id, error = %e, "coupon rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::{
        CouponPolicyRepository, CouponRepository, InMemoryLedger, ProductRepository,
        UserRepository,
    };
    use lock::InMemoryLockClient;

    struct Fixture {
        workflow: OrderWorkflow<InMemoryLockClient, InMemoryLedger>,
        store: InMemoryLedger,
        user: UserId,
    }

    async fn fixture(balance_cents: i64) -> Fixture {
        let store = InMemoryLedger::new();
        let user = store
            .insert_user(Money::from_cents(balance_cents))
            .await
            .unwrap()
            .id;
        Fixture {
            workflow: OrderWorkflow::new(InMemoryLockClient::new(), store.clone()),
            store,
            user,
        }
    }

    impl Fixture {
        async fn product(&self, price_cents: i64, stock: u32) -> ProductId {
            self.store
                .insert_product("Item", Money::from_cents(price_cents), stock)
                .await
                .unwrap()
                .id
        }
    }

    #[tokio::test]
    async fn happy_path_debits_and_persists() {
        let fx = fixture(10_000).await;
        let p1 = fx.product(500, 10).await;
        let p2 = fx.product(300, 10).await;

        let order = fx
            .workflow
            .place_order(PlaceOrder {
                user_id: fx.user,
                lines: vec![OrderLine::new(p1, 2), OrderLine::new(p2, 1)],
                coupon_id: None,
            })
            .await
            .unwrap();

        assert_eq!(order.total_amount, Money::from_cents(1300));
        assert_eq!(fx.store.find_product(p1).await.unwrap().stock, 8);
        assert_eq!(fx.store.find_product(p2).await.unwrap().stock, 9);
        assert_eq!(
            fx.store.find_user(fx.user).await.unwrap().point,
            Money::from_cents(8700)
        );
        assert_eq!(fx.workflow.user_orders(fx.user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_order_rejected() {
        let fx = fixture(1000).await;
        let err = fx
            .workflow
            .place_order(PlaceOrder {
                user_id: fx.user,
                lines: vec![],
                coupon_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::EmptyOrder));
    }

    #[tokio::test]
    async fn zero_quantity_rejected_before_locking() {
        let fx = fixture(1000).await;
        let p = fx.product(500, 10).await;
        let err = fx
            .workflow
            .place_order(PlaceOrder {
                user_id: fx.user,
                lines: vec![OrderLine::new(p, 0)],
                coupon_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Ledger(LedgerError::InvalidQuantity(0))
        ));
        assert_eq!(fx.store.find_product(p).await.unwrap().stock, 10);
    }

    #[tokio::test]
    async fn over_quantity_order_leaves_stock_untouched() {
        let fx = fixture(10_000).await;
        let p = fx.product(500, 10).await;

        let err = fx
            .workflow
            .place_order(PlaceOrder {
                user_id: fx.user,
                lines: vec![OrderLine::new(p, 12)],
                coupon_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Ledger(LedgerError::InsufficientStock { .. })
        ));
        assert_eq!(fx.store.find_product(p).await.unwrap().stock, 10);
        assert_eq!(fx.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn insufficient_stock_rolls_back_earlier_lines() {
        let fx = fixture(10_000).await;
        let p1 = fx.product(500, 10).await;
        let p2 = fx.product(300, 1).await;

        let err = fx
            .workflow
            .place_order(PlaceOrder {
                user_id: fx.user,
                lines: vec![OrderLine::new(p1, 2), OrderLine::new(p2, 5)],
                coupon_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Ledger(LedgerError::InsufficientStock { .. })
        ));

        // The first line's reservation was unwound.
        assert_eq!(fx.store.find_product(p1).await.unwrap().stock, 10);
        assert_eq!(fx.store.find_product(p2).await.unwrap().stock, 1);
        assert_eq!(
            fx.store.find_user(fx.user).await.unwrap().point,
            Money::from_cents(10_000)
        );
        assert_eq!(fx.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn coupon_discount_applies() {
        let fx = fixture(10_000).await;
        let p = fx.product(1000, 10).await;
        let code = common::PolicyCode::new("WELCOME10");
        let policy = fx.store.insert_policy(&code, 10, 10).await.unwrap();
        let coupon = fx
            .store
            .insert_coupon(ledger::NewCoupon::from_policy(
                fx.user,
                &policy,
                chrono::Utc::now(),
            ))
            .await
            .unwrap();

        let order = fx
            .workflow
            .place_order(PlaceOrder {
                user_id: fx.user,
                lines: vec![OrderLine::new(p, 1)],
                coupon_id: Some(coupon.id),
            })
            .await
            .unwrap();

        assert_eq!(order.total_amount, Money::from_cents(900));
        assert!(fx.store.find_coupon(coupon.id).await.unwrap().used);
        assert_eq!(
            fx.store.find_user(fx.user).await.unwrap().point,
            Money::from_cents(9100)
        );
    }

    #[tokio::test]
    async fn invalid_coupon_rolls_back_stock() {
        let fx = fixture(10_000).await;
        let p = fx.product(1000, 10).await;

        let err = fx
            .workflow
            .place_order(PlaceOrder {
                user_id: fx.user,
                lines: vec![OrderLine::new(p, 1)],
                coupon_id: Some(CouponId::new(999)),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Ledger(LedgerError::CouponNotFound(_))
        ));
        assert_eq!(fx.store.find_product(p).await.unwrap().stock, 10);
        assert_eq!(
            fx.store.find_user(fx.user).await.unwrap().point,
            Money::from_cents(10_000)
        );
    }

    #[tokio::test]
    async fn insufficient_balance_rolls_back_stock_but_not_coupon() {
        let fx = fixture(500).await;
        let p = fx.product(1000, 10).await;
        let code = common::PolicyCode::new("WELCOME10");
        let policy = fx.store.insert_policy(&code, 10, 10).await.unwrap();
        let coupon = fx
            .store
            .insert_coupon(ledger::NewCoupon::from_policy(
                fx.user,
                &policy,
                chrono::Utc::now(),
            ))
            .await
            .unwrap();

        let err = fx
            .workflow
            .place_order(PlaceOrder {
                user_id: fx.user,
                lines: vec![OrderLine::new(p, 1)],
                coupon_id: Some(coupon.id),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Ledger(LedgerError::InsufficientBalance { .. })
        ));

        assert_eq!(fx.store.find_product(p).await.unwrap().stock, 10);
        // The coupon stays consumed on a balance shortfall.
        assert!(fx.store.find_coupon(coupon.id).await.unwrap().used);
        assert_eq!(
            fx.store.find_user(fx.user).await.unwrap().point,
            Money::from_cents(500)
        );
    }

    #[tokio::test]
    async fn repeated_product_lines_each_reserve() {
        let fx = fixture(10_000).await;
        let p = fx.product(200, 10).await;

        let order = fx
            .workflow
            .place_order(PlaceOrder {
                user_id: fx.user,
                lines: vec![OrderLine::new(p, 3), OrderLine::new(p, 2)],
                coupon_id: None,
            })
            .await
            .unwrap();

        assert_eq!(order.total_amount, Money::from_cents(1000));
        assert_eq!(fx.store.find_product(p).await.unwrap().stock, 5);
    }
}
