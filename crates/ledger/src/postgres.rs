//! PostgreSQL ledger backend.
//!
//! Conditional mutations are single UPDATE statements with a guard in the
//! WHERE clause, so the check and the write are atomic at the row level.

use async_trait::async_trait;
use common::{CouponId, Money, OrderId, PolicyCode, ProductId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::Result;
use crate::error::LedgerError;
use crate::model::{Coupon, CouponPolicy, NewCoupon, Order, OrderItem, Product, User};
use crate::repository::{
    CouponPolicyRepository, CouponRepository, OrderRepository, ProductRepository, UserRepository,
};

/// PostgreSQL-backed implementation of every repository.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Creates a ledger over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    // Counts travel as INTEGER columns; an `as` cast past i32::MAX would
    // flip the sign and invert the guarded arithmetic.
    fn db_count(value: u32) -> Result<i32> {
        i32::try_from(value).map_err(|_| LedgerError::InvalidQuantity(value))
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price")?),
            stock: row.try_get::<i32, _>("stock")? as u32,
            version: row.try_get("version")?,
        })
    }

    fn row_to_user(row: PgRow) -> Result<User> {
        Ok(User {
            id: UserId::new(row.try_get("id")?),
            point: Money::from_cents(row.try_get("point")?),
            version: row.try_get("version")?,
        })
    }

    fn row_to_policy(row: PgRow) -> Result<CouponPolicy> {
        Ok(CouponPolicy {
            id: row.try_get("id")?,
            code: PolicyCode::new(row.try_get::<String, _>("code")?),
            discount_rate: row.try_get::<i16, _>("discount_rate")? as u8,
            max_count: row.try_get::<i32, _>("max_count")? as u32,
        })
    }

    fn row_to_coupon(row: PgRow) -> Result<Coupon> {
        Ok(Coupon {
            id: CouponId::new(row.try_get("id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            code: PolicyCode::new(row.try_get::<String, _>("code")?),
            discount_rate: row.try_get::<i16, _>("discount_rate")? as u8,
            used: row.try_get("used")?,
            issued_at: row.try_get("issued_at")?,
            expiration_date: row.try_get("expiration_date")?,
            version: row.try_get("version")?,
        })
    }
}

#[async_trait]
impl ProductRepository for PgLedger {
    async fn find_product(&self, id: ProductId) -> Result<Product> {
        let row = sqlx::query("SELECT id, name, price, stock, version FROM product WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::ProductNotFound(id))?;
        Self::row_to_product(row)
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query("SELECT id, name, price, stock, version FROM product ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn insert_product(&self, name: &str, price: Money, stock: u32) -> Result<Product> {
        let row = sqlx::query(
            r#"
            INSERT INTO product (name, price, stock)
            VALUES ($1, $2, $3)
            RETURNING id, name, price, stock, version
            "#,
        )
        .bind(name)
        .bind(price.cents())
        .bind(Self::db_count(stock)?)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_product(row)
    }

    async fn decrease_stock(&self, id: ProductId, quantity: u32) -> Result<Product> {
        let quantity_db = Self::db_count(quantity)?;
        let row = sqlx::query(
            r#"
            UPDATE product
            SET stock = stock - $2, version = version + 1
            WHERE id = $1 AND stock >= $2
            RETURNING id, name, price, stock, version
            "#,
        )
        .bind(id.as_i64())
        .bind(quantity_db)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_product(row),
            // Guard rejected: report not-found or the current stock level.
            None => {
                let current = self.find_product(id).await?;
                Err(LedgerError::InsufficientStock {
                    product_id: id,
                    stock: current.stock,
                    requested: quantity,
                })
            }
        }
    }

    async fn increase_stock(&self, id: ProductId, quantity: u32) -> Result<Product> {
        let quantity_db = Self::db_count(quantity)?;
        let row = sqlx::query(
            r#"
            UPDATE product
            SET stock = stock + $2, version = version + 1
            WHERE id = $1
            RETURNING id, name, price, stock, version
            "#,
        )
        .bind(id.as_i64())
        .bind(quantity_db)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::ProductNotFound(id))?;
        Self::row_to_product(row)
    }
}

#[async_trait]
impl UserRepository for PgLedger {
    async fn find_user(&self, id: UserId) -> Result<User> {
        let row = sqlx::query("SELECT id, point, version FROM users WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::UserNotFound(id))?;
        Self::row_to_user(row)
    }

    async fn insert_user(&self, initial_point: Money) -> Result<User> {
        let row = sqlx::query(
            "INSERT INTO users (point) VALUES ($1) RETURNING id, point, version",
        )
        .bind(initial_point.cents())
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_user(row)
    }

    async fn debit_points(&self, id: UserId, amount: Money) -> Result<User> {
        let row = sqlx::query(
            r#"
            UPDATE users
            SET point = point - $2, version = version + 1
            WHERE id = $1 AND point >= $2
            RETURNING id, point, version
            "#,
        )
        .bind(id.as_i64())
        .bind(amount.cents())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_user(row),
            None => {
                let current = self.find_user(id).await?;
                Err(LedgerError::InsufficientBalance {
                    balance: current.point,
                    required: amount,
                })
            }
        }
    }

    async fn credit_points(&self, id: UserId, amount: Money) -> Result<User> {
        let row = sqlx::query(
            r#"
            UPDATE users
            SET point = point + $2, version = version + 1
            WHERE id = $1
            RETURNING id, point, version
            "#,
        )
        .bind(id.as_i64())
        .bind(amount.cents())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::UserNotFound(id))?;
        Self::row_to_user(row)
    }

    async fn save_user_versioned(&self, user: &User) -> Result<User> {
        let row = sqlx::query(
            r#"
            UPDATE users
            SET point = $2, version = version + 1
            WHERE id = $1 AND version = $3
            RETURNING id, point, version
            "#,
        )
        .bind(user.id.as_i64())
        .bind(user.point.cents())
        .bind(user.version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_user(row),
            None => {
                self.find_user(user.id).await?;
                Err(LedgerError::ConcurrentUpdate {
                    entity: "user",
                    id: user.id.as_i64(),
                })
            }
        }
    }
}

#[async_trait]
impl CouponPolicyRepository for PgLedger {
    async fn find_policy(&self, code: &PolicyCode) -> Result<CouponPolicy> {
        let row = sqlx::query(
            "SELECT id, code, discount_rate, max_count FROM coupon_policy WHERE code = $1",
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LedgerError::PolicyNotFound(code.clone()))?;
        Self::row_to_policy(row)
    }

    async fn insert_policy(
        &self,
        code: &PolicyCode,
        discount_rate: u8,
        max_count: u32,
    ) -> Result<CouponPolicy> {
        CouponPolicy::validate(discount_rate, max_count)?;
        let row = sqlx::query(
            r#"
            INSERT INTO coupon_policy (code, discount_rate, max_count)
            VALUES ($1, $2, $3)
            RETURNING id, code, discount_rate, max_count
            "#,
        )
        .bind(code.as_str())
        .bind(i16::from(discount_rate))
        .bind(i32::try_from(max_count).map_err(|_| {
            LedgerError::InvalidArgument(format!("max_count out of range: {max_count}"))
        })?)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("coupon_policy_code_unique")
            {
                return LedgerError::InvalidArgument(format!(
                    "policy code already exists: {code}"
                ));
            }
            LedgerError::Database(e)
        })?;
        Self::row_to_policy(row)
    }

    async fn list_policies(&self) -> Result<Vec<CouponPolicy>> {
        let rows =
            sqlx::query("SELECT id, code, discount_rate, max_count FROM coupon_policy ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Self::row_to_policy).collect()
    }
}

#[async_trait]
impl CouponRepository for PgLedger {
    async fn insert_coupon(&self, new: NewCoupon) -> Result<Coupon> {
        let row = sqlx::query(
            r#"
            INSERT INTO coupon (user_id, code, discount_rate, issued_at, expiration_date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, code, discount_rate, used, issued_at, expiration_date, version
            "#,
        )
        .bind(new.user_id.as_i64())
        .bind(new.code.as_str())
        .bind(i16::from(new.discount_rate))
        .bind(new.issued_at)
        .bind(new.expiration_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("coupon_user_code_unique")
            {
                return LedgerError::AlreadyIssued {
                    user_id: new.user_id,
                    code: new.code.clone(),
                };
            }
            LedgerError::Database(e)
        })?;
        Self::row_to_coupon(row)
    }

    async fn find_coupon(&self, id: CouponId) -> Result<Coupon> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, code, discount_rate, used, issued_at, expiration_date, version
            FROM coupon WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerError::CouponNotFound(id))?;
        Self::row_to_coupon(row)
    }

    async fn find_user_coupons(&self, user_id: UserId) -> Result<Vec<Coupon>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, code, discount_rate, used, issued_at, expiration_date, version
            FROM coupon WHERE user_id = $1 ORDER BY id
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_coupon).collect()
    }

    async fn count_by_code(&self, code: &PolicyCode) -> Result<u32> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM coupon WHERE code = $1")
            .bind(code.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u32)
    }

    async fn exists_for_user(&self, user_id: UserId, code: &PolicyCode) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM coupon WHERE user_id = $1 AND code = $2)",
        )
        .bind(user_id.as_i64())
        .bind(code.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn set_used_versioned(
        &self,
        id: CouponId,
        used: bool,
        expected_version: i64,
    ) -> Result<Coupon> {
        let row = sqlx::query(
            r#"
            UPDATE coupon
            SET used = $2, version = version + 1
            WHERE id = $1 AND version = $3
            RETURNING id, user_id, code, discount_rate, used, issued_at, expiration_date, version
            "#,
        )
        .bind(id.as_i64())
        .bind(used)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_coupon(row),
            None => {
                self.find_coupon(id).await?;
                Err(LedgerError::ConcurrentUpdate {
                    entity: "coupon",
                    id: id.as_i64(),
                })
            }
        }
    }
}

#[async_trait]
impl OrderRepository for PgLedger {
    async fn insert_order(
        &self,
        user_id: UserId,
        items: Vec<OrderItem>,
        total_amount: Money,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO orders (user_id, total_amount)
            VALUES ($1, $2)
            RETURNING id, created_at
            "#,
        )
        .bind(user_id.as_i64())
        .bind(total_amount.cents())
        .fetch_one(&mut *tx)
        .await?;

        let order_id: i64 = row.try_get("id")?;
        let created_at = row.try_get("created_at")?;

        for item in &items {
            sqlx::query(
                r#"
                INSERT INTO order_item (order_id, product_id, quantity, unit_price)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(order_id)
            .bind(item.product_id.as_i64())
            .bind(Self::db_count(item.quantity)?)
            .bind(item.unit_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Order {
            id: OrderId::new(order_id),
            user_id,
            total_amount,
            created_at,
            items,
        })
    }

    async fn find_user_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        let order_rows = sqlx::query(
            r#"
            SELECT id, user_id, total_amount, created_at
            FROM orders WHERE user_id = $1 ORDER BY id DESC
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(order_rows.len());
        for row in order_rows {
            let order_id: i64 = row.try_get("id")?;
            let item_rows = sqlx::query(
                r#"
                SELECT product_id, quantity, unit_price
                FROM order_item WHERE order_id = $1 ORDER BY id
                "#,
            )
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;

            let items = item_rows
                .into_iter()
                .map(|item| {
                    Ok(OrderItem {
                        product_id: ProductId::new(item.try_get("product_id")?),
                        quantity: item.try_get::<i32, _>("quantity")? as u32,
                        unit_price: Money::from_cents(item.try_get("unit_price")?),
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            orders.push(Order {
                id: OrderId::new(order_id),
                user_id,
                total_amount: Money::from_cents(row.try_get("total_amount")?),
                created_at: row.try_get("created_at")?,
                items,
            });
        }
        Ok(orders)
    }
}
