//! Coupon issuance and redemption.
//!
//! Issuance runs under a per-code distributed lock so the dedup check, the
//! cap check and the insert form one serialized section. Redemption uses the
//! coupon row's optimistic version instead: contention on a single user's
//! coupon is rare and a conflict usually means the coupon was just used.

use chrono::Utc;
use common::{CouponId, Money, PolicyCode, UserId};
use lock::{LockClient, LockManager};
use tracing::{info, instrument, warn};

use crate::Result;
use crate::error::LedgerError;
use crate::model::{Coupon, NewCoupon};
use crate::repository::{CouponPolicyRepository, CouponRepository};

fn issue_lock_key(code: &PolicyCode) -> String {
    format!("coupon:issue:{code}")
}

/// Coupon-facing service over the durable ledger.
#[derive(Clone)]
pub struct CouponLedger<C, R> {
    lock: LockManager<C>,
    store: R,
}

impl<C, R> CouponLedger<C, R>
where
    C: LockClient,
    R: CouponRepository + CouponPolicyRepository + Clone + Send + Sync,
{
    pub fn new(lock: LockManager<C>, store: R) -> Self {
        Self { lock, store }
    }

    /// Issues one coupon for `code` to `user_id`, first come first served.
    ///
    /// The per-code lock serializes the dedup check, the cap check and the
    /// insert, so the issued count can never exceed the policy's cap and a
    /// user can never hold two coupons for the same code.
    #[instrument(skip(self), fields(user_id = %user_id, code = %code))]
    pub async fn issue(&self, user_id: UserId, code: &PolicyCode) -> Result<Coupon> {
        let key = issue_lock_key(code);
        self.lock
            .with_lock(&key, || async {
                let policy = self.store.find_policy(code).await?;
                let issued = self.store.count_by_code(code).await?;
                if issued >= policy.max_count {
                    return Err(LedgerError::SoldOut {
                        code: code.clone(),
                        max_count: policy.max_count,
                    });
                }
                if self.store.exists_for_user(user_id, code).await? {
                    return Err(LedgerError::AlreadyIssued {
                        user_id,
                        code: code.clone(),
                    });
                }
                let coupon = self
                    .store
                    .insert_coupon(NewCoupon::from_policy(user_id, &policy, Utc::now()))
                    .await?;
                metrics::counter!("coupons_issued_total").increment(1);
                info!(coupon_id = %coupon.id, issued = issued + 1, "coupon issued");
                Ok(coupon)
            })
            .await
    }

    /// Loads a coupon by id.
    pub async fn get(&self, id: CouponId) -> Result<Coupon> {
        self.store.find_coupon(id).await
    }

    /// All coupons held by `user_id`.
    pub async fn user_coupons(&self, user_id: UserId) -> Result<Vec<Coupon>> {
        self.store.find_user_coupons(user_id).await
    }

    /// Consumes the coupon and returns the discounted amount.
    ///
    /// The used flag flips via a version-checked write. On a version conflict
    /// the row is re-read once: if the racing writer used the coupon this is
    /// `AlreadyUsed`, otherwise the write retries against the fresh version.
    #[instrument(skip(self), fields(coupon_id = %id, user_id = %user_id, amount = %amount))]
    pub async fn use_and_discount(
        &self,
        id: CouponId,
        user_id: UserId,
        amount: Money,
    ) -> Result<(Money, Coupon)> {
        let coupon = self.store.find_coupon(id).await?;
        coupon.validate(user_id, Utc::now())?;
        let discounted = coupon.discounted_amount(amount)?;

        let used = match self.store.set_used_versioned(id, true, coupon.version).await {
            Ok(c) => c,
            Err(LedgerError::ConcurrentUpdate { .. }) => {
                let fresh = self.store.find_coupon(id).await?;
                if fresh.used {
                    return Err(LedgerError::AlreadyUsed(id));
                }
                self.store.set_used_versioned(id, true, fresh.version).await?
            }
            Err(e) => return Err(e),
        };
        metrics::counter!("coupons_used_total").increment(1);
        info!(discounted = %discounted, "coupon consumed");
        Ok((discounted, used))
    }

    /// Marks a consumed coupon unused again (compensation path). Idempotent:
    /// an already-unused coupon is left as is.
    #[instrument(skip(self), fields(coupon_id = %id))]
    pub async fn rollback_use(&self, id: CouponId) -> Result<Coupon> {
        let coupon = self.store.find_coupon(id).await?;
        if !coupon.used {
            return Ok(coupon);
        }
        match self.store.set_used_versioned(id, false, coupon.version).await {
            Ok(c) => {
                warn!("coupon use rolled back");
                Ok(c)
            }
            Err(LedgerError::ConcurrentUpdate { .. }) => {
                let fresh = self.store.find_coupon(id).await?;
                if !fresh.used {
                    return Ok(fresh);
                }
                self.store.set_used_versioned(id, false, fresh.version).await
            }
            Err(e) => Err(e),
        }
    }
}
