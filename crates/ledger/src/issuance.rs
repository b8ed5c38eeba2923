//! Asynchronous coupon issuance front-end.
//!
//! Fast admission runs against cache structures (counter, dedup sets, ranked
//! queue); the durable coupon ledger stays the source of truth. A periodic
//! reconciliation pass drains the queue and performs the real issue, re-
//! checking the durable count so cache drift can never overshoot the cap.

use std::time::Duration;

use cache::{AtomicCounter, DedupSet, RankedQueue};
use chrono::Utc;
use common::{PolicyCode, UserId};
use lock::LockClient;
use tracing::{info, instrument, warn};

use crate::Result;
use crate::coupons::CouponLedger;
use crate::error::LedgerError;
use crate::model::Coupon;
use crate::repository::{CouponPolicyRepository, CouponRepository};

/// Counter retention: one flash-sale day.
pub const COUNTER_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Queue and processing-set retention.
pub const QUEUE_TTL: Duration = Duration::from_secs(60 * 60);
/// Issued-set retention, matching coupon validity.
pub const ISSUED_SET_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

fn count_key(code: &PolicyCode) -> String {
    format!("coupon:count:{code}")
}

fn queue_key(code: &PolicyCode) -> String {
    format!("coupon:queue:{code}")
}

fn processing_key(code: &PolicyCode) -> String {
    format!("coupon:processing:{code}")
}

fn issued_key(code: &PolicyCode) -> String {
    format!("coupon:issued:{code}")
}

/// Per-code remaining-inventory counter with decrement-then-check semantics.
#[derive(Clone)]
pub struct InventoryCounter<S> {
    cache: S,
}

impl<S: AtomicCounter> InventoryCounter<S> {
    pub fn new(cache: S) -> Self {
        Self { cache }
    }

    /// Reserves one unit. Seeds the counter to `max_count` on first touch,
    /// then decrements; a negative result is re-incremented and reported as
    /// sold out.
    pub async fn reserve(&self, code: &PolicyCode, max_count: u32) -> bool {
        let key = count_key(code);
        self.cache
            .init_if_absent(&key, i64::from(max_count), COUNTER_TTL)
            .await;
        let left = self.cache.decrement(&key).await;
        if left < 0 {
            self.cache.increment(&key).await;
            return false;
        }
        true
    }

    /// Returns one unit (compensation path).
    pub async fn release(&self, code: &PolicyCode) {
        self.cache.increment(&count_key(code)).await;
    }

    /// Current remaining units, if the counter is seeded.
    pub async fn remaining(&self, code: &PolicyCode) -> Option<i64> {
        self.cache.count(&count_key(code)).await
    }
}

/// Admission queue with duplicate suppression.
///
/// Never authoritative for "was issued": the issued set mirrors the durable
/// ledger for fast rejection, and the reconciliation pass re-verifies.
#[derive(Clone)]
pub struct IssuanceQueue<S> {
    cache: S,
}

impl<S: DedupSet + RankedQueue> IssuanceQueue<S> {
    pub fn new(cache: S) -> Self {
        Self { cache }
    }

    /// Queues `user_id` with `priority_ts` as the ordering score. Rejects
    /// users already issued, already queued or currently being processed.
    pub async fn admit(
        &self,
        code: &PolicyCode,
        user_id: UserId,
        priority_ts: i64,
    ) -> Result<()> {
        let member = user_id.as_i64().to_string();
        if self.cache.contains(&issued_key(code), &member).await {
            return Err(LedgerError::AlreadyIssued {
                user_id,
                code: code.clone(),
            });
        }
        if self.cache.contains(&processing_key(code), &member).await {
            return Err(LedgerError::AlreadyPending {
                user_id,
                code: code.clone(),
            });
        }
        if !self
            .cache
            .push(&queue_key(code), &member, priority_ts, QUEUE_TTL)
            .await
        {
            return Err(LedgerError::AlreadyPending {
                user_id,
                code: code.clone(),
            });
        }
        Ok(())
    }

    /// Pops up to `n` oldest queued users into the processing set.
    pub async fn drain_batch(&self, code: &PolicyCode, n: usize) -> Vec<UserId> {
        let members = self.cache.pop_oldest(&queue_key(code), n).await;
        let mut users = Vec::with_capacity(members.len());
        for member in members {
            match member.parse::<i64>() {
                Ok(id) => {
                    self.cache
                        .add(&processing_key(code), &member, QUEUE_TTL)
                        .await;
                    users.push(UserId::new(id));
                }
                Err(_) => warn!(member, "dropping malformed queue member"),
            }
        }
        users
    }

    /// Records a finished issuance: out of processing, into the issued set.
    pub async fn complete(&self, code: &PolicyCode, user_id: UserId) {
        let member = user_id.as_i64().to_string();
        DedupSet::remove(&self.cache, &processing_key(code), &member).await;
        self.cache
            .add(&issued_key(code), &member, ISSUED_SET_TTL)
            .await;
    }

    /// Drops a user from the queue and the processing set (compensation
    /// path). They may request again.
    pub async fn abandon(&self, code: &PolicyCode, user_id: UserId) {
        let member = user_id.as_i64().to_string();
        RankedQueue::remove(&self.cache, &queue_key(code), &member).await;
        DedupSet::remove(&self.cache, &processing_key(code), &member).await;
    }

    /// Number of users waiting in the queue.
    pub async fn pending(&self, code: &PolicyCode) -> usize {
        self.cache.len(&queue_key(code)).await
    }
}

/// Orchestrates the asynchronous issuance path over the cache structures and
/// the durable coupon ledger.
#[derive(Clone)]
pub struct AsyncCouponIssuer<S, C, R> {
    counter: InventoryCounter<S>,
    queue: IssuanceQueue<S>,
    coupons: CouponLedger<C, R>,
    store: R,
}

impl<S, C, R> AsyncCouponIssuer<S, C, R>
where
    S: AtomicCounter + DedupSet + RankedQueue + Clone,
    C: LockClient,
    R: CouponRepository + CouponPolicyRepository + Clone + Send + Sync,
{
    pub fn new(cache: S, coupons: CouponLedger<C, R>, store: R) -> Self {
        Self {
            counter: InventoryCounter::new(cache.clone()),
            queue: IssuanceQueue::new(cache),
            coupons,
            store,
        }
    }

    /// Fast enqueue front-end: reserve a counter unit, then admit to the
    /// queue. The durable issue happens later in [`Self::process_pending`].
    #[instrument(skip(self), fields(user_id = %user_id, code = %code))]
    pub async fn request(&self, user_id: UserId, code: &PolicyCode) -> Result<()> {
        let policy = self.store.find_policy(code).await?;
        if !self.counter.reserve(code, policy.max_count).await {
            metrics::counter!("coupon_requests_sold_out_total").increment(1);
            return Err(LedgerError::SoldOut {
                code: code.clone(),
                max_count: policy.max_count,
            });
        }
        let now = Utc::now().timestamp_millis();
        if let Err(e) = self.queue.admit(code, user_id, now).await {
            self.counter.release(code).await;
            return Err(e);
        }
        metrics::counter!("coupon_requests_total").increment(1);
        info!("issuance request queued");
        Ok(())
    }

    /// Synchronous variant: reserve, admit, then confirm durably in one call.
    /// Failures unwind in reverse order (queue entry, then counter unit).
    #[instrument(skip(self), fields(user_id = %user_id, code = %code))]
    pub async fn issue_now(&self, user_id: UserId, code: &PolicyCode) -> Result<Coupon> {
        self.request(user_id, code).await?;
        match self.coupons.issue(user_id, code).await {
            Ok(coupon) => {
                self.queue.complete(code, user_id).await;
                RankedQueue::remove(
                    &self.queue.cache,
                    &queue_key(code),
                    &user_id.as_i64().to_string(),
                )
                .await;
                Ok(coupon)
            }
            Err(e) => {
                self.queue.abandon(code, user_id).await;
                self.counter.release(code).await;
                Err(e)
            }
        }
    }

    /// Reconciliation pass: drains up to `batch` queued users and performs
    /// the durable issue for each. The durable count is re-checked first so
    /// the batch can never push issuance past the policy cap even when the
    /// cache counter drifted.
    #[instrument(skip(self), fields(code = %code, batch))]
    pub async fn process_pending(&self, code: &PolicyCode, batch: usize) -> Result<u32> {
        let policy = self.store.find_policy(code).await?;
        let issued_so_far = self.store.count_by_code(code).await?;
        let remaining = policy.max_count.saturating_sub(issued_so_far) as usize;
        let take = batch.min(remaining);
        if take == 0 {
            return Ok(0);
        }

        let mut issued = 0u32;
        let drained = self.queue.drain_batch(code, take).await;
        let mut batch = drained.iter().copied();
        for user_id in batch.by_ref() {
            match self.coupons.issue(user_id, code).await {
                Ok(_) => {
                    self.queue.complete(code, user_id).await;
                    issued += 1;
                }
                Err(LedgerError::AlreadyIssued { .. }) => {
                    // The durable ledger already has it; just sync the set.
                    self.queue.complete(code, user_id).await;
                }
                Err(LedgerError::SoldOut { .. }) => {
                    self.settle_unissued(code, user_id).await;
                    break;
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "durable issue failed, dropping request");
                    self.settle_unissued(code, user_id).await;
                }
            }
        }
        // Anything still drained after a sold-out break must leave the
        // processing set now, not at its TTL, or re-requests bounce off
        // AlreadyPending in the meantime.
        for user_id in batch {
            self.settle_unissued(code, user_id).await;
        }
        if issued > 0 {
            info!(issued, "issuance batch reconciled");
        }
        Ok(issued)
    }

    /// Drops a drained-but-unissued user from the queue structures and
    /// returns their counter unit. They may request again.
    async fn settle_unissued(&self, code: &PolicyCode, user_id: UserId) {
        self.queue.abandon(code, user_id).await;
        self.counter.release(code).await;
    }

    /// Reconciles every known policy; returns the total issued.
    pub async fn process_all_pending(&self, batch: usize) -> Result<u32> {
        let mut total = 0;
        for policy in self.store.list_policies().await? {
            total += self.process_pending(&policy.code, batch).await?;
        }
        Ok(total)
    }

    /// Queue depth for a code (monitoring).
    pub async fn pending(&self, code: &PolicyCode) -> usize {
        self.queue.pending(code).await
    }
}
