//! Point balance operations.

use std::time::Duration;

use common::{Money, UserId};
use tracing::{info, instrument, warn};

use crate::Result;
use crate::error::LedgerError;
use crate::model::User;
use crate::repository::UserRepository;

const CHARGE_RETRIES: u32 = 3;
const CHARGE_RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// Balance-facing service. Spending, refunding and plain charging are atomic
/// conditional writes; [`BalanceLedger::charge_optimistic`] is a versioned
/// read-modify-write with a short retry loop for low-contention paths.
#[derive(Clone)]
pub struct BalanceLedger<R> {
    users: R,
}

impl<R: UserRepository> BalanceLedger<R> {
    pub fn new(users: R) -> Self {
        Self { users }
    }

    /// Loads the current balance.
    pub async fn get(&self, id: UserId) -> Result<User> {
        self.users.find_user(id).await
    }

    /// Spends `amount`, failing with `InsufficientBalance` when the balance
    /// cannot cover it.
    #[instrument(skip(self), fields(user_id = %id, amount = %amount))]
    pub async fn use_points(&self, id: UserId, amount: Money) -> Result<User> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let user = self.users.debit_points(id, amount).await?;
        info!(balance = %user.point, "points spent");
        Ok(user)
    }

    /// Returns a previously spent amount (compensation path).
    #[instrument(skip(self), fields(user_id = %id, amount = %amount))]
    pub async fn refund(&self, id: UserId, amount: Money) -> Result<User> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let user = self.users.credit_points(id, amount).await?;
        info!(balance = %user.point, "points refunded");
        Ok(user)
    }

    /// Adds `amount` to the balance.
    #[instrument(skip(self), fields(user_id = %id, amount = %amount))]
    pub async fn charge(&self, id: UserId, amount: Money) -> Result<User> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let user = self.users.credit_points(id, amount).await?;
        info!(balance = %user.point, "points charged");
        Ok(user)
    }

    /// Charges `amount` using optimistic versioning, retrying a handful of
    /// times on version conflicts.
    #[instrument(skip(self), fields(user_id = %id, amount = %amount))]
    pub async fn charge_optimistic(&self, id: UserId, amount: Money) -> Result<User> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut attempt = 0;
        loop {
            let mut user = self.users.find_user(id).await?;
            user.charge(amount)?;
            match self.users.save_user_versioned(&user).await {
                Ok(saved) => {
                    info!(balance = %saved.point, "points charged");
                    return Ok(saved);
                }
                Err(LedgerError::ConcurrentUpdate { .. }) if attempt + 1 < CHARGE_RETRIES => {
                    attempt += 1;
                    warn!(attempt, "charge hit a version conflict, retrying");
                    tokio::time::sleep(CHARGE_RETRY_BACKOFF).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedger;

    async fn balance_with(cents: i64) -> (BalanceLedger<InMemoryLedger>, UserId) {
        let backend = InMemoryLedger::new();
        let user = backend.insert_user(Money::from_cents(cents)).await.unwrap();
        (BalanceLedger::new(backend), user.id)
    }

    #[tokio::test]
    async fn spend_then_refund() {
        let (balance, id) = balance_with(1000).await;
        assert_eq!(
            balance
                .use_points(id, Money::from_cents(400))
                .await
                .unwrap()
                .point,
            Money::from_cents(600)
        );
        assert_eq!(
            balance.refund(id, Money::from_cents(400)).await.unwrap().point,
            Money::from_cents(1000)
        );
    }

    #[tokio::test]
    async fn spend_beyond_balance_fails() {
        let (balance, id) = balance_with(100).await;
        let err = balance
            .use_points(id, Money::from_cents(200))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn charge_adds_points() {
        let (balance, id) = balance_with(100).await;
        let user = balance.charge(id, Money::from_cents(900)).await.unwrap();
        assert_eq!(user.point, Money::from_cents(1000));
    }

    #[tokio::test]
    async fn non_positive_amounts_rejected() {
        let (balance, id) = balance_with(100).await;
        assert!(balance.use_points(id, Money::zero()).await.is_err());
        assert!(balance.refund(id, Money::from_cents(-5)).await.is_err());
        assert!(balance.charge(id, Money::zero()).await.is_err());
        assert!(balance.charge_optimistic(id, Money::zero()).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_optimistic_charges_never_lose_updates() {
        let (balance, id) = balance_with(0).await;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let balance = balance.clone();
            handles.push(tokio::spawn(async move {
                balance.charge_optimistic(id, Money::from_cents(100)).await
            }));
        }
        let mut landed = 0i64;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => landed += 1,
                Err(LedgerError::ConcurrentUpdate { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        // Every successful charge is reflected exactly once.
        assert_eq!(
            balance.get(id).await.unwrap().point,
            Money::from_cents(landed * 100)
        );
        assert!(landed >= 1);
    }
}
