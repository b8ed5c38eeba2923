//! Balance-holding user.

use common::{Money, UserId};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// A user's point balance. Never created by the core in production flows;
/// assumed to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub point: Money,
    /// Optimistic version for the low-contention charge path.
    pub version: i64,
}

impl User {
    /// Adds `amount` to the balance.
    pub fn charge(&mut self, amount: Money) -> Result<(), LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.point += amount;
        Ok(())
    }

    /// Spends `amount` from the balance.
    pub fn use_points(&mut self, amount: Money) -> Result<(), LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if self.point < amount {
            return Err(LedgerError::InsufficientBalance {
                balance: self.point,
                required: amount,
            });
        }
        self.point -= amount;
        Ok(())
    }

    /// Returns a previously debited amount (compensation path).
    pub fn refund(&mut self, amount: Money) -> Result<(), LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        self.point += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(cents: i64) -> User {
        User {
            id: UserId::new(1),
            point: Money::from_cents(cents),
            version: 0,
        }
    }

    #[test]
    fn charge_and_use() {
        let mut u = user(0);
        u.charge(Money::from_cents(1000)).unwrap();
        u.use_points(Money::from_cents(300)).unwrap();
        assert_eq!(u.point, Money::from_cents(700));
    }

    #[test]
    fn use_beyond_balance_fails() {
        let mut u = user(500);
        let err = u.use_points(Money::from_cents(501)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(u.point, Money::from_cents(500));
    }

    #[test]
    fn non_positive_amounts_rejected() {
        let mut u = user(500);
        assert!(u.charge(Money::zero()).is_err());
        assert!(u.use_points(Money::from_cents(-10)).is_err());
        assert!(u.refund(Money::zero()).is_err());
    }

    #[test]
    fn refund_restores() {
        let mut u = user(500);
        u.use_points(Money::from_cents(500)).unwrap();
        u.refund(Money::from_cents(500)).unwrap();
        assert_eq!(u.point, Money::from_cents(500));
    }
}
