//! Coupon policies and issued coupons.

use chrono::{DateTime, Duration, Utc};
use common::{CouponId, Money, PolicyCode, UserId};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Days an issued coupon stays valid.
pub const COUPON_VALIDITY_DAYS: i64 = 30;

/// Template defining a coupon code's discount rate and maximum issuable
/// quantity. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponPolicy {
    pub id: i64,
    pub code: PolicyCode,
    /// Percentage discount, 0–100.
    pub discount_rate: u8,
    /// Hard cap on issued coupons, at least 1.
    pub max_count: u32,
}

impl CouponPolicy {
    /// Validates the rate/cap ranges for a new policy.
    pub fn validate(discount_rate: u8, max_count: u32) -> Result<(), LedgerError> {
        if discount_rate > 100 {
            return Err(LedgerError::InvalidArgument(format!(
                "discount rate must be 0-100, got {discount_rate}"
            )));
        }
        if max_count == 0 {
            return Err(LedgerError::InvalidArgument(
                "max count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A coupon ready to be persisted. The discount rate is copied from the
/// policy at issuance so later policy edits never change issued coupons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCoupon {
    pub user_id: UserId,
    pub code: PolicyCode,
    pub discount_rate: u8,
    pub issued_at: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
}

impl NewCoupon {
    /// Builds the issuance record for `user_id` under `policy` at `now`.
    pub fn from_policy(user_id: UserId, policy: &CouponPolicy, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            code: policy.code.clone(),
            discount_rate: policy.discount_rate,
            issued_at: now,
            expiration_date: now + Duration::days(COUPON_VALIDITY_DAYS),
        }
    }
}

/// An issued coupon. Append-only: created at issuance, mutated once by use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    pub user_id: UserId,
    pub code: PolicyCode,
    pub discount_rate: u8,
    pub used: bool,
    pub issued_at: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    /// Optimistic version, compared at write time.
    pub version: i64,
}

impl Coupon {
    /// True when the coupon is past its expiration date.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date < now
    }

    /// Checks ownership, the used flag and expiry for `user_id`.
    pub fn validate(&self, user_id: UserId, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.user_id != user_id {
            return Err(LedgerError::NotOwner(self.id));
        }
        if self.used {
            return Err(LedgerError::AlreadyUsed(self.id));
        }
        if self.is_expired(now) {
            return Err(LedgerError::Expired(self.id));
        }
        Ok(())
    }

    /// Applies the discount rate to `amount`.
    pub fn discounted_amount(&self, amount: Money) -> Result<Money, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        Ok(amount.discounted(self.discount_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coupon(used: bool) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: CouponId::new(1),
            user_id: UserId::new(10),
            code: PolicyCode::new("WELCOME10"),
            discount_rate: 10,
            used,
            issued_at: now,
            expiration_date: now + Duration::days(COUPON_VALIDITY_DAYS),
            version: 0,
        }
    }

    #[test]
    fn validate_passes_for_owner() {
        coupon(false).validate(UserId::new(10), Utc::now()).unwrap();
    }

    #[test]
    fn validate_rejects_other_user() {
        let err = coupon(false)
            .validate(UserId::new(99), Utc::now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotOwner(_)));
    }

    #[test]
    fn validate_rejects_used() {
        let err = coupon(true).validate(UserId::new(10), Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyUsed(_)));
    }

    #[test]
    fn validate_rejects_expired() {
        let mut c = coupon(false);
        c.expiration_date = Utc::now() - Duration::days(1);
        let err = c.validate(UserId::new(10), Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::Expired(_)));
    }

    #[test]
    fn discount_math() {
        let c = coupon(false);
        assert_eq!(
            c.discounted_amount(Money::from_cents(1000)).unwrap(),
            Money::from_cents(900)
        );
        assert!(matches!(
            c.discounted_amount(Money::zero()),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn new_coupon_copies_policy_rate_and_sets_expiry() {
        let policy = CouponPolicy {
            id: 1,
            code: PolicyCode::new("WELCOME10"),
            discount_rate: 10,
            max_count: 2,
        };
        let now = Utc::now();
        let new = NewCoupon::from_policy(UserId::new(5), &policy, now);
        assert_eq!(new.discount_rate, 10);
        assert_eq!(new.expiration_date, now + Duration::days(30));
    }

    #[test]
    fn policy_validation_bounds() {
        CouponPolicy::validate(0, 1).unwrap();
        CouponPolicy::validate(100, 10).unwrap();
        assert!(CouponPolicy::validate(101, 10).is_err());
        assert!(CouponPolicy::validate(10, 0).is_err());
    }
}
