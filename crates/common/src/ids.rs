//! Typed identifiers.
//!
//! All row identities are i64 newtypes with a total order, so id sets can be
//! sorted deterministically wherever acquisition order matters.

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database identity value.
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw identity value.
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

id_newtype!(
    /// Identifier of a balance-holding user.
    UserId
);
id_newtype!(
    /// Identifier of a catalog product.
    ProductId
);
id_newtype!(
    /// Identifier of an issued coupon.
    CouponId
);
id_newtype!(
    /// Identifier of a placed order.
    OrderId
);

/// Human-chosen coupon policy code, e.g. `"WELCOME10"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyCode(String);

impl PolicyCode {
    /// Creates a policy code from a string.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PolicyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PolicyCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PolicyCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for PolicyCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_ids_order_numerically() {
        let mut ids = vec![ProductId::new(10), ProductId::new(2), ProductId::new(7)];
        ids.sort();
        assert_eq!(ids, vec![ProductId::new(2), ProductId::new(7), ProductId::new(10)]);
    }

    #[test]
    fn id_serialization_is_transparent() {
        let id = UserId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let back: UserId = serde_json::from_str("42").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn policy_code_string_conversion() {
        let code = PolicyCode::new("WELCOME10");
        assert_eq!(code.as_str(), "WELCOME10");
        let code2: PolicyCode = "FLASH50".into();
        assert_eq!(code2.to_string(), "FLASH50");
    }
}
