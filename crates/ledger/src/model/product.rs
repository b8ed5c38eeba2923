//! Catalog product with bounded stock.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// A product row. Stock is never observed negative: the check and the
/// decrement happen in one critical section at the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: u32,
    /// Row version, bumped on every stock mutation.
    pub version: i64,
}

impl Product {
    /// Removes `quantity` units from stock.
    pub fn decrease_stock(&mut self, quantity: u32) -> Result<(), LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        if self.stock < quantity {
            return Err(LedgerError::InsufficientStock {
                product_id: self.id,
                stock: self.stock,
                requested: quantity,
            });
        }
        self.stock -= quantity;
        self.version += 1;
        Ok(())
    }

    /// Returns `quantity` units to stock (compensation path).
    pub fn increase_stock(&mut self, quantity: u32) -> Result<(), LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        self.stock += quantity;
        self.version += 1;
        Ok(())
    }
}
