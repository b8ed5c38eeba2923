//! Stock operations over the product repository.

use common::ProductId;
use tracing::{info, instrument};

use crate::Result;
use crate::error::LedgerError;
use crate::model::Product;
use crate::repository::ProductRepository;

// Stock lives in a 32-bit column; quantities past this cannot be valid.
const MAX_QUANTITY: u32 = i32::MAX as u32;

/// Stock-facing service. Reservation and restoration are each a single
/// atomic repository call, so callers compose them freely under whatever
/// locking discipline they need.
#[derive(Clone)]
pub struct StockLedger<R> {
    products: R,
}

impl<R: ProductRepository> StockLedger<R> {
    pub fn new(products: R) -> Self {
        Self { products }
    }

    /// Loads a product for display or pre-checks.
    pub async fn get(&self, id: ProductId) -> Result<Product> {
        self.products.find_product(id).await
    }

    /// Lists the catalog.
    pub async fn list(&self) -> Result<Vec<Product>> {
        self.products.list_products().await
    }

    /// Reserves `quantity` units, failing with `InsufficientStock` rather
    /// than driving the row negative.
    #[instrument(skip(self), fields(product_id = %id, quantity))]
    pub async fn reserve(&self, id: ProductId, quantity: u32) -> Result<Product> {
        if quantity == 0 || quantity > MAX_QUANTITY {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        let product = self.products.decrease_stock(id, quantity).await?;
        metrics::counter!("stock_reserved_total").increment(u64::from(quantity));
        info!(remaining = product.stock, "stock reserved");
        Ok(product)
    }

    /// Returns previously reserved units (compensation path).
    #[instrument(skip(self), fields(product_id = %id, quantity))]
    pub async fn restore(&self, id: ProductId, quantity: u32) -> Result<Product> {
        if quantity == 0 || quantity > MAX_QUANTITY {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        let product = self.products.increase_stock(id, quantity).await?;
        metrics::counter!("stock_restored_total").increment(u64::from(quantity));
        info!(remaining = product.stock, "stock restored");
        Ok(product)
    }
}
