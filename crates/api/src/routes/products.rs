//! Catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, ProductId};
use ledger::{LedgerStore, Product, ProductRepository};
use lock::LockClient;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub price_cents: i64,
    pub stock: u32,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: i64,
    pub name: String,
    pub price_cents: i64,
    pub stock: u32,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id.as_i64(),
            name: p.name,
            price_cents: p.price.cents(),
            stock: p.stock,
        }
    }
}

/// GET /products — list the catalog.
#[tracing::instrument(skip(state))]
pub async fn list<S: LedgerStore, C: LockClient + Clone + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.stock.list().await?;
    Ok(Json(products.into_iter().map(Into::into).collect()))
}

/// GET /products/:id — load one product.
#[tracing::instrument(skip(state))]
pub async fn get<S: LedgerStore, C: LockClient + Clone + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<i64>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state.stock.get(ProductId::new(id)).await?;
    Ok(Json(product.into()))
}

/// POST /products — create a catalog entry (seeding).
#[tracing::instrument(skip(state, req))]
pub async fn create<S: LedgerStore, C: LockClient + Clone + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("product name is required".to_string()));
    }
    if req.price_cents < 0 {
        return Err(ApiError::BadRequest(
            "price must not be negative".to_string(),
        ));
    }
    let product = state
        .store
        .insert_product(&req.name, Money::from_cents(req.price_cents), req.stock)
        .await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}
