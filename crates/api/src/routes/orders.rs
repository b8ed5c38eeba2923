//! Order placement and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::{OrderLine, PlaceOrder};
use chrono::{DateTime, Utc};
use common::{CouponId, ProductId, UserId};
use ledger::{LedgerStore, Order};
use lock::LockClient;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub user_id: i64,
    pub lines: Vec<OrderLineRequest>,
    pub coupon_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct OrderLineRequest {
    pub product_id: i64,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: i64,
    pub user_id: i64,
    pub total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: i64,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl From<Order> for OrderResponse {
    fn from(o: Order) -> Self {
        Self {
            id: o.id.as_i64(),
            user_id: o.user_id.as_i64(),
            total_cents: o.total_amount.cents(),
            created_at: o.created_at,
            items: o
                .items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id.as_i64(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price.cents(),
                })
                .collect(),
        }
    }
}

/// POST /orders — place an order.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: LedgerStore, C: LockClient + Clone + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state
        .workflow
        .place_order(PlaceOrder {
            user_id: UserId::new(req.user_id),
            lines: req
                .lines
                .iter()
                .map(|l| OrderLine::new(ProductId::new(l.product_id), l.quantity))
                .collect(),
            coupon_id: req.coupon_id.map(CouponId::new),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /users/:id/orders — a user's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list_for_user<S: LedgerStore, C: LockClient + Clone + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.workflow.user_orders(UserId::new(id)).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}
