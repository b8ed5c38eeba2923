//! User balance endpoints and user seeding.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, UserId};
use ledger::{LedgerStore, User, UserRepository};
use lock::LockClient;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub point_cents: i64,
}

#[derive(Deserialize)]
pub struct AmountRequest {
    pub amount_cents: i64,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub user_id: i64,
    pub point_cents: i64,
}

impl From<User> for BalanceResponse {
    fn from(u: User) -> Self {
        Self {
            user_id: u.id.as_i64(),
            point_cents: u.point.cents(),
        }
    }
}

/// POST /users — create a user with an initial balance (seeding).
#[tracing::instrument(skip(state, req))]
pub async fn create<S: LedgerStore, C: LockClient + Clone + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<BalanceResponse>), ApiError> {
    if req.point_cents < 0 {
        return Err(ApiError::BadRequest(
            "initial balance must not be negative".to_string(),
        ));
    }
    let user = state
        .store
        .insert_user(Money::from_cents(req.point_cents))
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /users/:id/balance — current point balance.
#[tracing::instrument(skip(state))]
pub async fn balance<S: LedgerStore, C: LockClient + Clone + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<i64>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user = state.balance.get(UserId::new(id)).await?;
    Ok(Json(user.into()))
}

/// POST /users/:id/balance/charge — add points.
#[tracing::instrument(skip(state, req))]
pub async fn charge<S: LedgerStore, C: LockClient + Clone + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<i64>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user = state
        .balance
        .charge_optimistic(UserId::new(id), Money::from_cents(req.amount_cents))
        .await?;
    Ok(Json(user.into()))
}

/// POST /users/:id/balance/use — spend points.
#[tracing::instrument(skip(state, req))]
pub async fn use_points<S: LedgerStore, C: LockClient + Clone + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<i64>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user = state
        .balance
        .use_points(UserId::new(id), Money::from_cents(req.amount_cents))
        .await?;
    Ok(Json(user.into()))
}
