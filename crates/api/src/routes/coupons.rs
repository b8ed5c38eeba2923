//! Coupon policy, issuance and lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{PolicyCode, UserId};
use ledger::{Coupon, CouponPolicy, CouponPolicyRepository, LedgerStore};
use lock::LockClient;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Deserialize)]
pub struct CreatePolicyRequest {
    pub code: String,
    pub discount_rate: u8,
    pub max_count: u32,
}

#[derive(Deserialize)]
pub struct IssueRequest {
    pub user_id: i64,
    pub code: String,
}

#[derive(Serialize)]
pub struct PolicyResponse {
    pub id: i64,
    pub code: String,
    pub discount_rate: u8,
    pub max_count: u32,
}

impl From<CouponPolicy> for PolicyResponse {
    fn from(p: CouponPolicy) -> Self {
        Self {
            id: p.id,
            code: p.code.to_string(),
            discount_rate: p.discount_rate,
            max_count: p.max_count,
        }
    }
}

#[derive(Serialize)]
pub struct CouponResponse {
    pub id: i64,
    pub user_id: i64,
    pub code: String,
    pub discount_rate: u8,
    pub used: bool,
    pub issued_at: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
}

impl From<Coupon> for CouponResponse {
    fn from(c: Coupon) -> Self {
        Self {
            id: c.id.as_i64(),
            user_id: c.user_id.as_i64(),
            code: c.code.to_string(),
            discount_rate: c.discount_rate,
            used: c.used,
            issued_at: c.issued_at,
            expiration_date: c.expiration_date,
        }
    }
}

#[derive(Serialize)]
pub struct RequestAcceptedResponse {
    pub status: &'static str,
}

fn policy_code(raw: &str) -> Result<PolicyCode, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("coupon code is required".to_string()));
    }
    Ok(PolicyCode::new(trimmed))
}

/// POST /coupons/policies — create a coupon policy (seeding).
#[tracing::instrument(skip(state, req))]
pub async fn create_policy<S: LedgerStore, C: LockClient + Clone + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Json(req): Json<CreatePolicyRequest>,
) -> Result<(StatusCode, Json<PolicyResponse>), ApiError> {
    let code = policy_code(&req.code)?;
    let policy = state
        .store
        .insert_policy(&code, req.discount_rate, req.max_count)
        .await?;
    Ok((StatusCode::CREATED, Json(policy.into())))
}

/// POST /coupons/issue — synchronous first-come-first-served issuance.
#[tracing::instrument(skip(state, req))]
pub async fn issue<S: LedgerStore, C: LockClient + Clone + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Json(req): Json<IssueRequest>,
) -> Result<(StatusCode, Json<CouponResponse>), ApiError> {
    let code = policy_code(&req.code)?;
    let coupon = state.coupons.issue(UserId::new(req.user_id), &code).await?;
    Ok((StatusCode::CREATED, Json(coupon.into())))
}

/// POST /coupons/requests — asynchronous issuance: enqueue now, the
/// reconciliation task performs the durable issue.
#[tracing::instrument(skip(state, req))]
pub async fn request<S: LedgerStore, C: LockClient + Clone + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Json(req): Json<IssueRequest>,
) -> Result<(StatusCode, Json<RequestAcceptedResponse>), ApiError> {
    let code = policy_code(&req.code)?;
    state.issuer.request(UserId::new(req.user_id), &code).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RequestAcceptedResponse { status: "queued" }),
    ))
}

/// GET /users/:id/coupons — a user's coupons.
#[tracing::instrument(skip(state))]
pub async fn user_coupons<S: LedgerStore, C: LockClient + Clone + 'static>(
    State(state): State<Arc<AppState<S, C>>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<CouponResponse>>, ApiError> {
    let coupons = state.coupons.user_coupons(UserId::new(id)).await?;
    Ok(Json(coupons.into_iter().map(Into::into).collect()))
}
