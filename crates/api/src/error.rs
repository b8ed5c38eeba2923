//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use ledger::LedgerError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Ledger business error.
    Ledger(LedgerError),
    /// Checkout workflow error.
    Checkout(CheckoutError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Ledger(err) => ledger_error_to_response(err),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn ledger_error_to_response(err: LedgerError) -> (StatusCode, String) {
    match &err {
        LedgerError::ProductNotFound(_)
        | LedgerError::CouponNotFound(_)
        | LedgerError::PolicyNotFound(_)
        | LedgerError::UserNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        LedgerError::InvalidQuantity(_)
        | LedgerError::InvalidAmount(_)
        | LedgerError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        LedgerError::InsufficientStock { .. }
        | LedgerError::InsufficientBalance { .. }
        | LedgerError::SoldOut { .. }
        | LedgerError::AlreadyIssued { .. }
        | LedgerError::AlreadyPending { .. }
        | LedgerError::AlreadyUsed(_)
        | LedgerError::Expired(_)
        | LedgerError::NotOwner(_)
        | LedgerError::ConcurrentUpdate { .. } => (StatusCode::CONFLICT, err.to_string()),
        LedgerError::Lock(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "busy, try again shortly".to_string(),
        ),
        LedgerError::Database(_) => {
            tracing::error!(error = %err, "database error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match err {
        CheckoutError::EmptyOrder => (StatusCode::BAD_REQUEST, err.to_string()),
        CheckoutError::Ledger(inner) => ledger_error_to_response(inner),
        CheckoutError::Lock(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "busy, try again shortly".to_string(),
        ),
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}
