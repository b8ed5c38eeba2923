//! HTTP API server with observability for the commerce core.
//!
//! Provides REST endpoints for catalog, balances, coupon issuance and order
//! placement, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use cache::InMemoryCache;
use checkout::OrderWorkflow;
use ledger::{AsyncCouponIssuer, BalanceLedger, CouponLedger, LedgerStore, StockLedger};
use lock::{LockClient, LockManager};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: LedgerStore, C: LockClient + Clone + 'static>(
    state: Arc<AppState<S, C>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products", get(routes::products::list::<S, C>))
        .route("/products", post(routes::products::create::<S, C>))
        .route("/products/{id}", get(routes::products::get::<S, C>))
        .route("/users", post(routes::users::create::<S, C>))
        .route("/users/{id}/balance", get(routes::users::balance::<S, C>))
        .route(
            "/users/{id}/balance/charge",
            post(routes::users::charge::<S, C>),
        )
        .route(
            "/users/{id}/balance/use",
            post(routes::users::use_points::<S, C>),
        )
        .route(
            "/coupons/policies",
            post(routes::coupons::create_policy::<S, C>),
        )
        .route("/coupons/issue", post(routes::coupons::issue::<S, C>))
        .route("/coupons/requests", post(routes::coupons::request::<S, C>))
        .route(
            "/users/{id}/coupons",
            get(routes::coupons::user_coupons::<S, C>),
        )
        .route("/orders", post(routes::orders::create::<S, C>))
        .route(
            "/users/{id}/orders",
            get(routes::orders::list_for_user::<S, C>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the ledgers, the checkout workflow and the async issuance path over
/// one storage backend and one lock backend.
pub fn create_default_state<S: LedgerStore, C: LockClient + Clone + 'static>(
    store: S,
    client: C,
) -> Arc<AppState<S, C>> {
    let coupons = CouponLedger::new(LockManager::new(client.clone()), store.clone());
    Arc::new(AppState {
        stock: StockLedger::new(store.clone()),
        balance: BalanceLedger::new(store.clone()),
        coupons: coupons.clone(),
        issuer: AsyncCouponIssuer::new(InMemoryCache::new(), coupons, store.clone()),
        workflow: OrderWorkflow::new(client, store.clone()),
        store,
    })
}

/// Spawns the periodic issuance-queue reconciliation task.
pub fn spawn_reconciliation<S: LedgerStore, C: LockClient + Clone + 'static>(
    state: Arc<AppState<S, C>>,
    interval: Duration,
    batch: usize,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match state.issuer.process_all_pending(batch).await {
                Ok(0) => {}
                Ok(issued) => tracing::info!(issued, "issuance queue reconciled"),
                Err(e) => tracing::warn!(error = %e, "issuance reconciliation failed"),
            }
        }
    })
}
