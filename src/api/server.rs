//! Axum HTTP server for the voucher pipeline.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::config::ServerConfig;
use crate::orchestrator::VoucherOrchestrator;

/// Headroom over the orchestrator's payload limit for JSON whitespace and the
/// `{"invoices": ...}` wrapper. The orchestrator enforces the exact limit.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

/// Shared state for all API handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub orchestrator: VoucherOrchestrator,
}

impl AppState {
    pub fn new(orchestrator: VoucherOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Request body cap applied at the HTTP layer.
    pub fn body_limit(&self) -> usize {
        self.orchestrator
            .max_payload_bytes()
            .saturating_mul(2)
            .saturating_add(BODY_LIMIT_SLACK)
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.body_limit();
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(super::routes::health::get_health))
        .route("/vouchers", post(super::routes::vouchers::submit_vouchers))
        .route("/vouchers/stats", get(super::routes::vouchers::get_stats))
        .route(
            "/vouchers/{id}/status",
            get(super::routes::vouchers::get_status),
        )
        .route(
            "/vouchers/{id}/result",
            get(super::routes::vouchers::get_result),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state)
}

/// Start the API server and run until Ctrl-C.
pub async fn start_server(
    config: &ServerConfig,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = build_router(state);
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Voucher API listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Voucher API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
