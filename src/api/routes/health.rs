//! Health endpoint.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::server::AppState;

/// GET /health: liveness plus a count of jobs still generating.
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.orchestrator.cache_stats();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "jobs": {
            "pending": stats.pending,
            "total": stats.total_entries,
        },
    }))
}
