//! Voucher job routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::api::server::AppState;
use crate::cache::{HashKey, JobStatus};
use crate::error::VoucherError;
use crate::voucher::InvoiceBatch;

fn not_found_for_malformed(id: &str) -> (StatusCode, Json<Value>) {
    debug!(id = %id.chars().take(40).collect::<String>(), "Malformed result id");
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "unknown resultId" })),
    )
}

/// POST /vouchers: submit an invoice batch, returns `{resultId}`.
pub async fn submit_vouchers(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let invoices = match serde_json::from_value::<InvoiceBatch>(body) {
        Ok(b) => b.into_invoices(),
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid invoice batch: {e}") })),
            )
        }
    };

    match state.orchestrator.submit(&invoices) {
        Ok(key) => (StatusCode::ACCEPTED, Json(json!({ "resultId": key }))),
        Err(e @ VoucherError::PayloadTooLarge { .. }) => (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({ "error": e.to_string() })),
        ),
        Err(e @ VoucherError::InvalidPayload(_)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

/// GET /vouchers/{id}/status: `{status}` for a job.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let Ok(key) = HashKey::parse(&id) else {
        return not_found_for_malformed(&id);
    };

    let status = state.orchestrator.status(&key);
    let code = if status == JobStatus::NotFound {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    };
    (code, Json(json!({ "status": status })))
}

/// GET /vouchers/{id}/result: the generated voucher once the job succeeded.
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let Ok(key) = HashKey::parse(&id) else {
        return not_found_for_malformed(&id);
    };

    // Status first: `result()` alone cannot tell pending from failed.
    let status = state.orchestrator.status(&key);
    let code = match status {
        JobStatus::Success => {
            if let Some(voucher) = state.orchestrator.result(&key) {
                return (
                    StatusCode::OK,
                    Json(json!({ "resultId": key, "status": status, "result": voucher })),
                );
            }
            // Evicted between the two reads.
            StatusCode::NOT_FOUND
        }
        JobStatus::NotFound => StatusCode::NOT_FOUND,
        JobStatus::Pending => StatusCode::CONFLICT,
        JobStatus::Error => StatusCode::UNPROCESSABLE_ENTITY,
    };
    let status = if code == StatusCode::NOT_FOUND {
        JobStatus::NotFound
    } else {
        status
    };
    (
        code,
        Json(json!({ "resultId": key, "status": status, "result": null })),
    )
}

/// GET /vouchers/stats: job cache counters.
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "cache": state.orchestrator.cache_stats() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::generation::GenerationBackend;
    use crate::orchestrator::{voucher_connector, VoucherOrchestrator};
    use crate::voucher::entry::VOUCHER_SHAPE;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedBackend(String);

    #[async_trait]
    impl GenerationBackend for FixedBackend {
        async fn complete(&self, _model: &str, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    fn state_with(answer: &str, max_payload: usize) -> (State<Arc<AppState>>, VoucherOrchestrator) {
        let connector = voucher_connector(Arc::new(FixedBackend(answer.to_string())), "m")
            .with_retry_limit(1);
        let orch = VoucherOrchestrator::new(connector, 8, max_payload);
        (State(Arc::new(AppState::new(orch.clone()))), orch)
    }

    fn good_state() -> (State<Arc<AppState>>, VoucherOrchestrator) {
        state_with(&format!("```json\n{VOUCHER_SHAPE}\n```"), 64 * 1024)
    }

    fn invoice_json(number: &str) -> Value {
        json!({
            "invoice_number": number,
            "vendor": "ACME",
            "issue_date": "2024-03-14",
            "net_amount": 100.0,
            "tax_amount": 19.0
        })
    }

    async fn settle(orch: &VoucherOrchestrator, id: &str) -> JobStatus {
        let key = HashKey::parse(id).unwrap();
        orch.wait_for_terminal(&key, Duration::from_millis(5), Duration::from_secs(5))
            .await
    }

    // ── submit ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_submit_wrapped_body() {
        let (state, _) = good_state();
        let (status, Json(body)) =
            submit_vouchers(state, Json(json!({ "invoices": [invoice_json("A")] }))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let id = body["resultId"].as_str().expect("resultId string");
        assert_eq!(id.len(), HashKey::LEN);
    }

    #[tokio::test]
    async fn test_submit_bare_array_same_id_as_wrapped() {
        let (state, _) = good_state();
        let (_, Json(a)) = submit_vouchers(
            state.clone(),
            Json(json!({ "invoices": [invoice_json("A")] })),
        )
        .await;
        let (_, Json(b)) = submit_vouchers(state, Json(json!([invoice_json("A")]))).await;
        assert_eq!(a["resultId"], b["resultId"]);
    }

    #[tokio::test]
    async fn test_submit_empty_batch_rejected() {
        let (state, _) = good_state();
        let (status, Json(body)) = submit_vouchers(state, Json(json!({ "invoices": [] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_submit_malformed_invoice_rejected() {
        let (state, _) = good_state();
        let (status, _) =
            submit_vouchers(state, Json(json!({ "invoices": [{"vendor": "x"}] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_submit_too_large() {
        let (state, _) = state_with("irrelevant", 64);
        let (status, _) = submit_vouchers(state, Json(json!([invoice_json("A")]))).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    // ── status ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_status_malformed_id_is_404() {
        let (state, _) = good_state();
        let (status, Json(body)) = get_status(state, Path("../../etc".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_status_unknown_id_is_404_not_found() {
        let (state, _) = good_state();
        let id = HashKey::from_bytes(b"nobody").to_string();
        let (status, Json(body)) = get_status(state, Path(id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "notFound");
    }

    #[tokio::test]
    async fn test_status_and_result_after_success() {
        let (state, orch) = good_state();
        let (_, Json(body)) =
            submit_vouchers(state.clone(), Json(json!([invoice_json("S")]))).await;
        let id = body["resultId"].as_str().unwrap().to_string();
        assert_eq!(settle(&orch, &id).await, JobStatus::Success);

        let (status, Json(body)) = get_status(state.clone(), Path(id.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");

        let (status, Json(body)) = get_result(state, Path(id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["entries"][0]["invoice_number"], "INV-001");
    }

    #[tokio::test]
    async fn test_result_after_error_is_422() {
        let (state, orch) = state_with("no fences at all", 64 * 1024);
        let (_, Json(body)) =
            submit_vouchers(state.clone(), Json(json!([invoice_json("E")]))).await;
        let id = body["resultId"].as_str().unwrap().to_string();
        assert_eq!(settle(&orch, &id).await, JobStatus::Error);

        let (status, Json(body)) = get_result(state, Path(id)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["status"], "error");
        assert!(body["result"].is_null());
    }

    #[tokio::test]
    async fn test_result_unknown_and_malformed_are_404() {
        let (state, _) = good_state();
        let (status, _) = get_result(state.clone(), Path("zz".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let id = HashKey::from_bytes(b"ghost").to_string();
        let (status, Json(body)) = get_result(state, Path(id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "notFound");
    }

    #[tokio::test]
    async fn test_stats_reports_entries() {
        let (state, orch) = good_state();
        let (_, Json(body)) =
            submit_vouchers(state.clone(), Json(json!([invoice_json("T")]))).await;
        settle(&orch, body["resultId"].as_str().unwrap()).await;

        let Json(stats) = get_stats(state).await;
        assert_eq!(stats["cache"]["total_entries"], 1);
        assert_eq!(stats["cache"]["capacity"], 8);
    }
}
