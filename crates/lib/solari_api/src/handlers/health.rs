//! Liveness and store reachability.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::AppState;
use crate::models::HealthResponse;

/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store = state.gateway.sessions();
    let reachable = store.health_check().await.is_ok();
    let status = if reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        status: if reachable { "ok" } else { "degraded" }.to_string(),
        version: solari_core::version().to_string(),
        store: store.backend_name().to_string(),
        store_reachable: reachable,
        store_durable: store.is_durable(),
        signing_alg: state.gateway.signer().algorithm_name().to_string(),
    };
    (status, Json(body))
}
