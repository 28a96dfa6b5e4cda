use crate::app_state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};

/// GET /metrics
///
/// Prometheus text exposition of token issuance, revocations, auth failures,
/// passkey replays, cleanup removals and HTTP latency. With the no-op backend
/// the body is empty but the endpoint still answers 200.
pub async fn metrics_handler(State(app_state): State<AppState>) -> impl IntoResponse {
    // ---
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        app_state.metrics().render(),
    )
}
