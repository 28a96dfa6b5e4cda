//! Request middleware: bearer authentication and HTTP metrics.

use crate::app_state::AppState;
use crate::domain::AuthError;
use axum::extract::{MatchedPath, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

/// Resolve `Authorization: Bearer <token>` and put the caller into request
/// extensions as [`AuthenticatedUser`](crate::auth::AuthenticatedUser).
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    // ---
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let caller = state.auth().authenticate(header).await?;
    request.extensions_mut().insert(caller);

    Ok(next.run(request).await)
}

/// Record latency and status for every request, keyed by the matched route.
pub async fn track_metrics(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    // ---
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    state
        .metrics()
        .record_http_request(start, &path, &method, response.status().as_u16());

    response
}
