//! Session listing and revocation for the authenticated user.

use super::shared_types::{CountResponse, SuccessResponse};
use crate::app_state::AppState;
use crate::auth::{AuthenticatedUser, SessionStats};
use crate::domain::{AuthError, Session};
use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A session as shown to its owner. Tokens are never echoed back.
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    // ---
    pub session_id: String,
    pub device_label: String,
    pub user_agent: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub current: bool,
}

impl SessionInfo {
    fn from_session(session: Session, current: Option<&str>) -> Self {
        // ---
        Self {
            current: current == Some(session.session_id.as_str()),
            session_id: session.session_id,
            device_label: session.device_label,
            user_agent: session.user_agent,
            address: session.address,
            created_at: session.created_at,
            last_activity_at: session.last_activity_at,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    // ---
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RevokeAllRequest {
    // ---
    pub except_session_id: Option<String>,
}

/// GET /auth/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
) -> Result<Json<ListSessionsResponse>, AuthError> {
    // ---
    let current = caller.session_id.as_deref();
    let sessions = state
        .auth()
        .sessions()
        .list_sessions(caller.user_id)
        .await?
        .into_iter()
        .map(|s| SessionInfo::from_session(s, current))
        .collect();

    Ok(Json(ListSessionsResponse { sessions }))
}

/// GET /auth/sessions/stats
pub async fn session_stats(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
) -> Result<Json<SessionStats>, AuthError> {
    // ---
    Ok(Json(
        state.auth().sessions().session_stats(caller.user_id).await?,
    ))
}

/// DELETE /auth/sessions/{id}
pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(session_id): Path<String>,
) -> Result<Json<SuccessResponse>, AuthError> {
    // ---
    state
        .auth()
        .revoke_own_session(caller.user_id, &session_id)
        .await?;

    Ok(SuccessResponse::ok(true))
}

/// POST /auth/sessions/revoke-all
///
/// Without a body every session goes, including the one making the call.
pub async fn revoke_all_sessions(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
    body: Option<Json<RevokeAllRequest>>,
) -> Result<Json<CountResponse>, AuthError> {
    // ---
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let count = state
        .auth()
        .sessions()
        .revoke_all_sessions(caller.user_id, req.except_session_id.as_deref())
        .await?;

    Ok(Json(CountResponse {
        count: count as u64,
    }))
}
