//! Password registration, login, refresh and logout.

use super::shared_types::{device_from_headers, ClientAddress, SuccessResponse};
use crate::app_state::AppState;
use crate::auth::{AuthTokens, AuthenticatedUser, LoginAttempt};
use crate::domain::AuthError;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use serde::Deserialize;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    // ---
    pub email: String,
    pub password: String,
    pub device_label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    // ---
    pub email: String,
    pub password: String,
    pub code: Option<String>,
    #[serde(default)]
    pub remember_device: bool,
    pub device_label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    // ---
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    // ---
    pub refresh_token: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    address: ClientAddress,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthTokens>), AuthError> {
    // ---
    let device = device_from_headers(&headers, address, req.device_label);
    let tokens = state
        .auth()
        .register(&req.email, &req.password, &device)
        .await?;

    Ok((StatusCode::CREATED, Json(tokens)))
}

/// POST /auth/login
///
/// Answers `second_factor_required` when the account has TOTP enabled, the
/// client is not a trusted device and no `code` was sent.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    address: ClientAddress,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthTokens>, AuthError> {
    // ---
    let attempt = LoginAttempt {
        email: req.email,
        password: req.password,
        code: req.code,
        remember_device: req.remember_device,
        device: device_from_headers(&headers, address, req.device_label),
    };

    Ok(Json(state.auth().login(attempt).await?))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<AuthTokens>, AuthError> {
    // ---
    Ok(Json(state.auth().refresh(&req.refresh_token).await?))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
    body: Option<Json<LogoutRequest>>,
) -> Result<Json<SuccessResponse>, AuthError> {
    // ---
    let req = body.map(|Json(req)| req).unwrap_or_default();
    state
        .auth()
        .logout(&caller.access_token, req.refresh_token.as_deref())
        .await?;

    Ok(SuccessResponse::ok(true))
}
