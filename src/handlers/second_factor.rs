//! TOTP setup, enable, disable and verify.

use super::shared_types::SuccessResponse;
use crate::app_state::AppState;
use crate::auth::{AuthenticatedUser, TotpSetup};
use crate::domain::AuthError;
use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    // ---
    pub code: String,
}

/// POST /auth/2fa/setup
///
/// Stores a new secret in the pending state and returns it with the
/// `otpauth://` payload.
pub async fn setup(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
) -> Result<Json<TotpSetup>, AuthError> {
    // ---
    Ok(Json(state.auth().second_factor_setup(caller.user_id).await?))
}

/// POST /auth/2fa/enable
pub async fn enable(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<SuccessResponse>, AuthError> {
    // ---
    let enabled = state
        .auth()
        .second_factor()
        .enable(caller.user_id, &req.code)
        .await?;
    Ok(SuccessResponse::ok(enabled))
}

/// POST /auth/2fa/disable
pub async fn disable(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<SuccessResponse>, AuthError> {
    // ---
    let disabled = state
        .auth()
        .second_factor()
        .disable(caller.user_id, &req.code)
        .await?;
    Ok(SuccessResponse::ok(disabled))
}

/// POST /auth/2fa/verify
pub async fn verify(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<SuccessResponse>, AuthError> {
    // ---
    let verified = state
        .auth()
        .second_factor()
        .verify(caller.user_id, &req.code)
        .await?;
    Ok(SuccessResponse::ok(verified))
}
