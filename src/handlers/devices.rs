//! Trusted-device management.

use super::shared_types::{CountResponse, SuccessResponse};
use crate::app_state::AppState;
use crate::auth::AuthenticatedUser;
use crate::domain::{AuthError, TrustedDevice};
use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ListDevicesResponse {
    // ---
    pub devices: Vec<TrustedDevice>,
}

/// GET /auth/devices
pub async fn list_devices(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
) -> Result<Json<ListDevicesResponse>, AuthError> {
    // ---
    let devices = state.auth().devices().list(caller.user_id).await?;
    Ok(Json(ListDevicesResponse { devices }))
}

/// DELETE /auth/devices/{id}
pub async fn revoke_device(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(device_id): Path<String>,
) -> Result<Json<SuccessResponse>, AuthError> {
    // ---
    if !state
        .auth()
        .devices()
        .revoke(caller.user_id, &device_id)
        .await?
    {
        return Err(AuthError::NotFound("device"));
    }
    Ok(SuccessResponse::ok(true))
}

/// DELETE /auth/devices
pub async fn revoke_all_devices(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
) -> Result<Json<CountResponse>, AuthError> {
    // ---
    let count = state.auth().devices().revoke_all(caller.user_id).await?;
    Ok(Json(CountResponse {
        count: count as u64,
    }))
}
