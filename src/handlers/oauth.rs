//! OAuth round trip: state issuance and profile callback.
//!
//! The code-for-token exchange with the provider happens upstream; the
//! callback receives the provider's profile document as-is.

use super::shared_types::{device_from_headers, ClientAddress};
use crate::app_state::AppState;
use crate::auth::{OAuthInit, OAuthLogin, OAuthProvider, ProviderTokens};
use crate::domain::AuthError;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    // ---
    pub state: String,
    pub profile: serde_json::Value,
    #[serde(default)]
    pub tokens: ProviderTokens,
    pub device_label: Option<String>,
}

/// POST /auth/oauth/{provider}/init
pub async fn init(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Json<OAuthInit>, AuthError> {
    // ---
    let provider: OAuthProvider = provider.parse()?;
    Ok(Json(state.auth().oauth_init(provider).await?))
}

/// POST /auth/oauth/{provider}/callback
#[tracing::instrument(skip(state, headers, address, req))]
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    address: ClientAddress,
    Json(req): Json<CallbackRequest>,
) -> Result<Json<OAuthLogin>, AuthError> {
    // ---
    let provider: OAuthProvider = provider.parse()?;
    let device = device_from_headers(&headers, address, req.device_label);

    let login = state
        .auth()
        .oauth_callback(provider, &req.state, req.profile, req.tokens, &device)
        .await?;

    Ok(Json(login))
}
