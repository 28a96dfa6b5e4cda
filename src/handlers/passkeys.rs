//! Passkey challenge, registration, login and credential management.
//!
//! Flows:
//! 1. `register_challenge` then `register` - bind a credential to the caller
//! 2. `login_challenge` then `login` - sign in with a registered credential

use super::shared_types::{device_from_headers, ClientAddress, SuccessResponse};
use crate::app_state::AppState;
use crate::auth::{AuthTokens, AuthenticatedUser};
use crate::domain::{AuthError, PasskeyCredential, UserId};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    // ---
    pub challenge: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    // ---
    pub challenge: String,
    pub credential_id: String,
    /// Base64url (unpadded) public key as produced by the authenticator.
    pub public_key: String,
    pub label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    // ---
    pub success: bool,
    pub credential_id: String,
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    // ---
    pub challenge: String,
    pub credential_id: String,
    pub counter: i64,
    pub device_label: Option<String>,
}

/// Information about a registered passkey. Key material is never exposed.
#[derive(Debug, Serialize)]
pub struct CredentialInfo {
    // ---
    pub credential_id: String,
    pub label: Option<String>,
    pub counter: i64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<PasskeyCredential> for CredentialInfo {
    fn from(c: PasskeyCredential) -> Self {
        // ---
        Self {
            credential_id: c.credential_id,
            label: c.label,
            counter: c.counter,
            created_at: c.created_at,
            last_used_at: c.last_used_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListCredentialsResponse {
    // ---
    pub credentials: Vec<CredentialInfo>,
}

// ============================================================================
// Registration
// ============================================================================

/// POST /auth/passkeys/register/challenge
pub async fn register_challenge(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
) -> Result<Json<ChallengeResponse>, AuthError> {
    // ---
    let challenge = state
        .auth()
        .passkey_register_challenge(caller.user_id)
        .await?;
    Ok(Json(ChallengeResponse { challenge }))
}

/// POST /auth/passkeys/register
///
/// The challenge carries the user it was issued to, so no bearer is needed.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    // ---
    let public_key = URL_SAFE_NO_PAD.decode(&req.public_key).map_err(|err| {
        tracing::warn!("Passkey public key is not base64url: {}", err);
        AuthError::InvalidCredentials
    })?;

    let user_id = state
        .auth()
        .passkey_register(&req.challenge, &req.credential_id, public_key, req.label)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            credential_id: req.credential_id,
            user_id,
        }),
    ))
}

// ============================================================================
// Login
// ============================================================================

/// POST /auth/passkeys/login/challenge
pub async fn login_challenge(
    State(state): State<AppState>,
) -> Result<Json<ChallengeResponse>, AuthError> {
    // ---
    let challenge = state.auth().passkey_login_challenge().await?;
    Ok(Json(ChallengeResponse { challenge }))
}

/// POST /auth/passkeys/login
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    address: ClientAddress,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthTokens>, AuthError> {
    // ---
    let device = device_from_headers(&headers, address, req.device_label);
    let tokens = state
        .auth()
        .passkey_login(&req.challenge, &req.credential_id, req.counter, &device)
        .await?;

    Ok(Json(tokens))
}

// ============================================================================
// Credential management
// ============================================================================

/// GET /auth/passkeys
pub async fn list_credentials(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
) -> Result<Json<ListCredentialsResponse>, AuthError> {
    // ---
    let credentials = state
        .auth()
        .passkeys()
        .list_credentials(caller.user_id)
        .await?
        .into_iter()
        .map(CredentialInfo::from)
        .collect();

    Ok(Json(ListCredentialsResponse { credentials }))
}

/// DELETE /auth/passkeys/{id}
///
/// Another user's credential id answers 404, same as an unknown one.
pub async fn delete_credential(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(credential_id): Path<String>,
) -> Result<Json<SuccessResponse>, AuthError> {
    // ---
    if !state
        .auth()
        .passkeys()
        .delete_credential(caller.user_id, &credential_id)
        .await?
    {
        return Err(AuthError::NotFound("credential"));
    }
    Ok(SuccessResponse::ok(true))
}
