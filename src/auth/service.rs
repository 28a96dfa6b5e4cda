//! Credential-establishment flows.
//!
//! Password, passkey and OAuth logins all end in [`AuthService::issue_session`],
//! which mints the token pair and records the session. Refresh, logout and
//! bearer authentication live here as well.

use super::devices::{DeviceTrust, TRUST_WINDOW};
use super::oauth::{OAuthCoordinator, OAuthInit, OAuthProvider, ProviderTokens};
use super::passkeys::{AssertionOutcome, PasskeyService};
use super::revocation::RevocationLedger;
use super::secrets::SigningSecrets;
use super::sessions::SessionTracker;
use super::store::RecordStore;
use super::tokens::TokenEngine;
use super::totp::{SecondFactor, TotpSetup};
use crate::config::{AppConfig, TokenConfig};
use crate::domain::{
    AuthError, AuthResult, ChallengePurpose, DeviceInfo, EphemeralStorePtr, MetricsPtr, NewUser,
    RepositoryPtr, RevocationReason, UserId,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Tunables for the assembled service, normally derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub tokens: TokenConfig,
    pub session_ttl: Duration,
    pub trust_window: Duration,
    pub challenge_ttl: Duration,
    pub state_ttl: Duration,
    pub totp_issuer: String,
    pub bcrypt_cost: u32,
}

impl ServiceSettings {
    // ---
    pub fn from_config(config: &AppConfig) -> Self {
        // ---
        Self {
            tokens: config.tokens.clone(),
            session_ttl: config.tokens.refresh_ttl,
            trust_window: TRUST_WINDOW,
            challenge_ttl: config.redis.passkey_challenge_ttl,
            state_ttl: config.redis.oauth_state_ttl,
            totp_issuer: config.second_factor.issuer.clone(),
            bcrypt_cost: config.password.bcrypt_cost,
        }
    }
}

/// Token pair handed to a client after any successful login.
#[derive(Debug, Clone, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub user_id: UserId,
    pub session_id: String,
}

/// Caller identity established from a bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub access_token: String,
    pub session_id: Option<String>,
}

/// Password login input.
#[derive(Debug, Clone, Default)]
pub struct LoginAttempt {
    pub email: String,
    pub password: String,
    pub code: Option<String>,
    pub remember_device: bool,
    pub device: DeviceInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct OAuthLogin {
    #[serde(flatten)]
    pub tokens: AuthTokens,
    pub is_new_user: bool,
}

#[derive(Clone)]
pub struct AuthService {
    // ---
    repository: RepositoryPtr,
    metrics: MetricsPtr,
    tokens: Arc<TokenEngine>,
    ledger: Arc<RevocationLedger>,
    sessions: Arc<SessionTracker>,
    devices: Arc<DeviceTrust>,
    second_factor: Arc<SecondFactor>,
    passkeys: Arc<PasskeyService>,
    oauth: Arc<OAuthCoordinator>,
    bcrypt_cost: u32,
}

impl AuthService {
    // ---
    /// Wire every component over one repository and one ephemeral store.
    pub fn assemble(
        settings: &ServiceSettings,
        secrets: &SigningSecrets,
        repository: RepositoryPtr,
        store: EphemeralStorePtr,
        metrics: MetricsPtr,
    ) -> Self {
        // ---
        let records = RecordStore::new(store);

        let tokens = Arc::new(TokenEngine::new(
            secrets,
            &settings.tokens,
            repository.clone(),
            metrics.clone(),
        ));
        let ledger = Arc::new(RevocationLedger::new(
            repository.clone(),
            metrics.clone(),
            settings.tokens.refresh_ttl,
        ));
        let sessions = Arc::new(SessionTracker::new(
            records.clone(),
            ledger.clone(),
            settings.session_ttl,
        ));
        let devices = Arc::new(DeviceTrust::new(records.clone(), settings.trust_window));
        let second_factor = Arc::new(SecondFactor::new(
            repository.clone(),
            records.clone(),
            settings.totp_issuer.clone(),
        ));
        let passkeys = Arc::new(PasskeyService::new(
            repository.clone(),
            records.clone(),
            metrics.clone(),
            settings.challenge_ttl,
        ));
        let oauth = Arc::new(OAuthCoordinator::new(
            repository.clone(),
            records,
            settings.state_ttl,
        ));

        Self {
            repository,
            metrics,
            tokens,
            ledger,
            sessions,
            devices,
            second_factor,
            passkeys,
            oauth,
            bcrypt_cost: settings.bcrypt_cost,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenEngine> {
        &self.tokens
    }

    pub fn ledger(&self) -> &Arc<RevocationLedger> {
        &self.ledger
    }

    pub fn sessions(&self) -> &Arc<SessionTracker> {
        &self.sessions
    }

    pub fn devices(&self) -> &Arc<DeviceTrust> {
        &self.devices
    }

    pub fn second_factor(&self) -> &Arc<SecondFactor> {
        &self.second_factor
    }

    pub fn passkeys(&self) -> &Arc<PasskeyService> {
        &self.passkeys
    }

    pub fn oauth(&self) -> &Arc<OAuthCoordinator> {
        &self.oauth
    }

    // ========================================================================
    // Issuance
    // ========================================================================

    /// Mint a token pair and record the session. Every login path ends here.
    pub async fn issue_session(&self, user_id: UserId, device: &DeviceInfo) -> AuthResult<AuthTokens> {
        // ---
        let access_token = self.tokens.issue_access_token(user_id)?;
        let refresh_token = self.tokens.issue_refresh_token(user_id).await?;
        let session_id = self
            .sessions
            .create_session(user_id, &access_token, &refresh_token, device)
            .await?;

        Ok(self.pair(user_id, access_token, refresh_token, session_id))
    }

    fn pair(
        &self,
        user_id: UserId,
        access_token: String,
        refresh_token: String,
        session_id: String,
    ) -> AuthTokens {
        // ---
        AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in: self.tokens.access_ttl().as_secs(),
            user_id,
            session_id,
        }
    }

    // ========================================================================
    // Password flows
    // ========================================================================

    #[tracing::instrument(skip(self, password, device))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        device: &DeviceInfo,
    ) -> AuthResult<AuthTokens> {
        // ---
        let email = normalize_email(email).ok_or(AuthError::InvalidCredentials)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        if self.repository.get_user_by_email(&email).await?.is_some() {
            return Err(AuthError::IdentifierTaken);
        }

        let password_hash = hash_password(password.to_string(), self.bcrypt_cost).await?;
        let user = self
            .repository
            .create_user(NewUser {
                email: Some(email),
                password_hash: Some(password_hash),
                ..Default::default()
            })
            .await?;

        tracing::info!("Registered user {}", user.id);
        self.issue_session(user.id, device).await
    }

    /// Password first, then the second factor unless the device is trusted.
    #[tracing::instrument(skip_all)]
    pub async fn login(&self, attempt: LoginAttempt) -> AuthResult<AuthTokens> {
        // ---
        let result = self.login_inner(attempt).await;
        if let Err(err) = &result {
            self.metrics.record_auth_failure(err.code());
        }
        result
    }

    async fn login_inner(&self, attempt: LoginAttempt) -> AuthResult<AuthTokens> {
        // ---
        let email = normalize_email(&attempt.email).ok_or(AuthError::InvalidCredentials)?;
        let Some(user) = self.repository.get_user_by_email(&email).await? else {
            tracing::warn!("Login for unknown identifier");
            return Err(AuthError::InvalidCredentials);
        };
        let Some(hash) = user.password_hash.clone() else {
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(attempt.password.clone(), hash).await? {
            tracing::warn!("Wrong password for user {}", user.id);
            return Err(AuthError::InvalidCredentials);
        }

        let device = &attempt.device;
        if user.totp_enabled {
            let trust = self
                .devices
                .is_trusted(user.id, &device.user_agent, &device.address)
                .await?;

            if !trust.trusted {
                let code = attempt
                    .code
                    .as_deref()
                    .ok_or(AuthError::SecondFactorRequired)?;
                if !self.second_factor.verify(user.id, code).await? {
                    tracing::warn!("Second factor failed for user {}", user.id);
                    return Err(AuthError::SecondFactorFailed);
                }
            }
        }

        if attempt.remember_device && device.address.is_empty() {
            tracing::debug!("No client address for user {}; device not trusted", user.id);
        } else if attempt.remember_device {
            self.devices
                .trust(user.id, &device.user_agent, &device.address)
                .await?;
        }

        tracing::info!("User {} logged in", user.id);
        self.issue_session(user.id, device).await
    }

    // ========================================================================
    // Refresh, logout, bearer authentication
    // ========================================================================

    /// Rotate a refresh token and move its session to the new pair.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<AuthTokens> {
        // ---
        let result = self.refresh_inner(refresh_token).await;
        if let Err(err) = &result {
            self.metrics.record_auth_failure(err.code());
        }
        result
    }

    async fn refresh_inner(&self, old: &str) -> AuthResult<AuthTokens> {
        // ---
        let claims = self.tokens.verify_refresh_token(old)?;
        self.ledger.ensure_not_revoked(old).await?;

        let user_id = claims.sub;
        let refresh_token = self.tokens.rotate_refresh_token(old, user_id).await?;

        // The rotation already revoked the old row; the deny-list entry only
        // short-circuits later lookups.
        if let Err(err) = self
            .ledger
            .blacklist(old, user_id, RevocationReason::Rotation)
            .await
        {
            tracing::warn!("Deny-list write after rotation failed for user {}: {}", user_id, err);
        }

        let access_token = self.tokens.issue_access_token(user_id)?;

        let session_id = match self.sessions.find_by_refresh_token(user_id, old).await? {
            Some(session) => {
                let moved = self
                    .sessions
                    .replace_tokens(&session.session_id, &access_token, &refresh_token)
                    .await?;
                if !moved {
                    tracing::warn!(
                        "Session {} was revoked during refresh for user {}",
                        session.session_id,
                        user_id
                    );
                    self.discard_pair(user_id, &access_token, &refresh_token)
                        .await?;
                    return Err(AuthError::RotationError);
                }
                session.session_id
            }
            None => {
                self.sessions
                    .create_session(user_id, &access_token, &refresh_token, &DeviceInfo::default())
                    .await?
            }
        };

        tracing::debug!("Rotated refresh token for user {}", user_id);
        Ok(self.pair(user_id, access_token, refresh_token, session_id))
    }

    async fn discard_pair(&self, user_id: UserId, access: &str, refresh: &str) -> AuthResult<()> {
        // ---
        let reason = RevocationReason::SessionRevoked;
        self.ledger.blacklist(access, user_id, reason).await?;
        self.ledger.blacklist(refresh, user_id, reason).await?;
        self.ledger.revoke_refresh_token(refresh, user_id).await?;
        Ok(())
    }

    /// Revoke both tokens of the caller and drop the owning session.
    #[tracing::instrument(skip_all)]
    pub async fn logout(&self, access_token: &str, refresh_token: Option<&str>) -> AuthResult<()> {
        // ---
        let caller = self.authenticate_token(access_token).await?;
        let user_id = caller.user_id;

        let session = match caller.session_id.as_deref() {
            Some(id) => self.sessions.get_session(id).await?,
            None => None,
        };

        self.ledger
            .blacklist(access_token, user_id, RevocationReason::Logout)
            .await?;

        if let Some(refresh) = refresh_token {
            match self.tokens.verify_refresh_token(refresh) {
                Ok(claims) if claims.sub == user_id => {
                    self.ledger
                        .blacklist(refresh, user_id, RevocationReason::Logout)
                        .await?;
                    self.ledger.revoke_refresh_token(refresh, user_id).await?;
                }
                _ => tracing::warn!("Logout for user {} carried a foreign refresh token", user_id),
            }
        }

        if let Some(session) = session {
            self.sessions.revoke_session(&session.session_id).await?;
        }

        tracing::info!("User {} logged out", user_id);
        Ok(())
    }

    /// Resolve an `Authorization` header value to the caller.
    ///
    /// The revocation gate runs before signature checks and fails secure.
    pub async fn authenticate(&self, header: Option<&str>) -> AuthResult<AuthenticatedUser> {
        // ---
        let result = match parse_bearer(header) {
            Some(token) => self.authenticate_token(token).await,
            None => Err(AuthError::MissingCredential),
        };

        if let Err(err) = &result {
            self.metrics.record_auth_failure(err.code());
        }
        result
    }

    async fn authenticate_token(&self, token: &str) -> AuthResult<AuthenticatedUser> {
        // ---
        self.ledger.ensure_not_revoked(token).await?;
        let user_id = self.tokens.verify_access_token(token)?;

        // Activity tracking never blocks the request.
        let session_id = match self.sessions.find_by_access_token(user_id, token).await {
            Ok(Some(session)) => {
                if let Err(err) = self.sessions.touch(&session.session_id).await {
                    tracing::debug!("Session touch failed: {}", err);
                }
                Some(session.session_id)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::debug!("Session lookup failed: {}", err);
                None
            }
        };

        Ok(AuthenticatedUser {
            user_id,
            access_token: token.to_string(),
            session_id,
        })
    }

    // ========================================================================
    // Session management on behalf of the owner
    // ========================================================================

    /// Revoke one of the caller's own sessions.
    pub async fn revoke_own_session(&self, user_id: UserId, session_id: &str) -> AuthResult<()> {
        // ---
        match self.sessions.get_session(session_id).await? {
            Some(session) if session.user_id == user_id => {
                self.sessions.revoke_session(session_id).await?;
                Ok(())
            }
            _ => Err(AuthError::NotFound("session")),
        }
    }

    /// Second-factor setup labelled with the user's address.
    pub async fn second_factor_setup(&self, user_id: UserId) -> AuthResult<TotpSetup> {
        // ---
        let user = self
            .repository
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound("user"))?;
        let label = user.email.unwrap_or_else(|| format!("user-{user_id}"));

        self.second_factor.generate_secret(user_id, &label).await
    }

    // ========================================================================
    // Passkeys
    // ========================================================================

    pub async fn passkey_register_challenge(&self, user_id: UserId) -> AuthResult<String> {
        // ---
        self.passkeys
            .issue_challenge(ChallengePurpose::Registration, Some(user_id))
            .await
    }

    /// Bind a new credential to the user the registration challenge was issued to.
    pub async fn passkey_register(
        &self,
        challenge: &str,
        credential_id: &str,
        public_key: Vec<u8>,
        label: Option<String>,
    ) -> AuthResult<UserId> {
        // ---
        let user_id = match self.passkeys.consume_challenge(challenge).await? {
            Some(c) if c.purpose == ChallengePurpose::Registration => {
                c.user_id.ok_or(AuthError::InvalidChallenge)?
            }
            _ => return Err(AuthError::InvalidChallenge),
        };

        if !self
            .passkeys
            .register(user_id, credential_id, public_key, label)
            .await?
        {
            return Err(AuthError::IdentifierTaken);
        }
        Ok(user_id)
    }

    pub async fn passkey_login_challenge(&self) -> AuthResult<String> {
        // ---
        self.passkeys
            .issue_challenge(ChallengePurpose::Authentication, None)
            .await
    }

    #[tracing::instrument(skip(self, challenge, device))]
    pub async fn passkey_login(
        &self,
        challenge: &str,
        credential_id: &str,
        counter: i64,
        device: &DeviceInfo,
    ) -> AuthResult<AuthTokens> {
        // ---
        let result = self
            .passkey_login_inner(challenge, credential_id, counter, device)
            .await;
        if let Err(err) = &result {
            self.metrics.record_auth_failure(err.code());
        }
        result
    }

    async fn passkey_login_inner(
        &self,
        challenge: &str,
        credential_id: &str,
        counter: i64,
        device: &DeviceInfo,
    ) -> AuthResult<AuthTokens> {
        // ---
        match self.passkeys.consume_challenge(challenge).await? {
            Some(c) if c.purpose == ChallengePurpose::Authentication => {}
            _ => return Err(AuthError::InvalidChallenge),
        }

        match self.passkeys.verify_assertion(credential_id, counter).await? {
            AssertionOutcome::Verified { user_id } => self.issue_session(user_id, device).await,
            AssertionOutcome::UnknownCredential => Err(AuthError::UnknownCredential),
            AssertionOutcome::Replay { stored, presented } => {
                Err(AuthError::ReplayDetected { stored, presented })
            }
        }
    }

    // ========================================================================
    // OAuth
    // ========================================================================

    pub async fn oauth_init(&self, provider: OAuthProvider) -> AuthResult<OAuthInit> {
        self.oauth.init(provider).await
    }

    #[tracing::instrument(skip(self, state, profile, tokens, device))]
    pub async fn oauth_callback(
        &self,
        provider: OAuthProvider,
        state: &str,
        profile: serde_json::Value,
        tokens: ProviderTokens,
        device: &DeviceInfo,
    ) -> AuthResult<OAuthLogin> {
        // ---
        let resolved = self.oauth.callback(provider, state, profile, tokens).await?;
        let tokens = self.issue_session(resolved.user_id, device).await?;

        Ok(OAuthLogin {
            tokens,
            is_new_user: resolved.is_new_user,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn normalize_email(email: &str) -> Option<String> {
    // ---
    let email = email.trim().to_lowercase();
    (email.contains('@') && email.len() > 2).then_some(email)
}

/// Extract the token from `Bearer <token>`. The scheme is case-insensitive.
pub fn parse_bearer(header: Option<&str>) -> Option<&str> {
    // ---
    let (scheme, token) = header?.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

async fn hash_password(password: String, cost: u32) -> AuthResult<String> {
    // ---
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|err| anyhow::anyhow!("bcrypt task failed: {err}"))?
        .map_err(|err| AuthError::Persistence(anyhow::anyhow!("bcrypt hash: {err}")))
}

async fn verify_password(password: String, hash: String) -> AuthResult<bool> {
    // ---
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|err| anyhow::anyhow!("bcrypt task failed: {err}"))?;

    match verified {
        Ok(ok) => Ok(ok),
        Err(err) => {
            tracing::error!("Stored password hash is unreadable: {}", err);
            Ok(false)
        }
    }
}
