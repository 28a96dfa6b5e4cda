//! Signed bearer tokens.
//!
//! Access and refresh tokens are HS256 JWTs signed with distinct secrets.
//! Every issued refresh token has exactly one row in the refresh-token
//! registry, and rotation replaces that row atomically.

use super::secrets::SigningSecrets;
use super::to_chrono;
use crate::config::TokenConfig;
use crate::domain::{AuthError, AuthResult, MetricsPtr, RefreshTokenRecord, RepositoryPtr, UserId};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Which secret a token is signed with, and what it may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    // ---
    Access,
    Refresh,
}

impl TokenKind {
    // ---
    pub fn as_str(&self) -> &'static str {
        // ---
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// JWT payload shared by both kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    // ---
    pub sub: UserId,
    pub kind: TokenKind,
    /// Unique per token, so two tokens minted in the same second differ.
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    // ---
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Issues, verifies and rotates bearer tokens.
pub struct TokenEngine {
    // ---
    access: KeyPair,
    refresh: KeyPair,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
    repository: RepositoryPtr,
    metrics: MetricsPtr,
}

impl TokenEngine {
    // ---
    pub fn new(
        secrets: &SigningSecrets,
        config: &TokenConfig,
        repository: RepositoryPtr,
        metrics: MetricsPtr,
    ) -> Self {
        // ---
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            access: KeyPair::from_secret(secrets.access.expose_secret().as_bytes()),
            refresh: KeyPair::from_secret(secrets.refresh.expose_secret().as_bytes()),
            validation,
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
            repository,
            metrics,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mint a short-lived access token. Nothing is persisted.
    pub fn issue_access_token(&self, user_id: UserId) -> AuthResult<String> {
        // ---
        let (token, _) = self.sign(user_id, TokenKind::Access)?;
        self.metrics.record_token_issued(TokenKind::Access.as_str());
        Ok(token)
    }

    /// Mint a refresh token and record it in the registry.
    ///
    /// The token is only returned once its registry row exists; an insert
    /// failure surfaces as `Persistence` and the token is discarded.
    pub async fn issue_refresh_token(&self, user_id: UserId) -> AuthResult<String> {
        // ---
        let (token, claims) = self.sign(user_id, TokenKind::Refresh)?;
        let record = registry_record(&token, &claims)?;

        self.repository.insert_refresh_token(record).await.map_err(|err| {
            tracing::error!("Failed to record refresh token for user {}: {}", user_id, err);
            AuthError::Persistence(err)
        })?;

        self.metrics.record_token_issued(TokenKind::Refresh.as_str());
        Ok(token)
    }

    /// Verify an access token and return its subject.
    pub fn verify_access_token(&self, token: &str) -> AuthResult<UserId> {
        // ---
        self.verify(token, TokenKind::Access).map(|claims| claims.sub)
    }

    /// Verify a refresh token's signature, expiry and kind.
    ///
    /// Registry state (revoked, rotated) is not consulted here.
    pub fn verify_refresh_token(&self, token: &str) -> AuthResult<Claims> {
        // ---
        self.verify(token, TokenKind::Refresh)
    }

    /// Replace `old` with a freshly minted refresh token.
    ///
    /// The conditional revoke of the old row and the insert of the new one
    /// happen in one storage transaction, so of two concurrent rotations of
    /// the same token at most one succeeds.
    ///
    /// # Errors
    /// `RotationError` if the old token is unknown, already revoked, expired
    /// or owned by another user.
    pub async fn rotate_refresh_token(&self, old: &str, user_id: UserId) -> AuthResult<String> {
        // ---
        let (token, claims) = self.sign(user_id, TokenKind::Refresh)?;
        let record = registry_record(&token, &claims)?;

        let rotated = self
            .repository
            .rotate_refresh_token(old, user_id, record)
            .await?;

        if !rotated {
            tracing::warn!("Refresh token rotation refused for user {}", user_id);
            return Err(AuthError::RotationError);
        }

        self.metrics.record_token_issued(TokenKind::Refresh.as_str());
        Ok(token)
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        // ---
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign(&self, user_id: UserId, kind: TokenKind) -> AuthResult<(String, Claims)> {
        // ---
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };

        let claims = Claims {
            sub: user_id,
            kind,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + to_chrono(ttl)).timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.keys(kind).encoding,
        )
        .map_err(|err| AuthError::Persistence(anyhow::anyhow!("jwt encode: {err}")))?;

        Ok((token, claims))
    }

    fn verify(&self, token: &str, expected: TokenKind) -> AuthResult<Claims> {
        // ---
        match decode::<Claims>(token, &self.keys(expected).decoding, &self.validation) {
            Ok(data) if data.claims.kind == expected => Ok(data.claims),
            Ok(_) => Err(AuthError::WrongTokenKind),
            Err(err) if matches!(err.kind(), ErrorKind::InvalidSignature) => {
                let other = match expected {
                    TokenKind::Access => TokenKind::Refresh,
                    TokenKind::Refresh => TokenKind::Access,
                };
                match decode::<Claims>(token, &self.keys(other).decoding, &self.validation) {
                    Ok(_) => Err(AuthError::WrongTokenKind),
                    Err(_) => Err(AuthError::InvalidToken),
                }
            }
            Err(err) => {
                tracing::debug!("Rejected {} token: {}", expected.as_str(), err);
                Err(AuthError::InvalidToken)
            }
        }
    }
}

fn registry_record(token: &str, claims: &Claims) -> AuthResult<RefreshTokenRecord> {
    // ---
    let expires_at = claims
        .expires_at()
        .ok_or_else(|| AuthError::Persistence(anyhow::anyhow!("refresh expiry out of range")))?;

    Ok(RefreshTokenRecord::new(token.to_string(), claims.sub, expires_at))
}

/// Read the `exp` claim without checking the signature.
///
/// Used only to size deny-list entries; never as an authorization decision.
pub fn unverified_expiry(token: &str) -> Option<DateTime<Utc>> {
    // ---
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .and_then(|data| data.claims.expires_at())
}
