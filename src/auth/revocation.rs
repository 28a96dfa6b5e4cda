//! Server-side revocation: the token deny-list and the refresh-token registry.

use super::to_chrono;
use super::tokens::unverified_expiry;
use crate::domain::{
    AuthError, AuthResult, BlacklistEntry, MetricsPtr, RepositoryPtr, RevocationReason, UserId,
};
use chrono::Utc;
use std::time::Duration;

/// Counts removed by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCleanup {
    pub refresh_tokens: u64,
    pub blacklist_entries: u64,
}

impl LedgerCleanup {
    pub fn total(&self) -> u64 {
        self.refresh_tokens + self.blacklist_entries
    }
}

/// Deny-list plus refresh-token registry.
pub struct RevocationLedger {
    // ---
    repository: RepositoryPtr,
    metrics: MetricsPtr,
    fallback_ttl: Duration,
}

impl RevocationLedger {
    // ---
    /// `fallback_ttl` sizes entries for tokens whose `exp` cannot be read.
    pub fn new(repository: RepositoryPtr, metrics: MetricsPtr, fallback_ttl: Duration) -> Self {
        // ---
        Self {
            repository,
            metrics,
            fallback_ttl,
        }
    }

    /// Deny `token` until it would have expired on its own.
    ///
    /// Returns `false` when the token is already past its expiry and so
    /// needs no entry.
    pub async fn blacklist(
        &self,
        token: &str,
        user_id: UserId,
        reason: RevocationReason,
    ) -> AuthResult<bool> {
        // ---
        let now = Utc::now();
        let expires_at = unverified_expiry(token).unwrap_or(now + to_chrono(self.fallback_ttl));

        if expires_at <= now {
            return Ok(false);
        }

        self.repository
            .insert_blacklist_entry(BlacklistEntry {
                token: token.to_string(),
                user_id,
                reason: reason.as_str().to_string(),
                expires_at,
            })
            .await
            .map_err(|err| {
                tracing::error!("Failed to blacklist token for user {}: {}", user_id, err);
                AuthError::Persistence(err)
            })?;

        self.metrics.record_token_revoked(reason.as_str());
        tracing::debug!("Blacklisted token for user {} ({})", user_id, reason);

        Ok(true)
    }

    /// Raw deny-list lookup. Storage errors are returned to the caller.
    pub async fn is_blacklisted(&self, token: &str) -> AuthResult<bool> {
        // ---
        Ok(self.repository.is_blacklisted(token, Utc::now()).await?)
    }

    /// Gate consulted on every authenticated request.
    ///
    /// A lookup that cannot be performed denies the token.
    pub async fn ensure_not_revoked(&self, token: &str) -> AuthResult<()> {
        // ---
        match self.repository.is_blacklisted(token, Utc::now()).await {
            Ok(false) => Ok(()),
            Ok(true) => Err(AuthError::TokenRevoked),
            Err(err) => {
                tracing::error!("Revocation lookup failed, denying request: {}", err);
                Err(AuthError::InvalidToken)
            }
        }
    }

    /// Mark one registry row revoked. `false` if unknown, foreign or already revoked.
    pub async fn revoke_refresh_token(&self, token: &str, user_id: UserId) -> AuthResult<bool> {
        // ---
        Ok(self.repository.revoke_refresh_token(token, user_id).await?)
    }

    /// Revoke every live refresh token of a user.
    pub async fn revoke_all_refresh_tokens(&self, user_id: UserId) -> AuthResult<u64> {
        // ---
        let count = self.repository.revoke_all_refresh_tokens(user_id).await?;
        tracing::info!("Revoked {} refresh token(s) for user {}", count, user_id);
        Ok(count)
    }

    /// Delete expired rows from both tables.
    pub async fn cleanup_expired(&self) -> AuthResult<LedgerCleanup> {
        // ---
        let now = Utc::now();
        let refresh_tokens = self.repository.delete_expired_refresh_tokens(now).await?;
        let blacklist_entries = self.repository.delete_expired_blacklist_entries(now).await?;

        Ok(LedgerCleanup {
            refresh_tokens,
            blacklist_entries,
        })
    }
}
