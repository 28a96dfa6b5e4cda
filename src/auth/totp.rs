//! Time-based one-time codes (TOTP).
//!
//! State machine: `Disabled -> PendingEnable -> Enabled -> Disabled`. A secret
//! stored without the enabled flag is the pending state. Codes are SHA-1,
//! six digits, 30 second steps, accepted two steps either side of now.

use super::store::RecordStore;
use crate::domain::{AuthError, AuthResult, RepositoryPtr, User, UserId};
use serde::Serialize;
use std::time::Duration;
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
const SKEW: u8 = 2;
const STEP_SECS: u64 = 30;

/// A consumed code stays recorded for the whole acceptance window.
const USED_CODE_TTL: Duration = Duration::from_secs((2 * SKEW as u64 + 1) * STEP_SECS);

/// What the user needs to configure an authenticator app.
#[derive(Debug, Clone, Serialize)]
pub struct TotpSetup {
    /// Base32 secret for manual entry.
    pub secret: String,
    /// `otpauth://` provisioning URI, usually rendered as a QR code.
    pub qr_payload: String,
}

pub struct SecondFactor {
    // ---
    repository: RepositoryPtr,
    store: RecordStore,
    issuer: String,
}

impl SecondFactor {
    // ---
    pub fn new(repository: RepositoryPtr, store: RecordStore, issuer: String) -> Self {
        // ---
        Self {
            repository,
            store,
            issuer: issuer.replace(':', ""),
        }
    }

    /// Store a fresh secret without enabling it.
    ///
    /// # Errors
    /// `SecondFactorAlreadyEnabled` while the flag is set.
    pub async fn generate_secret(&self, user_id: UserId, label: &str) -> AuthResult<TotpSetup> {
        // ---
        let user = self.user(user_id).await?;
        if user.totp_enabled {
            return Err(AuthError::SecondFactorAlreadyEnabled);
        }

        let secret = Secret::generate_secret();
        let totp = self.build(secret.to_bytes().map_err(secret_error)?, label)?;
        let encoded = totp.get_secret_base32();

        self.repository
            .set_totp_secret(user_id, Some(&encoded))
            .await?;

        tracing::info!("Generated second-factor secret for user {}", user_id);

        Ok(TotpSetup {
            secret: encoded,
            qr_payload: totp.get_url(),
        })
    }

    /// Turn the second factor on. A wrong code leaves the flag untouched.
    pub async fn enable(&self, user_id: UserId, code: &str) -> AuthResult<bool> {
        // ---
        let user = self.user(user_id).await?;
        if user.totp_enabled {
            return Err(AuthError::SecondFactorAlreadyEnabled);
        }
        let Some(secret) = user.totp_secret.as_deref() else {
            return Ok(false);
        };

        if !self.check(user_id, secret, code).await? {
            tracing::warn!("Second-factor enable rejected for user {}", user_id);
            return Ok(false);
        }

        self.repository.set_totp_enabled(user_id, true).await?;
        tracing::info!("Second factor enabled for user {}", user_id);
        Ok(true)
    }

    /// Turn the second factor off. Requires a valid code; clears the secret.
    pub async fn disable(&self, user_id: UserId, code: &str) -> AuthResult<bool> {
        // ---
        if !self.verify(user_id, code).await? {
            tracing::warn!("Second-factor disable rejected for user {}", user_id);
            return Ok(false);
        }

        self.repository.set_totp_enabled(user_id, false).await?;
        self.repository.set_totp_secret(user_id, None).await?;
        tracing::info!("Second factor disabled for user {}", user_id);
        Ok(true)
    }

    /// Check a code for a user with the second factor enabled.
    pub async fn verify(&self, user_id: UserId, code: &str) -> AuthResult<bool> {
        // ---
        let user = self.user(user_id).await?;
        match (user.totp_enabled, user.totp_secret.as_deref()) {
            (true, Some(secret)) => self.check(user_id, secret, code).await,
            _ => Ok(false),
        }
    }

    async fn check(&self, user_id: UserId, secret: &str, code: &str) -> AuthResult<bool> {
        // ---
        let bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(secret_error)?;
        let totp = self.build(bytes, &format!("user-{user_id}"))?;

        let valid = totp
            .check_current(code)
            .map_err(|err| AuthError::Persistence(anyhow::anyhow!("system clock: {err}")))?;
        if !valid {
            return Ok(false);
        }

        // A code is good for one use inside its window.
        let first_use = self
            .store
            .put_if_absent(&format!("totp:used:{user_id}:{code}"), &true, USED_CODE_TTL)
            .await?;
        if !first_use {
            tracing::warn!("Replayed second-factor code for user {}", user_id);
        }

        Ok(first_use)
    }

    fn build(&self, secret: Vec<u8>, account: &str) -> AuthResult<TOTP> {
        // ---
        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW,
            STEP_SECS,
            secret,
            Some(self.issuer.clone()),
            account.replace(':', ""),
        )
        .map_err(|err| AuthError::Persistence(anyhow::anyhow!("TOTP init error: {err}")))
    }

    async fn user(&self, user_id: UserId) -> AuthResult<User> {
        // ---
        self.repository
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound("user"))
    }
}

fn secret_error<E: std::fmt::Debug>(err: E) -> AuthError {
    AuthError::Persistence(anyhow::anyhow!("TOTP secret error: {err:?}"))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::auth::testing::Fixture;
    use crate::domain::{NewUser, Repository};

    fn code_for(secret: &str, offset_steps: i64) -> String {
        // ---
        let bytes = Secret::Encoded(secret.to_string()).to_bytes().unwrap();
        let totp = TOTP::new(Algorithm::SHA1, 6, SKEW, 30, bytes, None, "t".to_string()).unwrap();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        totp.generate((now + offset_steps * 30) as u64)
    }

    fn wrong_code(secret: &str) -> String {
        // ---
        let window: Vec<String> = (-3..=3).map(|step| code_for(secret, step)).collect();
        ["000000", "111111", "222222", "333333", "444444", "555555", "666666", "777777"]
            .into_iter()
            .find(|c| !window.iter().any(|w| w == c))
            .unwrap()
            .to_string()
    }

    async fn user(fx: &Fixture) -> UserId {
        // ---
        fx.repo
            .create_user(NewUser {
                email: Some("totp@example.test".to_string()),
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn setup_stores_secret_without_enabling() {
        // ---
        let fx = Fixture::new();
        let id = user(&fx).await;

        let setup = fx.totp.generate_secret(id, "totp@example.test").await.unwrap();
        assert!(setup.qr_payload.starts_with("otpauth://totp/"));

        let stored = fx.repo.get_user_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.totp_secret.as_deref(), Some(setup.secret.as_str()));
        assert!(!stored.totp_enabled);
    }

    #[tokio::test]
    async fn enable_requires_a_correct_code() {
        // ---
        let fx = Fixture::new();
        let id = user(&fx).await;
        let setup = fx.totp.generate_secret(id, "totp").await.unwrap();

        assert!(!fx.totp.enable(id, &wrong_code(&setup.secret)).await.unwrap());
        assert!(!fx.repo.get_user_by_id(id).await.unwrap().unwrap().totp_enabled);

        assert!(fx.totp.enable(id, &code_for(&setup.secret, 0)).await.unwrap());
        assert!(fx.repo.get_user_by_id(id).await.unwrap().unwrap().totp_enabled);

        assert!(matches!(
            fx.totp.generate_secret(id, "totp").await,
            Err(AuthError::SecondFactorAlreadyEnabled)
        ));
    }

    #[tokio::test]
    async fn codes_inside_the_skew_window_verify() {
        // ---
        let fx = Fixture::new();
        let id = user(&fx).await;
        let setup = fx.totp.generate_secret(id, "totp").await.unwrap();
        fx.totp.enable(id, &code_for(&setup.secret, 0)).await.unwrap();

        assert!(fx.totp.verify(id, &code_for(&setup.secret, -1)).await.unwrap());
        assert!(!fx.totp.verify(id, &code_for(&setup.secret, 5)).await.unwrap());
    }

    #[tokio::test]
    async fn same_window_replay_is_rejected() {
        // ---
        let fx = Fixture::new();
        let id = user(&fx).await;
        let setup = fx.totp.generate_secret(id, "totp").await.unwrap();
        fx.totp.enable(id, &code_for(&setup.secret, 0)).await.unwrap();

        let code = code_for(&setup.secret, 1);
        assert!(fx.totp.verify(id, &code).await.unwrap());
        assert!(!fx.totp.verify(id, &code).await.unwrap());
    }

    #[tokio::test]
    async fn disable_clears_flag_and_secret() {
        // ---
        let fx = Fixture::new();
        let id = user(&fx).await;
        let setup = fx.totp.generate_secret(id, "totp").await.unwrap();
        fx.totp.enable(id, &code_for(&setup.secret, 0)).await.unwrap();

        assert!(!fx.totp.disable(id, &wrong_code(&setup.secret)).await.unwrap());
        assert!(fx.totp.disable(id, &code_for(&setup.secret, -1)).await.unwrap());

        let stored = fx.repo.get_user_by_id(id).await.unwrap().unwrap();
        assert!(!stored.totp_enabled);
        assert!(stored.totp_secret.is_none());
        assert!(!fx.totp.verify(id, &code_for(&setup.secret, 0)).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        // ---
        let fx = Fixture::new();
        assert!(matches!(
            fx.totp.generate_secret(404, "x").await,
            Err(AuthError::NotFound("user"))
        ));
    }
}
