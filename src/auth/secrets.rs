//! Signing-secret provisioning.
//!
//! Resolves the access and refresh HMAC secrets once at startup. Production
//! refuses to start without two strong, distinct secrets. Other environments
//! may fall back to a random secret held for the lifetime of the process.

use crate::config::TokenConfig;
use crate::domain::{AuthError, AuthResult};
use rand::distributions::Alphanumeric;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};

/// Minimum accepted secret length, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

const GENERATED_SECRET_LEN: usize = 64;

/// The pair of secrets the token engine signs with.
#[derive(Clone)]
pub struct SigningSecrets {
    // ---
    pub access: SecretString,
    pub refresh: SecretString,

    /// True when at least one secret was generated for this process only.
    pub ephemeral: bool,
}

impl std::fmt::Debug for SigningSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningSecrets")
            .field("ephemeral", &self.ephemeral)
            .finish_non_exhaustive()
    }
}

/// Resolve both signing secrets from configuration.
///
/// # Errors
/// `SecretMisconfigured` when a secret is missing and generation is not
/// allowed, when a production secret is shorter than [`MIN_SECRET_LEN`], or
/// when production uses the same value for both kinds.
pub fn provision(config: &TokenConfig) -> AuthResult<SigningSecrets> {
    // ---
    let production = config.environment.is_production();
    let may_generate = !production && config.allow_ephemeral_secrets;

    let (access, access_generated) = resolve(
        "CIVIC_JWT_ACCESS_SECRET",
        config.access_secret.as_ref(),
        production,
        may_generate,
    )?;
    let (refresh, refresh_generated) = resolve(
        "CIVIC_JWT_REFRESH_SECRET",
        config.refresh_secret.as_ref(),
        production,
        may_generate,
    )?;

    if access.expose_secret() == refresh.expose_secret() {
        if production {
            return Err(AuthError::SecretMisconfigured(
                "access and refresh secrets must differ".to_string(),
            ));
        }
        tracing::warn!("Access and refresh signing secrets are identical");
    }

    Ok(SigningSecrets {
        access,
        refresh,
        ephemeral: access_generated || refresh_generated,
    })
}

fn resolve(
    name: &str,
    configured: Option<&SecretString>,
    production: bool,
    may_generate: bool,
) -> AuthResult<(SecretString, bool)> {
    // ---
    match configured {
        Some(secret) if secret.expose_secret().len() >= MIN_SECRET_LEN => Ok((secret.clone(), false)),
        Some(_) if production => Err(AuthError::SecretMisconfigured(format!(
            "{name} must be at least {MIN_SECRET_LEN} bytes"
        ))),
        Some(secret) => {
            tracing::warn!("{} is shorter than {} bytes", name, MIN_SECRET_LEN);
            Ok((secret.clone(), false))
        }
        None if may_generate => {
            tracing::warn!(
                "{} not set; using a generated secret. Tokens will not survive a restart",
                name
            );
            Ok((generate_secret(), true))
        }
        None => Err(AuthError::SecretMisconfigured(format!("{name} is not set"))),
    }
}

fn generate_secret() -> SecretString {
    // ---
    let secret: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_SECRET_LEN)
        .map(char::from)
        .collect();

    SecretString::from(secret)
}
