//! Environment-driven configuration for the auth service.
//!
//! Every `CIVIC_*` variable is read once at startup. A missing required
//! value aborts the process; optional tuning knobs fall back to defaults.

use anyhow::Result;
use std::time::Duration;

// ============================================================
// Env helpers
// ============================================================

/// Reads `$key` or returns early with a "Missing required configuration" error.
macro_rules! required_env {
    // ---
    ($key:literal) => {
        std::env::var($key)
            .map_err(|_| anyhow::anyhow!(concat!("Missing required configuration: ", $key)))?
    };
}

/// Parses `$key` as `$ty`, using `$default` when unset or malformed.
macro_rules! optional_env_parse {
    // ---
    ($key:literal, $ty:ty, $default:expr) => {
        std::env::var($key)
            .ok()
            .and_then(|v| v.parse::<$ty>().ok())
            .unwrap_or($default)
    };
}

/// Reads an optional, non-empty environment variable.
macro_rules! optional_env {
    // ---
    ($key:literal) => {
        std::env::var($key).ok().filter(|v| !v.trim().is_empty())
    };
}

#[cfg(test)]
/// Checks that `$expr` failed because `$key` was not set.
macro_rules! assert_missing_config {
    // ---
    ($expr:expr, $key:literal) => {{
        let err = $expr.expect_err("expected configuration error");
        assert!(
            err.to_string()
                .contains(concat!("Missing required configuration: ", $key)),
            "unexpected error: {err}"
        );
    }};
}

// ============================================================
// AppConfig
// ============================================================

/// Every configuration section, loaded together by [`AppConfig::from_env`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: server::ServerConfig,
    pub database: database::DatabaseConfig,
    pub redis: redis::RedisConfig,
    pub tokens: tokens::TokenConfig,
    pub second_factor: second_factor::SecondFactorConfig,
    pub password: password::PasswordConfig,
    pub cleanup: cleanup::CleanupConfig,
}

impl AppConfig {
    /// Fails on the first section with a missing or unparseable required value.
    pub fn from_env() -> Result<Self> {
        // ---
        Ok(Self {
            server: server::ServerConfig::from_env()?,
            database: database::DatabaseConfig::from_env()?,
            redis: redis::RedisConfig::from_env()?,
            tokens: tokens::TokenConfig::from_env()?,
            second_factor: second_factor::SecondFactorConfig::from_env(),
            password: password::PasswordConfig::from_env(),
            cleanup: cleanup::CleanupConfig::from_env(),
        })
    }
}

// ============================================================
// Server configuration
// ============================================================

mod server {
    // ---
    use super::*;

    /// HTTP listener and metrics backend selection.
    #[derive(Debug, Clone)]
    pub struct ServerConfig {
        /// Socket address to bind. Defaults to 127.0.0.1:8080.
        pub bind_addr: String,

        /// `prom` for the Prometheus recorder, anything else for no-op metrics.
        pub metrics_type: String,

        /// Header a trusted reverse proxy writes the client address into
        /// (`CIVIC_CLIENT_IP_HEADER`). Unset means the socket peer is used.
        pub client_ip_header: Option<String>,
    }

    impl ServerConfig {
        pub fn from_env() -> Result<Self> {
            // ---
            let bind_addr =
                optional_env!("CIVIC_BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());
            let metrics_type =
                optional_env!("CIVIC_METRICS_TYPE").unwrap_or_else(|| "noop".to_string());

            let client_ip_header =
                optional_env!("CIVIC_CLIENT_IP_HEADER");

            Ok(Self {
                bind_addr,
                metrics_type,
                client_ip_header,
            })
        }
    }
}
pub use server::ServerConfig;

// ============================================================
// Database configuration
// ============================================================

mod database {
    // ---
    use super::*;

    /// Which implementation backs the durable tables.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum StorageBackend {
        Postgres,
        /// In-process tables. Nothing survives a restart.
        Memory,
    }

    /// Durable storage selection and connection pool sizing.
    #[derive(Debug, Clone)]
    pub struct DatabaseConfig {
        /// Backend for the durable tables. Defaults to Postgres.
        pub backend: StorageBackend,

        /// PostgreSQL connection string. Required for the Postgres backend.
        pub database_url: String,

        /// Connect attempts before startup gives up (`CIVIC_DB_RETRY_COUNT`, 50).
        pub retry_count: u32,

        /// Pool acquire timeout (`CIVIC_DB_ACQUIRE_TIMEOUT_SEC`, 30s).
        pub acquire_timeout: Duration,

        /// Idle floor of the pool (`CIVIC_DB_MIN_CONNECTIONS`, 2).
        pub min_connections: u32,

        /// Pool ceiling (`CIVIC_DB_MAX_CONNECTIONS`, 15).
        pub max_connections: u32,
    }

    impl DatabaseConfig {
        /// Returns an error if `DATABASE_URL` is missing while the Postgres
        /// backend is selected.
        pub fn from_env() -> Result<Self> {
            // ---
            let backend = match optional_env!("CIVIC_STORAGE_BACKEND").as_deref() {
                Some("memory") => StorageBackend::Memory,
                Some("postgres") | None => StorageBackend::Postgres,
                Some(other) => anyhow::bail!("Unknown CIVIC_STORAGE_BACKEND: {other}"),
            };

            let database_url = match backend {
                StorageBackend::Postgres => required_env!("DATABASE_URL"),
                StorageBackend::Memory => std::env::var("DATABASE_URL").unwrap_or_default(),
            };

            let retry_count = optional_env_parse!("CIVIC_DB_RETRY_COUNT", u32, 50);
            let acquire_timeout_secs = optional_env_parse!("CIVIC_DB_ACQUIRE_TIMEOUT_SEC", u64, 30);
            let min_connections = optional_env_parse!("CIVIC_DB_MIN_CONNECTIONS", u32, 2);
            let max_connections = optional_env_parse!("CIVIC_DB_MAX_CONNECTIONS", u32, 15);

            Ok(Self {
                backend,
                database_url,
                retry_count,
                acquire_timeout: Duration::from_secs(acquire_timeout_secs),
                min_connections,
                max_connections,
            })
        }
    }
}
pub use database::{DatabaseConfig, StorageBackend};

// ============================================================
// Redis / ephemeral state configuration
// ============================================================

mod redis {
    // ---
    use super::*;

    /// Which implementation backs sessions, trust windows, challenges and states.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum EphemeralBackend {
        Redis,
        /// Process-local maps; single instance only.
        Memory,
    }

    /// Configuration for ephemeral, TTL-bound state.
    #[derive(Debug, Clone)]
    pub struct RedisConfig {
        /// Backend for ephemeral state. Defaults to Redis.
        pub backend: EphemeralBackend,

        /// Redis connection string. Required for the Redis backend.
        pub url: String,

        /// Prepended to every key so several deployments can share one Redis.
        pub key_prefix: String,

        /// Time-to-live for passkey challenges. Defaults to 5 minutes.
        pub passkey_challenge_ttl: Duration,

        /// Time-to-live for OAuth state values. Defaults to 10 minutes.
        pub oauth_state_ttl: Duration,
    }

    impl RedisConfig {
        /// Builds a [`RedisConfig`] from environment variables.
        ///
        /// # Errors
        /// Returns an error if `CIVIC_REDIS_URL` is missing while the Redis
        /// backend is selected.
        pub fn from_env() -> Result<Self> {
            // ---
            let backend = match optional_env!("CIVIC_EPHEMERAL_BACKEND").as_deref() {
                Some("memory") => EphemeralBackend::Memory,
                Some("redis") | None => EphemeralBackend::Redis,
                Some(other) => anyhow::bail!("Unknown CIVIC_EPHEMERAL_BACKEND: {other}"),
            };

            let url = match backend {
                EphemeralBackend::Redis => required_env!("CIVIC_REDIS_URL"),
                EphemeralBackend::Memory => std::env::var("CIVIC_REDIS_URL").unwrap_or_default(),
            };

            let key_prefix =
                optional_env!("CIVIC_REDIS_KEY_PREFIX").unwrap_or_else(|| "civic:".to_string());
            let challenge_secs = optional_env_parse!("CIVIC_PASSKEY_CHALLENGE_TTL_SEC", u64, 300);
            let state_secs = optional_env_parse!("CIVIC_OAUTH_STATE_TTL_SEC", u64, 600);

            Ok(Self {
                backend,
                url,
                key_prefix,
                passkey_challenge_ttl: Duration::from_secs(challenge_secs),
                oauth_state_ttl: Duration::from_secs(state_secs),
            })
        }
    }
}
pub use redis::{EphemeralBackend, RedisConfig};

// ============================================================
// Token configuration
// ============================================================

mod tokens {
    // ---
    use super::*;
    use secrecy::SecretString;

    /// Deployment environment. Only `Production` refuses generated secrets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Environment {
        Production,
        Development,
        Test,
    }

    impl Environment {
        pub fn is_production(&self) -> bool {
            // ---
            matches!(self, Environment::Production)
        }
    }

    /// Signing-secret inputs and token lifetimes.
    ///
    /// The raw secrets are validated later by the secret provisioner; this
    /// struct only captures what the environment provided.
    #[derive(Debug, Clone)]
    pub struct TokenConfig {
        /// `CIVIC_ENV`: production (default), development or test.
        pub environment: Environment,

        /// HMAC secret for access tokens, if configured.
        pub access_secret: Option<SecretString>,

        /// HMAC secret for refresh tokens, if configured.
        pub refresh_secret: Option<SecretString>,

        /// Allow generated secrets outside production. Defaults to true.
        pub allow_ephemeral_secrets: bool,

        /// Access token lifetime. Defaults to 15 minutes.
        pub access_ttl: Duration,

        /// Refresh token (and session) lifetime. Defaults to 7 days.
        pub refresh_ttl: Duration,
    }

    impl TokenConfig {
        /// Builds a [`TokenConfig`] from environment variables.
        ///
        /// # Errors
        /// Returns an error if `CIVIC_ENV` holds an unknown value.
        pub fn from_env() -> Result<Self> {
            // ---
            let environment = match optional_env!("CIVIC_ENV").as_deref() {
                // Unset means production: generated secrets must be opted into.
                Some("production") | Some("prod") | None => Environment::Production,
                Some("development") | Some("dev") => Environment::Development,
                Some("test") => Environment::Test,
                Some(other) => anyhow::bail!("Unknown CIVIC_ENV: {other}"),
            };

            let access_secret = optional_env!("CIVIC_JWT_ACCESS_SECRET").map(SecretString::from);
            let refresh_secret = optional_env!("CIVIC_JWT_REFRESH_SECRET").map(SecretString::from);
            let allow_ephemeral_secrets =
                optional_env_parse!("CIVIC_ALLOW_EPHEMERAL_SECRETS", bool, true);
            let access_secs = optional_env_parse!("CIVIC_ACCESS_TOKEN_TTL_SEC", u64, 15 * 60);
            let refresh_secs =
                optional_env_parse!("CIVIC_REFRESH_TOKEN_TTL_SEC", u64, 7 * 24 * 60 * 60);

            Ok(Self {
                environment,
                access_secret,
                refresh_secret,
                allow_ephemeral_secrets,
                access_ttl: Duration::from_secs(access_secs),
                refresh_ttl: Duration::from_secs(refresh_secs),
            })
        }
    }
}
pub use tokens::{Environment, TokenConfig};

// ============================================================
// Second-factor configuration
// ============================================================

mod second_factor {
    // ---

    /// Time-based one-time code settings.
    #[derive(Debug, Clone)]
    pub struct SecondFactorConfig {
        /// Issuer shown by authenticator apps.
        pub issuer: String,
    }

    impl SecondFactorConfig {
        pub fn from_env() -> Self {
            // ---
            let issuer =
                optional_env!("CIVIC_TOTP_ISSUER").unwrap_or_else(|| "CivicNet".to_string());

            Self { issuer }
        }
    }
}
pub use second_factor::SecondFactorConfig;

// ============================================================
// Password hashing configuration
// ============================================================

mod password {
    // ---
    use super::*;

    /// bcrypt accepts work factors from 4 to 31.
    const BCRYPT_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

    #[derive(Debug, Clone)]
    pub struct PasswordConfig {
        /// bcrypt work factor. Defaults to 12.
        pub bcrypt_cost: u32,
    }

    impl PasswordConfig {
        pub fn from_env() -> Self {
            // ---
            let cost = optional_env_parse!("CIVIC_BCRYPT_COST", u32, 12);

            Self {
                bcrypt_cost: cost.clamp(*BCRYPT_COST_RANGE.start(), *BCRYPT_COST_RANGE.end()),
            }
        }
    }
}
pub use password::PasswordConfig;

// ============================================================
// Cleanup configuration
// ============================================================

mod cleanup {
    // ---
    use super::*;

    /// Cleanup scheduler cadence.
    #[derive(Debug, Clone)]
    pub struct CleanupConfig {
        /// Interval between sweeps. Defaults to one hour.
        pub interval: Duration,
    }

    impl CleanupConfig {
        pub fn from_env() -> Self {
            // ---
            let secs = optional_env_parse!("CIVIC_CLEANUP_INTERVAL_SEC", u64, 3600);

            Self {
                interval: Duration::from_secs(secs.max(1)),
            }
        }
    }
}
pub use cleanup::CleanupConfig;

// ============================================================
// Tests
// ============================================================
