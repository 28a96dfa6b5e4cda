//! Credential and session lifecycle.
//!
//! Each component owns one concern; [`AuthService`] wires them together over
//! a single durable repository and a single ephemeral store.

mod cleanup;
mod devices;
mod oauth;
mod passkeys;
mod revocation;
mod secrets;
mod service;
mod sessions;
mod store;
mod tokens;
mod totp;

pub use cleanup::{CleanupReport, CleanupScheduler};
pub use devices::{fingerprint, DeviceTrust, TrustCheck, TRUST_WINDOW};
pub use oauth::{
    NormalizedIdentity, OAuthCoordinator, OAuthInit, OAuthProvider, ProviderProfile,
    ProviderTokens, ResolvedAccount,
};
pub use passkeys::{AssertionOutcome, PasskeyService};
pub use revocation::{LedgerCleanup, RevocationLedger};
pub use secrets::{provision, SigningSecrets, MIN_SECRET_LEN};
pub use service::{
    parse_bearer, AuthService, AuthTokens, AuthenticatedUser, LoginAttempt, OAuthLogin,
    ServiceSettings, MIN_PASSWORD_LEN,
};
pub use sessions::{derive_device_label, SessionStats, SessionTracker};
pub use store::RecordStore;
pub use tokens::{unverified_expiry, Claims, TokenEngine, TokenKind};
pub use totp::{SecondFactor, TotpSetup};

/// Convert a configured duration for timestamp arithmetic, saturating on overflow.
pub(crate) fn to_chrono(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::TimeDelta::MAX)
}
