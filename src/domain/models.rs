use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric user identifier, assigned by the durable store.
pub type UserId = i64;

/// Identity anchor owned by the application.
///
/// This subsystem only reads identifiers and mutates the security fields
/// (second-factor secret and flag, email verification on OAuth creation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    // ---
    pub id: UserId,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub wallet_address: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing)]
    pub totp_secret: Option<String>,
    pub totp_enabled: bool,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields required to insert a user row.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    // ---
    pub email: Option<String>,
    pub phone: Option<String>,
    pub wallet_address: Option<String>,
    pub password_hash: Option<String>,
    pub email_verified: bool,
}

/// Persisted registry row for one issued refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    // ---
    pub token: String,
    pub user_id: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    // ---
    pub fn new(token: String, user_id: UserId, expires_at: DateTime<Utc>) -> Self {
        // ---
        Self {
            token,
            user_id,
            issued_at: Utc::now(),
            expires_at,
            revoked: false,
            last_used_at: None,
        }
    }
}

/// Why a token ended up on the deny-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    // ---
    Logout,
    Rotation,
    SessionRevoked,
    SecurityEvent,
    Manual,
}

impl RevocationReason {
    // ---
    pub fn as_str(&self) -> &'static str {
        // ---
        match self {
            RevocationReason::Logout => "logout",
            RevocationReason::Rotation => "rotation",
            RevocationReason::SessionRevoked => "session_revoked",
            RevocationReason::SecurityEvent => "security_event",
            RevocationReason::Manual => "manual",
        }
    }
}

impl std::fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deny-list entry. A token is revoked iff a non-expired entry exists for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    // ---
    pub token: String,
    pub user_id: UserId,
    pub reason: String,
    pub expires_at: DateTime<Utc>,
}

/// Client description captured at login time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    // ---
    pub user_agent: String,
    /// Network address of the client, empty when the transport did not expose one.
    pub address: String,
    /// Human-readable device label, derived from the user agent when absent.
    pub label: Option<String>,
}

impl DeviceInfo {
    // ---
    pub fn new(user_agent: impl Into<String>, address: impl Into<String>) -> Self {
        // ---
        Self {
            user_agent: user_agent.into(),
            address: address.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        // ---
        self.label = label;
        self
    }
}

/// One logical login instance bound to a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    // ---
    pub session_id: String,
    pub user_id: UserId,
    pub access_token: String,
    pub refresh_token: String,
    pub device_label: String,
    pub user_agent: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    // ---
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        // ---
        self.expires_at <= now
    }
}

/// Time-boxed exemption from the second factor for a recognized client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustedDevice {
    // ---
    pub device_id: String,
    pub user_id: UserId,
    pub fingerprint: String,
    pub trusted_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// Registered public-key credential (passkey).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasskeyCredential {
    // ---
    /// Opaque provider-issued credential id, unique across all users.
    pub credential_id: String,

    /// User this credential belongs to
    pub user_id: UserId,

    /// Public key material as presented at registration
    pub public_key: Vec<u8>,

    /// Signature counter (for replay attack prevention)
    pub counter: i64,

    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl PasskeyCredential {
    // ---
    pub fn new(
        credential_id: String,
        user_id: UserId,
        public_key: Vec<u8>,
        label: Option<String>,
    ) -> Self {
        // ---
        Self {
            credential_id,
            user_id,
            public_key,
            counter: 0,
            label,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }
}

/// What a passkey challenge may be redeemed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengePurpose {
    // ---
    Registration,
    Authentication,
}

/// Ephemeral single-use passkey challenge record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasskeyChallenge {
    // ---
    pub challenge: String,
    pub purpose: ChallengePurpose,
    /// Set for registration challenges only.
    pub user_id: Option<UserId>,
    pub issued_at: DateTime<Utc>,
}

/// Link between a local user and a third-party identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthAccount {
    // ---
    pub user_id: UserId,
    pub provider: String,
    pub provider_user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Ephemeral single-use CSRF state for an OAuth round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthStateToken {
    // ---
    pub state: String,
    pub provider: String,
    pub issued_at: DateTime<Utc>,
}
