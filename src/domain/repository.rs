use super::models::{
    BlacklistEntry, NewUser, OAuthAccount, PasskeyCredential, RefreshTokenRecord, User, UserId,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Abstraction for the durable auth tables.
///
/// Every method is a single statement or a single transaction; callers rely
/// on that for the rotation and passkey-counter invariants.
#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    // ---
    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Create a new user.
    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// Get user by ID.
    async fn get_user_by_id(&self, user_id: UserId) -> Result<Option<User>>;

    /// Get user by email (case-insensitive).
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Store (or clear) the second-factor secret without touching the enabled flag.
    async fn set_totp_secret(&self, user_id: UserId, secret: Option<&str>) -> Result<()>;

    /// Flip the second-factor enabled flag.
    async fn set_totp_enabled(&self, user_id: UserId, enabled: bool) -> Result<()>;

    // ------------------------------------------------------------------
    // Refresh-token registry
    // ------------------------------------------------------------------

    /// Insert a freshly issued refresh token row.
    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> Result<()>;

    /// Get a refresh token row by its token value.
    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>>;

    /// Revoke the old row and insert the new one in one transaction.
    ///
    /// The old row is only revoked if it belongs to `user_id`, is not yet
    /// revoked and has not expired. Returns `false` (and inserts nothing)
    /// when that condition does not hold.
    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        user_id: UserId,
        replacement: RefreshTokenRecord,
    ) -> Result<bool>;

    /// Mark one refresh token revoked. Returns `true` if a live row changed.
    async fn revoke_refresh_token(&self, token: &str, user_id: UserId) -> Result<bool>;

    /// Mark every live refresh token of a user revoked.
    async fn revoke_all_refresh_tokens(&self, user_id: UserId) -> Result<u64>;

    /// Delete refresh-token rows whose expiry has passed.
    async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64>;

    // ------------------------------------------------------------------
    // Blacklist
    // ------------------------------------------------------------------

    /// Insert (or refresh) a deny-list entry.
    async fn insert_blacklist_entry(&self, entry: BlacklistEntry) -> Result<()>;

    /// True if a deny-list entry for `token` exists that expires after `now`.
    async fn is_blacklisted(&self, token: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Delete deny-list entries whose expiry has passed.
    async fn delete_expired_blacklist_entries(&self, now: DateTime<Utc>) -> Result<u64>;

    // ------------------------------------------------------------------
    // Passkeys
    // ------------------------------------------------------------------

    /// Save a new credential. Returns `false` if the credential id already exists.
    async fn save_credential(&self, credential: PasskeyCredential) -> Result<bool>;

    /// Get a specific credential by its ID.
    async fn get_credential_by_id(&self, credential_id: &str)
        -> Result<Option<PasskeyCredential>>;

    /// Get all credentials for a user.
    async fn get_credentials_by_user(&self, user_id: UserId) -> Result<Vec<PasskeyCredential>>;

    /// Store `counter` only if it is strictly greater than the stored value.
    ///
    /// Returns `true` when the counter advanced (and last-used was refreshed).
    async fn advance_credential_counter(&self, credential_id: &str, counter: i64)
        -> Result<bool>;

    /// Delete a credential owned by `user_id`.
    async fn delete_credential(&self, user_id: UserId, credential_id: &str) -> Result<bool>;

    // ------------------------------------------------------------------
    // OAuth accounts
    // ------------------------------------------------------------------

    /// Look up the link for a provider identity.
    async fn get_oauth_account(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<OAuthAccount>>;

    /// Insert a link for an existing user.
    async fn insert_oauth_account(&self, account: OAuthAccount) -> Result<()>;

    /// Update profile data and provider tokens on an existing link.
    async fn update_oauth_account(&self, account: OAuthAccount) -> Result<()>;

    /// Create a user and its first OAuth link in one transaction.
    ///
    /// `account.user_id` is ignored and replaced by the new user's id.
    async fn create_user_with_oauth_account(
        &self,
        user: NewUser,
        account: OAuthAccount,
    ) -> Result<User>;
}

/// Type alias for any backend that implements Repository.
pub type RepositoryPtr = Arc<dyn Repository>;
