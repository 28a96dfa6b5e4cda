use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::domain::{
    BlacklistEntry, NewUser, OAuthAccount, PasskeyCredential, RefreshTokenRecord, Repository,
    User, UserId,
};

#[derive(Default)]
struct Tables {
    next_user_id: UserId,
    users: HashMap<UserId, User>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
    blacklist: HashMap<String, BlacklistEntry>,
    credentials: HashMap<String, PasskeyCredential>,
    oauth_accounts: HashMap<(String, String), OAuthAccount>,
}

impl Tables {
    // ---
    fn insert_user(&mut self, user: NewUser) -> Result<User> {
        // ---
        let email = user.email.map(|e| e.to_lowercase());
        if let Some(email) = &email {
            if self.find_by_email(email).is_some() {
                bail!("duplicate key value violates unique constraint \"users_email_lower_idx\"");
            }
        }

        self.next_user_id += 1;
        let created = User {
            id: self.next_user_id,
            email,
            phone: user.phone,
            wallet_address: user.wallet_address,
            password_hash: user.password_hash,
            totp_secret: None,
            totp_enabled: false,
            email_verified: user.email_verified,
            created_at: Utc::now(),
        };

        self.users.insert(created.id, created.clone());
        Ok(created)
    }

    fn find_by_email(&self, email: &str) -> Option<&User> {
        // ---
        let wanted = email.to_lowercase();
        self.users
            .values()
            .find(|u| u.email.as_deref() == Some(wanted.as_str()))
    }

    fn user_mut(&mut self, user_id: UserId) -> Result<&mut User> {
        // ---
        match self.users.get_mut(&user_id) {
            Some(user) => Ok(user),
            None => bail!("user {user_id} does not exist"),
        }
    }
}

/// In-process implementation of the durable tables.
///
/// Mirrors the single-statement atomicity of the Postgres repository by
/// holding one lock per call. Intended for tests and local development; data
/// does not survive a restart. `set_unavailable` makes every call fail, which
/// is how the fail-secure paths are exercised.
#[derive(Default)]
pub struct MemoryRepository {
    // ---
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    deny_list_read_only: AtomicBool,
}

impl MemoryRepository {
    // ---
    pub fn new() -> Self {
        // ---
        Self::default()
    }

    /// Simulate the durable store going away (or coming back).
    pub fn set_unavailable(&self, unavailable: bool) {
        // ---
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail deny-list inserts only; every other table keeps working.
    pub fn set_deny_list_read_only(&self, read_only: bool) {
        // ---
        self.deny_list_read_only.store(read_only, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>> {
        // ---
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("storage unavailable");
        }

        self.tables
            .lock()
            .map_err(|_| anyhow::anyhow!("memory repository lock poisoned"))
    }
}

#[async_trait::async_trait]
impl Repository for MemoryRepository {
    // ---
    async fn create_user(&self, user: NewUser) -> Result<User> {
        self.lock()?.insert_user(user)
    }

    async fn get_user_by_id(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.lock()?.find_by_email(email).cloned())
    }

    async fn set_totp_secret(&self, user_id: UserId, secret: Option<&str>) -> Result<()> {
        // ---
        let mut tables = self.lock()?;
        tables.user_mut(user_id)?.totp_secret = secret.map(str::to_string);
        Ok(())
    }

    async fn set_totp_enabled(&self, user_id: UserId, enabled: bool) -> Result<()> {
        // ---
        let mut tables = self.lock()?;
        tables.user_mut(user_id)?.totp_enabled = enabled;
        Ok(())
    }

    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> Result<()> {
        // ---
        let mut tables = self.lock()?;
        if tables.refresh_tokens.contains_key(&record.token) {
            bail!("duplicate refresh token");
        }
        tables.refresh_tokens.insert(record.token.clone(), record);
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        Ok(self.lock()?.refresh_tokens.get(token).cloned())
    }

    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        user_id: UserId,
        replacement: RefreshTokenRecord,
    ) -> Result<bool> {
        // ---
        let mut tables = self.lock()?;
        let now = Utc::now();

        let Some(old) = tables.refresh_tokens.get_mut(old_token) else {
            return Ok(false);
        };

        if old.revoked || old.user_id != user_id || old.expires_at <= now {
            return Ok(false);
        }

        old.revoked = true;
        old.last_used_at = Some(now);
        tables
            .refresh_tokens
            .insert(replacement.token.clone(), replacement);

        Ok(true)
    }

    async fn revoke_refresh_token(&self, token: &str, user_id: UserId) -> Result<bool> {
        // ---
        let mut tables = self.lock()?;
        match tables.refresh_tokens.get_mut(token) {
            Some(row) if row.user_id == user_id && !row.revoked => {
                row.revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_refresh_tokens(&self, user_id: UserId) -> Result<u64> {
        // ---
        let mut tables = self.lock()?;
        let mut count = 0;
        for row in tables.refresh_tokens.values_mut() {
            if row.user_id == user_id && !row.revoked {
                row.revoked = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        // ---
        let mut tables = self.lock()?;
        let before = tables.refresh_tokens.len();
        tables.refresh_tokens.retain(|_, row| row.expires_at > now);
        Ok((before - tables.refresh_tokens.len()) as u64)
    }

    async fn insert_blacklist_entry(&self, entry: BlacklistEntry) -> Result<()> {
        // ---
        if self.deny_list_read_only.load(Ordering::SeqCst) {
            bail!("deny list is read-only");
        }
        let mut tables = self.lock()?;
        let expires_at = match tables.blacklist.get(&entry.token) {
            Some(existing) => existing.expires_at.max(entry.expires_at),
            None => entry.expires_at,
        };
        tables.blacklist.insert(
            entry.token.clone(),
            BlacklistEntry {
                expires_at,
                ..entry
            },
        );
        Ok(())
    }

    async fn is_blacklisted(&self, token: &str, now: DateTime<Utc>) -> Result<bool> {
        // ---
        Ok(self
            .lock()?
            .blacklist
            .get(token)
            .is_some_and(|entry| entry.expires_at > now))
    }

    async fn delete_expired_blacklist_entries(&self, now: DateTime<Utc>) -> Result<u64> {
        // ---
        let mut tables = self.lock()?;
        let before = tables.blacklist.len();
        tables.blacklist.retain(|_, entry| entry.expires_at > now);
        Ok((before - tables.blacklist.len()) as u64)
    }

    async fn save_credential(&self, credential: PasskeyCredential) -> Result<bool> {
        // ---
        let mut tables = self.lock()?;
        if !tables.users.contains_key(&credential.user_id) {
            bail!("user {} does not exist", credential.user_id);
        }
        if tables.credentials.contains_key(&credential.credential_id) {
            return Ok(false);
        }
        tables
            .credentials
            .insert(credential.credential_id.clone(), credential);
        Ok(true)
    }

    async fn get_credential_by_id(&self, credential_id: &str) -> Result<Option<PasskeyCredential>> {
        Ok(self.lock()?.credentials.get(credential_id).cloned())
    }

    async fn get_credentials_by_user(&self, user_id: UserId) -> Result<Vec<PasskeyCredential>> {
        // ---
        let tables = self.lock()?;
        let mut creds: Vec<_> = tables
            .credentials
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        creds.sort_by_key(|c| c.created_at);
        Ok(creds)
    }

    async fn advance_credential_counter(&self, credential_id: &str, counter: i64) -> Result<bool> {
        // ---
        let mut tables = self.lock()?;
        match tables.credentials.get_mut(credential_id) {
            Some(cred) if counter > cred.counter => {
                cred.counter = counter;
                cred.last_used_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_credential(&self, user_id: UserId, credential_id: &str) -> Result<bool> {
        // ---
        let mut tables = self.lock()?;
        let owned = tables
            .credentials
            .get(credential_id)
            .is_some_and(|c| c.user_id == user_id);
        if owned {
            tables.credentials.remove(credential_id);
        }
        Ok(owned)
    }

    async fn get_oauth_account(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<OAuthAccount>> {
        // ---
        let key = (provider.to_string(), provider_user_id.to_string());
        Ok(self.lock()?.oauth_accounts.get(&key).cloned())
    }

    async fn insert_oauth_account(&self, account: OAuthAccount) -> Result<()> {
        // ---
        let mut tables = self.lock()?;
        let key = (account.provider.clone(), account.provider_user_id.clone());
        if tables.oauth_accounts.contains_key(&key) {
            bail!("duplicate oauth account {}:{}", key.0, key.1);
        }
        tables.oauth_accounts.insert(key, account);
        Ok(())
    }

    async fn update_oauth_account(&self, account: OAuthAccount) -> Result<()> {
        // ---
        let mut tables = self.lock()?;
        let key = (account.provider.clone(), account.provider_user_id.clone());
        if let Some(existing) = tables.oauth_accounts.get_mut(&key) {
            existing.email = account.email;
            existing.name = account.name;
            existing.access_token = account.access_token;
            existing.refresh_token = account.refresh_token;
        }
        Ok(())
    }

    async fn create_user_with_oauth_account(
        &self,
        user: NewUser,
        account: OAuthAccount,
    ) -> Result<User> {
        // ---
        let mut tables = self.lock()?;
        let key = (account.provider.clone(), account.provider_user_id.clone());
        if tables.oauth_accounts.contains_key(&key) {
            bail!("duplicate oauth account {}:{}", key.0, key.1);
        }

        let created = tables.insert_user(user)?;
        tables.oauth_accounts.insert(
            key,
            OAuthAccount {
                user_id: created.id,
                ..account
            },
        );
        Ok(created)
    }
}
