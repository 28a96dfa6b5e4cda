use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{
    BlacklistEntry, NewUser, OAuthAccount, PasskeyCredential, RefreshTokenRecord, Repository,
    User, UserId,
};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: Option<String>,
    phone: Option<String>,
    wallet_address: Option<String>,
    password_hash: Option<String>,
    totp_secret: Option<String>,
    totp_enabled: bool,
    email_verified: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        // ---
        User {
            id: r.id,
            email: r.email,
            phone: r.phone,
            wallet_address: r.wallet_address,
            password_hash: r.password_hash,
            totp_secret: r.totp_secret,
            totp_enabled: r.totp_enabled,
            email_verified: r.email_verified,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    token: String,
    user_id: i64,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked: bool,
    last_used_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    credential_id: String,
    user_id: i64,
    public_key: Vec<u8>,
    counter: i64,
    label: Option<String>,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl From<CredentialRow> for PasskeyCredential {
    fn from(r: CredentialRow) -> Self {
        // ---
        PasskeyCredential {
            credential_id: r.credential_id,
            user_id: r.user_id,
            public_key: r.public_key,
            counter: r.counter,
            label: r.label,
            created_at: r.created_at,
            last_used_at: r.last_used_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OAuthAccountRow {
    user_id: i64,
    provider: String,
    provider_user_id: String,
    email: Option<String>,
    name: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    created_at: DateTime<Utc>,
}

const USER_COLUMNS: &str = "id, email, phone, wallet_address, password_hash, totp_secret, \
                            totp_enabled, email_verified, created_at";

const INSERT_USER: &str = "INSERT INTO users (email, phone, wallet_address, password_hash, email_verified) \
     VALUES ($1, $2, $3, $4, $5) \
     RETURNING id, email, phone, wallet_address, password_hash, totp_secret, \
               totp_enabled, email_verified, created_at";

const INSERT_OAUTH_ACCOUNT: &str = "INSERT INTO oauth_accounts \
     (user_id, provider, provider_user_id, email, name, access_token, refresh_token, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

pub fn create_postgres_repository(pool: PgPool) -> impl Repository {
    // ---
    PostgresRepository::new(pool)
}

pub struct PostgresRepository {
    // ---
    pool: PgPool,
}

impl PostgresRepository {
    // ---
    pub fn new(pool: PgPool) -> Self {
        // ---
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Repository for PostgresRepository {
    // ---
    async fn create_user(&self, user: NewUser) -> Result<User> {
        // ---
        let row = sqlx::query_as::<_, UserRow>(INSERT_USER)
            .bind(user.email.as_deref().map(str::to_lowercase))
            .bind(&user.phone)
            .bind(&user.wallet_address)
            .bind(&user.password_hash)
            .bind(user.email_verified)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn get_user_by_id(&self, user_id: UserId) -> Result<Option<User>> {
        // ---
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        // ---
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn set_totp_secret(&self, user_id: UserId, secret: Option<&str>) -> Result<()> {
        // ---
        sqlx::query("UPDATE users SET totp_secret = $1 WHERE id = $2")
            .bind(secret)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_totp_enabled(&self, user_id: UserId, enabled: bool) -> Result<()> {
        // ---
        sqlx::query("UPDATE users SET totp_enabled = $1 WHERE id = $2")
            .bind(enabled)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> Result<()> {
        // ---
        sqlx::query(
            "INSERT INTO refresh_tokens (token, user_id, issued_at, expires_at, revoked, last_used_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&record.token)
        .bind(record.user_id)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(record.last_used_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        // ---
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            "SELECT token, user_id, issued_at, expires_at, revoked, last_used_at
             FROM refresh_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| RefreshTokenRecord {
            token: r.token,
            user_id: r.user_id,
            issued_at: r.issued_at,
            expires_at: r.expires_at,
            revoked: r.revoked,
            last_used_at: r.last_used_at,
        }))
    }

    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        user_id: UserId,
        replacement: RefreshTokenRecord,
    ) -> Result<bool> {
        // ---
        let mut tx = self.pool.begin().await?;

        // Row lock via the conditional UPDATE: a concurrent rotation of the
        // same token blocks here and then matches zero rows.
        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE, last_used_at = now()
             WHERE token = $1 AND user_id = $2 AND revoked = FALSE AND expires_at > now()",
        )
        .bind(old_token)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if revoked != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO refresh_tokens (token, user_id, issued_at, expires_at, revoked, last_used_at)
             VALUES ($1, $2, $3, $4, FALSE, NULL)",
        )
        .bind(&replacement.token)
        .bind(replacement.user_id)
        .bind(replacement.issued_at)
        .bind(replacement.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(true)
    }

    async fn revoke_refresh_token(&self, token: &str, user_id: UserId) -> Result<bool> {
        // ---
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE
             WHERE token = $1 AND user_id = $2 AND revoked = FALSE",
        )
        .bind(token)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_refresh_tokens(&self, user_id: UserId) -> Result<u64> {
        // ---
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1 AND revoked = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        // ---
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert_blacklist_entry(&self, entry: BlacklistEntry) -> Result<()> {
        // ---
        sqlx::query(
            "INSERT INTO token_blacklist (token, user_id, reason, expires_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (token) DO UPDATE
             SET reason = EXCLUDED.reason,
                 expires_at = GREATEST(token_blacklist.expires_at, EXCLUDED.expires_at)",
        )
        .bind(&entry.token)
        .bind(entry.user_id)
        .bind(&entry.reason)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_blacklisted(&self, token: &str, now: DateTime<Utc>) -> Result<bool> {
        // ---
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM token_blacklist WHERE token = $1 AND expires_at > $2)",
        )
        .bind(token)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn delete_expired_blacklist_entries(&self, now: DateTime<Utc>) -> Result<u64> {
        // ---
        let result = sqlx::query("DELETE FROM token_blacklist WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn save_credential(&self, credential: PasskeyCredential) -> Result<bool> {
        // ---
        let result = sqlx::query(
            "INSERT INTO passkey_credentials
                 (credential_id, user_id, public_key, counter, label, created_at, last_used_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (credential_id) DO NOTHING",
        )
        .bind(&credential.credential_id)
        .bind(credential.user_id)
        .bind(&credential.public_key)
        .bind(credential.counter)
        .bind(&credential.label)
        .bind(credential.created_at)
        .bind(credential.last_used_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_credential_by_id(&self, credential_id: &str) -> Result<Option<PasskeyCredential>> {
        // ---
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT credential_id, user_id, public_key, counter, label, created_at, last_used_at
             FROM passkey_credentials WHERE credential_id = $1",
        )
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PasskeyCredential::from))
    }

    async fn get_credentials_by_user(&self, user_id: UserId) -> Result<Vec<PasskeyCredential>> {
        // ---
        let rows = sqlx::query_as::<_, CredentialRow>(
            "SELECT credential_id, user_id, public_key, counter, label, created_at, last_used_at
             FROM passkey_credentials WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PasskeyCredential::from).collect())
    }

    async fn advance_credential_counter(&self, credential_id: &str, counter: i64) -> Result<bool> {
        // ---
        let result = sqlx::query(
            "UPDATE passkey_credentials SET counter = $1, last_used_at = now()
             WHERE credential_id = $2 AND counter < $1",
        )
        .bind(counter)
        .bind(credential_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_credential(&self, user_id: UserId, credential_id: &str) -> Result<bool> {
        // ---
        let result =
            sqlx::query("DELETE FROM passkey_credentials WHERE credential_id = $1 AND user_id = $2")
                .bind(credential_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_oauth_account(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<OAuthAccount>> {
        // ---
        let row = sqlx::query_as::<_, OAuthAccountRow>(
            "SELECT user_id, provider, provider_user_id, email, name, access_token, refresh_token, created_at
             FROM oauth_accounts WHERE provider = $1 AND provider_user_id = $2",
        )
        .bind(provider)
        .bind(provider_user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| OAuthAccount {
            user_id: r.user_id,
            provider: r.provider,
            provider_user_id: r.provider_user_id,
            email: r.email,
            name: r.name,
            access_token: r.access_token,
            refresh_token: r.refresh_token,
            created_at: r.created_at,
        }))
    }

    async fn insert_oauth_account(&self, account: OAuthAccount) -> Result<()> {
        // ---
        sqlx::query(INSERT_OAUTH_ACCOUNT)
            .bind(account.user_id)
            .bind(&account.provider)
            .bind(&account.provider_user_id)
            .bind(&account.email)
            .bind(&account.name)
            .bind(&account.access_token)
            .bind(&account.refresh_token)
            .bind(account.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_oauth_account(&self, account: OAuthAccount) -> Result<()> {
        // ---
        sqlx::query(
            "UPDATE oauth_accounts
             SET email = $1, name = $2, access_token = $3, refresh_token = $4
             WHERE provider = $5 AND provider_user_id = $6",
        )
        .bind(&account.email)
        .bind(&account.name)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(&account.provider)
        .bind(&account.provider_user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_user_with_oauth_account(
        &self,
        user: NewUser,
        account: OAuthAccount,
    ) -> Result<User> {
        // ---
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, UserRow>(INSERT_USER)
            .bind(user.email.as_deref().map(str::to_lowercase))
            .bind(&user.phone)
            .bind(&user.wallet_address)
            .bind(&user.password_hash)
            .bind(user.email_verified)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(INSERT_OAUTH_ACCOUNT)
            .bind(row.id)
            .bind(&account.provider)
            .bind(&account.provider_user_id)
            .bind(&account.email)
            .bind(&account.name)
            .bind(&account.access_token)
            .bind(&account.refresh_token)
            .bind(account.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(row.into())
    }
}
