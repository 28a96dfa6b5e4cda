//! Per-device login sessions.
//!
//! A session binds one login to device metadata and its current token pair.
//! Records live in the ephemeral store under `session:{id}`, and each user
//! has an index set `sessions:{user}` for multi-device enumeration.
//!
//! Request activity is kept apart from the record, under
//! `session:{id}:activity`. Activity writes therefore never touch the token
//! pair, and only `replace_tokens` rewrites a live record.

use super::revocation::RevocationLedger;
use super::store::RecordStore;
use super::to_chrono;
use crate::domain::{AuthResult, DeviceInfo, RevocationReason, Session, UserId};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Sessions with activity inside this window count as active.
const ACTIVE_WINDOW_MINUTES: i64 = 30;

/// Aggregate view over a user's sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub total: usize,
    pub active: usize,
    pub devices: Vec<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

pub struct SessionTracker {
    // ---
    store: RecordStore,
    ledger: Arc<RevocationLedger>,
    ttl: Duration,
}

fn session_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

fn activity_key(session_id: &str) -> String {
    format!("session:{session_id}:activity")
}

fn index_key(user_id: UserId) -> String {
    format!("sessions:{user_id}")
}

fn remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (expires_at - now).to_std().unwrap_or(Duration::ZERO)
}

impl SessionTracker {
    // ---
    pub fn new(store: RecordStore, ledger: Arc<RevocationLedger>, ttl: Duration) -> Self {
        // ---
        Self { store, ledger, ttl }
    }

    /// Record a new session and return its id.
    pub async fn create_session(
        &self,
        user_id: UserId,
        access_token: &str,
        refresh_token: &str,
        device: &DeviceInfo,
    ) -> AuthResult<String> {
        // ---
        let now = Utc::now();
        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            user_id,
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            device_label: device
                .label
                .clone()
                .unwrap_or_else(|| derive_device_label(&device.user_agent)),
            user_agent: device.user_agent.clone(),
            address: device.address.clone(),
            created_at: now,
            last_activity_at: now,
            expires_at: now + to_chrono(self.ttl),
        };

        self.store
            .put(&session_key(&session.session_id), &session, self.ttl)
            .await?;
        self.store
            .raw()
            .index_add(&index_key(user_id), &session.session_id, self.ttl)
            .await?;

        tracing::info!(
            "Created session {} for user {} ({})",
            session.session_id,
            user_id,
            session.device_label
        );

        Ok(session.session_id)
    }

    /// Live session by id. Expired records are evicted on read.
    pub async fn get_session(&self, session_id: &str) -> AuthResult<Option<Session>> {
        // ---
        let Some(mut session) = self.store.get::<Session>(&session_key(session_id)).await? else {
            return Ok(None);
        };

        if session.is_expired(Utc::now()) {
            self.remove(&session).await?;
            return Ok(None);
        }

        if let Some(seen) = self
            .store
            .get::<DateTime<Utc>>(&activity_key(session_id))
            .await?
        {
            session.last_activity_at = session.last_activity_at.max(seen);
        }

        Ok(Some(session))
    }

    /// All live sessions of a user, most recently active first.
    pub async fn list_sessions(&self, user_id: UserId) -> AuthResult<Vec<Session>> {
        // ---
        let index = index_key(user_id);
        let mut sessions = Vec::new();

        for session_id in self.store.raw().index_members(&index).await? {
            match self.get_session(&session_id).await? {
                Some(session) if session.user_id == user_id => sessions.push(session),
                _ => self.store.raw().index_remove(&index, &session_id).await?,
            }
        }

        sessions.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(sessions)
    }

    /// Revoke one session: both tokens are denied before the record goes away.
    pub async fn revoke_session(&self, session_id: &str) -> AuthResult<bool> {
        // ---
        let Some(session) = self.get_session(session_id).await? else {
            return Ok(false);
        };

        self.revoke(&session).await?;
        Ok(true)
    }

    /// Revoke every session of a user except `except`. Returns how many went.
    pub async fn revoke_all_sessions(
        &self,
        user_id: UserId,
        except: Option<&str>,
    ) -> AuthResult<usize> {
        // ---
        let mut count = 0;
        for session in self.list_sessions(user_id).await? {
            if Some(session.session_id.as_str()) == except {
                continue;
            }
            self.revoke(&session).await?;
            count += 1;
        }

        tracing::info!("Revoked {} session(s) for user {}", count, user_id);
        Ok(count)
    }

    /// Record activity. Does not extend the session's expiry.
    ///
    /// Only the activity key is written; the session record is left alone.
    pub async fn touch(&self, session_id: &str) -> AuthResult<bool> {
        // ---
        let Some(session) = self.get_session(session_id).await? else {
            return Ok(false);
        };

        let now = Utc::now();
        self.store
            .put(
                &activity_key(session_id),
                &now,
                remaining(session.expires_at, now),
            )
            .await?;

        Ok(true)
    }

    /// Move a session to a new token pair and slide its expiry.
    pub async fn replace_tokens(
        &self,
        session_id: &str,
        access_token: &str,
        refresh_token: &str,
    ) -> AuthResult<bool> {
        // ---
        let Some(mut session) = self.get_session(session_id).await? else {
            return Ok(false);
        };

        let now = Utc::now();
        session.access_token = access_token.to_string();
        session.refresh_token = refresh_token.to_string();
        session.last_activity_at = now;
        session.expires_at = now + to_chrono(self.ttl);

        // Revoked between the read and this write: stay revoked.
        if !self
            .store
            .put_if_present(&session_key(session_id), &session, self.ttl)
            .await?
        {
            return Ok(false);
        }
        self.store
            .raw()
            .index_add(&index_key(session.user_id), session_id, self.ttl)
            .await?;

        Ok(true)
    }

    pub async fn find_by_refresh_token(
        &self,
        user_id: UserId,
        refresh_token: &str,
    ) -> AuthResult<Option<Session>> {
        // ---
        Ok(self
            .list_sessions(user_id)
            .await?
            .into_iter()
            .find(|s| s.refresh_token == refresh_token))
    }

    pub async fn find_by_access_token(
        &self,
        user_id: UserId,
        access_token: &str,
    ) -> AuthResult<Option<Session>> {
        // ---
        Ok(self
            .list_sessions(user_id)
            .await?
            .into_iter()
            .find(|s| s.access_token == access_token))
    }

    pub async fn session_stats(&self, user_id: UserId) -> AuthResult<SessionStats> {
        // ---
        let sessions = self.list_sessions(user_id).await?;
        let active_since = Utc::now() - ChronoDuration::minutes(ACTIVE_WINDOW_MINUTES);

        let devices: BTreeSet<String> = sessions.iter().map(|s| s.device_label.clone()).collect();

        Ok(SessionStats {
            total: sessions.len(),
            active: sessions
                .iter()
                .filter(|s| s.last_activity_at >= active_since)
                .count(),
            devices: devices.into_iter().collect(),
            last_activity_at: sessions.iter().map(|s| s.last_activity_at).max(),
        })
    }

    async fn revoke(&self, session: &Session) -> AuthResult<()> {
        // ---
        self.deny_pair(session).await?;

        // A refresh may have moved the record to a new pair since it was read.
        let key = session_key(&session.session_id);
        if let Some(current) = self.store.take::<Session>(&key).await? {
            if current.access_token != session.access_token {
                if let Err(err) = self.deny_pair(&current).await {
                    let now = Utc::now();
                    self.store
                        .put(&key, &current, remaining(current.expires_at, now))
                        .await?;
                    return Err(err);
                }
            }
        }

        self.remove(session).await?;
        tracing::info!(
            "Revoked session {} for user {}",
            session.session_id,
            session.user_id
        );
        Ok(())
    }

    async fn deny_pair(&self, session: &Session) -> AuthResult<()> {
        // ---
        let reason = RevocationReason::SessionRevoked;
        self.ledger
            .blacklist(&session.access_token, session.user_id, reason)
            .await?;
        self.ledger
            .blacklist(&session.refresh_token, session.user_id, reason)
            .await?;
        self.ledger
            .revoke_refresh_token(&session.refresh_token, session.user_id)
            .await?;
        Ok(())
    }

    async fn remove(&self, session: &Session) -> AuthResult<()> {
        // ---
        self.store.delete(&session_key(&session.session_id)).await?;
        self.store.delete(&activity_key(&session.session_id)).await?;
        self.store
            .raw()
            .index_remove(&index_key(session.user_id), &session.session_id)
            .await?;
        Ok(())
    }
}

/// Short human-readable label such as "Firefox on Linux".
pub fn derive_device_label(user_agent: &str) -> String {
    // ---
    if user_agent.trim().is_empty() {
        return "Unknown device".to_string();
    }

    let browser = if user_agent.contains("Edg/") {
        "Edge"
    } else if user_agent.contains("Chrome/") {
        "Chrome"
    } else if user_agent.contains("Firefox/") {
        "Firefox"
    } else if user_agent.contains("Safari/") {
        "Safari"
    } else {
        "Browser"
    };

    // Mobile platforms embed desktop OS names, so they are matched first.
    let os = if user_agent.contains("Android") {
        "Android"
    } else if user_agent.contains("iPhone") || user_agent.contains("iPad") {
        "iOS"
    } else if user_agent.contains("Windows") {
        "Windows"
    } else if user_agent.contains("Mac OS X") {
        "macOS"
    } else if user_agent.contains("Linux") {
        "Linux"
    } else {
        return browser.to_string();
    };

    format!("{browser} on {os}")
}
