//! Trusted-device windows.
//!
//! A trusted device only lets the login flow skip the second factor. It
//! never stands in for the password. Clients are told apart by user agent
//! and network address; a client without a known address is never trusted.

use super::store::RecordStore;
use super::to_chrono;
use crate::domain::{AuthResult, TrustedDevice, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::time::Duration;
use uuid::Uuid;

/// Default length of a trust window.
pub const TRUST_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const FINGERPRINT_LEN: usize = 16;

/// Outcome of a trust lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustCheck {
    pub trusted: bool,
    pub device_id: Option<String>,
}

/// Coarse, deterministic client fingerprint. Collisions are acceptable.
pub fn fingerprint(user_agent: &str, address: &str) -> String {
    // ---
    let digest = Sha1::digest(format!("{user_agent}|{address}").as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_LEN);
    hex
}

fn device_key(user_id: UserId, fingerprint: &str) -> String {
    format!("device:{user_id}:{fingerprint}")
}

fn index_key(user_id: UserId) -> String {
    format!("devices:{user_id}")
}

fn remaining(until: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (until - now).to_std().unwrap_or(Duration::ZERO)
}

pub struct DeviceTrust {
    // ---
    store: RecordStore,
    window: Duration,
}

impl DeviceTrust {
    // ---
    pub fn new(store: RecordStore, window: Duration) -> Self {
        Self { store, window }
    }

    /// Trust this client for one window. Re-trusting renews the same device.
    pub async fn trust(&self, user_id: UserId, user_agent: &str, address: &str) -> AuthResult<String> {
        // ---
        let fp = fingerprint(user_agent, address);
        let key = device_key(user_id, &fp);
        let now = Utc::now();
        let trusted_until = now + to_chrono(self.window);

        let device = match self.store.get::<TrustedDevice>(&key).await? {
            Some(existing) => TrustedDevice {
                trusted_until,
                last_used_at: now,
                ..existing
            },
            None => TrustedDevice {
                device_id: Uuid::new_v4().to_string(),
                user_id,
                fingerprint: fp.clone(),
                trusted_until,
                created_at: now,
                last_used_at: now,
            },
        };

        self.store.put(&key, &device, self.window).await?;
        self.store
            .raw()
            .index_add(&index_key(user_id), &fp, self.window)
            .await?;

        tracing::info!("Trusted device {} for user {}", device.device_id, user_id);
        Ok(device.device_id)
    }

    /// Whether this client is inside a trust window. Refreshes last-used on a match.
    pub async fn is_trusted(
        &self,
        user_id: UserId,
        user_agent: &str,
        address: &str,
    ) -> AuthResult<TrustCheck> {
        // ---
        if address.is_empty() {
            return Ok(TrustCheck {
                trusted: false,
                device_id: None,
            });
        }

        let key = device_key(user_id, &fingerprint(user_agent, address));
        let now = Utc::now();

        match self.store.get::<TrustedDevice>(&key).await? {
            Some(mut device) if device.trusted_until > now => {
                device.last_used_at = now;
                self.store
                    .put(&key, &device, remaining(device.trusted_until, now))
                    .await?;
                Ok(TrustCheck {
                    trusted: true,
                    device_id: Some(device.device_id),
                })
            }
            _ => Ok(TrustCheck {
                trusted: false,
                device_id: None,
            }),
        }
    }

    /// Live trusted devices of a user.
    pub async fn list(&self, user_id: UserId) -> AuthResult<Vec<TrustedDevice>> {
        // ---
        let index = index_key(user_id);
        let now = Utc::now();
        let mut devices = Vec::new();

        for fp in self.store.raw().index_members(&index).await? {
            match self.store.get::<TrustedDevice>(&device_key(user_id, &fp)).await? {
                Some(device) if device.trusted_until > now => devices.push(device),
                _ => self.store.raw().index_remove(&index, &fp).await?,
            }
        }

        devices.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        Ok(devices)
    }

    pub async fn revoke(&self, user_id: UserId, device_id: &str) -> AuthResult<bool> {
        // ---
        let Some(device) = self
            .list(user_id)
            .await?
            .into_iter()
            .find(|d| d.device_id == device_id)
        else {
            return Ok(false);
        };

        self.forget(&device).await?;
        Ok(true)
    }

    pub async fn revoke_all(&self, user_id: UserId) -> AuthResult<usize> {
        // ---
        let devices = self.list(user_id).await?;
        for device in &devices {
            self.forget(device).await?;
        }
        Ok(devices.len())
    }

    async fn forget(&self, device: &TrustedDevice) -> AuthResult<()> {
        // ---
        self.store
            .delete(&device_key(device.user_id, &device.fingerprint))
            .await?;
        self.store
            .raw()
            .index_remove(&index_key(device.user_id), &device.fingerprint)
            .await?;
        tracing::info!(
            "Revoked trusted device {} for user {}",
            device.device_id,
            device.user_id
        );
        Ok(())
    }
}
