//! Passkey challenges, registration and assertion counters.
//!
//! Only the challenge lifecycle and the signature-counter replay rule are
//! enforced here. Attestation and signature checks belong to the client
//! library that produced the assertion.

use super::store::RecordStore;
use crate::domain::{
    AuthResult, ChallengePurpose, MetricsPtr, PasskeyChallenge, PasskeyCredential, RepositoryPtr,
    UserId,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use std::time::Duration;

const CHALLENGE_BYTES: usize = 32;

/// Result of checking an assertion's signature counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssertionOutcome {
    /// Counter advanced; the credential belongs to `user_id`.
    Verified { user_id: UserId },
    UnknownCredential,
    /// Counter did not advance. Nothing was updated.
    Replay { stored: i64, presented: i64 },
}

fn challenge_key(challenge: &str) -> String {
    format!("passkey:challenge:{challenge}")
}

pub struct PasskeyService {
    // ---
    repository: RepositoryPtr,
    store: RecordStore,
    metrics: MetricsPtr,
    challenge_ttl: Duration,
}

impl PasskeyService {
    // ---
    pub fn new(
        repository: RepositoryPtr,
        store: RecordStore,
        metrics: MetricsPtr,
        challenge_ttl: Duration,
    ) -> Self {
        // ---
        Self {
            repository,
            store,
            metrics,
            challenge_ttl,
        }
    }

    /// Issue a single-use challenge. `user_id` is set for registrations only.
    pub async fn issue_challenge(
        &self,
        purpose: ChallengePurpose,
        user_id: Option<UserId>,
    ) -> AuthResult<String> {
        // ---
        let mut bytes = [0u8; CHALLENGE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let challenge = URL_SAFE_NO_PAD.encode(bytes);

        let record = PasskeyChallenge {
            challenge: challenge.clone(),
            purpose,
            user_id,
            issued_at: Utc::now(),
        };
        self.store
            .put(&challenge_key(&challenge), &record, self.challenge_ttl)
            .await?;

        tracing::debug!("Issued {:?} passkey challenge", purpose);
        Ok(challenge)
    }

    /// Atomically read and delete a challenge. Expired or reused yields `None`.
    pub async fn consume_challenge(&self, challenge: &str) -> AuthResult<Option<PasskeyChallenge>> {
        // ---
        self.store.take(&challenge_key(challenge)).await
    }

    /// Register a credential. `false` if the id is already registered to anyone.
    pub async fn register(
        &self,
        user_id: UserId,
        credential_id: &str,
        public_key: Vec<u8>,
        label: Option<String>,
    ) -> AuthResult<bool> {
        // ---
        let credential =
            PasskeyCredential::new(credential_id.to_string(), user_id, public_key, label);
        let saved = self.repository.save_credential(credential).await?;

        if saved {
            tracing::info!("Registered passkey {} for user {}", credential_id, user_id);
        } else {
            tracing::warn!("Passkey id {} is already registered", credential_id);
        }
        Ok(saved)
    }

    /// Apply the strictly-increasing counter rule.
    ///
    /// The comparison and the update are one conditional write, so two
    /// concurrent assertions carrying the same counter cannot both pass.
    pub async fn verify_assertion(
        &self,
        credential_id: &str,
        counter: i64,
    ) -> AuthResult<AssertionOutcome> {
        // ---
        let Some(credential) = self.repository.get_credential_by_id(credential_id).await? else {
            return Ok(AssertionOutcome::UnknownCredential);
        };

        if self
            .repository
            .advance_credential_counter(credential_id, counter)
            .await?
        {
            return Ok(AssertionOutcome::Verified {
                user_id: credential.user_id,
            });
        }

        let stored = self
            .repository
            .get_credential_by_id(credential_id)
            .await?
            .map_or(credential.counter, |c| c.counter);

        self.metrics.record_replay_detected();
        tracing::warn!(
            "Passkey counter replay for credential {}: stored={}, presented={}",
            credential_id,
            stored,
            counter
        );

        Ok(AssertionOutcome::Replay {
            stored,
            presented: counter,
        })
    }

    pub async fn list_credentials(&self, user_id: UserId) -> AuthResult<Vec<PasskeyCredential>> {
        Ok(self.repository.get_credentials_by_user(user_id).await?)
    }

    pub async fn delete_credential(&self, user_id: UserId, credential_id: &str) -> AuthResult<bool> {
        // ---
        let deleted = self.repository.delete_credential(user_id, credential_id).await?;
        if deleted {
            tracing::info!("Deleted passkey {} for user {}", credential_id, user_id);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::auth::testing::Fixture;
    use crate::domain::{NewUser, Repository};

    async fn user_with_passkey(fx: &Fixture, credential_id: &str) -> UserId {
        // ---
        let user = fx
            .repo
            .create_user(NewUser {
                email: Some(format!("{credential_id}@example.test")),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(fx
            .passkeys
            .register(user.id, credential_id, vec![1, 2, 3], Some("Phone".into()))
            .await
            .unwrap());
        user.id
    }

    #[tokio::test]
    async fn challenges_are_random_and_single_use() {
        // ---
        let fx = Fixture::new();
        let a = fx
            .passkeys
            .issue_challenge(ChallengePurpose::Registration, Some(7))
            .await
            .unwrap();
        let b = fx
            .passkeys
            .issue_challenge(ChallengePurpose::Authentication, None)
            .await
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(URL_SAFE_NO_PAD.decode(&a).unwrap().len(), CHALLENGE_BYTES);

        let data = fx.passkeys.consume_challenge(&a).await.unwrap().unwrap();
        assert_eq!(data.purpose, ChallengePurpose::Registration);
        assert_eq!(data.user_id, Some(7));
        assert!(fx.passkeys.consume_challenge(&a).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_challenge_is_gone() {
        // ---
        let fx = Fixture::with_challenge_ttl(Duration::ZERO);
        let c = fx
            .passkeys
            .issue_challenge(ChallengePurpose::Authentication, None)
            .await
            .unwrap();

        assert!(fx.passkeys.consume_challenge(&c).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_credential_id_is_refused() {
        // ---
        let fx = Fixture::new();
        user_with_passkey(&fx, "cred-a").await;
        let other = fx
            .repo
            .create_user(NewUser::default())
            .await
            .unwrap();

        assert!(!fx
            .passkeys
            .register(other.id, "cred-a", vec![9], None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn counters_are_strictly_monotonic() {
        // ---
        let fx = Fixture::new();
        let user_id = user_with_passkey(&fx, "cred-m").await;

        assert_eq!(
            fx.passkeys.verify_assertion("cred-m", 5).await.unwrap(),
            AssertionOutcome::Verified { user_id }
        );
        assert_eq!(
            fx.passkeys.verify_assertion("cred-m", 5).await.unwrap(),
            AssertionOutcome::Replay {
                stored: 5,
                presented: 5
            }
        );
        assert_eq!(
            fx.passkeys.verify_assertion("cred-m", 4).await.unwrap(),
            AssertionOutcome::Replay {
                stored: 5,
                presented: 4
            }
        );
        assert_eq!(
            fx.passkeys.verify_assertion("cred-m", 6).await.unwrap(),
            AssertionOutcome::Verified { user_id }
        );
        assert!(matches!(
            fx.passkeys.verify_assertion("cred-m", 6).await.unwrap(),
            AssertionOutcome::Replay { .. }
        ));
    }

    #[tokio::test]
    async fn concurrent_assertions_cannot_both_advance() {
        // ---
        let fx = Fixture::new();
        user_with_passkey(&fx, "cred-c").await;

        let (a, b) = tokio::join!(
            fx.passkeys.verify_assertion("cred-c", 1),
            fx.passkeys.verify_assertion("cred-c", 1),
        );
        let verified = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|o| matches!(o, AssertionOutcome::Verified { .. }))
            .count();
        assert_eq!(verified, 1);
    }

    #[tokio::test]
    async fn unknown_credential_and_owner_scoped_delete() {
        // ---
        let fx = Fixture::new();
        let owner = user_with_passkey(&fx, "cred-d").await;

        assert_eq!(
            fx.passkeys.verify_assertion("missing", 1).await.unwrap(),
            AssertionOutcome::UnknownCredential
        );

        assert!(!fx.passkeys.delete_credential(owner + 1, "cred-d").await.unwrap());
        assert_eq!(fx.passkeys.list_credentials(owner).await.unwrap().len(), 1);
        assert!(fx.passkeys.delete_credential(owner, "cred-d").await.unwrap());
        assert!(fx.passkeys.list_credentials(owner).await.unwrap().is_empty());
    }
}
