//! Third-party identity linking.
//!
//! `init` hands out a single-use CSRF state bound to a provider. The
//! callback consumes that state before anything else, normalizes the
//! provider's profile and resolves it to a local user.

use super::store::RecordStore;
use crate::domain::{
    AuthError, AuthResult, NewUser, OAuthAccount, OAuthStateToken, RepositoryPtr, UserId,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

const STATE_BYTES: usize = 32;

// ============================================================================
// Providers and profiles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Github,
    Facebook,
}

impl OAuthProvider {
    // ---
    pub fn as_str(&self) -> &'static str {
        // ---
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Github => "github",
            OAuthProvider::Facebook => "facebook",
        }
    }
}

impl FromStr for OAuthProvider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(OAuthProvider::Google),
            "github" => Ok(OAuthProvider::Github),
            "facebook" => Ok(OAuthProvider::Facebook),
            _ => Err(AuthError::NotFound("provider")),
        }
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OpenID Connect userinfo.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub sub: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub name: Option<String>,
}

/// `GET /user` plus the primary address from `GET /user/emails`.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubProfile {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

/// Graph API `/me?fields=id,name,email`. Only confirmed addresses are returned.
#[derive(Debug, Clone, Deserialize)]
pub struct FacebookProfile {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A provider's profile in its native shape.
#[derive(Debug, Clone)]
pub enum ProviderProfile {
    Google(GoogleProfile),
    Github(GithubProfile),
    Facebook(FacebookProfile),
}

/// Provider-neutral identity used for account resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedIdentity {
    pub provider: OAuthProvider,
    pub provider_user_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
}

impl ProviderProfile {
    // ---
    /// Parse a raw profile document in the shape `provider` returns.
    pub fn parse(provider: OAuthProvider, raw: serde_json::Value) -> AuthResult<Self> {
        // ---
        let parsed = match provider {
            OAuthProvider::Google => serde_json::from_value(raw).map(ProviderProfile::Google),
            OAuthProvider::Github => serde_json::from_value(raw).map(ProviderProfile::Github),
            OAuthProvider::Facebook => serde_json::from_value(raw).map(ProviderProfile::Facebook),
        };

        parsed.map_err(|err| {
            tracing::warn!("Malformed {} profile: {}", provider, err);
            AuthError::InvalidCredentials
        })
    }

    pub fn provider(&self) -> OAuthProvider {
        // ---
        match self {
            ProviderProfile::Google(_) => OAuthProvider::Google,
            ProviderProfile::Github(_) => OAuthProvider::Github,
            ProviderProfile::Facebook(_) => OAuthProvider::Facebook,
        }
    }

    pub fn normalize(self) -> NormalizedIdentity {
        // ---
        let provider = self.provider();
        match self {
            ProviderProfile::Google(p) => NormalizedIdentity {
                provider,
                provider_user_id: p.sub,
                email: p.email,
                email_verified: p.email_verified,
                name: p.name,
            },
            ProviderProfile::Github(p) => NormalizedIdentity {
                provider,
                provider_user_id: p.id.to_string(),
                email_verified: p.verified && p.email.is_some(),
                email: p.email,
                name: p.name.or(Some(p.login)),
            },
            ProviderProfile::Facebook(p) => NormalizedIdentity {
                provider,
                provider_user_id: p.id,
                email_verified: p.email.is_some(),
                email: p.email,
                name: p.name,
            },
        }
    }
}

/// Tokens the provider issued for this user, stored alongside the link.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

// ============================================================================
// Coordinator
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct OAuthInit {
    pub state: String,
    pub provider: OAuthProvider,
}

/// Local user an external identity resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub user_id: UserId,
    pub is_new_user: bool,
}

fn state_key(state: &str) -> String {
    format!("oauth:state:{state}")
}

pub struct OAuthCoordinator {
    // ---
    repository: RepositoryPtr,
    store: RecordStore,
    state_ttl: Duration,
}

impl OAuthCoordinator {
    // ---
    pub fn new(repository: RepositoryPtr, store: RecordStore, state_ttl: Duration) -> Self {
        // ---
        Self {
            repository,
            store,
            state_ttl,
        }
    }

    pub async fn init(&self, provider: OAuthProvider) -> AuthResult<OAuthInit> {
        // ---
        let mut bytes = [0u8; STATE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let state = URL_SAFE_NO_PAD.encode(bytes);

        let record = OAuthStateToken {
            state: state.clone(),
            provider: provider.as_str().to_string(),
            issued_at: Utc::now(),
        };
        self.store
            .put(&state_key(&state), &record, self.state_ttl)
            .await?;

        Ok(OAuthInit { state, provider })
    }

    /// Consume `state`, then resolve `profile` to a local user.
    ///
    /// The state is deleted on first read whatever the outcome.
    pub async fn callback(
        &self,
        provider: OAuthProvider,
        state: &str,
        profile: serde_json::Value,
        tokens: ProviderTokens,
    ) -> AuthResult<ResolvedAccount> {
        // ---
        self.consume_state(provider, state).await?;

        let identity = ProviderProfile::parse(provider, profile)?.normalize();
        self.resolve(identity, tokens).await
    }

    async fn consume_state(&self, provider: OAuthProvider, state: &str) -> AuthResult<()> {
        // ---
        match self.store.take::<OAuthStateToken>(&state_key(state)).await? {
            Some(record) if record.provider == provider.as_str() => Ok(()),
            Some(record) => {
                tracing::warn!(
                    "OAuth state issued for {} presented to {}",
                    record.provider,
                    provider
                );
                Err(AuthError::InvalidOAuthState)
            }
            None => Err(AuthError::InvalidOAuthState),
        }
    }

    /// Existing link, then verified-email match, then a new user.
    pub async fn resolve(
        &self,
        identity: NormalizedIdentity,
        tokens: ProviderTokens,
    ) -> AuthResult<ResolvedAccount> {
        // ---
        let provider = identity.provider.as_str();
        let now = Utc::now();

        if let Some(existing) = self
            .repository
            .get_oauth_account(provider, &identity.provider_user_id)
            .await?
        {
            self.repository
                .update_oauth_account(OAuthAccount {
                    email: identity.email.clone(),
                    name: identity.name.clone(),
                    access_token: tokens.access_token,
                    refresh_token: tokens.refresh_token,
                    ..existing.clone()
                })
                .await?;

            tracing::info!("OAuth login for user {} via {}", existing.user_id, provider);
            return Ok(ResolvedAccount {
                user_id: existing.user_id,
                is_new_user: false,
            });
        }

        let account = OAuthAccount {
            user_id: 0,
            provider: provider.to_string(),
            provider_user_id: identity.provider_user_id.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            created_at: now,
        };

        let email_owner = match identity.email.as_deref() {
            Some(email) => self.repository.get_user_by_email(email).await?,
            None => None,
        };

        match email_owner {
            Some(user) if identity.email_verified => {
                self.repository
                    .insert_oauth_account(OAuthAccount {
                        user_id: user.id,
                        ..account
                    })
                    .await?;

                tracing::info!("Linked {} identity to existing user {}", provider, user.id);
                Ok(ResolvedAccount {
                    user_id: user.id,
                    is_new_user: false,
                })
            }
            owner => {
                // An unverified address that already belongs to someone is not claimed.
                let email = if owner.is_some() { None } else { identity.email.clone() };
                let new_user = NewUser {
                    email_verified: email.is_some() && identity.email_verified,
                    email,
                    ..Default::default()
                };

                let user = self
                    .repository
                    .create_user_with_oauth_account(new_user, account)
                    .await?;

                tracing::info!("Created user {} from {} identity", user.id, provider);
                Ok(ResolvedAccount {
                    user_id: user.id,
                    is_new_user: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::auth::testing::Fixture;
    use crate::domain::Repository;
    use serde_json::json;

    fn google(sub: &str, email: &str, verified: bool) -> serde_json::Value {
        json!({ "sub": sub, "email": email, "email_verified": verified, "name": "Ada" })
    }

    #[test]
    fn provider_names_round_trip() {
        // ---
        for p in [OAuthProvider::Google, OAuthProvider::Github, OAuthProvider::Facebook] {
            assert_eq!(p.as_str().parse::<OAuthProvider>().unwrap(), p);
        }
        assert!("myspace".parse::<OAuthProvider>().is_err());
    }

    #[test]
    fn profiles_normalize_per_provider() {
        // ---
        let gh = ProviderProfile::parse(
            OAuthProvider::Github,
            json!({ "id": 583231, "login": "octocat", "email": "o@gh.test", "verified": true }),
        )
        .unwrap()
        .normalize();
        assert_eq!(gh.provider_user_id, "583231");
        assert_eq!(gh.name.as_deref(), Some("octocat"));
        assert!(gh.email_verified);

        let fb = ProviderProfile::parse(OAuthProvider::Facebook, json!({ "id": "10", "name": "F" }))
            .unwrap()
            .normalize();
        assert!(fb.email.is_none());
        assert!(!fb.email_verified);

        assert!(matches!(
            ProviderProfile::parse(OAuthProvider::Google, json!({ "id": 1 })),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn state_is_single_use() {
        // ---
        let fx = Fixture::new();
        let init = fx.oauth.init(OAuthProvider::Google).await.unwrap();

        let first = fx
            .oauth
            .callback(
                OAuthProvider::Google,
                &init.state,
                google("g-1", "ada@example.test", true),
                ProviderTokens::default(),
            )
            .await
            .unwrap();
        assert!(first.is_new_user);

        let second = fx
            .oauth
            .callback(
                OAuthProvider::Google,
                &init.state,
                google("g-1", "ada@example.test", true),
                ProviderTokens::default(),
            )
            .await;
        assert!(matches!(second, Err(AuthError::InvalidOAuthState)));
    }

    #[tokio::test]
    async fn expired_or_mismatched_state_is_rejected_and_consumed() {
        // ---
        let expired = Fixture::with_state_ttl(Duration::ZERO);
        let init = expired.oauth.init(OAuthProvider::Github).await.unwrap();
        let result = expired
            .oauth
            .callback(OAuthProvider::Github, &init.state, json!({}), ProviderTokens::default())
            .await;
        assert!(matches!(result, Err(AuthError::InvalidOAuthState)));

        let fx = Fixture::new();
        let init = fx.oauth.init(OAuthProvider::Github).await.unwrap();
        let wrong = fx
            .oauth
            .callback(
                OAuthProvider::Google,
                &init.state,
                google("g-2", "x@example.test", true),
                ProviderTokens::default(),
            )
            .await;
        assert!(matches!(wrong, Err(AuthError::InvalidOAuthState)));

        // The mismatched attempt still burned the state.
        let retry = fx
            .oauth
            .callback(
                OAuthProvider::Github,
                &init.state,
                json!({ "id": 1, "login": "o" }),
                ProviderTokens::default(),
            )
            .await;
        assert!(matches!(retry, Err(AuthError::InvalidOAuthState)));
    }

    #[tokio::test]
    async fn existing_link_is_reused_and_refreshed() {
        // ---
        let fx = Fixture::new();
        let created = fx
            .oauth
            .resolve(
                ProviderProfile::parse(OAuthProvider::Google, google("g-3", "b@example.test", true))
                    .unwrap()
                    .normalize(),
                ProviderTokens::default(),
            )
            .await
            .unwrap();

        let again = fx
            .oauth
            .resolve(
                ProviderProfile::parse(OAuthProvider::Google, google("g-3", "b2@example.test", true))
                    .unwrap()
                    .normalize(),
                ProviderTokens {
                    access_token: Some("ya29".into()),
                    refresh_token: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(again.user_id, created.user_id);
        assert!(!again.is_new_user);

        let account = fx.repo.get_oauth_account("google", "g-3").await.unwrap().unwrap();
        assert_eq!(account.email.as_deref(), Some("b2@example.test"));
        assert_eq!(account.access_token.as_deref(), Some("ya29"));
    }

    #[tokio::test]
    async fn verified_email_links_to_existing_user() {
        // ---
        let fx = Fixture::new();
        let existing = fx
            .repo
            .create_user(NewUser {
                email: Some("carol@example.test".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let resolved = fx
            .oauth
            .resolve(
                ProviderProfile::parse(
                    OAuthProvider::Google,
                    google("g-4", "Carol@example.test", true),
                )
                .unwrap()
                .normalize(),
                ProviderTokens::default(),
            )
            .await
            .unwrap();

        assert_eq!(resolved.user_id, existing.id);
        assert!(!resolved.is_new_user);
        assert!(fx.repo.get_oauth_account("google", "g-4").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unverified_email_never_links() {
        // ---
        let fx = Fixture::new();
        let existing = fx
            .repo
            .create_user(NewUser {
                email: Some("dave@example.test".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        let resolved = fx
            .oauth
            .resolve(
                ProviderProfile::parse(
                    OAuthProvider::Google,
                    google("g-5", "dave@example.test", false),
                )
                .unwrap()
                .normalize(),
                ProviderTokens::default(),
            )
            .await
            .unwrap();

        assert!(resolved.is_new_user);
        assert_ne!(resolved.user_id, existing.id);
        let user = fx.repo.get_user_by_id(resolved.user_id).await.unwrap().unwrap();
        assert!(user.email.is_none());
    }

    #[tokio::test]
    async fn new_user_inherits_verified_flag() {
        // ---
        let fx = Fixture::new();
        let resolved = fx
            .oauth
            .resolve(
                ProviderProfile::parse(OAuthProvider::Google, google("g-6", "eve@example.test", true))
                    .unwrap()
                    .normalize(),
                ProviderTokens::default(),
            )
            .await
            .unwrap();

        let user = fx.repo.get_user_by_id(resolved.user_id).await.unwrap().unwrap();
        assert_eq!(user.email.as_deref(), Some("eve@example.test"));
        assert!(user.email_verified);
    }
}
