// src/lib.rs
use anyhow::{Context, Result};
use axum::{
    http::HeaderName,
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use handlers::health_check;
use handlers::metrics_handler;
use handlers::root_handler;

// Public exports (visible outside this module)
pub mod auth;
pub mod domain;

// Internal-only exports (sibling access within this module)
mod app_state;
mod config;
mod handlers;
mod infrastructure;

pub use app_state::AppState;
pub use config::*;

// Publicly expose the infrastructure creation functions
pub use infrastructure::{
    connect_with_retry, // ---
    create_ephemeral_store,
    create_memory_repository,
    create_noop_metrics,
    create_postgres_repository,
    create_prom_metrics,
};

use auth::{AuthService, CleanupScheduler, ServiceSettings};
use domain::{MetricsPtr, RepositoryPtr};

/// A fully wired service: the HTTP router plus the background sweeper that
/// the caller is expected to spawn.
pub struct Application {
    pub router: Router,
    pub cleanup: Arc<CleanupScheduler>,
}

/// Build the HTTP router from environment configuration.
pub async fn create_router() -> Result<Router> {
    // ---
    let config = AppConfig::from_env()?;
    Ok(create_application(&config).await?.router)
}

/// Wire storage, metrics and the auth service according to `config`.
///
/// # Errors
/// Fails when the signing secrets are misconfigured (always fatal in
/// production), or when a storage backend cannot be reached.
pub async fn create_application(config: &AppConfig) -> Result<Application> {
    // ---
    tracing_subscriber::fmt::try_init().ok(); // Ignores if already initialized

    let metrics = select_metrics(&config.server.metrics_type)?;

    let secrets = auth::provision(&config.tokens).context("signing secrets")?;
    if secrets.ephemeral {
        tracing::warn!("Using process-local signing secrets; tokens will not survive a restart");
    }

    let repository = select_repository(&config.database).await?;
    let store = create_ephemeral_store(&config.redis)?;

    let service = Arc::new(AuthService::assemble(
        &ServiceSettings::from_config(config),
        &secrets,
        repository.clone(),
        store.clone(),
        metrics.clone(),
    ));

    let cleanup = Arc::new(CleanupScheduler::new(
        service.ledger().clone(),
        store.clone(),
        metrics.clone(),
        config.cleanup.interval,
    ));

    let client_ip_header = match config.server.client_ip_header.as_deref() {
        Some(name) => Some(
            HeaderName::try_from(name.trim())
                .with_context(|| format!("CIVIC_CLIENT_IP_HEADER is not a header name: {name}"))?,
        ),
        None => None,
    };
    let app_state = AppState::new(service, metrics, repository, store)
        .with_client_ip_header(client_ip_header);

    Ok(Application {
        router: build_router(app_state),
        cleanup,
    })
}

fn select_metrics(metrics_type: &str) -> Result<MetricsPtr> {
    // ---
    if metrics_type == "prom" {
        create_prom_metrics()
    } else {
        create_noop_metrics()
    }
}

async fn select_repository(config: &DatabaseConfig) -> Result<RepositoryPtr> {
    // ---
    match config.backend {
        StorageBackend::Postgres => {
            let pool = connect_with_retry(config).await?;
            Ok(create_postgres_repository(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory repository; nothing is persisted");
            Ok(create_memory_repository())
        }
    }
}

/// Attach every route to `app_state`.
pub fn build_router(app_state: AppState) -> Router {
    // ---
    let public = Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh))
        .route("/passkeys/register", post(handlers::passkey::register))
        .route(
            "/passkeys/login/challenge",
            post(handlers::passkey::login_challenge),
        )
        .route("/passkeys/login", post(handlers::passkey::login))
        .route("/oauth/{provider}/init", post(handlers::oauth_init))
        .route("/oauth/{provider}/callback", post(handlers::oauth_callback));

    let protected = Router::new()
        .route("/logout", post(handlers::logout))
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/stats", get(handlers::session_stats))
        .route("/sessions/revoke-all", post(handlers::revoke_all_sessions))
        .route("/sessions/{id}", delete(handlers::revoke_session))
        .route(
            "/devices",
            get(handlers::list_devices).delete(handlers::revoke_all_devices),
        )
        .route("/devices/{id}", delete(handlers::revoke_device))
        .route("/2fa/setup", post(handlers::totp::setup))
        .route("/2fa/enable", post(handlers::totp::enable))
        .route("/2fa/disable", post(handlers::totp::disable))
        .route("/2fa/verify", post(handlers::totp::verify))
        .route(
            "/passkeys/register/challenge",
            post(handlers::passkey::register_challenge),
        )
        .route("/passkeys", get(handlers::passkey::list_credentials))
        .route(
            "/passkeys/{id}",
            delete(handlers::passkey::delete_credential),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            handlers::require_auth,
        ));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .nest("/auth", public.merge(protected))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            handlers::track_metrics,
        ))
        .with_state(app_state)
}
