//! Router state.
//!
//! One `AppState` is built at startup and cloned into every request. It holds
//! the assembled `AuthService` plus the backends the health and metrics
//! endpoints read directly. Everything sits behind an `Arc`.

use crate::auth::AuthService;
use crate::domain::{EphemeralStorePtr, MetricsPtr, RepositoryPtr};
use axum::http::HeaderName;
use std::sync::Arc;

/// Handlers see only trait objects here, never a concrete Postgres or
/// Redis backend. `create_application` wires the concrete ones in.
#[derive(Clone)]
pub struct AppState {
    /// Credential and session flows.
    auth: Arc<AuthService>,

    /// Prometheus or no-op, per `CIVIC_METRICS_TYPE`.
    metrics: MetricsPtr,

    /// Durable storage, probed by the full health check.
    repository: RepositoryPtr,

    /// Sessions, challenges and OAuth states. Probed by the full health check.
    store: EphemeralStorePtr,

    /// Header a fronting proxy writes the client address into, if any.
    client_ip_header: Option<HeaderName>,
}

impl AppState {
    // ---

    pub fn new(
        auth: Arc<AuthService>,
        metrics: MetricsPtr,
        repository: RepositoryPtr,
        store: EphemeralStorePtr,
    ) -> Self {
        // ---
        AppState {
            auth,
            metrics,
            repository,
            store,
            client_ip_header: None,
        }
    }

    /// Read client addresses from `header` instead of the socket peer.
    pub fn with_client_ip_header(mut self, header: Option<HeaderName>) -> Self {
        // ---
        self.client_ip_header = header;
        self
    }

    pub(crate) fn auth(&self) -> &AuthService {
        // ---
        &self.auth
    }

    pub(crate) fn metrics(&self) -> &MetricsPtr {
        // ---
        &self.metrics
    }

    pub(crate) fn repository(&self) -> &RepositoryPtr {
        &self.repository
    }

    pub(crate) fn store(&self) -> &EphemeralStorePtr {
        &self.store
    }

    pub(crate) fn client_ip_header(&self) -> Option<&HeaderName> {
        self.client_ip_header.as_ref()
    }
}
