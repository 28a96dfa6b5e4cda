//! `Metrics` backed by the process-wide Prometheus recorder.
//!
//! Counters live in the global `metrics` registry, so the handle itself
//! carries no data. Rendering goes through the `PrometheusHandle` held by
//! `recorder.rs`.

use crate::domain::Metrics;
use std::time::Instant;

#[derive(Debug, Default)]
pub struct PrometheusMetrics;

impl Metrics for PrometheusMetrics {
    // ---
    fn render(&self) -> String {
        super::render_metrics()
    }

    fn record_token_issued(&self, kind: &'static str) {
        super::increment_tokens_issued(kind);
    }

    fn record_token_revoked(&self, reason: &'static str) {
        super::increment_tokens_revoked(reason);
    }

    fn record_auth_failure(&self, code: &'static str) {
        tracing::debug!(code, "auth failure");
        super::increment_auth_failures(code);
    }

    fn record_replay_detected(&self) {
        super::increment_replays_detected();
    }

    fn record_cleanup(&self, removed: u64) {
        super::increment_cleanup_removed(removed);
    }

    fn record_http_request(&self, start: Instant, path: &str, method: &str, status: u16) {
        super::track_http_request(start, path, method, status);
    }
}
