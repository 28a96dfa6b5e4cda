use std::sync::Arc;
use std::time::Instant;

/// Abstraction for application metrics (counters, histograms).
pub trait Metrics: Send + Sync + 'static {
    // ---
    /// Render current metrics in Prometheus text format.
    fn render(&self) -> String;

    /// Record a token being minted (`kind` is "access" or "refresh").
    fn record_token_issued(&self, kind: &'static str);

    /// Record a token being placed on the deny-list.
    fn record_token_revoked(&self, reason: &'static str);

    /// Record a rejected authentication attempt, labelled by error code.
    fn record_auth_failure(&self, code: &'static str);

    /// Record a passkey assertion whose counter did not advance.
    fn record_replay_detected(&self);

    /// Record the number of records removed by one cleanup sweep.
    fn record_cleanup(&self, removed: u64);

    /// Record HTTP request duration and labels.
    fn record_http_request(&self, start: Instant, path: &str, method: &str, status: u16);
}

/// Type alias for any backend that implements Metrics.
pub type MetricsPtr = Arc<dyn Metrics>;
