mod counters;
mod prometheus_metrics;
mod recorder;

pub use prometheus_metrics::PrometheusMetrics;
use std::sync::Arc;

// Free functions over the global registry
pub(crate) use counters::{
    increment_auth_failures, increment_cleanup_removed, increment_replays_detected,
    increment_tokens_issued, increment_tokens_revoked, track_http_request,
};
pub(crate) use recorder::{init_metrics, render_metrics};

/// Creates a new Prometheus metrics implementation.
///
/// The recorder is installed once per process; later calls reuse it.
pub fn create() -> anyhow::Result<crate::domain::MetricsPtr> {
    tracing::info!("Initializing Prometheus metrics");
    init_metrics()?;

    Ok(Arc::new(PrometheusMetrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_returns_valid_metrics() {
        let metrics = create().expect("prometheus metrics");
        metrics.record_token_issued("access");
        metrics.record_auth_failure("unauthenticated");
        assert!(metrics.render().contains("auth_tokens_issued_total"));
    }
}
