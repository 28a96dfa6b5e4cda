mod noop_metrics;

pub use noop_metrics::NoopMetrics;
use std::sync::Arc;

/// Metrics backend selected by `CIVIC_METRICS_TYPE=noop`.
///
/// Every recording call is dropped and `/metrics` renders an empty body.
pub fn create() -> anyhow::Result<crate::domain::MetricsPtr> {
    // ---
    Ok(Arc::new(NoopMetrics))
}
