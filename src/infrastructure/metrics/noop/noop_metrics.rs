use crate::domain::Metrics;
use std::time::Instant;

/// Discards every auth event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    // ---
    fn render(&self) -> String {
        String::new()
    }
    fn record_token_issued(&self, _: &'static str) {}
    fn record_token_revoked(&self, _: &'static str) {}
    fn record_auth_failure(&self, _: &'static str) {}
    fn record_replay_detected(&self) {}
    fn record_cleanup(&self, _: u64) {}
    fn record_http_request(&self, _: Instant, _: &str, _: &str, _: u16) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_nothing() {
        let metrics = NoopMetrics;
        metrics.record_token_issued("access");
        metrics.record_cleanup(3);
        assert!(metrics.render().is_empty());
    }
}
