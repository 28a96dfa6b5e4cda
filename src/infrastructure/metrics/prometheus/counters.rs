use metrics::{counter, histogram};
use std::time::Instant;

/// Count minted tokens by kind.
pub fn increment_tokens_issued(kind: &'static str) {
    counter!("auth_tokens_issued_total", "kind" => kind).increment(1);
}

/// Count deny-list insertions by reason.
pub fn increment_tokens_revoked(reason: &'static str) {
    counter!("auth_tokens_revoked_total", "reason" => reason).increment(1);
}

/// Count rejected authentication attempts by error code.
pub fn increment_auth_failures(code: &'static str) {
    counter!("auth_failures_total", "code" => code).increment(1);
}

/// Count passkey assertions rejected for a non-advancing counter.
pub fn increment_replays_detected() {
    counter!("auth_passkey_replays_total").increment(1);
}

/// Count records removed by the cleanup sweep.
pub fn increment_cleanup_removed(removed: u64) {
    counter!("auth_cleanup_removed_total").increment(removed);
}

/// Track HTTP request latency using a histogram.
pub fn track_http_request(start: Instant, path: &str, method: &str, status: u16) {
    let elapsed = start.elapsed();
    histogram!(
        "http_request_duration_seconds",
        "path" => path.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .record(elapsed);
}
