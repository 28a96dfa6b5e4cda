use serde_json::json;
use serial_test::serial;
use std::sync::Arc;

mod common;
use common::{token, unique_email, TestServer};

// NOTE: The Prometheus recorder is process-global.
// Tests are serial so the metrics backend env var is not raced.

async fn prom_server() -> TestServer {
    // ---
    common::setup_test_env();
    std::env::set_var("CIVIC_METRICS_TYPE", "prom");
    TestServer::new().await
}

async fn scrape(server: &TestServer) -> String {
    // ---
    let res = server.get("/metrics", None).await;
    assert!(res.status().is_success(), "Metrics endpoint should return success");
    res.text().await.unwrap()
}

#[tokio::test]
#[serial]
async fn prometheus_exports_auth_counters() {
    // ---
    let server = prom_server().await;

    // Issue a pair, fail one bearer check, then rotate.
    let pair = server.register(&unique_email("metrics")).await;
    let _ = server.get("/auth/sessions", Some("garbage")).await;
    let res = server
        .post(
            "/auth/refresh",
            None,
            json!({ "refresh_token": token(&pair, "refresh_token") }),
        )
        .await;
    assert!(res.status().is_success());

    let body = scrape(&server).await;
    for name in [
        "auth_tokens_issued_total",
        "auth_tokens_revoked_total",
        "auth_failures_total",
    ] {
        assert!(body.contains(name), "{name} missing from:\n{body}");
    }

    std::env::remove_var("CIVIC_METRICS_TYPE");
}

#[tokio::test]
#[serial]
async fn noop_metrics_still_answer() {
    // ---
    common::setup_test_env();
    std::env::set_var("CIVIC_METRICS_TYPE", "noop");

    let server = TestServer::new().await;
    let _ = server.get("/health", None).await;

    let res = server.get("/metrics", None).await;
    assert!(
        res.status().is_success(),
        "Metrics endpoint should return success even with noop"
    );

    std::env::remove_var("CIVIC_METRICS_TYPE");
}

#[tokio::test]
#[serial]
async fn metrics_endpoint_survives_load() {
    // ---
    let server = Arc::new(prom_server().await);

    let requests = (0..20).map(|i| {
        let server = Arc::clone(&server);
        async move {
            let path = match i % 3 {
                0 => "/health",
                1 => "/",
                _ => "/metrics",
            };
            server.get(path, None).await
        }
    });

    for (i, response) in futures::future::join_all(requests)
        .await
        .into_iter()
        .enumerate()
    {
        assert!(
            response.status().is_success(),
            "Request {i} should return success"
        );
    }

    assert!(!scrape(&server).await.is_empty());
    std::env::remove_var("CIVIC_METRICS_TYPE");
}

#[tokio::test]
#[serial]
async fn metrics_content_type_is_prometheus_text() {
    // ---
    let server = prom_server().await;

    let res = server.get("/metrics", None).await;
    let content_type = res
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"), "got {content_type}");

    std::env::remove_var("CIVIC_METRICS_TYPE");
}
