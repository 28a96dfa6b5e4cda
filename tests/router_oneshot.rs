//! Router tests driven in-process with `tower::ServiceExt::oneshot`.
//!
//! The state is assembled by hand, so no environment variables are read.

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderName, Request, StatusCode};
use axum::Router;
use civic_auth::auth::{provision, AuthService, ServiceSettings, TRUST_WINDOW};
use civic_auth::{
    build_router, create_ephemeral_store, create_memory_repository, create_noop_metrics, AppState,
    EphemeralBackend, Environment, RedisConfig, TokenConfig,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn settings() -> ServiceSettings {
    // ---
    ServiceSettings {
        tokens: TokenConfig {
            environment: Environment::Test,
            access_secret: None,
            refresh_secret: None,
            allow_ephemeral_secrets: true,
            access_ttl: Duration::from_secs(900),
            refresh_ttl: Duration::from_secs(3600),
        },
        session_ttl: Duration::from_secs(3600),
        trust_window: TRUST_WINDOW,
        challenge_ttl: Duration::from_secs(300),
        state_ttl: Duration::from_secs(600),
        totp_issuer: "CivicNet".to_string(),
        bcrypt_cost: 4,
    }
}

fn app() -> Router {
    app_behind(None)
}

/// Router that reads client addresses from `client_ip_header` when set.
fn app_behind(client_ip_header: Option<HeaderName>) -> Router {
    // ---
    let settings = settings();
    let secrets = provision(&settings.tokens).expect("generated secrets");
    let repository = create_memory_repository();
    let store = create_ephemeral_store(&RedisConfig {
        backend: EphemeralBackend::Memory,
        url: String::new(),
        key_prefix: "civic:".to_string(),
        passkey_challenge_ttl: settings.challenge_ttl,
        oauth_state_ttl: settings.state_ttl,
    })
    .expect("memory store");
    let metrics = create_noop_metrics().expect("noop metrics");

    let service = AuthService::assemble(
        &settings,
        &secrets,
        repository.clone(),
        store.clone(),
        metrics.clone(),
    );

    build_router(
        AppState::new(Arc::new(service), metrics, repository, store)
            .with_client_ip_header(client_ip_header),
    )
}

async fn call(app: &Router, method: &str, uri: &str, bearer: Option<&str>, body: Value) -> (StatusCode, Value) {
    // ---
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "oneshot-test/1.0");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn register_then_authenticated_stats() {
    // ---
    let app = app();

    let (status, pair) = call(
        &app,
        "POST",
        "/auth/register",
        None,
        json!({ "email": "one@example.test", "password": "long enough", "device_label": "Desk" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let access = pair["access_token"].as_str().unwrap().to_string();

    let (status, stats) = call(&app, "GET", "/auth/sessions/stats", Some(&access), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["active"], 1);
    assert_eq!(stats["devices"], json!(["Desk"]));
}

#[tokio::test]
async fn second_factor_requires_code_on_untrusted_device() {
    // ---
    let app = app();
    let creds = json!({ "email": "mfa@example.test", "password": "long enough" });

    let (_, pair) = call(&app, "POST", "/auth/register", None, creds.clone()).await;
    let access = pair["access_token"].as_str().unwrap().to_string();

    let (status, setup) = call(&app, "POST", "/auth/2fa/setup", Some(&access), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert!(setup["qr_payload"]
        .as_str()
        .unwrap()
        .starts_with("otpauth://totp/"));

    let (status, body) = call(
        &app,
        "POST",
        "/auth/2fa/enable",
        Some(&access),
        json!({ "code": "000000x" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);

    // Still disabled, so password alone works.
    let (status, _) = call(&app, "POST", "/auth/login", None, creds).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_and_missing_bearer() {
    // ---
    let app = app();

    let (status, body) = call(&app, "GET", "/auth/devices", None, Value::Null).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "unauthenticated" }));

    let (status, _) = call(&app, "GET", "/nope", None, Value::Null).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Register over a connection from `peer`, with an optional forwarded header,
/// and return the address the new session recorded.
async fn recorded_address(app: &Router, email: &str, peer: &str, forwarded: Option<&str>) -> Value {
    // ---
    let peer: SocketAddr = peer.parse().unwrap();
    let mut builder = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "oneshot-test/1.0")
        .extension(ConnectInfo(peer));
    if let Some(value) = forwarded {
        builder = builder.header("x-forwarded-for", value);
    }
    let body = json!({ "email": email, "password": "long enough" });
    let request = builder.body(Body::from(body.to_string())).unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let pair: Value = serde_json::from_slice(&bytes).unwrap();
    let access = pair["access_token"].as_str().unwrap();

    let (status, body) = call(app, "GET", "/auth/sessions", Some(access), Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    body["sessions"][0]["address"].clone()
}

#[tokio::test]
async fn session_address_is_the_socket_peer() {
    // ---
    let app = app();

    // A header the deployment never configured is ignored.
    let address = recorded_address(&app, "peer@example.test", "203.0.113.7:50123", Some("10.9.9.9")).await;
    assert_eq!(address, json!("203.0.113.7"));
}

#[tokio::test]
async fn session_address_follows_the_configured_proxy_header() {
    // ---
    let app = app_behind(Some(HeaderName::from_static("x-forwarded-for")));

    let address = recorded_address(
        &app,
        "proxied@example.test",
        "10.0.0.2:443",
        Some("198.51.100.4, 10.0.0.1"),
    )
    .await;
    assert_eq!(address, json!("198.51.100.4"));

    let address = recorded_address(&app, "direct@example.test", "10.0.0.2:443", None).await;
    assert_eq!(address, json!("10.0.0.2"));
}
