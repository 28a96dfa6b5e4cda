// Test helpers are intentionally partially used
#![allow(dead_code)]

use civic_auth::create_router;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::sync::Once;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;

macro_rules! set_env_if_unset {
    // ---
    ($key:expr, $val:expr) => {
        if std::env::var($key).is_err() {
            std::env::set_var($key, $val);
        }
    };
}

static INIT: Once = Once::new();

pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
pub const PASSWORD: &str = "correct horse battery";

// ============================================================================
// Test Setup
// ============================================================================

/// Initialize test environment variables once.
///
/// Every test server runs on the in-memory repository and ephemeral store,
/// so no external service is needed.
pub fn setup_test_env() {
    // ---
    INIT.call_once(|| {
        // ---
        set_env_if_unset!("CIVIC_ENV", "test");
        set_env_if_unset!("CIVIC_STORAGE_BACKEND", "memory");
        set_env_if_unset!("CIVIC_EPHEMERAL_BACKEND", "memory");
        set_env_if_unset!("CIVIC_ALLOW_EPHEMERAL_SECRETS", "true");
        set_env_if_unset!("CIVIC_METRICS_TYPE", "noop");
        set_env_if_unset!("CIVIC_BCRYPT_COST", "4");
    });
}

pub struct TestServer {
    pub addr: std::net::SocketAddr,
    pub client: Client,
}

impl TestServer {
    // ---
    pub async fn new() -> Self {
        // --
        setup_test_env();

        // Enable debug logging only when requested
        if std::env::var("TEST_DEBUG").is_ok() {
            std::env::set_var("RUST_LOG", "debug");
            std::env::set_var("NO_COLOR", "1");
        }

        let app = create_router().await.expect("Should be able to create router");
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Spawn the server in the background
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
            )
            .await
            .unwrap();
        });

        // Give the server a moment to start
        sleep(Duration::from_millis(100)).await;

        let client = Client::builder().user_agent(USER_AGENT).build().unwrap();

        Self { addr, client }
    }

    pub fn url(&self, path: &str) -> String {
        // ---
        format!("http://{}{}", self.addr, path)
    }

    /// POST a JSON body, optionally with a bearer token.
    pub async fn post(&self, path: &str, bearer: Option<&str>, body: Value) -> Response {
        // ---
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        req.send().await.expect("Failed to send request")
    }

    pub async fn get(&self, path: &str, bearer: Option<&str>) -> Response {
        // ---
        let mut req = self.client.get(self.url(path));
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        req.send().await.expect("Failed to send request")
    }

    pub async fn delete(&self, path: &str, bearer: Option<&str>) -> Response {
        // ---
        let mut req = self.client.delete(self.url(path));
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        req.send().await.expect("Failed to send request")
    }

    /// Register a fresh account and return the issued token pair.
    pub async fn register(&self, email: &str) -> Value {
        // ---
        let res = self
            .post(
                "/auth/register",
                None,
                json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(res.status(), 201, "registration should succeed");
        res.json().await.unwrap()
    }
}

/// Address unique to this process and call, so tests never collide.
pub fn unique_email(prefix: &str) -> String {
    // ---
    format!("{prefix}-{}@example.test", uuid::Uuid::new_v4().simple())
}

pub fn token(body: &Value, field: &str) -> String {
    // ---
    body[field]
        .as_str()
        .unwrap_or_else(|| panic!("missing {field} in {body}"))
        .to_string()
}
