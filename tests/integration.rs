use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use civic_auth::create_router;
use serde_json::{json, Value};

mod common;
use common::{token, unique_email, TestServer, PASSWORD};

#[tokio::test]
#[serial_test::serial]
async fn basic_integration_test() {
    // ---
    // Test that the router can be created successfully
    common::setup_test_env();
    let _router = create_router()
        .await
        .expect("Should be able to create router");
}

#[tokio::test]
#[serial_test::serial]
async fn health_endpoint_works() {
    // ---
    let server = TestServer::new().await;

    let light = server.get("/health", None).await;
    assert!(light.status().is_success());

    let full = server.get("/health?mode=full", None).await;
    assert!(full.status().is_success());
    let body: Value = full.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
#[serial_test::serial]
async fn root_endpoint_works() {
    // ---
    let server = TestServer::new().await;

    let response = server.get("/", None).await;
    assert!(response.status().is_success());

    let body = response.text().await.expect("Failed to read response body");
    assert!(body.contains("/auth/login"));
    assert!(body.contains(env!("CARGO_PKG_VERSION")));
}

#[tokio::test]
#[serial_test::serial]
async fn login_refresh_logout_flow() {
    // ---
    let server = TestServer::new().await;
    let email = unique_email("flow");
    server.register(&email).await;

    // Login
    let res = server
        .post(
            "/auth/login",
            None,
            json!({ "email": email, "password": PASSWORD }),
        )
        .await;
    assert_eq!(res.status(), 200);
    let login: Value = res.json().await.unwrap();
    let access = token(&login, "access_token");
    let refresh = token(&login, "refresh_token");
    assert_eq!(login["token_type"], "Bearer");

    let res = server.get("/auth/sessions", Some(&access)).await;
    assert_eq!(res.status(), 200);

    // Refresh rotates
    let res = server
        .post("/auth/refresh", None, json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(res.status(), 200);
    let rotated: Value = res.json().await.unwrap();
    let new_access = token(&rotated, "access_token");
    let new_refresh = token(&rotated, "refresh_token");
    assert_ne!(new_refresh, refresh);

    // The old refresh token is dead
    let res = server
        .post("/auth/refresh", None, json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(res.status(), 401);

    // Logout revokes both halves of the new pair
    let res = server
        .post(
            "/auth/logout",
            Some(&new_access),
            json!({ "refresh_token": new_refresh }),
        )
        .await;
    assert_eq!(res.status(), 200);

    let res = server.get("/auth/sessions", Some(&new_access)).await;
    assert_eq!(res.status(), 401);
    let res = server
        .post("/auth/refresh", None, json!({ "refresh_token": new_refresh }))
        .await;
    assert_eq!(res.status(), 401);
}

#[tokio::test]
#[serial_test::serial]
async fn unauthenticated_responses_are_uniform() {
    // ---
    let server = TestServer::new().await;
    let pair = server.register(&unique_email("uniform")).await;
    let refresh = token(&pair, "refresh_token");

    let missing = server.get("/auth/sessions", None).await;
    let garbage = server.get("/auth/sessions", Some("not-a-jwt")).await;
    let wrong_kind = server.get("/auth/sessions", Some(&refresh)).await;

    for res in [missing, garbage, wrong_kind] {
        assert_eq!(res.status(), 401);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body, json!({ "error": "unauthenticated" }));
    }
}

#[tokio::test]
#[serial_test::serial]
async fn registration_errors_carry_codes() {
    // ---
    let server = TestServer::new().await;
    let email = unique_email("dup");
    server.register(&email).await;

    let res = server
        .post(
            "/auth/register",
            None,
            json!({ "email": email, "password": PASSWORD }),
        )
        .await;
    assert_eq!(res.status(), 409);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "identifier_taken");

    let res = server
        .post(
            "/auth/register",
            None,
            json!({ "email": unique_email("weak"), "password": "short" }),
        )
        .await;
    assert_eq!(res.status(), 422);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "weak_password");
}

#[tokio::test]
#[serial_test::serial]
async fn revoke_all_keeps_the_excepted_session() {
    // ---
    let server = TestServer::new().await;
    let email = unique_email("multi");
    let first = server.register(&email).await;

    let mut others = Vec::new();
    for _ in 0..2 {
        let res = server
            .post(
                "/auth/login",
                None,
                json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        others.push(res.json::<Value>().await.unwrap());
    }

    let access = token(&first, "access_token");
    let keep = token(&first, "session_id");

    let res = server.get("/auth/sessions/stats", Some(&access)).await;
    let stats: Value = res.json().await.unwrap();
    assert_eq!(stats["total"], 3);

    let res = server
        .post(
            "/auth/sessions/revoke-all",
            Some(&access),
            json!({ "except_session_id": keep }),
        )
        .await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["count"], 2);

    let res = server.get("/auth/sessions", Some(&access)).await;
    let body: Value = res.json().await.unwrap();
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["session_id"], keep.as_str());
    assert_eq!(sessions[0]["current"], true);
    assert!(sessions[0].get("access_token").is_none());

    for other in &others {
        let res = server
            .get("/auth/sessions", Some(&token(other, "access_token")))
            .await;
        assert_eq!(res.status(), 401);
    }
}

#[tokio::test]
#[serial_test::serial]
async fn foreign_session_is_not_found() {
    // ---
    let server = TestServer::new().await;
    let alice = server.register(&unique_email("alice")).await;
    let bob = server.register(&unique_email("bob")).await;

    let res = server
        .delete(
            &format!("/auth/sessions/{}", token(&alice, "session_id")),
            Some(&token(&bob, "access_token")),
        )
        .await;
    assert_eq!(res.status(), 404);

    let res = server
        .get("/auth/sessions", Some(&token(&alice, "access_token")))
        .await;
    assert_eq!(res.status(), 200);
}

#[tokio::test]
#[serial_test::serial]
async fn passkey_register_login_and_replay() {
    // ---
    let server = TestServer::new().await;
    let pair = server.register(&unique_email("passkey")).await;
    let access = token(&pair, "access_token");

    let res = server
        .post("/auth/passkeys/register/challenge", Some(&access), json!({}))
        .await;
    let challenge = token(&res.json::<Value>().await.unwrap(), "challenge");

    let res = server
        .post(
            "/auth/passkeys/register",
            None,
            json!({
                "challenge": challenge,
                "credential_id": "cred-int",
                "public_key": URL_SAFE_NO_PAD.encode([1u8, 2, 3, 4]),
                "label": "Laptop",
            }),
        )
        .await;
    assert_eq!(res.status(), 201);

    let login = |counter: i64| {
        let server = &server;
        async move {
            let res = server
                .post("/auth/passkeys/login/challenge", None, json!({}))
                .await;
            let challenge = token(&res.json::<Value>().await.unwrap(), "challenge");
            server
                .post(
                    "/auth/passkeys/login",
                    None,
                    json!({ "challenge": challenge, "credential_id": "cred-int", "counter": counter }),
                )
                .await
        }
    };

    let res = login(5).await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user_id"], pair["user_id"]);

    let res = login(5).await;
    assert_eq!(res.status(), 401);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "replay_detected");

    let res = server.get("/auth/passkeys", Some(&access)).await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["credentials"][0]["counter"], 5);
    assert!(body["credentials"][0].get("public_key").is_none());
}

#[tokio::test]
#[serial_test::serial]
async fn oauth_state_is_single_use() {
    // ---
    let server = TestServer::new().await;

    let res = server.post("/auth/oauth/google/init", None, json!({})).await;
    assert_eq!(res.status(), 200);
    let init: Value = res.json().await.unwrap();
    assert_eq!(init["provider"], "google");
    let state = token(&init, "state");

    let callback = json!({
        "state": state,
        "profile": {
            "sub": "g-1",
            "email": unique_email("oauth"),
            "email_verified": true,
            "name": "G User"
        }
    });

    let res = server
        .post("/auth/oauth/google/callback", None, callback.clone())
        .await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["is_new_user"], true);
    assert!(body["access_token"].is_string());

    let res = server
        .post("/auth/oauth/google/callback", None, callback)
        .await;
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_oauth_state");

    let res = server.post("/auth/oauth/myspace/init", None, json!({})).await;
    assert_eq!(res.status(), 404);
}
