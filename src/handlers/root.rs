use axum::response::IntoResponse;

pub async fn root_handler() -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");
    format!(
        r#"CivicNet auth service
Version: {version}

Available endpoints:
  - POST   /auth/register                     - Create an account, returns a token pair
  - POST   /auth/login                        - Password login (code required when 2FA is on)
  - POST   /auth/refresh                      - Rotate the refresh token
  - POST   /auth/logout                       - Revoke the current token pair
  - GET    /auth/sessions                     - List your sessions
  - GET    /auth/sessions/stats               - Session summary
  - DELETE /auth/sessions/{{id}}                - Revoke one session
  - POST   /auth/sessions/revoke-all          - Revoke all sessions, optionally keeping one
  - GET    /auth/devices                      - List trusted devices
  - DELETE /auth/devices/{{id}}                 - Forget a trusted device
  - POST   /auth/2fa/{{setup,enable,disable,verify}}
  - POST   /auth/passkeys/register/challenge  - Start passkey registration
  - POST   /auth/passkeys/register            - Finish passkey registration
  - POST   /auth/passkeys/login/challenge     - Start passkey login
  - POST   /auth/passkeys/login               - Finish passkey login
  - GET    /auth/passkeys                     - List passkeys
  - DELETE /auth/passkeys/{{id}}                - Delete a passkey
  - POST   /auth/oauth/{{provider}}/init        - Start an OAuth round trip
  - POST   /auth/oauth/{{provider}}/callback    - Finish an OAuth round trip
  - GET    /health                            - Light health check
  - GET    /health?mode=full                  - Full health check (storage backends)
  - GET    /metrics                           - Prometheus metrics
"#
    )
}
