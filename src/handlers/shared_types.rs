use crate::app_state::AppState;
use crate::domain::{AuthError, DeviceInfo};
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    // ---
    pub error: &'static str,
}

/// Acknowledgement for operations without a payload.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    // ---
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok(success: bool) -> Json<Self> {
        Json(Self { success })
    }
}

/// Number of records an operation affected.
#[derive(Debug, Serialize)]
pub struct CountResponse {
    // ---
    pub count: u64,
}

impl AuthError {
    // ---
    fn status(&self) -> StatusCode {
        // ---
        match self {
            AuthError::MissingCredential
            | AuthError::InvalidToken
            | AuthError::TokenRevoked
            | AuthError::WrongTokenKind
            | AuthError::RotationError
            | AuthError::ReplayDetected { .. }
            | AuthError::SecondFactorFailed
            | AuthError::SecondFactorRequired
            | AuthError::InvalidCredentials
            | AuthError::UnknownCredential => StatusCode::UNAUTHORIZED,
            AuthError::InvalidOAuthState | AuthError::InvalidChallenge => StatusCode::BAD_REQUEST,
            AuthError::SecondFactorAlreadyEnabled | AuthError::IdentifierTaken => {
                StatusCode::CONFLICT
            }
            AuthError::WeakPassword => StatusCode::UNPROCESSABLE_ENTITY,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::SecretMisconfigured(_) | AuthError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Boundary failures collapse to one `401 {"error":"unauthenticated"}` so a
/// caller cannot tell which check rejected it.
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: self.code() })).into_response()
    }
}

/// Network address of the caller, empty when unknown.
///
/// With a client-IP header configured on the state, the first entry of that
/// header wins. Otherwise the socket peer is used, which requires serving the
/// router with `into_make_service_with_connect_info::<SocketAddr>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddress(pub String);

impl FromRequestParts<AppState> for ClientAddress {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // ---
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(Self(client_address(
            &parts.headers,
            peer,
            state.client_ip_header(),
        )))
    }
}

fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>, forwarded: Option<&HeaderName>) -> String {
    // ---
    let from_proxy = forwarded
        .and_then(|name| headers.get(name))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (from_proxy, peer) {
        (Some(hop), _) => hop.to_string(),
        // Port changes per connection; only the IP identifies the client.
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => String::new(),
    }
}

/// Client description from request headers, the caller's address and an
/// optional caller label.
pub fn device_from_headers(headers: &HeaderMap, address: ClientAddress, label: Option<String>) -> DeviceInfo {
    // ---
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    DeviceInfo::new(user_agent, address.0).with_label(label)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use axum::body::to_bytes;
    use axum::http::HeaderValue;

    async fn body_of(err: AuthError) -> (StatusCode, String) {
        // ---
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn boundary_failures_are_indistinguishable() {
        // ---
        let expected = (
            StatusCode::UNAUTHORIZED,
            r#"{"error":"unauthenticated"}"#.to_string(),
        );
        for err in [
            AuthError::MissingCredential,
            AuthError::InvalidToken,
            AuthError::TokenRevoked,
            AuthError::WrongTokenKind,
        ] {
            assert_eq!(body_of(err).await, expected);
        }
    }

    #[tokio::test]
    async fn other_errors_carry_their_code() {
        // ---
        assert_eq!(
            body_of(AuthError::IdentifierTaken).await,
            (
                StatusCode::CONFLICT,
                r#"{"error":"identifier_taken"}"#.to_string()
            )
        );
        assert_eq!(
            body_of(AuthError::NotFound("session")).await.0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            body_of(AuthError::Persistence(anyhow::anyhow!("down"))).await,
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"error":"persistence_error"}"#.to_string()
            )
        );
    }

    #[test]
    fn device_reads_user_agent_and_address() {
        // ---
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.5"));
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://civic.example"));

        let address = ClientAddress("203.0.113.7".into());
        let device = device_from_headers(&headers, address, Some("CLI".into()));
        assert_eq!(device.user_agent, "curl/8.5");
        assert_eq!(device.address, "203.0.113.7");
        assert_eq!(device.label.as_deref(), Some("CLI"));

        assert_eq!(
            device_from_headers(&HeaderMap::new(), ClientAddress(String::new()), None),
            DeviceInfo::default()
        );
    }

    #[test]
    fn address_comes_from_the_peer_without_its_port() {
        // ---
        let peer: SocketAddr = "203.0.113.7:51234".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));

        // Without a configured header, a client-supplied one is ignored.
        assert_eq!(client_address(&headers, Some(peer), None), "203.0.113.7");
        assert_eq!(client_address(&headers, None, None), "");

        let v6: SocketAddr = "[2001:db8::7]:443".parse().unwrap();
        assert_eq!(client_address(&HeaderMap::new(), Some(v6), None), "2001:db8::7");
    }

    #[test]
    fn configured_header_takes_the_first_hop() {
        // ---
        let name = HeaderName::from_static("x-forwarded-for");
        let peer: SocketAddr = "10.0.0.2:8080".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 198.51.100.4 , 10.0.0.1"),
        );
        assert_eq!(client_address(&headers, Some(peer), Some(&name)), "198.51.100.4");

        // Missing or blank header falls back to the peer.
        assert_eq!(client_address(&HeaderMap::new(), Some(peer), Some(&name)), "10.0.0.2");
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        assert_eq!(client_address(&headers, Some(peer), Some(&name)), "10.0.0.2");
    }
}
