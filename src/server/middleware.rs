//! Request authentication middleware for protected routes.
//!
//! Buffers the body (the digest check needs the literal bytes), runs the
//! authenticator, and only then lets the request through to its handler. A
//! rejection never reaches handler code.

use std::net::SocketAddr;

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AuthError;
use crate::server::AppState;
use crate::trust::authenticator::{
    RawCredentials, HEADER_BODY_SHA256, HEADER_DEVICE_ID, HEADER_NONCE, HEADER_SIGNATURE,
    HEADER_TIMESTAMP,
};

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::MissingCredentials
            | AuthError::InvalidTimestamp
            | AuthError::RequestExpired { .. }
            | AuthError::SignatureInvalid => StatusCode::UNAUTHORIZED,
            AuthError::NonceReplay { .. } => StatusCode::CONFLICT,
            AuthError::DeviceUnauthorized { .. } => StatusCode::FORBIDDEN,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::BodyIntegrityFailure => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// Axum middleware running the full authentication sequence.
///
/// Wire up with `axum::middleware::from_fn_with_state(state, auth_middleware)`
/// on the protected routes only; pairing and admin routes stay outside it.
pub async fn auth_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let credentials = credentials_from_headers(&parts.headers);
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();

    if let Err(err) = state
        .authenticator
        .verify(method.as_str(), &path, credentials, &bytes, addr.ip())
        .await
    {
        tracing::warn!(path = %path, error = %err, "request rejected");
        return err.into_response();
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    next.run(request).await
}

fn credentials_from_headers(headers: &HeaderMap) -> RawCredentials {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    RawCredentials {
        device_id: get(HEADER_DEVICE_ID),
        timestamp: get(HEADER_TIMESTAMP),
        nonce: get(HEADER_NONCE),
        body_sha256: get(HEADER_BODY_SHA256),
        signature: get(HEADER_SIGNATURE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_read_headers_case_insensitively() {
        let mut headers = HeaderMap::new();
        headers.insert("X-DEX-DeviceId", "dev-1".parse().unwrap());
        headers.insert("x-dex-timestamp", "1700000000000".parse().unwrap());

        let credentials = credentials_from_headers(&headers);
        assert_eq!(credentials.device_id.as_deref(), Some("dev-1"));
        assert_eq!(credentials.timestamp.as_deref(), Some("1700000000000"));
        assert!(credentials.nonce.is_none());
    }

    #[test]
    fn test_auth_error_status_mapping() {
        let cases = [
            (AuthError::MissingCredentials, StatusCode::UNAUTHORIZED),
            (AuthError::InvalidTimestamp, StatusCode::UNAUTHORIZED),
            (
                AuthError::RequestExpired { skew_ms: 61_000 },
                StatusCode::UNAUTHORIZED,
            ),
            (
                AuthError::NonceReplay {
                    device_id: "d".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                AuthError::DeviceUnauthorized {
                    device_id: "d".to_string(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                AuthError::RateLimited {
                    device_id: "d".to_string(),
                },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (AuthError::BodyIntegrityFailure, StatusCode::BAD_REQUEST),
            (AuthError::SignatureInvalid, StatusCode::UNAUTHORIZED),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
