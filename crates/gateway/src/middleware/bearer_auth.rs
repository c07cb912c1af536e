//! Bearer token authentication filter.
//!
//! Checks `Authorization: Bearer <token>`, verifies the token, and stores the
//! caller's [`Identity`] in the request extensions for handlers to extract.
//! Any failure ends the request with 401.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Request};
use axum::http::HeaderValue;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::debug;

use super::pipeline::Filter;
use crate::error::{ApiError, AuthFailure};
use crate::metrics::Metrics;
use crate::token::{Claims, TokenService};

/// Authenticated caller, valid for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub role: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.subject_id,
            username: claims.display_name,
            role: claims.role,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(ApiError::Auth(AuthFailure::MissingHeader))
    }
}

/// Extract the token from an `Authorization` header value.
///
/// The value must be exactly `Bearer <token>`: two parts on a single space,
/// the scheme spelled literally, and a non-empty token.
pub fn parse_bearer(header: Option<&HeaderValue>) -> Result<&str, AuthFailure> {
    let Some(header) = header.filter(|v| !v.is_empty()) else {
        return Err(AuthFailure::MissingHeader);
    };
    let Ok(value) = header.to_str() else {
        return Err(AuthFailure::InvalidFormat);
    };

    match value.split(' ').collect::<Vec<_>>().as_slice() {
        ["Bearer", token] if !token.is_empty() => Ok(*token),
        _ => Err(AuthFailure::InvalidFormat),
    }
}

/// Authenticate a request's headers against `tokens`.
pub fn authenticate(
    header: Option<&HeaderValue>,
    tokens: &TokenService,
) -> Result<Identity, AuthFailure> {
    let token = parse_bearer(header)?;
    let claims = tokens.verify(token).map_err(|e| {
        debug!(error = %e, "invalid bearer token");
        AuthFailure::InvalidToken
    })?;
    Ok(claims.into())
}

/// Filter that admits only requests carrying a valid bearer token.
#[derive(Debug, Clone)]
pub struct BearerAuth {
    tokens: Arc<TokenService>,
    metrics: Arc<Metrics>,
}

impl BearerAuth {
    pub fn new(tokens: Arc<TokenService>, metrics: Arc<Metrics>) -> Self {
        Self { tokens, metrics }
    }
}

#[async_trait]
impl Filter for BearerAuth {
    fn name(&self) -> &'static str {
        "bearer_auth"
    }

    async fn handle(&self, mut request: Request, next: Next) -> Response {
        match authenticate(request.headers().get(AUTHORIZATION), &self.tokens) {
            Ok(identity) => {
                request.extensions_mut().insert(identity);
                next.run(request).await
            }
            Err(failure) => {
                debug!(reason = %failure, path = %request.uri().path(), "authentication rejected");
                self.metrics.record_auth_failure();
                ApiError::Auth(failure).into_response()
            }
        }
    }
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"bearer-auth-test-secret-32-bytes!";

    fn header(value: &'static str) -> HeaderValue {
        HeaderValue::from_static(value)
    }

    #[test]
    fn test_parse_bearer_accepts_exact_scheme() {
        let value = header("Bearer abc.def.ghi");
        assert_eq!(parse_bearer(Some(&value)), Ok("abc.def.ghi"));
    }

    #[test]
    fn test_parse_bearer_missing() {
        assert_eq!(parse_bearer(None), Err(AuthFailure::MissingHeader));
        assert_eq!(
            parse_bearer(Some(&header(""))),
            Err(AuthFailure::MissingHeader)
        );
    }

    #[test]
    fn test_parse_bearer_rejects_bad_formats() {
        for raw in [
            "Bearer",
            "Bearer ",
            "bearer abc",
            "Basic dXNlcjpwYXNz",
            "Bearer abc def",
            "Bearer  abc",
            "Token abc",
        ] {
            assert_eq!(
                parse_bearer(Some(&header(raw))),
                Err(AuthFailure::InvalidFormat),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn test_authenticate_builds_identity() {
        let tokens = TokenService::new(SECRET);
        let token = tokens.issue("u-7", "carol", "admin").unwrap();
        let value = HeaderValue::from_str(&format!("Bearer {token}")).unwrap();

        let identity = authenticate(Some(&value), &tokens).unwrap();
        assert_eq!(
            identity,
            Identity {
                user_id: "u-7".to_string(),
                username: "carol".to_string(),
                role: "admin".to_string(),
            }
        );
    }

    #[test]
    fn test_authenticate_rejects_foreign_token() {
        let foreign = TokenService::new(b"another-secret-another-secret-32")
            .issue("u-7", "carol", "admin")
            .unwrap();
        let value = HeaderValue::from_str(&format!("Bearer {foreign}")).unwrap();

        assert_eq!(
            authenticate(Some(&value), &TokenService::new(SECRET)),
            Err(AuthFailure::InvalidToken)
        );
    }
}
