//! CORS headers and preflight handling.
//!
//! Every response carries a permissive CORS policy. `OPTIONS` requests are
//! answered here with 204 and never reach later filters or handlers.

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::pipeline::Filter;

const ALLOW_ORIGIN: HeaderValue = HeaderValue::from_static("*");
const ALLOW_METHODS: HeaderValue = HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS");
const ALLOW_HEADERS: HeaderValue =
    HeaderValue::from_static("Origin, Content-Type, Accept, Authorization");
const ALLOW_CREDENTIALS: HeaderValue = HeaderValue::from_static("true");

/// Stateless CORS filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorsFilter;

#[async_trait]
impl Filter for CorsFilter {
    fn name(&self) -> &'static str {
        "cors"
    }

    async fn handle(&self, request: Request, next: Next) -> Response {
        let mut response = if request.method() == Method::OPTIONS {
            StatusCode::NO_CONTENT.into_response()
        } else {
            next.run(request).await
        };

        apply_cors_headers(response.headers_mut());
        response
    }
}

/// Overwrite the CORS headers on `headers`.
pub fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW_ORIGIN);
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS);
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS);
    headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, ALLOW_CREDENTIALS);
}
