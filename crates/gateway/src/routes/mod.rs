//! HTTP route handlers and the gateway router.

pub mod auth;
pub mod file;
pub mod health;
pub mod metrics;

use std::any::Any;
use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::ApiError;
use crate::middleware::{AccessLog, BearerAuth, CorsFilter, Pipeline};
use crate::state::AppState;

/// Versioned API prefix.
pub const API_PREFIX: &str = "/api/v1";

/// Filters every request passes through before routing: CORS, access log,
/// then the rate limiter when one is configured.
pub fn ingress_pipeline(state: &AppState) -> Pipeline {
    let pipeline = Pipeline::new()
        .with(CorsFilter)
        .with(AccessLog::new(Arc::clone(state.metrics())));

    match state.rate_limiter() {
        Some(limiter) => pipeline.with_shared(limiter.clone()),
        None => pipeline,
    }
}

/// Filters guarding the protected route group.
pub fn protected_pipeline(state: &AppState) -> Pipeline {
    Pipeline::new().with(BearerAuth::new(
        Arc::clone(state.tokens()),
        Arc::clone(state.metrics()),
    ))
}

/// Turn a handler panic into a 500 error body.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_default();
    error!(panic = %detail, "handler panicked");
    ApiError::Internal("Internal server error".to_string()).into_response()
}

/// Build the complete gateway router.
///
/// Timeouts and panics are turned into responses inside the ingress
/// pipeline, so they still carry CORS headers and show up in the access log.
pub fn router(state: AppState) -> Router {
    let protected = protected_pipeline(&state).wrap_routes(
        Router::new()
            .merge(auth::protected_router())
            .merge(file::router(state.upload_max_bytes())),
    );

    let app = Router::new()
        .merge(health::router())
        .merge(metrics::router())
        .nest(API_PREFIX, auth::router().merge(protected))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.request_timeout(),
        ))
        .layer(CatchPanicLayer::custom(panic_response));

    ingress_pipeline(&state)
        .wrap(app)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
