//! Authentication routes (login, register, validate).
//!
//! Login and register relay credentials to the identity service. Validate
//! answers from the authenticated request context without any network call.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tracing::{error, info};

use crate::error::{ApiError, ApiResult};
use crate::middleware::Identity;
use crate::services::identity::{Credentials, IdentityError};
use crate::state::AppState;

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: String,
    pub username: String,
    pub role: String,
}

/// Registration response.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user_id: String,
}

/// Token validation response.
#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub user_id: String,
    pub username: String,
    pub role: String,
}

/// Routes open to anonymous callers.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
}

/// Routes that require an authenticated caller.
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/auth/validate", post(validate))
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let credentials = credentials_from(payload)?;

    let user = state
        .identity()
        .login(&credentials)
        .await
        .map_err(|e| upstream_failure(&state, e))?;

    let token = state
        .tokens()
        .issue(&user.user_id, &user.username, &user.role)
        .map_err(|e| {
            error!(error = %e, "failed to issue token");
            ApiError::Internal("Failed to generate token".to_string())
        })?;

    info!(user_id = %user.user_id, username = %user.username, "user logged in");

    Ok(Json(LoginResponse {
        token,
        user_id: user.user_id,
        username: user.username,
        role: user.role,
    }))
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let credentials = credentials_from(payload)?;

    let registration = state
        .identity()
        .register(&credentials)
        .await
        .map_err(|e| upstream_failure(&state, e))?;

    info!(user_id = %registration.user_id, username = %credentials.username, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User created successfully",
            user_id: registration.user_id,
        }),
    ))
}

async fn validate(identity: Identity) -> Json<ValidateResponse> {
    Json(ValidateResponse {
        valid: true,
        user_id: identity.user_id,
        username: identity.username,
        role: identity.role,
    })
}

/// Unwrap a credentials body, rejecting blank fields.
fn credentials_from(payload: Result<Json<Credentials>, JsonRejection>) -> ApiResult<Credentials> {
    let Json(credentials) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;

    if credentials.username.trim().is_empty() || credentials.password.is_empty() {
        return Err(ApiError::Validation(
            "username and password are required".to_string(),
        ));
    }

    Ok(credentials)
}

fn upstream_failure(state: &AppState, err: IdentityError) -> ApiError {
    state.metrics().record_upstream_error();
    ApiError::from(err)
}
