//! Identity service client.
//!
//! The identity service owns user records and credential checks. The gateway
//! forwards credentials to it and relays the outcome; it never stores or
//! inspects passwords itself.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Username/password pair relayed to the identity service.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Identity returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: String,
    pub username: String,
    pub role: String,
}

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub user_id: String,
}

/// Identity service errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity service unreachable")]
    Transport(#[source] reqwest::Error),

    #[error("identity service returned {0}")]
    Status(StatusCode),

    #[error("invalid response from identity service")]
    Decode(#[source] reqwest::Error),

    #[error("failed to build identity service client")]
    Client(#[source] reqwest::Error),
}

/// Operations the gateway needs from the identity service.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Check credentials and return the matching user.
    async fn login(&self, credentials: &Credentials) -> Result<UserSummary, IdentityError>;

    /// Create a user record.
    async fn register(&self, credentials: &Credentials) -> Result<Registration, IdentityError>;
}

/// Identity service reached over HTTP with JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpIdentityService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIdentityService {
    /// Create a client for `base_url`; every call is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(IdentityError::Client)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        credentials: &Credentials,
    ) -> Result<T, IdentityError> {
        let url = format!("{}/{path}", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(credentials)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, path, "identity service request failed");
                IdentityError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, path, "identity service rejected request");
            return Err(IdentityError::Status(status));
        }

        response.json::<T>().await.map_err(|e| {
            warn!(error = %e, path, "identity service returned an unexpected body");
            IdentityError::Decode(e)
        })
    }
}

#[async_trait]
impl IdentityService for HttpIdentityService {
    async fn login(&self, credentials: &Credentials) -> Result<UserSummary, IdentityError> {
        self.post("login", credentials).await
    }

    async fn register(&self, credentials: &Credentials) -> Result<Registration, IdentityError> {
        self.post("register", credentials).await
    }
}
