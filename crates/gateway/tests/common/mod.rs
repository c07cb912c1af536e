#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common test utilities for integration tests.
//!
//! Tests drive the REAL gateway router built by `routes::router`, with the
//! identity service and counter store swapped for in-process doubles where a
//! test does not need a live HTTP peer.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use edge_gateway::services::identity::{
    Credentials, HttpIdentityService, IdentityError, IdentityService, Registration, UserSummary,
};
use edge_gateway::store::{CounterStore, StoreError};
use edge_gateway::{AppState, Config, routes};
use gateway_test_utils::TEST_SECRET;

/// Identity service double that accepts any credentials.
pub struct StaticIdentity;

#[async_trait]
impl IdentityService for StaticIdentity {
    async fn login(&self, credentials: &Credentials) -> Result<UserSummary, IdentityError> {
        Ok(UserSummary {
            user_id: format!("user-{}", credentials.username),
            username: credentials.username.clone(),
            role: "user".to_string(),
        })
    }

    async fn register(&self, credentials: &Credentials) -> Result<Registration, IdentityError> {
        Ok(Registration {
            user_id: format!("user-{}", credentials.username),
        })
    }
}

/// Identity service double that stalls before answering.
pub struct SlowIdentity(pub Duration);

#[async_trait]
impl IdentityService for SlowIdentity {
    async fn login(&self, credentials: &Credentials) -> Result<UserSummary, IdentityError> {
        tokio::time::sleep(self.0).await;
        StaticIdentity.login(credentials).await
    }

    async fn register(&self, credentials: &Credentials) -> Result<Registration, IdentityError> {
        tokio::time::sleep(self.0).await;
        StaticIdentity.register(credentials).await
    }
}

/// Counter store that is always unreachable.
pub struct FailingStore;

#[async_trait]
impl CounterStore for FailingStore {
    async fn increment(&self, _key: &str, _window: Duration) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn backend(&self) -> &'static str {
        "failing"
    }
}

/// Builder for a [`TestApp`].
pub struct TestAppBuilder {
    config: Config,
    identity: Arc<dyn IdentityService>,
    store: Option<Arc<dyn CounterStore>>,
}

impl TestAppBuilder {
    /// Use a real HTTP identity client pointed at `base_url`.
    pub fn identity_url(mut self, base_url: &str) -> Self {
        self.config.auth_service_url = base_url.to_string();
        self.identity = Arc::new(
            HttpIdentityService::new(base_url, Duration::from_secs(2))
                .expect("identity client"),
        );
        self
    }

    /// Enable rate limiting over `store`.
    pub fn rate_limited(mut self, store: Arc<dyn CounterStore>, limit: u64) -> Self {
        self.config.rate_limit_enabled = true;
        self.config.rate_limit = limit;
        self.store = Some(store);
        self
    }

    /// Use an in-process identity double.
    pub fn identity(mut self, identity: impl IdentityService + 'static) -> Self {
        self.identity = Arc::new(identity);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn upload_max_bytes(mut self, max: usize) -> Self {
        self.config.upload_max_bytes = max;
        self
    }

    pub fn build(self) -> TestApp {
        let state = AppState::with_services(&self.config, self.identity, self.store);
        TestApp {
            router: routes::router(state.clone()),
            state,
        }
    }
}

/// Test application wrapper using the REAL gateway routes and state.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            config: Config::new(TEST_SECRET),
            identity: Arc::new(StaticIdentity),
            store: None,
        }
    }

    /// Gateway without rate limiting and with [`StaticIdentity`].
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Send a request through the full router.
    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, path: &str) -> Response {
        self.request(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    pub async fn send(&self, method: Method, path: &str, token: Option<&str>) -> Response {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.request(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Response {
        self.request(
            Request::post(path)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

/// Read a response body as JSON.
pub async fn response_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Read a response body as text.
pub async fn response_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Build a single-part multipart body.
pub fn multipart_body(field: &str, filename: &str, content: &str) -> (String, String) {
    let boundary = "gateway-test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: text/plain\r\n\
         \r\n\
         {content}\r\n\
         --{boundary}--\r\n"
    );
    (format!("multipart/form-data; boundary={boundary}"), body)
}
