//! Edge gateway test utilities.
//!
//! Helpers for integration testing: token fixtures (valid, expired, signed
//! with a foreign secret or a foreign algorithm), a scripted in-process
//! identity service, and assertion utilities for JSON responses.

// Test support code; panicking on setup failure is the desired behaviour.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{StatusCode, Uri};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

/// Signing secret shared by test gateways and token fixtures.
pub const TEST_SECRET: &str = "test-secret-0123456789abcdef-0123456789";

/// Create token claims for `username`, valid for one hour from now.
pub fn test_claims(username: &str) -> TestClaims {
    let now = chrono::Utc::now().timestamp();
    TestClaims {
        user_id: format!("user-{username}"),
        username: username.to_string(),
        role: "user".to_string(),
        issued_at: now,
        expires_at: now + 3600,
    }
}

/// A token claims builder for creating test fixtures.
#[derive(Debug, Clone)]
pub struct TestClaims {
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl TestClaims {
    /// Set a custom user ID.
    pub fn with_user_id(mut self, user_id: &str) -> Self {
        self.user_id = user_id.to_string();
        self
    }

    /// Set the role.
    pub fn with_role(mut self, role: &str) -> Self {
        self.role = role.to_string();
        self
    }

    /// Issued two hours ago, expired one hour ago.
    pub fn expired(mut self) -> Self {
        let now = chrono::Utc::now().timestamp();
        self.issued_at = now - 7200;
        self.expires_at = now - 3600;
        self
    }

    /// JWT payload using the gateway's wire names.
    pub fn to_json(&self) -> Value {
        json!({
            "user_id": self.user_id,
            "username": self.username,
            "role": self.role,
            "iat": self.issued_at,
            "exp": self.expires_at,
        })
    }

    /// Sign with HS256 and [`TEST_SECRET`].
    pub fn sign(&self) -> String {
        self.sign_with(Algorithm::HS256, TEST_SECRET)
    }

    /// Sign with an arbitrary HMAC algorithm and secret.
    pub fn sign_with(&self, alg: Algorithm, secret: &str) -> String {
        jsonwebtoken::encode(
            &Header::new(alg),
            &self.to_json(),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("signing test token")
    }

    /// Token whose header names `alg` and whose signature is junk.
    pub fn forge_with_alg(&self, alg: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(json!({ "alg": alg, "typ": "JWT" }).to_string());
        let payload = URL_SAFE_NO_PAD.encode(self.to_json().to_string());
        let signature = URL_SAFE_NO_PAD.encode(b"forged");
        format!("{header}.{payload}.{signature}")
    }
}

/// A request received by an [`IdentityStub`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub body: Value,
}

/// Scripted identity service listening on `127.0.0.1`.
///
/// Every request is recorded and answered with the status and JSON body the
/// responder returns for its path. The server stops when the stub is dropped.
pub struct IdentityStub {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: JoinHandle<()>,
}

impl IdentityStub {
    /// Answer every path with the same status and body.
    pub async fn start(status: u16, body: Value) -> Self {
        Self::start_with(move |_| (status, body.clone())).await
    }

    /// Answer each path with whatever `respond` returns for it.
    pub async fn start_with<F>(respond: F) -> Self
    where
        F: Fn(&str) -> (u16, Value) + Send + Sync + 'static,
    {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let respond = Arc::new(respond);

        let recorded = Arc::clone(&requests);
        let app = Router::new().fallback(move |uri: Uri, body: Bytes| {
            let respond = Arc::clone(&respond);
            let recorded = Arc::clone(&recorded);
            async move {
                let path = uri.path().to_string();
                recorded.lock().push(RecordedRequest {
                    path: path.clone(),
                    body: serde_json::from_slice(&body).unwrap_or(Value::Null),
                });

                let (status, reply) = respond(&path);
                let status = StatusCode::from_u16(status).expect("valid stub status");
                (status, Json(reply))
            }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind identity stub");
        let addr = listener.local_addr().expect("identity stub address");
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            addr,
            requests,
            task,
        }
    }

    /// Base URL to configure as the identity service.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

impl Drop for IdentityStub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// URL of a local port with nothing listening on it.
pub async fn unused_local_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    let addr = listener.local_addr().expect("probe address");
    drop(listener);
    format!("http://{addr}")
}

/// Assertion helpers for JSON responses.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON error body carries `message` and `code`.
    pub fn error_body(value: &Value, message: &str, code: &str) {
        assert_eq!(
            value["error"], message,
            "unexpected error message in {value}"
        );
        assert_eq!(value["code"], code, "unexpected error code in {value}");
    }
}
