//! Rate limiting filter backed by a shared counter store.
//!
//! Fixed-window counting keyed by client address: the first request in a
//! window creates `rate_limit:<client>` with a TTL of one window, and every
//! request increments it. A client may therefore burst up to twice the limit
//! across a window boundary.
//!
//! The filter fails closed: when the counter store cannot be reached the
//! request is rejected.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{ConnectInfo, Request};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};

use super::pipeline::Filter;
use crate::error::ApiError;
use crate::metrics::Metrics;
use crate::store::{CounterStore, StoreError};

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Rate limit configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Requests allowed per client per window.
    pub limit: u64,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Quota state after counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u64,
    pub remaining: u64,
    /// Unix time at which the client's window is reported to reset.
    pub reset_at: i64,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed(Quota),
    Limited(Quota),
}

/// Fixed-window rate limiter.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
    metrics: Arc<Metrics>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Count one request from `client` and decide whether it may proceed.
    pub async fn check(&self, client: &str) -> Result<Decision, StoreError> {
        let key = format!("rate_limit:{client}");
        let count = self.store.increment(&key, self.config.window).await?;

        let quota = Quota {
            limit: self.config.limit,
            remaining: self.config.limit.saturating_sub(count),
            reset_at: chrono::Utc::now().timestamp() + window_secs(self.config.window),
        };

        if count > self.config.limit {
            debug!(client, count, limit = self.config.limit, "rate limit exceeded");
            Ok(Decision::Limited(quota))
        } else {
            Ok(Decision::Allowed(quota))
        }
    }
}

#[async_trait]
impl Filter for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn handle(&self, request: Request, next: Next) -> Response {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let client = get_client_id(peer, request.headers());

        match self.check(&client).await {
            Ok(Decision::Allowed(quota)) => {
                let mut response = next.run(request).await;
                apply_quota_headers(response.headers_mut(), &quota);
                response
            }
            Ok(Decision::Limited(quota)) => {
                self.metrics.record_rate_limit();
                let window_secs = window_secs(self.config.window).unsigned_abs();
                let mut response = ApiError::RateLimited {
                    limit: quota.limit,
                    window_secs,
                }
                .into_response();
                let headers = response.headers_mut();
                apply_quota_headers(headers, &quota);
                headers.insert(RETRY_AFTER, HeaderValue::from(window_secs));
                response
            }
            Err(e) => {
                error!(
                    error = %e,
                    backend = self.store.backend(),
                    "rate limit check failed, rejecting request"
                );
                ApiError::Internal("Rate limit error".to_string()).into_response()
            }
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("backend", &self.store.backend())
            .finish()
    }
}

fn window_secs(window: Duration) -> i64 {
    i64::try_from(window.as_secs()).unwrap_or(i64::MAX)
}

fn apply_quota_headers(headers: &mut HeaderMap, quota: &Quota) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(quota.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(quota.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(quota.reset_at));
}

/// Get the client identifier (IP address) for rate limiting.
pub fn get_client_id(addr: Option<SocketAddr>, headers: &HeaderMap) -> String {
    // Check X-Forwarded-For header first (for proxied requests)
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(ip) = value.split(',').next().map(str::trim)
        && !ip.is_empty()
    {
        // Take the first IP in the chain
        return ip.to_string();
    }

    // Check X-Real-IP header
    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && !value.trim().is_empty()
    {
        return value.trim().to_string();
    }

    // Fall back to connection address
    addr.map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use crate::store::MemoryCounterStore;

    use super::*;

    fn limiter(limit: u64) -> (RateLimiter, Arc<MemoryCounterStore>) {
        let store = Arc::new(MemoryCounterStore::new());
        let config = RateLimitConfig {
            limit,
            window: Duration::from_secs(60),
        };
        (
            RateLimiter::new(store.clone(), config, Arc::new(Metrics::new())),
            store,
        )
    }

    #[test]
    fn test_client_id_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        let peer = Some("127.0.0.1:5000".parse().unwrap());

        assert_eq!(get_client_id(peer, &headers), "203.0.113.7");
    }

    #[test]
    fn test_client_id_fallbacks() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "198.51.100.2".parse().unwrap());
        assert_eq!(get_client_id(None, &headers), "198.51.100.2");

        let peer = Some("192.0.2.10:4444".parse().unwrap());
        assert_eq!(get_client_id(peer, &HeaderMap::new()), "192.0.2.10");
        assert_eq!(get_client_id(None, &HeaderMap::new()), "unknown");
    }

    #[tokio::test]
    async fn test_remaining_decreases_until_limited() {
        let (limiter, store) = limiter(3);

        let mut remaining = Vec::new();
        for _ in 0..3 {
            match limiter.check("203.0.113.7").await.unwrap() {
                Decision::Allowed(quota) => remaining.push(quota.remaining),
                Decision::Limited(_) => panic!("limited too early"),
            }
        }
        assert_eq!(remaining, [2, 1, 0]);

        let Decision::Limited(quota) = limiter.check("203.0.113.7").await.unwrap() else {
            panic!("expected the fourth request to be limited");
        };
        assert_eq!(quota.limit, 3);
        assert_eq!(quota.remaining, 0);
        assert_eq!(store.count("rate_limit:203.0.113.7"), Some(4));
    }

    #[tokio::test]
    async fn test_clients_are_counted_separately() {
        let (limiter, _) = limiter(1);

        assert!(matches!(
            limiter.check("a").await.unwrap(),
            Decision::Allowed(_)
        ));
        assert!(matches!(
            limiter.check("b").await.unwrap(),
            Decision::Allowed(_)
        ));
        assert!(matches!(
            limiter.check("a").await.unwrap(),
            Decision::Limited(_)
        ));
    }

    #[tokio::test]
    async fn test_reset_is_one_window_ahead() {
        let (limiter, _) = limiter(10);
        let before = chrono::Utc::now().timestamp();

        let Decision::Allowed(quota) = limiter.check("c").await.unwrap() else {
            panic!("expected allowed");
        };
        assert!(quota.reset_at >= before + 60);
        assert!(quota.reset_at <= chrono::Utc::now().timestamp() + 60);
    }

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.limit, 100);
        assert_eq!(config.window, Duration::from_secs(60));
    }
}
