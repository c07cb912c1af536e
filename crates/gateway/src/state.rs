//! Application state shared across all request handlers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::metrics::Metrics;
use crate::middleware::{RateLimitConfig, RateLimiter};
use crate::services::identity::{HttpIdentityService, IdentityService};
use crate::store::{CounterStore, RedisCounterStore};
use crate::token::TokenService;

/// Minimum recommended signing secret length in bytes.
const MIN_SECRET_LEN: usize = 32;

/// Application state shared across all request handlers.
///
/// Cheap to clone; everything lives behind one `Arc` and is immutable after
/// startup.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    tokens: Arc<TokenService>,
    identity: Arc<dyn IdentityService>,
    rate_limiter: Option<Arc<RateLimiter>>,
    metrics: Arc<Metrics>,
    request_timeout: Duration,
    upload_max_bytes: usize,
}

impl AppState {
    /// Build production state from configuration.
    ///
    /// Connects the identity client and, when rate limiting is enabled, the
    /// Redis counter store.
    pub async fn new(config: &Config) -> Result<Self> {
        check_secret_strength(&config.jwt_secret);

        let identity =
            HttpIdentityService::new(&config.auth_service_url, config.upstream_timeout)
                .context("failed to create identity service client")?;

        let store: Option<Arc<dyn CounterStore>> = if config.rate_limit_enabled {
            let store = RedisCounterStore::open(&config.redis_url)
                .context("failed to create Redis client")?;
            match store.ping().await {
                Ok(()) => info!("Connected to Redis"),
                Err(e) => warn!(
                    error = %e,
                    "Redis unreachable at startup; rate-limited requests will fail until it recovers"
                ),
            }
            Some(Arc::new(store))
        } else {
            info!("Rate limiting disabled");
            None
        };

        Ok(Self::with_services(config, Arc::new(identity), store))
    }

    /// Build state around caller-supplied collaborators.
    ///
    /// `store` enables rate limiting when present, regardless of
    /// `config.rate_limit_enabled`.
    pub fn with_services(
        config: &Config,
        identity: Arc<dyn IdentityService>,
        store: Option<Arc<dyn CounterStore>>,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        let rate_limiter = store.map(|store| {
            let limits = RateLimitConfig {
                limit: config.rate_limit,
                window: config.rate_limit_window,
            };
            Arc::new(RateLimiter::new(store, limits, Arc::clone(&metrics)))
        });

        Self {
            inner: Arc::new(AppStateInner {
                tokens: Arc::new(TokenService::new(config.jwt_secret.as_bytes())),
                identity,
                rate_limiter,
                metrics,
                request_timeout: config.request_timeout,
                upload_max_bytes: config.upload_max_bytes,
            }),
        }
    }

    /// Get the token service.
    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.inner.tokens
    }

    /// Get the identity service client.
    pub fn identity(&self) -> &Arc<dyn IdentityService> {
        &self.inner.identity
    }

    /// Get the rate limiter, if rate limiting is enabled.
    pub fn rate_limiter(&self) -> Option<&Arc<RateLimiter>> {
        self.inner.rate_limiter.as_ref()
    }

    /// Get the metrics registry.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    pub fn request_timeout(&self) -> Duration {
        self.inner.request_timeout
    }

    pub fn upload_max_bytes(&self) -> usize {
        self.inner.upload_max_bytes
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("rate_limiter", &self.inner.rate_limiter)
            .field("request_timeout", &self.inner.request_timeout)
            .field("upload_max_bytes", &self.inner.upload_max_bytes)
            .finish_non_exhaustive()
    }
}

/// Warn about signing secrets that are short or low-entropy.
fn check_secret_strength(secret: &str) {
    if secret.len() < MIN_SECRET_LEN {
        warn!(
            length = secret.len(),
            "JWT_SECRET is shorter than {MIN_SECRET_LEN} bytes; consider a longer value"
        );
    }

    // Warn about low-entropy secrets
    let unique_chars: HashSet<u8> = secret.bytes().collect();
    if unique_chars.len() < 8 {
        warn!(
            unique_chars = unique_chars.len(),
            "JWT_SECRET has low character diversity; consider using a more random value"
        );
    }
}
