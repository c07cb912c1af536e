//! Configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Gateway configuration.
#[derive(Clone)]
pub struct Config {
    /// HTTP server port (default: 8080).
    pub port: u16,

    /// Identity service base URL.
    pub auth_service_url: String,

    /// File storage service base URL. The file handlers are stubs and only
    /// report it at startup.
    pub file_service_url: String,

    /// HMAC secret used to sign and verify identity tokens.
    pub jwt_secret: String,

    /// Whether the global rate limiter is active (default: false).
    pub rate_limit_enabled: bool,

    /// Redis connection URL for the rate-limit counters.
    pub redis_url: String,

    /// Requests allowed per client per window (default: 100).
    pub rate_limit: u64,

    /// Rate-limit window length (default: 60s).
    pub rate_limit_window: Duration,

    /// Timeout for identity service calls (default: 10s).
    pub upstream_timeout: Duration,

    /// Timeout for a whole request (default: 30s).
    pub request_timeout: Duration,

    /// Maximum accepted upload body in bytes (default: 10 MiB).
    pub upload_max_bytes: usize,
}

impl Config {
    /// Configuration with every optional setting at its default.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            port: 8080,
            auth_service_url: "http://localhost:8081".to_string(),
            file_service_url: "http://localhost:8082".to_string(),
            jwt_secret: jwt_secret.into(),
            rate_limit_enabled: false,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            rate_limit: 100,
            rate_limit_window: Duration::from_secs(60),
            upstream_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            upload_max_bytes: 10 * 1024 * 1024,
        }
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .context("JWT_SECRET environment variable is required")?;

        let mut config = Self::new(jwt_secret);

        if let Some(port) = lookup("PORT") {
            config.port = port.parse().context("PORT must be a valid u16")?;
        }
        if let Some(url) = lookup("AUTH_SERVICE_URL") {
            config.auth_service_url = url;
        }
        if let Some(url) = lookup("FILE_SERVICE_URL") {
            config.file_service_url = url;
        }
        if let Some(enabled) = lookup("RATE_LIMIT_ENABLED") {
            config.rate_limit_enabled = parse_bool(&enabled)
                .with_context(|| format!("RATE_LIMIT_ENABLED must be a boolean, got {enabled:?}"))?;
        }
        if let Some(url) = lookup("REDIS_URL") {
            config.redis_url = url;
        }

        config.rate_limit = parse_or(&lookup, "RATE_LIMIT", config.rate_limit)?;
        if config.rate_limit == 0 {
            bail!("RATE_LIMIT must be greater than zero");
        }

        config.rate_limit_window = secs_or(&lookup, "RATE_LIMIT_WINDOW_SECS", 60)?;
        config.upstream_timeout = secs_or(&lookup, "UPSTREAM_TIMEOUT_SECS", 10)?;
        config.request_timeout = secs_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)?;
        config.upload_max_bytes =
            parse_or(&lookup, "UPLOAD_MAX_BYTES", config.upload_max_bytes)?;

        Ok(config)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("auth_service_url", &self.auth_service_url)
            .field("file_service_url", &self.file_service_url)
            .field("jwt_secret", &"[redacted]")
            .field("rate_limit_enabled", &self.rate_limit_enabled)
            .field("redis_url", &self.redis_url)
            .field("rate_limit", &self.rate_limit)
            .field("rate_limit_window", &self.rate_limit_window)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("upload_max_bytes", &self.upload_max_bytes)
            .finish()
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number, got {raw:?}")),
        None => Ok(default),
    }
}

fn secs_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default_secs: u64,
) -> Result<Duration> {
    let secs: u64 = parse_or(lookup, key, default_secs)?;
    if secs == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("unrecognised boolean {other:?}"),
    }
}
