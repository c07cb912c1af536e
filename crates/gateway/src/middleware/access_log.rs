//! Per-request access log and HTTP metrics.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::extract::{ConnectInfo, MatchedPath, Request};
use axum::http::header::USER_AGENT;
use axum::middleware::Next;
use axum::response::Response;
use tracing::info;

use super::pipeline::Filter;
use super::rate_limit::get_client_id;
use crate::metrics::{Metrics, UNMATCHED_ROUTE};

/// Logs one event per request and records request metrics.
///
/// Metrics are labelled with the matched route template; the log line keeps
/// the raw path.
#[derive(Debug, Clone)]
pub struct AccessLog {
    metrics: Arc<Metrics>,
}

impl AccessLog {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl Filter for AccessLog {
    fn name(&self) -> &'static str {
        "access_log"
    }

    async fn handle(&self, request: Request, next: Next) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map_or(UNMATCHED_ROUTE, MatchedPath::as_str)
            .to_string();
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let client_ip = get_client_id(peer, request.headers());
        let user_agent = request
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let response = next.run(request).await;

        let elapsed = start.elapsed();
        let status = response.status().as_u16();
        self.metrics
            .record_request(method.as_str(), &route, status, elapsed.as_secs_f64());

        info!(
            method = %method,
            path = %path,
            status,
            duration_ms = elapsed.as_millis() as u64,
            client_ip = %client_ip,
            user_agent = %user_agent,
            "request completed"
        );

        response
    }
}
