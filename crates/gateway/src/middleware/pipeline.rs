//! Ordered request filters.
//!
//! A [`Filter`] sees a request before the rest of the chain and either answers
//! it directly or hands it on through [`Next`]. A [`Pipeline`] is an explicit,
//! ordered list of filters; the first entry sees the request first and the
//! response last.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;

/// One stage of request processing.
#[async_trait]
pub trait Filter: Send + Sync + 'static {
    /// Short name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Handle `request`, calling `next.run(request)` to continue the chain.
    async fn handle(&self, request: Request, next: Next) -> Response;
}

/// An ordered chain of filters.
#[derive(Clone, Default)]
pub struct Pipeline {
    filters: Vec<Arc<dyn Filter>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter to the end of the chain.
    pub fn with(self, filter: impl Filter) -> Self {
        self.with_shared(Arc::new(filter))
    }

    /// Append a filter that is also held elsewhere.
    pub fn with_shared(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Filter names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run the chain ahead of every route and the fallback of `router`.
    pub fn wrap<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        // Layers added last run first, so apply in reverse.
        self.filters.iter().rev().fold(router, |router, filter| {
            let filter = Arc::clone(filter);
            router.layer(middleware::from_fn(move |request: Request, next: Next| {
                let filter = Arc::clone(&filter);
                async move { filter.handle(request, next).await }
            }))
        })
    }

    /// Run the chain ahead of the routes of `router` only.
    ///
    /// Requests that match no route never reach these filters.
    pub fn wrap_routes<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.filters.iter().rev().fold(router, |router, filter| {
            let filter = Arc::clone(filter);
            router.route_layer(middleware::from_fn(move |request: Request, next: Next| {
                let filter = Arc::clone(&filter);
                async move { filter.handle(request, next).await }
            }))
        })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
