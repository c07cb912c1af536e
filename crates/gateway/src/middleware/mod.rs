//! Request filters: CORS, access logging, rate limiting, and bearer
//! authentication, composed through [`pipeline::Pipeline`].

pub mod access_log;
pub mod bearer_auth;
pub mod cors;
pub mod pipeline;
pub mod rate_limit;

pub use access_log::AccessLog;
pub use bearer_auth::{BearerAuth, Identity};
pub use cors::CorsFilter;
pub use pipeline::{Filter, Pipeline};
pub use rate_limit::{RateLimitConfig, RateLimiter};
