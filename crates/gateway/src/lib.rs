//! Edge API Gateway Library
//!
//! This library exposes gateway internals for integration testing.
//! The main entry point for running the server is the `api-gateway` binary.

pub mod config;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod token;

pub use config::Config;
pub use error::{ApiError, AuthFailure};
pub use state::AppState;
