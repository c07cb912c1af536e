//! Clients for downstream services.

pub mod identity;
