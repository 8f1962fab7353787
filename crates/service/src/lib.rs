//! Sleep disorder prediction service
//!
//! Loads a trained artifact set once at startup and serves predictions,
//! liveness/readiness and Prometheus metrics over HTTP.

pub mod api;
pub mod config;
pub mod context;

pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");
