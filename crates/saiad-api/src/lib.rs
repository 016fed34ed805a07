//! Axum HTTP/WebSocket API server.
//!
//! This crate provides:
//! - Submit, status, cancel and download endpoints for generation jobs
//! - Live job updates over WebSocket
//! - Rate limiting and security headers
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
