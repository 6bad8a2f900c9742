//! Middleware for the API service.
//!
//! # Components
//!
//! - `auth` - Bearer token authentication for protected routes
//! - `http_metrics` - Request metrics for every response

pub mod auth;
pub mod http_metrics;

pub use auth::{require_auth, AuthState, PrincipalExt};
pub use http_metrics::http_metrics_middleware;
