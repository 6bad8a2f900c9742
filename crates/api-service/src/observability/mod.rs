//! Observability for the API service.
//!
//! Prometheus metrics are recorded through the `metrics` facade and exposed
//! on `/metrics`. Logging goes through `tracing`.

pub mod metrics;
