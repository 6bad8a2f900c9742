//! API Service Library
//!
//! A bearer-token protected HTTP API. Access tokens are JWTs issued by an
//! external identity provider and verified against the provider's published
//! JWKS:
//!
//! - Signing keys are cached in process and refreshed when a token names an
//!   unknown key id, so key rotation needs no restart
//! - Concurrent refreshes are coalesced into a single fetch
//! - Signature, algorithm, expiry, not-before, issuer and audience are all
//!   checked before a request reaches a handler
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> auth::AuthGate -> auth::TokenValidator
//!                                                        -> auth::KeySetCache -> auth::JwksFetcher
//! ```
//!
//! # Modules
//!
//! - `auth` - Key set retrieval, caching and token validation
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authentication and HTTP metrics middleware
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup
//! - `tasks` - Background tasks

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod tasks;
