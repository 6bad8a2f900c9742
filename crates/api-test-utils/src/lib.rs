//! # API Test Utilities
//!
//! Shared test utilities for the API service.
//!
//! This crate provides:
//! - Signing key fixtures for every supported key family, with their JWKs
//! - Test claims builder (`TestClaimsBuilder`)
//! - A mock JWKS endpoint (`MockJwksServer`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use api_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let key = TestSigningKey::ed25519(1, "key-a");
//!     let jwks = MockJwksServer::start().await;
//!     jwks.serve_keys(&[&key]).await;
//!
//!     let token = key.sign(&TestClaimsBuilder::new().for_subject("alice").build());
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_server;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_server::*;
pub use token_builders::*;
