//! Mock JWKS endpoint for tests
//!
//! Wraps a `wiremock::MockServer` serving `/.well-known/jwks.json`.
//! Mocks are matched in mount order, so `serve_keys_once` followed by
//! `serve_keys` models a key rotation on the identity provider.

use crate::crypto_fixtures::{jwks_document, TestSigningKey};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the identity provider publishes its key set on.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Mock identity-provider JWKS endpoint.
///
/// # Example
/// ```rust,ignore
/// let jwks = MockJwksServer::start().await;
/// jwks.serve_keys(&[&key]).await;
/// let fetcher = JwksFetcher::new(jwks.jwks_url(), Duration::from_secs(5));
/// ```
pub struct MockJwksServer {
    server: MockServer,
}

impl MockJwksServer {
    /// Start a server with nothing mounted.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Full URL of the JWKS endpoint.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Serve `keys` for every request.
    pub async fn serve_keys(&self, keys: &[&TestSigningKey]) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .mount(&self.server)
            .await;
    }

    /// Serve `keys` for the next request only.
    pub async fn serve_keys_once(&self, keys: &[&TestSigningKey]) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Serve `keys` after `delay`.
    pub async fn serve_keys_delayed(&self, keys: &[&TestSigningKey], delay: Duration) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(jwks_document(keys))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Serve an arbitrary JSON document.
    pub async fn serve_json(&self, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Serve a raw body with status 200.
    pub async fn serve_body(&self, body: &str) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Respond with `status` and an empty body.
    pub async fn serve_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Remove all mounted responses and recorded requests.
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Number of requests the endpoint has received.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or_default()
    }

    /// The underlying wiremock server, for custom mocks.
    pub fn server(&self) -> &MockServer {
        &self.server
    }
}
