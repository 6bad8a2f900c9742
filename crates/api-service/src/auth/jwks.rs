//! JWKS retrieval.
//!
//! [`KeySource`] is the seam between the key cache and wherever keys come
//! from. [`JwksFetcher`] is the production source: one HTTP GET against the
//! identity provider's JWKS endpoint per call, no caching and no retries.
//!
//! # Document handling
//!
//! The document must be a JSON object with a `keys` array. Each entry is
//! converted on its own; entries that are not usable signing keys are
//! dropped with a warning. A document that yields no usable keys is an
//! error so that a misconfigured endpoint never empties the cache.

use crate::auth::keys::{Jwk, KeySet, SigningKey};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// HTTP request timeout used when none is configured.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest JWKS document accepted (256KB). Real key sets are a few KB.
pub const MAX_JWKS_SIZE_BYTES: usize = 256 * 1024;

/// Failure to obtain a usable key set.
///
/// Cloneable so a single refresh outcome can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("JWKS request failed: {0}")]
    Transport(String),

    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    #[error("JWKS document is invalid: {0}")]
    InvalidDocument(String),

    #[error("JWKS document contains no usable signing keys")]
    NoUsableKeys,

    #[error("JWKS fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("JWKS refresh was interrupted before completing")]
    Interrupted,
}

impl FetchError {
    /// Bounded label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Status(_) => "status",
            FetchError::InvalidDocument(_) => "invalid_document",
            FetchError::NoUsableKeys => "no_usable_keys",
            FetchError::Timeout(_) => "timeout",
            FetchError::Interrupted => "interrupted",
        }
    }
}

/// Something that can produce the current key set.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Retrieve a complete key set.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] when no usable key set could be obtained.
    async fn fetch(&self) -> Result<KeySet, FetchError>;
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<serde_json::Value>,
}

/// Parse a JWKS document body into a key set.
///
/// # Errors
///
/// - `InvalidDocument` - body is not a JSON object with a `keys` array
/// - `NoUsableKeys` - every entry was rejected, or the array was empty
pub fn parse_jwks(body: &[u8]) -> Result<KeySet, FetchError> {
    let document: JwksDocument =
        serde_json::from_slice(body).map_err(|e| FetchError::InvalidDocument(e.to_string()))?;

    let total = document.keys.len();
    let keys: Vec<SigningKey> = document
        .keys
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let converted = serde_json::from_value::<Jwk>(entry)
                .map_err(|e| e.to_string())
                .and_then(|jwk| {
                    SigningKey::from_jwk(&jwk).map_err(|rejection| {
                        format!("kid {:?}: {rejection}", jwk.kid.as_deref().unwrap_or(""))
                    })
                });
            match converted {
                Ok(key) => Some(key),
                Err(reason) => {
                    tracing::warn!(
                        target: "api.auth.jwks",
                        index,
                        reason = %reason,
                        "Dropping unusable JWKS entry"
                    );
                    None
                }
            }
        })
        .collect();

    if keys.is_empty() {
        return Err(FetchError::NoUsableKeys);
    }

    tracing::debug!(
        target: "api.auth.jwks",
        total,
        usable = keys.len(),
        "Parsed JWKS document"
    );

    Ok(KeySet::from_keys(keys, Utc::now()))
}

/// Fetches the key set from an identity provider's JWKS endpoint.
#[derive(Debug, Clone)]
pub struct JwksFetcher {
    jwks_url: String,
    http_client: reqwest::Client,
}

impl JwksFetcher {
    /// Create a fetcher for `jwks_url` whose requests give up after `timeout`.
    #[must_use]
    pub fn new(jwks_url: String, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(
                    target: "api.auth.jwks",
                    error = %e,
                    "Failed to build JWKS HTTP client, using default client"
                );
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
        }
    }

    #[must_use]
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }
}

#[async_trait]
impl KeySource for JwksFetcher {
    #[instrument(skip(self), fields(url = %self.jwks_url))]
    async fn fetch(&self) -> Result<KeySet, FetchError> {
        tracing::debug!(target: "api.auth.jwks", "Fetching JWKS");

        let mut response = self
            .http_client
            .get(&self.jwks_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    tracing::warn!(target: "api.auth.jwks", "JWKS request timed out");
                    FetchError::Transport(format!("request timed out: {e}"))
                } else {
                    tracing::warn!(target: "api.auth.jwks", error = %e, "JWKS request failed");
                    FetchError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                target: "api.auth.jwks",
                status = %status,
                "JWKS endpoint returned error status"
            );
            return Err(FetchError::Status(status.as_u16()));
        }

        if response
            .content_length()
            .is_some_and(|len| len > MAX_JWKS_SIZE_BYTES as u64)
        {
            return Err(oversized_document());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            tracing::warn!(target: "api.auth.jwks", error = %e, "Failed to read JWKS body");
            FetchError::Transport(e.to_string())
        })? {
            if body.len() + chunk.len() > MAX_JWKS_SIZE_BYTES {
                return Err(oversized_document());
            }
            body.extend_from_slice(&chunk);
        }

        let key_set = parse_jwks(&body)?;

        tracing::debug!(
            target: "api.auth.jwks",
            key_count = key_set.len(),
            "JWKS fetched"
        );

        Ok(key_set)
    }
}

fn oversized_document() -> FetchError {
    tracing::warn!(
        target: "api.auth.jwks",
        max_bytes = MAX_JWKS_SIZE_BYTES,
        "JWKS document exceeds size limit"
    );
    FetchError::InvalidDocument(format!(
        "document exceeds {MAX_JWKS_SIZE_BYTES} bytes"
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::keys::KeyFamily;
    use api_test_utils::{jwks_document, MockJwksServer, TestSigningKey};
    use serde_json::json;

    #[test]
    fn test_parse_keeps_usable_entries_and_drops_the_rest() {
        let ed = TestSigningKey::ed25519(1, "ed");
        let rsa = TestSigningKey::rs256("rsa");
        let body = json!({
            "keys": [
                ed.jwk(),
                {"kty": "oct", "kid": "secret", "k": "c2VjcmV0"},
                {"kty": "RSA", "kid": "no-modulus", "e": "AQAB"},
                "not-an-object",
                {"kty": "RSA", "kid": 42},
                rsa.jwk()
            ]
        });

        let set = parse_jwks(body.to_string().as_bytes()).unwrap();

        assert_eq!(set.kids(), vec!["ed", "rsa"]);
        assert_eq!(set.get("rsa").unwrap().family(), KeyFamily::Rsa);
        assert!(set.retrieved_at().is_some());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let result = parse_jwks(b"<html>oops</html>");
        assert!(matches!(result, Err(FetchError::InvalidDocument(_))));
    }

    #[test]
    fn test_parse_rejects_missing_keys_array() {
        let result = parse_jwks(br#"{"issuer":"x"}"#);
        assert!(matches!(result, Err(FetchError::InvalidDocument(_))));
    }

    #[test]
    fn test_parse_rejects_document_without_usable_keys() {
        assert_eq!(parse_jwks(br#"{"keys":[]}"#).unwrap_err(), FetchError::NoUsableKeys);

        let only_symmetric = json!({"keys": [{"kty": "oct", "kid": "s", "k": "AA"}]});
        assert_eq!(
            parse_jwks(only_symmetric.to_string().as_bytes()).unwrap_err(),
            FetchError::NoUsableKeys
        );
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let key = TestSigningKey::ed25519(3, "key-a");
        let jwks = MockJwksServer::start().await;
        jwks.serve_keys(&[&key]).await;

        let fetcher = JwksFetcher::new(jwks.jwks_url(), Duration::from_secs(5));
        let set = fetcher.fetch().await.unwrap();

        assert!(set.contains("key-a"));
        assert_eq!(jwks.request_count().await, 1);
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let jwks = MockJwksServer::start().await;
        jwks.serve_status(503).await;

        let fetcher = JwksFetcher::new(jwks.jwks_url(), Duration::from_secs(5));

        assert_eq!(fetcher.fetch().await.unwrap_err(), FetchError::Status(503));
    }

    #[tokio::test]
    async fn test_fetch_invalid_body() {
        let jwks = MockJwksServer::start().await;
        jwks.serve_body("not json").await;

        let fetcher = JwksFetcher::new(jwks.jwks_url(), Duration::from_secs(5));

        assert!(matches!(
            fetcher.fetch().await,
            Err(FetchError::InvalidDocument(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_document() {
        let key = TestSigningKey::ed25519(5, "big");
        let mut document = jwks_document(&[&key]);
        document["padding"] = json!("x".repeat(MAX_JWKS_SIZE_BYTES));
        let jwks = MockJwksServer::start().await;
        jwks.serve_json(document).await;

        let fetcher = JwksFetcher::new(jwks.jwks_url(), Duration::from_secs(5));

        assert_eq!(
            fetcher.fetch().await.unwrap_err(),
            FetchError::InvalidDocument(format!("document exceeds {MAX_JWKS_SIZE_BYTES} bytes"))
        );
    }

    #[tokio::test]
    async fn test_fetch_http_timeout() {
        let key = TestSigningKey::ed25519(4, "slow");
        let jwks = MockJwksServer::start().await;
        jwks.serve_keys_delayed(&[&key], Duration::from_secs(2)).await;

        let fetcher = JwksFetcher::new(jwks.jwks_url(), Duration::from_millis(100));

        assert!(matches!(fetcher.fetch().await, Err(FetchError::Transport(_))));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_endpoint() {
        let fetcher = JwksFetcher::new(
            "http://127.0.0.1:1/.well-known/jwks.json".to_string(),
            Duration::from_secs(1),
        );

        assert!(matches!(fetcher.fetch().await, Err(FetchError::Transport(_))));
    }

    #[test]
    fn test_fetch_error_kinds_are_bounded() {
        assert_eq!(FetchError::Status(500).kind(), "status");
        assert_eq!(FetchError::Timeout(DEFAULT_FETCH_TIMEOUT).kind(), "timeout");
        assert_eq!(FetchError::NoUsableKeys.kind(), "no_usable_keys");
    }

    #[test]
    fn test_jwks_document_fixture_parses() {
        let a = TestSigningKey::rs256("a");
        let b = TestSigningKey::es256("b");
        let body = jwks_document(&[&a, &b]).to_string();

        let set = parse_jwks(body.as_bytes()).unwrap();

        assert_eq!(set.len(), 2);
    }
}
