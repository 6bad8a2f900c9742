//! Request authentication boundary.
//!
//! Turns the raw `Authorization` header value into a validation outcome
//! using the process-wide issuer and audience.

use crate::auth::jwt::{AuthError, TokenValidator, ValidationOutcome};
use chrono::Utc;
use std::sync::Arc;

/// Authenticates bearer credentials for one trusted issuer and audience.
#[derive(Clone)]
pub struct AuthGate {
    validator: Arc<TokenValidator>,
    expected_issuer: String,
    expected_audience: String,
}

impl AuthGate {
    #[must_use]
    pub fn new(
        validator: Arc<TokenValidator>,
        expected_issuer: String,
        expected_audience: String,
    ) -> Self {
        Self {
            validator,
            expected_issuer,
            expected_audience,
        }
    }

    /// Authenticate an `Authorization` header value at the current time.
    ///
    /// # Errors
    ///
    /// `NoCredential` when the header is not a bearer credential, otherwise
    /// the validator's rejection.
    pub async fn authenticate(&self, authorization: &str) -> ValidationOutcome {
        self.authenticate_at(authorization, Utc::now().timestamp())
            .await
    }

    /// Authenticate an `Authorization` header value at `now` (Unix epoch seconds).
    ///
    /// # Errors
    ///
    /// See [`AuthGate::authenticate`].
    pub async fn authenticate_at(&self, authorization: &str, now: i64) -> ValidationOutcome {
        let token = bearer_token(authorization).ok_or(AuthError::NoCredential)?;

        self.validator
            .validate(token, &self.expected_issuer, &self.expected_audience, now)
            .await
    }

    #[must_use]
    pub fn expected_issuer(&self) -> &str {
        &self.expected_issuer
    }

    #[must_use]
    pub fn expected_audience(&self) -> &str {
        &self.expected_audience
    }
}

/// Extract the token from a `Bearer <token>` credential.
///
/// The scheme is matched case-insensitively. Returns `None` for any other
/// scheme or an empty token.
#[must_use]
pub fn bearer_token(authorization: &str) -> Option<&str> {
    let (scheme, token) = authorization.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::jwks::{FetchError, KeySource};
    use crate::auth::key_cache::KeySetCache;
    use crate::auth::keys::{Jwk, KeySet, SigningKey};
    use api_test_utils::{TestClaimsBuilder, TestSigningKey, TEST_AUDIENCE, TEST_ISSUER};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails every fetch and counts attempts.
    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KeySource for CountingSource {
        async fn fetch(&self) -> Result<KeySet, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::Transport("unreachable".to_string()))
        }
    }

    fn gate() -> (AuthGate, Arc<CountingSource>) {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let cache = KeySetCache::new(
            Arc::clone(&source) as Arc<dyn KeySource>,
            Duration::from_secs(1),
        );
        let gate = AuthGate::new(
            Arc::new(TokenValidator::new(cache)),
            TEST_ISSUER.to_string(),
            TEST_AUDIENCE.to_string(),
        );
        (gate, source)
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("BEARER   abc  "), Some("abc"));
        assert_eq!(bearer_token(""), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic xyz"), None);
        assert_eq!(bearer_token("Bearerabc"), None);
        assert_eq!(bearer_token("abc.def.ghi"), None);
    }

    #[tokio::test]
    async fn test_no_credential_without_network() {
        let (gate, source) = gate();

        for header in ["", "Basic xyz", "Bearer", "Bearer   ", "Token abc"] {
            assert_eq!(
                gate.authenticate(header).await.unwrap_err(),
                AuthError::NoCredential,
                "header {header:?}"
            );
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bearer_credential_reaches_validator() {
        let (gate, source) = gate();
        let key = TestSigningKey::ed25519(1, "key-a");
        let token = key.sign(&TestClaimsBuilder::new().build());

        let result = gate.authenticate(&format!("Bearer {token}")).await;

        assert!(result.unwrap_err().is_key_set_unavailable());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    /// Serves a fixed key set.
    struct StaticSource {
        jwk: serde_json::Value,
    }

    #[async_trait]
    impl KeySource for StaticSource {
        async fn fetch(&self) -> Result<KeySet, FetchError> {
            let jwk: Jwk = serde_json::from_value(self.jwk.clone()).unwrap();
            Ok(KeySet::from_keys(
                [SigningKey::from_jwk(&jwk).unwrap()],
                Utc::now(),
            ))
        }
    }

    #[tokio::test]
    async fn test_authenticate_at_fixed_times() {
        let key = TestSigningKey::ed25519(1, "key-a");
        let cache = KeySetCache::new(
            Arc::new(StaticSource { jwk: key.jwk() }),
            Duration::from_secs(1),
        );
        let gate = AuthGate::new(
            Arc::new(TokenValidator::new(cache)),
            TEST_ISSUER.to_string(),
            TEST_AUDIENCE.to_string(),
        );

        let nbf = 1_700_000_000;
        let exp = nbf + 600;
        let token = key.sign(
            &TestClaimsBuilder::new()
                .for_subject("user-1")
                .issued_at(nbf)
                .not_before(nbf)
                .expires_at(exp)
                .build(),
        );
        let header = format!("Bearer {token}");

        assert_eq!(
            gate.authenticate_at(&header, nbf - 1).await,
            Err(AuthError::NotYetValid)
        );
        assert_eq!(
            gate.authenticate_at(&header, nbf + 300).await.unwrap().subject,
            "user-1"
        );
        assert_eq!(
            gate.authenticate_at(&header, exp).await,
            Err(AuthError::Expired)
        );
        assert_eq!(
            gate.authenticate_at(&header, exp + 3600).await,
            Err(AuthError::Expired)
        );
    }

    #[test]
    fn test_expected_values() {
        let (gate, _) = gate();
        assert_eq!(gate.expected_issuer(), TEST_ISSUER);
        assert_eq!(gate.expected_audience(), TEST_AUDIENCE);
    }
}
