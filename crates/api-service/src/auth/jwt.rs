//! Access token validation.
//!
//! Validates bearer tokens signed by the identity provider using keys from
//! the shared [`KeySetCache`].
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The header `alg` must belong to the resolved key's family, so a token
//!   claiming `HS256` or `none` is never checked against a public key
//! - Issuer and audience are compared exactly
//! - Rejection reasons are returned to the caller; nothing is logged here

use crate::auth::claims::Principal;
use crate::auth::key_cache::{CacheError, KeySetCache};
use crate::auth::keys::SigningKey;
use common::jwt::{decode_token, DecodedToken, TokenClaims, DEFAULT_CLOCK_SKEW};
use jsonwebtoken::Algorithm;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Result of validating one token.
pub type ValidationOutcome = Result<Principal, AuthError>;

/// Why a credential was rejected.
///
/// The variant is for diagnostics and metrics; clients only ever see a
/// generic rejection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("token is malformed")]
    Malformed,

    #[error("token header has no key id")]
    MissingKeyId,

    #[error("signing key could not be resolved: {0}")]
    KeyResolutionFailed(#[source] CacheError),

    #[error("token algorithm does not match the signing key")]
    AlgorithmMismatch,

    #[error("token signature is invalid")]
    BadSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("token issuer is not trusted")]
    IssuerMismatch,

    #[error("token audience does not include this API")]
    AudienceMismatch,

    #[error("no bearer credential presented")]
    NoCredential,
}

impl AuthError {
    /// Bounded reason code for logs and metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Malformed => "malformed",
            AuthError::MissingKeyId => "missing_key_id",
            AuthError::KeyResolutionFailed(CacheError::UnknownKey(_)) => "unknown_key",
            AuthError::KeyResolutionFailed(CacheError::FetchFailed(_)) => "key_fetch_failed",
            AuthError::AlgorithmMismatch => "algorithm_mismatch",
            AuthError::BadSignature => "bad_signature",
            AuthError::Expired => "expired",
            AuthError::NotYetValid => "not_yet_valid",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::NoCredential => "no_credential",
        }
    }

    /// Whether the rejection was caused by the key set being unavailable
    /// rather than by the credential itself.
    #[must_use]
    pub fn is_key_set_unavailable(&self) -> bool {
        matches!(
            self,
            AuthError::KeyResolutionFailed(CacheError::FetchFailed(_))
        )
    }
}

/// Validates tokens against the identity provider's key set.
#[derive(Clone)]
pub struct TokenValidator {
    key_cache: KeySetCache,
    leeway_seconds: i64,
}

impl TokenValidator {
    /// Create a validator with no clock skew tolerance.
    #[must_use]
    pub fn new(key_cache: KeySetCache) -> Self {
        Self {
            key_cache,
            leeway_seconds: duration_to_seconds(DEFAULT_CLOCK_SKEW),
        }
    }

    /// Tolerate `leeway` of clock skew on `exp` and `nbf`.
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway_seconds = duration_to_seconds(leeway);
        self
    }

    /// Validate `token` at time `now` (Unix epoch seconds).
    ///
    /// Checks run in order and stop at the first failure:
    /// 1. Structure
    /// 2. Key id present
    /// 3. Key resolution
    /// 4. Algorithm and signature
    /// 5. `exp`, then `nbf`
    /// 6. Issuer, then audience
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] of the first failed check.
    #[instrument(skip_all)]
    pub async fn validate(
        &self,
        token: &str,
        expected_issuer: &str,
        expected_audience: &str,
        now: i64,
    ) -> ValidationOutcome {
        let decoded = decode_token(token).map_err(|_| AuthError::Malformed)?;

        let kid = decoded
            .header
            .kid
            .as_deref()
            .ok_or(AuthError::MissingKeyId)?;

        let key = self
            .key_cache
            .resolve(kid)
            .await
            .map_err(AuthError::KeyResolutionFailed)?;

        verify_signature(&decoded, &key)?;
        check_time_window(&decoded.claims, now, self.leeway_seconds)?;

        if decoded.claims.iss.as_deref() != Some(expected_issuer) {
            return Err(AuthError::IssuerMismatch);
        }

        let audience_matches = decoded
            .claims
            .aud
            .as_ref()
            .is_some_and(|aud| aud.contains(expected_audience));
        if !audience_matches {
            return Err(AuthError::AudienceMismatch);
        }

        Ok(Principal::from_claims(decoded.claims))
    }
}

fn verify_signature(decoded: &DecodedToken<'_>, key: &SigningKey) -> Result<(), AuthError> {
    // Unknown names, `none` and HMAC algorithms all fail here
    let alg: Algorithm = decoded
        .header
        .alg
        .parse()
        .map_err(|_| AuthError::AlgorithmMismatch)?;
    if !key.accepts(alg) {
        return Err(AuthError::AlgorithmMismatch);
    }

    match jsonwebtoken::crypto::verify(
        decoded.signature(),
        decoded.signing_input().as_bytes(),
        key.decoding_key(),
        alg,
    ) {
        Ok(true) => Ok(()),
        Ok(false) | Err(_) => Err(AuthError::BadSignature),
    }
}

fn check_time_window(claims: &TokenClaims, now: i64, leeway: i64) -> Result<(), AuthError> {
    if claims.exp.saturating_add(leeway) <= now {
        return Err(AuthError::Expired);
    }
    if let Some(nbf) = claims.nbf {
        if nbf.saturating_sub(leeway) > now {
            return Err(AuthError::NotYetValid);
        }
    }
    Ok(())
}

fn duration_to_seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}
