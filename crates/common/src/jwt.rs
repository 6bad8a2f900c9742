//! JWT structure utilities shared by the API services.
//!
//! This module decomposes a compact JWS (`header.claims.signature`) without
//! verifying it:
//! - Size limits for DoS prevention
//! - Header decoding (`alg`, `kid`, `typ`)
//! - Registered claims decoding (`iss`, `sub`, `aud`, `exp`, `nbf`, `iat`)
//! - Clock skew bounds used by token validation
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing returned from here is trusted until the signature over
//!   [`DecodedToken::signing_input`] has been verified with a key from a
//!   trusted key set
//! - The `sub` field in [`TokenClaims`] is redacted in Debug output
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::decode_token;
//!
//! let decoded = decode_token(token)?;
//! let kid = decoded.header.kid.as_deref();
//! // look up the key by kid, then verify decoded.signature() over decoded.signing_input()
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Tokens larger than this are rejected BEFORE any base64 decoding or
/// cryptographic work. Typical identity-provider access tokens are well under
/// 2KB even with a permissions array.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default clock skew tolerance applied to `exp` and `nbf`.
///
/// Zero means `exp` must be strictly in the future and `nbf` must not be in
/// the future.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::ZERO;

/// Maximum allowed clock skew tolerance (10 minutes).
///
/// Prevents misconfiguration from turning expired tokens into valid ones.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while decomposing a JWT.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtParseError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("token exceeds maximum size")]
    TokenTooLarge,

    /// Token is not three base64url segments with JSON header and claims.
    #[error("token is malformed")]
    MalformedToken,
}

// =============================================================================
// Header
// =============================================================================

/// Decoded JOSE header.
///
/// Only the fields needed for key selection are kept; any other header
/// parameters are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Declared signing algorithm, verbatim (e.g. `RS256`, `HS256`, `none`).
    pub alg: String,

    /// Key ID. `None` when absent, empty, or not a string.
    pub kid: Option<String>,

    /// Token type, usually `JWT` or `at+jwt`.
    pub typ: Option<String>,
}

impl TokenHeader {
    fn from_json(value: &serde_json::Value) -> Result<Self, JwtParseError> {
        let alg = value
            .get("alg")
            .and_then(serde_json::Value::as_str)
            .ok_or(JwtParseError::MalformedToken)?
            .to_string();

        // An empty or non-string kid is the same as no kid for key lookup
        let kid = value
            .get("kid")
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string);

        let typ = value
            .get("typ")
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string);

        Ok(Self { alg, kid, typ })
    }
}

// =============================================================================
// Claims Types
// =============================================================================

/// The `aud` claim, which may be a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// `"aud": "api"`
    Single(String),
    /// `"aud": ["api", "userinfo"]`
    Multiple(Vec<String>),
}

impl Audience {
    /// Whether `audience` is one of the token's audiences.
    #[must_use]
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(value) => value == audience,
            Audience::Multiple(values) => values.iter().any(|v| v == audience),
        }
    }

    /// All audiences as a list.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Audience::Single(value) => vec![value.clone()],
            Audience::Multiple(values) => values.clone(),
        }
    }
}

/// Claims carried by an access token.
///
/// `sub` and `exp` are required; a token without them fails to decode.
/// Claims that are not registered here are kept in `extra`.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user or client identifier) - redacted in Debug output.
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience(s).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Space-separated scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Permissions array (RBAC-enabled APIs put granted permissions here).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,

    /// Every other claim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Debug for TokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenClaims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("nbf", &self.nbf)
            .field("iat", &self.iat)
            .field("scope", &self.scope)
            .field("permissions", &self.permissions)
            .field("extra_claims", &self.extra.len())
            .finish()
    }
}

impl TokenClaims {
    /// Scopes from the `scope` claim followed by any `permissions` not
    /// already listed, without duplicates.
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = Vec::new();
        let from_scope = self
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(ToString::to_string);
        let from_permissions = self.permissions.iter().flatten().cloned();

        for scope in from_scope.chain(from_permissions) {
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        scopes
    }
}

// =============================================================================
// Decoded Token
// =============================================================================

/// A JWT split into its parts. Nothing here has been verified.
#[derive(Debug, Clone)]
pub struct DecodedToken<'a> {
    /// Decoded header.
    pub header: TokenHeader,

    /// Decoded claims.
    pub claims: TokenClaims,

    signing_input: &'a str,
    signature: &'a str,
}

impl<'a> DecodedToken<'a> {
    /// `header.claims` as it appeared on the wire; the bytes the signature covers.
    #[must_use]
    pub fn signing_input(&self) -> &'a str {
        self.signing_input
    }

    /// The base64url signature segment.
    #[must_use]
    pub fn signature(&self) -> &'a str {
        self.signature
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Split and decode a compact JWT without verifying its signature.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - not exactly three non-empty base64url segments, header
///   is not a JSON object with a string `alg`, or claims are not a JSON object
///   with `sub` and `exp`
pub fn decode_token(token: &str) -> Result<DecodedToken<'_>, JwtParseError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtParseError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let (signing_input, signature) = token
        .rsplit_once('.')
        .ok_or(JwtParseError::MalformedToken)?;
    let (header_part, claims_part) = signing_input
        .split_once('.')
        .ok_or(JwtParseError::MalformedToken)?;

    if claims_part.contains('.')
        || header_part.is_empty()
        || claims_part.is_empty()
        || signature.is_empty()
    {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtParseError::MalformedToken);
    }

    let header_bytes = decode_segment(header_part, "header")?;
    let header_json: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtParseError::MalformedToken
    })?;
    let header = TokenHeader::from_json(&header_json)?;

    let claims_bytes = decode_segment(claims_part, "claims")?;
    let claims: TokenClaims = serde_json::from_slice(&claims_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT claims JSON");
        JwtParseError::MalformedToken
    })?;

    // The signature is only checked for encoding here; verification needs the key
    decode_segment(signature, "signature")?;

    Ok(DecodedToken {
        header,
        claims,
        signing_input,
        signature,
    })
}

fn decode_segment(segment: &str, part: &'static str) -> Result<Vec<u8>, JwtParseError> {
    URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", part, error = %e, "Failed to decode JWT segment base64");
        JwtParseError::MalformedToken
    })
}

// =============================================================================
// Tests
// =============================================================================
