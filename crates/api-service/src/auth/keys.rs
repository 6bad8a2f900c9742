//! Signing keys and key sets.
//!
//! A [`SigningKey`] is a public verification key converted from one JWK
//! entry. A [`KeySet`] is the immutable collection of keys published by the
//! identity provider at one point in time, indexed by key id.
//!
//! Conversion is strict: entries that are not asymmetric signing keys of a
//! supported family are rejected individually with a [`JwkRejection`], and
//! the caller decides whether to drop them or fail.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A single JSON Web Key as published in a JWKS document.
///
/// Every field is optional at this layer so that missing members produce a
/// precise [`JwkRejection`] instead of a generic parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub kty: Option<String>,

    #[serde(default)]
    pub kid: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    /// Intended key use (`sig` or `enc`).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Curve name for EC and OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate, or the OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

/// Why a JWK entry could not be turned into a [`SigningKey`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JwkRejection {
    #[error("missing required member `{0}`")]
    MissingMember(&'static str),

    #[error("unsupported key type `{0}`")]
    UnsupportedKeyType(String),

    #[error("unsupported curve `{0}`")]
    UnsupportedCurve(String),

    #[error("unsupported algorithm `{0}`")]
    UnsupportedAlgorithm(String),

    #[error("algorithm `{alg}` cannot be used with a {family} key")]
    AlgorithmKeyMismatch { alg: String, family: KeyFamily },

    #[error("key use `{0}` is not `sig`")]
    NotForSigning(String),

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
}

/// Key families accepted for token signatures.
///
/// Symmetric (`oct`) keys are never accepted: a public key set has no
/// business carrying shared secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    Rsa,
    EcP256,
    EcP384,
    Ed25519,
}

impl KeyFamily {
    /// Whether `alg` is a signature algorithm this family can verify.
    #[must_use]
    pub fn supports(self, alg: Algorithm) -> bool {
        matches!(
            (self, alg),
            (
                KeyFamily::Rsa,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ) | (KeyFamily::EcP256, Algorithm::ES256)
                | (KeyFamily::EcP384, Algorithm::ES384)
                | (KeyFamily::Ed25519, Algorithm::EdDSA)
        )
    }
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyFamily::Rsa => "RSA",
            KeyFamily::EcP256 => "EC P-256",
            KeyFamily::EcP384 => "EC P-384",
            KeyFamily::Ed25519 => "Ed25519",
        };
        f.write_str(name)
    }
}

/// A public key able to verify token signatures.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    family: KeyFamily,
    algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Convert one JWK entry.
    ///
    /// # Errors
    ///
    /// Returns a [`JwkRejection`] when the entry has no `kid`, is not marked
    /// for signing, is a symmetric or unknown key type, uses an unsupported
    /// curve, declares an algorithm outside its family, or carries key
    /// material that does not decode.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, JwkRejection> {
        let kid = required(jwk.kid.as_deref(), "kid")?;
        let kty = required(jwk.kty.as_deref(), "kty")?;

        if let Some(key_use) = jwk.key_use.as_deref() {
            if key_use != "sig" {
                return Err(JwkRejection::NotForSigning(key_use.to_string()));
            }
        }

        let algorithm = jwk
            .alg
            .as_deref()
            .map(|alg| {
                alg.parse::<Algorithm>()
                    .map_err(|_| JwkRejection::UnsupportedAlgorithm(alg.to_string()))
            })
            .transpose()?;

        let (family, decoding_key) = match kty {
            "RSA" => {
                let n = required(jwk.n.as_deref(), "n")?;
                let e = required(jwk.e.as_deref(), "e")?;
                let key = DecodingKey::from_rsa_components(n, e).map_err(invalid_material)?;
                (KeyFamily::Rsa, key)
            }
            "EC" => {
                let family = match required(jwk.crv.as_deref(), "crv")? {
                    "P-256" => KeyFamily::EcP256,
                    "P-384" => KeyFamily::EcP384,
                    other => return Err(JwkRejection::UnsupportedCurve(other.to_string())),
                };
                let x = required(jwk.x.as_deref(), "x")?;
                let y = required(jwk.y.as_deref(), "y")?;
                let key = DecodingKey::from_ec_components(x, y).map_err(invalid_material)?;
                (family, key)
            }
            "OKP" => {
                let crv = required(jwk.crv.as_deref(), "crv")?;
                if crv != "Ed25519" {
                    return Err(JwkRejection::UnsupportedCurve(crv.to_string()));
                }
                let x = required(jwk.x.as_deref(), "x")?;
                let key = DecodingKey::from_ed_components(x).map_err(invalid_material)?;
                (KeyFamily::Ed25519, key)
            }
            other => return Err(JwkRejection::UnsupportedKeyType(other.to_string())),
        };

        if let Some(alg) = algorithm {
            if !family.supports(alg) {
                return Err(JwkRejection::AlgorithmKeyMismatch {
                    alg: format!("{alg:?}"),
                    family,
                });
            }
        }

        Ok(Self {
            kid: kid.to_string(),
            family,
            algorithm,
            decoding_key,
        })
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    #[must_use]
    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// Algorithm the key set pinned this key to, if any.
    #[must_use]
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Whether a token header naming `alg` may be verified with this key.
    ///
    /// The algorithm must belong to the key's family and, when the key
    /// declares an `alg`, must be exactly that algorithm.
    #[must_use]
    pub fn accepts(&self, alg: Algorithm) -> bool {
        self.family.supports(alg) && self.algorithm.map_or(true, |pinned| pinned == alg)
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

fn required<'a>(value: Option<&'a str>, member: &'static str) -> Result<&'a str, JwkRejection> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(JwkRejection::MissingMember(member)),
    }
}

fn invalid_material(err: jsonwebtoken::errors::Error) -> JwkRejection {
    JwkRejection::InvalidKeyMaterial(err.to_string())
}

/// Immutable snapshot of the identity provider's signing keys.
///
/// The cache replaces the whole set on refresh and never mutates one in
/// place, so a reader holding an `Arc<KeySet>` always sees a consistent set.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    retrieved_at: Option<DateTime<Utc>>,
    generation: u64,
}

impl KeySet {
    /// The set the cache starts with before the first fetch.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set from converted keys. On duplicate key ids the later entry wins.
    pub fn from_keys(keys: impl IntoIterator<Item = SigningKey>, retrieved_at: DateTime<Utc>) -> Self {
        let mut by_kid = HashMap::new();
        for key in keys {
            if let Some(previous) = by_kid.insert(key.kid.clone(), Arc::new(key)) {
                tracing::warn!(
                    target: "api.auth.jwks",
                    kid = %previous.kid,
                    "Duplicate key id in JWKS, keeping the later entry"
                );
            }
        }
        Self {
            keys: by_kid,
            retrieved_at: Some(retrieved_at),
            generation: 0,
        }
    }

    #[must_use]
    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    #[must_use]
    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key ids in the set, sorted.
    #[must_use]
    pub fn kids(&self) -> Vec<&str> {
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        kids
    }

    /// When the set was fetched, `None` for the initial empty set.
    #[must_use]
    pub fn retrieved_at(&self) -> Option<DateTime<Utc>> {
        self.retrieved_at
    }

    /// Number of successful refreshes that preceded this set.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }
}
