//! Authenticated principal.
//!
//! Built only from tokens that passed every validation step. The subject is
//! redacted in Debug output to prevent exposure in logs.

use common::jwt::TokenClaims;
use serde::Serialize;
use std::fmt;

/// Identity established by a validated bearer token.
#[derive(Clone, PartialEq, Serialize)]
pub struct Principal {
    /// Subject (user or client identifier) - redacted in Debug output.
    pub subject: String,

    pub issuer: String,

    /// Audiences the token was issued for.
    pub audience: Vec<String>,

    /// Expiration timestamp (Unix epoch seconds).
    pub expires_at: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<i64>,

    /// Granted scopes and permissions.
    pub scopes: Vec<String>,

    /// Claims not modelled above.
    #[serde(skip)]
    pub extra_claims: serde_json::Map<String, serde_json::Value>,
}

impl Principal {
    pub(crate) fn from_claims(claims: TokenClaims) -> Self {
        let scopes = claims.scopes();
        Self {
            subject: claims.sub,
            issuer: claims.iss.unwrap_or_default(),
            audience: claims.aud.map(|aud| aud.to_vec()).unwrap_or_default(),
            expires_at: claims.exp,
            issued_at: claims.iat,
            scopes,
            extra_claims: claims.extra,
        }
    }

    /// Check if the principal was granted `scope`.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Look up a claim that has no dedicated field.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra_claims.get(name)
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("subject", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expires_at", &self.expires_at)
            .field("issued_at", &self.issued_at)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: serde_json::Value) -> TokenClaims {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_from_claims() {
        let principal = Principal::from_claims(claims(json!({
            "sub": "auth0|alice",
            "exp": 2_000_000_000,
            "iat": 1_900_000_000,
            "iss": "https://tenant.example.com/",
            "aud": ["https://api.example.com", "https://tenant.example.com/userinfo"],
            "scope": "read:items write:items",
            "permissions": ["read:items", "delete:items"],
            "org_id": "org_123"
        })));

        assert_eq!(principal.subject, "auth0|alice");
        assert_eq!(principal.issuer, "https://tenant.example.com/");
        assert_eq!(principal.audience.len(), 2);
        assert_eq!(principal.issued_at, Some(1_900_000_000));
        assert_eq!(
            principal.scopes,
            vec!["read:items", "write:items", "delete:items"]
        );
        assert!(principal.has_scope("delete:items"));
        assert!(!principal.has_scope("admin"));
        assert_eq!(principal.claim("org_id"), Some(&json!("org_123")));
    }

    #[test]
    fn test_debug_redacts_subject() {
        let principal = Principal::from_claims(claims(json!({
            "sub": "secret-user-id",
            "exp": 2_000_000_000,
            "iss": "https://tenant.example.com/",
            "aud": "https://api.example.com"
        })));

        let debug = format!("{principal:?}");

        assert!(!debug.contains("secret-user-id"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_serialize_skips_extra_claims() {
        let principal = Principal::from_claims(claims(json!({
            "sub": "u",
            "exp": 1,
            "internal_flag": true
        })));

        let value = serde_json::to_value(&principal).unwrap();

        assert!(value.get("extra_claims").is_none());
        assert!(value.get("issued_at").is_none());
    }
}
