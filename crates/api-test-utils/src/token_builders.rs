//! Builder patterns for test data construction
//!
//! Provides a fluent API for access-token claims.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Issuer used by default in test tokens and test configuration.
pub const TEST_ISSUER: &str = "https://test-tenant.auth.example.com/";

/// Audience used by default in test tokens and test configuration.
pub const TEST_AUDIENCE: &str = "https://api.example.com";

/// Builder for creating test JWT claims
///
/// Defaults produce claims that pass validation against [`TEST_ISSUER`] and
/// [`TEST_AUDIENCE`] for the next hour.
///
/// # Example
/// ```rust,ignore
/// let claims = TestClaimsBuilder::new()
///     .for_subject("auth0|alice")
///     .with_scope("read:items")
///     .expires_in(3600)
///     .build();
/// ```
pub struct TestClaimsBuilder {
    sub: String,
    iss: Option<String>,
    aud: Option<Value>,
    exp: i64,
    nbf: Option<i64>,
    iat: i64,
    scope: Option<String>,
    permissions: Option<Vec<String>>,
    extra: Map<String, Value>,
}

impl TestClaimsBuilder {
    /// Create a new claims builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-subject".to_string(),
            iss: Some(TEST_ISSUER.to_string()),
            aud: Some(json!(TEST_AUDIENCE)),
            exp: (now + Duration::seconds(3600)).timestamp(),
            nbf: None,
            iat: now.timestamp(),
            scope: None,
            permissions: None,
            extra: Map::new(),
        }
    }

    /// Set the subject
    pub fn for_subject(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the issuer
    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = Some(issuer.to_string());
        self
    }

    /// Omit the `iss` claim
    pub fn without_issuer(mut self) -> Self {
        self.iss = None;
        self
    }

    /// Set a single audience
    pub fn for_audience(mut self, audience: &str) -> Self {
        self.aud = Some(json!(audience));
        self
    }

    /// Set an audience array
    pub fn for_audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = Some(json!(audiences));
        self
    }

    /// Omit the `aud` claim
    pub fn without_audience(mut self) -> Self {
        self.aud = None;
        self
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set an absolute expiration timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = timestamp;
        self
    }

    /// Set an absolute not-before timestamp
    pub fn not_before(mut self, timestamp: i64) -> Self {
        self.nbf = Some(timestamp);
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Set the scope (space-separated)
    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }

    /// Set the permissions array
    pub fn with_permissions(mut self, permissions: &[&str]) -> Self {
        self.permissions = Some(permissions.iter().map(|p| p.to_string()).collect());
        self
    }

    /// Add an arbitrary claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = self.extra;
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("exp".to_string(), json!(self.exp));
        claims.insert("iat".to_string(), json!(self.iat));
        if let Some(iss) = self.iss {
            claims.insert("iss".to_string(), json!(iss));
        }
        if let Some(aud) = self.aud {
            claims.insert("aud".to_string(), aud);
        }
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), json!(nbf));
        }
        if let Some(scope) = self.scope {
            claims.insert("scope".to_string(), json!(scope));
        }
        if let Some(permissions) = self.permissions {
            claims.insert("permissions".to_string(), json!(permissions));
        }
        Value::Object(claims)
    }
}

impl Default for TestClaimsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
