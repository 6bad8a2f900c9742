//! Current principal handler.
//!
//! Returns the identity established by the bearer token.

use crate::auth::Principal;
use axum::{Extension, Json};
use serde::Serialize;
use tracing::instrument;

/// Response for `/api/v1/me`.
#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub sub: String,
    pub iss: String,
    pub aud: Vec<String>,
    pub scopes: Vec<String>,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl From<Principal> for MeResponse {
    fn from(principal: Principal) -> Self {
        Self {
            sub: principal.subject,
            iss: principal.issuer,
            aud: principal.audience,
            scopes: principal.scopes,
            exp: principal.expires_at,
            iat: principal.issued_at,
        }
    }
}

/// Handler for GET /api/v1/me
///
/// Requires the auth middleware.
///
/// ## Response
///
/// ```json
/// {
///   "sub": "auth0|5f7c8ec7c33c6c004bbafe82",
///   "iss": "https://tenant.auth.example.com/",
///   "aud": ["https://api.example.com"],
///   "scopes": ["read:messages"],
///   "exp": 1234567890,
///   "iat": 1234567800
/// }
/// ```
#[instrument(skip_all, name = "api.handlers.me")]
pub async fn get_me(Extension(principal): Extension<Principal>) -> Json<MeResponse> {
    Json(MeResponse::from(principal))
}
