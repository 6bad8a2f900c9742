//! Authentication middleware for protected routes.
//!
//! Hands the `Authorization` header to the [`AuthGate`], injects the
//! resulting [`Principal`] into request extensions, and turns rejections
//! into 401 (or 503 when the key set could not be fetched).

use crate::auth::{AuthGate, Principal};
use crate::errors::ApiError;
use crate::observability::metrics::record_token_validation;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub gate: Arc<AuthGate>,
}

/// Authentication middleware that validates bearer tokens.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// # Response
///
/// - 401 Unauthorized with `WWW-Authenticate` if the credential is missing or invalid
/// - 503 Service Unavailable if the key set needed to check it could not be fetched
/// - Otherwise continues with the [`Principal`] in extensions
#[instrument(skip(state, req, next), name = "api.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    // A header that is not visible ASCII is treated as no credential
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    match state.gate.authenticate(authorization).await {
        Ok(principal) => {
            tracing::debug!(
                target: "api.middleware.auth",
                scopes = ?principal.scopes,
                "Request authenticated"
            );
            record_token_validation("valid");
            req.extensions_mut().insert(principal);
            Ok(next.run(req).await)
        }
        Err(e) => {
            tracing::debug!(
                target: "api.middleware.auth",
                reason = e.reason(),
                error = %e,
                "Request rejected"
            );
            record_token_validation(e.reason());
            Err(ApiError::from(e))
        }
    }
}

/// Extension trait for extracting the principal from a request.
pub trait PrincipalExt {
    /// Returns `None` if the auth middleware was not applied to this request.
    fn principal(&self) -> Option<&Principal>;
}

impl<B> PrincipalExt for axum::extract::Request<B> {
    fn principal(&self) -> Option<&Principal> {
        self.extensions().get::<Principal>()
    }
}
