//! Health check handler.
//!
//! Liveness plus the state of the cached key set. The endpoint never fails:
//! an empty key set is reported, not turned into an error, because the
//! first token with an unknown key id triggers a fetch anyway.

use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Response for `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `healthy` while the process is serving.
    pub status: String,

    /// `loaded` once a key set has been fetched, otherwise `empty`.
    pub jwks: String,

    pub key_count: usize,

    /// RFC 3339 time of the last successful key set fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_refreshed_at: Option<String>,
}

/// Handler for GET /health
///
/// ## Example Response
///
/// ```json
/// {
///   "status": "healthy",
///   "jwks": "loaded",
///   "key_count": 2,
///   "jwks_refreshed_at": "2026-01-01T00:00:00+00:00"
/// }
/// ```
#[instrument(skip_all, name = "api.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let key_set = state.key_cache.snapshot().await;

    Json(HealthResponse {
        status: "healthy".to_string(),
        jwks: if key_set.is_empty() { "empty" } else { "loaded" }.to_string(),
        key_count: key_set.len(),
        jwks_refreshed_at: key_set.retrieved_at().map(|at| at.to_rfc3339()),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_omits_missing_refresh_time() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            jwks: "empty".to_string(),
            key_count: 0,
            jwks_refreshed_at: None,
        };

        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["status"], "healthy");
        assert_eq!(value["jwks"], "empty");
        assert!(value.get("jwks_refreshed_at").is_none());
    }
}
