//! Metrics definitions for the API service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `api_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: HTTP methods
//! - `endpoint`: known paths, everything else is `/other`
//! - `status`: `success`, `error`, `timeout`
//! - `result`: `hit`, `miss`
//! - `outcome`: `valid` or an [`AuthError::reason`](crate::auth::AuthError::reason) code

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle for serving
/// `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("api_http_request".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // JWKS refreshes are network round trips bounded by the fetch timeout
        .set_buckets_for_metric(
            Matcher::Prefix("api_jwks_refresh".to_string()),
            &[
                0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `api_http_requests_total`, `api_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("api_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("api_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path onto a bounded set of endpoint labels.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/api/v1/me" => "/api/v1/me",
        _ => "/other",
    }
}

// ============================================================================
// JWKS Metrics
// ============================================================================

/// Record a completed key set refresh
///
/// Metric: `api_jwks_refresh_total`, `api_jwks_refresh_duration_seconds`
/// Labels: `status` (`success` or the [`FetchError::kind`](crate::auth::FetchError::kind))
pub fn record_jwks_refresh(status: &'static str, duration: Duration) {
    histogram!("api_jwks_refresh_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
    counter!("api_jwks_refresh_total", "status" => status).increment(1);
}

/// Set the number of keys currently cached
///
/// Metric: `api_jwks_keys`
pub fn set_jwks_key_count(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("api_jwks_keys").set(count as f64);
}

/// Record a key id lookup against the cached set
///
/// Metric: `api_jwks_cache_lookups_total`
/// Labels: `result` (`hit`, `miss`)
pub fn record_key_lookup(result: &'static str) {
    counter!("api_jwks_cache_lookups_total", "result" => result).increment(1);
}

// ============================================================================
// Token Validation Metrics
// ============================================================================

/// Record the outcome of authenticating a request
///
/// Metric: `api_token_validations_total`
/// Labels: `outcome`
pub fn record_token_validation(outcome: &'static str) {
    counter!("api_token_validations_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(401), "error");
        assert_eq!(categorize_status_code(503), "error");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/api/v1/me"), "/api/v1/me");
        assert_eq!(normalize_endpoint("/api/v1/users/12345"), "/other");
        assert_eq!(normalize_endpoint("/wp-admin"), "/other");
    }

    #[test]
    fn test_recording_without_recorder_is_a_no_op() {
        // The metrics facade discards records when no recorder is installed
        record_http_request("GET", "/health", 200, Duration::from_millis(3));
        record_jwks_refresh("success", Duration::from_millis(40));
        set_jwks_key_count(2);
        record_key_lookup("hit");
        record_token_validation("valid");
    }
}
