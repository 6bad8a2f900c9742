//! HTTP routes for the API service.
//!
//! Defines the Axum router and application state.

use crate::auth::{AuthGate, JwksFetcher, KeySetCache, TokenValidator};
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Process-wide signing key cache.
    pub key_cache: KeySetCache,

    /// Authentication gate for protected routes.
    pub gate: Arc<AuthGate>,
}

impl AppState {
    /// Wire the JWKS fetcher, key cache, validator and gate from configuration.
    ///
    /// Nothing is fetched here; the cache starts empty.
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        let fetcher = JwksFetcher::new(config.jwks_url.clone(), config.jwks_fetch_timeout);
        let key_cache = KeySetCache::new(Arc::new(fetcher), config.jwks_fetch_timeout);
        Self::with_key_cache(config, key_cache)
    }

    /// Build state around an existing key cache.
    #[must_use]
    pub fn with_key_cache(config: Config, key_cache: KeySetCache) -> Self {
        let validator = TokenValidator::new(key_cache.clone()).with_leeway(config.jwt_clock_skew);
        let gate = Arc::new(AuthGate::new(
            Arc::new(validator),
            config.issuer.clone(),
            config.audience.clone(),
        ));

        Self {
            config,
            key_cache,
            gate,
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness and key set status - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/api/v1/me` - Current principal - requires authentication
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        gate: Arc::clone(&state.gate),
    });

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route("/api/v1/me", get(handlers::get_me))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth));

    // Each .layer() wraps the ones before it:
    // 1. TraceLayer - Log request details (innermost)
    // 2. TimeoutLayer - Timeout the request, including tracing
    // 3. http_metrics_middleware - Record ALL responses, timeouts included (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn test_config_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<Config>();
    }
}
