//! API Service
//!
//! Serves the bearer-token protected API.

use api_service::config::Config;
use api_service::observability::metrics::init_metrics_recorder;
use api_service::routes::{self, AppState};
use api_service::tasks::start_key_refresh;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting API service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        issuer = %config.issuer,
        audience = %config.audience,
        jwks_url = %config.jwks_url,
        jwt_clock_skew_seconds = config.jwt_clock_skew.as_secs(),
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let bind_address: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address {}: {}", config.bind_address, e);
        e
    })?;
    let drain_period = config.drain_period;
    let refresh_interval = config.jwks_refresh_interval;

    let state = Arc::new(AppState::from_config(config));

    // Startup is not blocked on the identity provider; a failed prime is
    // retried by the first token with an unknown key id
    match state.key_cache.prime().await {
        Ok(key_count) => info!(key_count, "Signing keys loaded"),
        Err(e) => warn!(error = %e, "Initial signing key fetch failed, continuing with empty key set"),
    }

    let cancel_token = CancellationToken::new();
    let refresh_handle = refresh_interval.map(|period| {
        tokio::spawn(start_key_refresh(
            state.key_cache.clone(),
            period,
            cancel_token.child_token(),
        ))
    });

    let app = routes::build_routes(Arc::clone(&state), metrics_handle);

    let listener = tokio::net::TcpListener::bind(bind_address).await.map_err(|e| {
        error!("Failed to bind to {}: {}", bind_address, e);
        e
    })?;

    info!("API service listening on {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(drain_period))
        .await
        .map_err(|e| {
            error!("Server error: {}", e);
            e
        })?;

    cancel_token.cancel();
    if let Some(handle) = refresh_handle {
        if let Err(e) = handle.await {
            warn!("Key refresh task did not stop cleanly: {}", e);
        }
    }

    info!("API service shutdown complete");

    Ok(())
}

/// Initialize tracing. `LOG_FORMAT=json` switches to JSON output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "api_service=info,api=info,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM), then the drain period.
async fn shutdown_signal(drain_period: Duration) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    if drain_period.is_zero() {
        info!("Skipping drain period (DRAIN_SECONDS=0)");
    } else {
        warn!("Draining connections for {} seconds...", drain_period.as_secs());
        tokio::time::sleep(drain_period).await;
        info!("Drain period complete");
    }
}
