//! Periodic key set refresh.
//!
//! Refreshing on a schedule picks up key removals and pre-published keys
//! without waiting for a token with an unknown key id. Misses still refresh
//! on their own; a scheduled refresh that overlaps one joins it.
//!
//! # Graceful Shutdown
//!
//! The task exits when the cancellation token is cancelled. A refresh that
//! is already running completes in its own task.

use crate::auth::KeySetCache;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Start the periodic key refresh task.
///
/// The first refresh happens one `period` after start; startup priming is
/// done separately.
///
/// Returns when the cancellation token is triggered.
#[instrument(skip_all, name = "api.task.key_refresh")]
pub async fn start_key_refresh(
    key_cache: KeySetCache,
    period: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "api.task.key_refresh",
        period_seconds = period.as_secs(),
        "Starting key refresh task"
    );

    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match key_cache.force_refresh().await {
                    Ok(key_set) => {
                        tracing::debug!(
                            target: "api.task.key_refresh",
                            key_count = key_set.len(),
                            generation = key_set.generation(),
                            "Scheduled key refresh completed"
                        );
                    }
                    Err(e) => {
                        // Keep the current set and try again next period
                        warn!(
                            target: "api.task.key_refresh",
                            error = %e,
                            "Scheduled key refresh failed"
                        );
                    }
                }
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "api.task.key_refresh",
                    "Key refresh task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "api.task.key_refresh", "Key refresh task stopped");
}
