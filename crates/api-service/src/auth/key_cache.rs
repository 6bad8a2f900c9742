//! Shared key set cache with miss-driven, coalesced refresh.
//!
//! Every token validation resolves its `kid` here. Lookups read a snapshot
//! of the current [`KeySet`]; only a miss triggers a refresh, and at most
//! one refresh runs at a time. Callers that miss while a refresh is running
//! wait for that refresh instead of starting their own, and all of them
//! observe the same outcome.
//!
//! # Invariants
//!
//! - The current set is only ever replaced by a complete, successfully
//!   fetched set. A failed refresh leaves it untouched.
//! - A refresh is bounded by the fetch timeout. When it elapses the refresh
//!   fails and the next miss starts a fresh one.
//! - The refresh runs in its own task, so a caller that gives up waiting
//!   does not cancel it for the others.
//! - Failures are not cached: a miss that happens after a failed refresh
//!   gets a new attempt. Misses that were already waiting share the failure.

use crate::auth::jwks::{FetchError, KeySource};
use crate::auth::keys::{KeySet, SigningKey};
use crate::observability::metrics;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::instrument;

/// Why a key id could not be resolved.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// The set was refreshed and still does not contain the key id.
    #[error("signing key {0:?} is not in the key set")]
    UnknownKey(String),

    /// The refresh triggered by the miss failed.
    #[error("key set refresh failed: {0}")]
    FetchFailed(#[source] FetchError),
}

type RefreshOutcome = Result<Arc<KeySet>, FetchError>;

struct InFlightRefresh {
    id: u64,
    outcome: watch::Receiver<Option<RefreshOutcome>>,
}

struct CompletedRefresh {
    id: u64,
    outcome: RefreshOutcome,
}

/// Refresh bookkeeping guarded by one lock.
#[derive(Default)]
struct RefreshSlot {
    running: Option<InFlightRefresh>,
    last_completed: Option<CompletedRefresh>,
}

/// What a caller saw when its lookup missed.
#[derive(Debug, Clone, Copy)]
struct Miss {
    generation: u64,
    /// Id the next refresh to start will get. Refreshes with this id or
    /// later began after the miss and answer it.
    next_refresh: u64,
}

struct CacheInner {
    source: Arc<dyn KeySource>,
    current: RwLock<Arc<KeySet>>,
    in_flight: Mutex<RefreshSlot>,
    next_refresh_id: AtomicU64,
    fetch_timeout: Duration,
}

/// Cloneable handle to the process-wide key set.
#[derive(Clone)]
pub struct KeySetCache {
    inner: Arc<CacheInner>,
}

impl KeySetCache {
    /// Create an empty cache backed by `source`.
    ///
    /// The cache starts with no keys; the first lookup (or [`prime`]) fetches.
    ///
    /// [`prime`]: KeySetCache::prime
    pub fn new(source: Arc<dyn KeySource>, fetch_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                source,
                current: RwLock::new(Arc::new(KeySet::empty())),
                in_flight: Mutex::new(RefreshSlot::default()),
                next_refresh_id: AtomicU64::new(0),
                fetch_timeout,
            }),
        }
    }

    /// The key set currently in use.
    pub async fn snapshot(&self) -> Arc<KeySet> {
        Arc::clone(&*self.inner.current.read().await)
    }

    /// Resolve `kid` to a signing key, refreshing the set on a miss.
    ///
    /// # Errors
    ///
    /// - `UnknownKey` - the key id is absent even after a refresh
    /// - `FetchFailed` - the refresh needed to look for the key failed
    #[instrument(skip_all, fields(kid = %kid))]
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, CacheError> {
        let snapshot = self.snapshot().await;
        if let Some(key) = snapshot.get(kid) {
            metrics::record_key_lookup("hit");
            return Ok(key);
        }
        metrics::record_key_lookup("miss");

        tracing::debug!(
            target: "api.auth.cache",
            generation = snapshot.generation(),
            "Key id not cached, refreshing key set"
        );

        let miss = Miss {
            generation: snapshot.generation(),
            next_refresh: self.inner.next_refresh_id.load(Ordering::SeqCst),
        };
        let refreshed = self
            .refresh_after(Some(miss))
            .await
            .map_err(CacheError::FetchFailed)?;

        refreshed.get(kid).ok_or_else(|| {
            tracing::debug!(target: "api.auth.cache", "Key id not present after refresh");
            CacheError::UnknownKey(kid.to_string())
        })
    }

    /// Refresh the key set now, joining a refresh that is already running.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchError`] of the refresh; the current set is kept.
    pub async fn force_refresh(&self) -> Result<Arc<KeySet>, FetchError> {
        self.refresh_after(None).await
    }

    /// Load the initial key set, returning the number of keys.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchError`] of the initial fetch.
    pub async fn prime(&self) -> Result<usize, FetchError> {
        self.force_refresh().await.map(|set| set.len())
    }

    /// Obtain a key set refreshed after the caller's miss.
    ///
    /// With `Some(miss)`, a refresh that started after the miss answers it
    /// without another fetch, whether it succeeded or failed. A successful
    /// refresh that completed after the miss snapshot answers it as well.
    async fn refresh_after(&self, miss: Option<Miss>) -> RefreshOutcome {
        let mut outcome = {
            let mut slot = self.inner.in_flight.lock().await;

            if let Some(miss) = miss {
                let current = Arc::clone(&*self.inner.current.read().await);
                if current.generation() > miss.generation {
                    return Ok(current);
                }
                if let Some(done) = slot
                    .last_completed
                    .as_ref()
                    .filter(|done| done.id >= miss.next_refresh)
                {
                    tracing::debug!(
                        target: "api.auth.cache",
                        refresh_id = done.id,
                        "Sharing outcome of refresh completed after miss"
                    );
                    return done.outcome.clone();
                }
            }

            match slot.running.as_ref() {
                Some(running) if running.outcome.has_changed().is_ok() => {
                    tracing::debug!(
                        target: "api.auth.cache",
                        refresh_id = running.id,
                        "Joining in-flight key set refresh"
                    );
                    running.outcome.clone()
                }
                _ => {
                    let started = self.spawn_refresh();
                    let receiver = started.outcome.clone();
                    slot.running = Some(started);
                    receiver
                }
            }
        };

        let result = match outcome.wait_for(Option::is_some).await {
            Ok(value) => match &*value {
                Some(result) => result.clone(),
                None => Err(FetchError::Interrupted),
            },
            Err(_) => Err(FetchError::Interrupted),
        };
        result
    }

    /// Start a refresh task. Must be called with the slot lock held.
    fn spawn_refresh(&self) -> InFlightRefresh {
        let id = self.inner.next_refresh_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = watch::channel(None);
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let result = inner.run_refresh(id).await;

            // Record the outcome before publishing so a miss queued behind
            // the slot lock shares it instead of fetching again.
            let mut slot = inner.in_flight.lock().await;
            if slot.running.as_ref().is_some_and(|running| running.id == id) {
                slot.running = None;
            }
            if slot.last_completed.as_ref().map_or(true, |done| done.id < id) {
                slot.last_completed = Some(CompletedRefresh {
                    id,
                    outcome: result.clone(),
                });
            }
            sender.send_replace(Some(result));
        });

        InFlightRefresh {
            id,
            outcome: receiver,
        }
    }
}

impl CacheInner {
    #[instrument(skip(self))]
    async fn run_refresh(&self, id: u64) -> RefreshOutcome {
        let started = Instant::now();

        let fetched = match tokio::time::timeout(self.fetch_timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.fetch_timeout)),
        };

        match fetched {
            Ok(set) => {
                let mut current = self.current.write().await;
                let generation = current.generation().saturating_add(1);
                let set = Arc::new(set.with_generation(generation));
                *current = Arc::clone(&set);
                drop(current);

                tracing::info!(
                    target: "api.auth.cache",
                    generation,
                    key_count = set.len(),
                    kids = ?set.kids(),
                    "Key set refreshed"
                );
                metrics::record_jwks_refresh("success", started.elapsed());
                metrics::set_jwks_key_count(set.len());
                Ok(set)
            }
            Err(e) => {
                tracing::warn!(
                    target: "api.auth.cache",
                    error = %e,
                    "Key set refresh failed, keeping current key set"
                );
                metrics::record_jwks_refresh(e.kind(), started.elapsed());
                Err(e)
            }
        }
    }
}
