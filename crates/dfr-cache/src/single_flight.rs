//! Result cache with at-most-one computation per key.
//!
//! ```text
//! get(key) ── hit ──────────────────────────────────────▶ Hit
//!    │ miss
//! join in-flight handle for key, lock it
//! get(key) ── hit (someone computed while we waited) ───▶ Hit
//!    │ miss
//! compute ── error ─────────────────────────────────────▶ Err (nothing stored)
//!    │
//! insert_if_absent ── Inserted ─────────────────────────▶ Computed
//!                  └─ Existing (another process won) ───▶ RaceLost
//! ```
//!
//! The in-flight map only dedups callers inside this process. Across
//! processes the store's insert-if-absent is the backstop. Every store call
//! is bounded by `persist_timeout`; a timeout is a `SystemError`, not a retry.

use dfr_kernel::{EngineError, SystemError};
use dfr_store::{CacheKey, InsertOutcome, ReportRow, ReportStore, StoreError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::from_secs(5);

/// How a cached lookup was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from the store without computing.
    Hit(ReportRow),
    /// Computed here and stored.
    Computed(ReportRow),
    /// Computed here, but another writer stored first; this is their row.
    RaceLost(ReportRow),
}

impl CacheOutcome {
    pub fn row(&self) -> &ReportRow {
        match self {
            CacheOutcome::Hit(row) | CacheOutcome::Computed(row) | CacheOutcome::RaceLost(row) => {
                row
            }
        }
    }

    pub fn into_row(self) -> ReportRow {
        match self {
            CacheOutcome::Hit(row) | CacheOutcome::Computed(row) | CacheOutcome::RaceLost(row) => {
                row
            }
        }
    }

    /// The returned report was not computed by this call.
    pub fn is_hit(&self) -> bool {
        !matches!(self, CacheOutcome::Computed(_))
    }
}

type InFlightMap = Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>;

pub struct ResultCache {
    store: Arc<dyn ReportStore>,
    in_flight: InFlightMap,
    persist_timeout: Duration,
}

impl ResultCache {
    pub fn new(store: Arc<dyn ReportStore>, persist_timeout: Duration) -> Self {
        Self {
            store,
            in_flight: Mutex::new(HashMap::new()),
            persist_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn ReportStore> {
        &self.store
    }

    pub fn persist_timeout(&self) -> Duration {
        self.persist_timeout
    }

    /// Keys with a computation currently in flight.
    pub fn in_flight_len(&self) -> usize {
        lock_map(&self.in_flight).len()
    }

    /// Return the stored report for `key`, computing and storing it at most
    /// once if absent.
    ///
    /// `compute` errors are returned as-is and never stored.
    pub async fn get_or_compute<F>(&self, key: &CacheKey, compute: F) -> Result<CacheOutcome, EngineError>
    where
        F: FnOnce() -> Result<ReportRow, EngineError>,
    {
        if let Some(row) = self.bounded("read", self.store.get(key)).await? {
            tracing::debug!(key = %key, "cache hit");
            return Ok(CacheOutcome::Hit(row));
        }

        let flight = InFlight::join(&self.in_flight, key);
        let _permit = flight.handle.lock().await;

        if let Some(row) = self.bounded("read", self.store.get(key)).await? {
            tracing::debug!(key = %key, "cache hit after waiting on in-flight computation");
            return Ok(CacheOutcome::Hit(row));
        }

        let row = compute()?;
        if row.key() != *key {
            return Err(SystemError::Internal(format!(
                "computed row {} does not match cache key {key}",
                row.key()
            ))
            .into());
        }

        match self.bounded("write", self.store.insert_if_absent(row.clone())).await? {
            InsertOutcome::Inserted => {
                tracing::debug!(key = %key, "report computed and stored");
                Ok(CacheOutcome::Computed(row))
            }
            InsertOutcome::Existing(winner) => {
                tracing::info!(key = %key, "lost insert race; serving stored report");
                Ok(CacheOutcome::RaceLost(*winner))
            }
        }
    }

    /// Run one store call under the persistence timeout.
    pub async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, SystemError> {
        match tokio::time::timeout(self.persist_timeout, fut).await {
            Ok(result) => result.map_err(SystemError::from),
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.persist_timeout.as_millis() as u64,
                    "persistence timed out"
                );
                Err(SystemError::PersistenceTimeout {
                    operation: operation.to_string(),
                    timeout_ms: self.persist_timeout.as_millis() as u64,
                })
            }
        }
    }
}

fn lock_map(map: &InFlightMap) -> MutexGuard<'_, HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Membership in the in-flight set for one key. The last member out removes
/// the entry.
struct InFlight<'a> {
    map: &'a InFlightMap,
    key: CacheKey,
    handle: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> InFlight<'a> {
    fn join(map: &'a InFlightMap, key: &CacheKey) -> Self {
        let handle = lock_map(map).entry(key.clone()).or_default().clone();
        Self {
            map,
            key: key.clone(),
            handle,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut map = lock_map(self.map);
        // One reference in the map, one here: nobody else is waiting.
        if Arc::strong_count(&self.handle) == 2 {
            map.remove(&self.key);
        }
    }
}
