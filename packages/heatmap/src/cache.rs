//! Memoization of computed bins per request fingerprint.
//!
//! Entries expire after a TTL and are evicted when a persisted report could
//! change them. Concurrent misses on the same fingerprint share a single
//! in-flight computation, which runs as its own task so it finishes even if
//! every caller goes away. A data-version counter is bumped on every
//! invalidation, and a computation overtaken by a change it covers is
//! handed to its waiters but never published.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use complaint_map_complaint_models::ComplaintReport;
use complaint_map_database_models::GeoPredicate;
use complaint_map_heatmap_models::{AggregationRequest, HeatmapBin};
use futures::future::{BoxFuture, FutureExt as _, Shared};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::HeatmapError;
use crate::clock::Clock;

/// Bins shared between the cache and its readers.
pub type SharedBins = Arc<Vec<HeatmapBin>>;

type InFlight = Shared<BoxFuture<'static, Result<SharedBins, HeatmapError>>>;

/// Number of recent changes remembered for publishing results computed
/// under an older data version.
const CHANGE_HISTORY: usize = 1024;

/// Why the data version was bumped.
#[derive(Debug, Clone)]
enum Change {
    Persisted(ComplaintReport),
    Opaque,
}

/// The slice of the report stream a cached result depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coverage {
    /// Earliest report creation time included in the result.
    pub window_start: DateTime<Utc>,
    /// Jurisdiction restriction of the result.
    pub geo: GeoPredicate,
}

/// A published result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Request the bins answer.
    pub fingerprint: AggregationRequest,
    /// The bins.
    pub bins: SharedBins,
    /// Wall-clock time the computation was published.
    pub computed_at: DateTime<Utc>,
    /// Data version the computation started under.
    pub data_version: u64,
    /// When the entry stops being served.
    pub expires_at: Instant,
    /// What the result depends on.
    pub coverage: Coverage,
}

fn affects(
    fingerprint: &AggregationRequest,
    coverage: &Coverage,
    report: &ComplaintReport,
) -> bool {
    report.created_at >= coverage.window_start
        && fingerprint.category.matches(report.category)
        && coverage.geo.matches(report)
}

impl CacheEntry {
    /// Whether a newly persisted report could change this result.
    #[must_use]
    pub fn covers(&self, report: &ComplaintReport) -> bool {
        affects(&self.fingerprint, &self.coverage, report)
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Aborts the background sweep when dropped.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// TTL cache of heatmap results with single-flight computation.
pub struct AggregationCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<BTreeMap<AggregationRequest, CacheEntry>>,
    in_flight: Mutex<BTreeMap<(AggregationRequest, u64), InFlight>>,
    changes: Mutex<VecDeque<(u64, Change)>>,
    data_version: AtomicU64,
}

impl AggregationCache {
    /// Creates an empty cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(BTreeMap::new()),
            in_flight: Mutex::new(BTreeMap::new()),
            changes: Mutex::new(VecDeque::new()),
            data_version: AtomicU64::new(0),
        }
    }

    /// Current data version.
    #[must_use]
    pub fn data_version(&self) -> u64 {
        self.data_version.load(Ordering::SeqCst)
    }

    /// Number of stored entries, expired ones included until swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of computations currently running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the live entry for `fingerprint`.
    #[must_use]
    pub fn entry(&self, fingerprint: &AggregationRequest) -> Option<CacheEntry> {
        let now = Instant::now();
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fingerprint)
            .filter(|entry| entry.is_live(now))
            .cloned()
    }

    /// Returns the live bins for `fingerprint`.
    #[must_use]
    pub fn get(&self, fingerprint: &AggregationRequest) -> Option<SharedBins> {
        self.entry(fingerprint).map(|entry| entry.bins)
    }

    /// Publishes bins computed under `data_version`.
    ///
    /// Returns `false`, storing nothing, if a change since the computation
    /// started could alter the result, or if that can no longer be told.
    pub fn put(
        &self,
        fingerprint: AggregationRequest,
        bins: SharedBins,
        data_version: u64,
        coverage: Coverage,
    ) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if data_version != self.data_version()
            && self.overtaken(&fingerprint, &coverage, data_version)
        {
            log::debug!(
                "Discarding result for {fingerprint:?} computed under stale version {data_version}"
            );
            return false;
        }

        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            bins,
            computed_at: self.clock.now(),
            data_version,
            expires_at: Instant::now() + self.ttl,
            coverage,
        };
        entries.insert(fingerprint, entry);
        true
    }

    /// Whether a change recorded after `since` could alter a result for
    /// `fingerprint`. Must be called with the entries lock held.
    fn overtaken(
        &self,
        fingerprint: &AggregationRequest,
        coverage: &Coverage,
        since: u64,
    ) -> bool {
        let changes = self.changes.lock().unwrap_or_else(PoisonError::into_inner);

        // Versions in the history are contiguous up to the current one.
        if changes
            .front()
            .is_none_or(|(version, _)| *version > since + 1)
        {
            return true;
        }

        changes
            .iter()
            .filter(|(version, _)| *version > since)
            .any(|(_, change)| match change {
                Change::Persisted(report) => affects(fingerprint, coverage, report),
                Change::Opaque => true,
            })
    }

    fn record(&self, change: Change, predicate: impl Fn(&CacheEntry) -> bool) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let version = self.data_version.fetch_add(1, Ordering::SeqCst) + 1;

        let mut changes = self.changes.lock().unwrap_or_else(PoisonError::into_inner);
        changes.push_back((version, change));
        while changes.len() > CHANGE_HISTORY {
            changes.pop_front();
        }
        drop(changes);

        let before = entries.len();
        entries.retain(|_, entry| !predicate(entry));
        before - entries.len()
    }

    /// Evicts every entry matching `predicate` and bumps the data version,
    /// so no computation already in flight is published. Returns the number
    /// of evicted entries.
    pub fn invalidate(&self, predicate: impl Fn(&CacheEntry) -> bool) -> usize {
        self.record(Change::Opaque, predicate)
    }

    /// Invalidation hook for a newly persisted report: evicts every entry
    /// whose window, category and jurisdiction cover it. Computations in
    /// flight are still published unless the report falls inside them.
    pub fn notify_complaint_persisted(&self, report: &ComplaintReport) -> usize {
        let evicted = self.record(Change::Persisted(report.clone()), |entry| {
            entry.covers(report)
        });
        log::debug!(
            "Report {} persisted, evicted {evicted} cache entries (version {})",
            report.id,
            self.data_version()
        );
        evicted
    }

    /// Removes expired entries. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Returns the cached bins for `fingerprint`, or runs `compute` and
    /// publishes its result.
    ///
    /// Concurrent callers with the same fingerprint and data version await
    /// one shared computation; `compute` is only invoked by the first. The
    /// computation is spawned, so dropping a caller never strands it.
    /// Failures are returned to every waiter and never cached.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns whatever error the computation produced.
    pub async fn get_or_compute<F, Fut>(
        self: &Arc<Self>,
        fingerprint: AggregationRequest,
        coverage: Coverage,
        compute: F,
    ) -> Result<SharedBins, HeatmapError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<HeatmapBin>, HeatmapError>> + Send + 'static,
    {
        if let Some(bins) = self.get(&fingerprint) {
            log::debug!("Cache hit for {fingerprint:?}");
            return Ok(bins);
        }

        let shared = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);

            // A computation may have been published since the first lookup.
            if let Some(bins) = self.get(&fingerprint) {
                return Ok(bins);
            }

            let key = (fingerprint, self.data_version());
            if let Some(existing) = in_flight.get(&key) {
                log::debug!("Joining in-flight computation for {:?}", key.0);
                existing.clone()
            } else {
                log::debug!("Cache miss for {:?} at version {}", key.0, key.1);
                let shared = self.publish_on_completion(key.clone(), coverage, compute());
                in_flight.insert(key, shared.clone());
                shared
            }
        };

        shared.await
    }

    fn publish_on_completion<Fut>(
        self: &Arc<Self>,
        key: (AggregationRequest, u64),
        coverage: Coverage,
        computation: Fut,
    ) -> InFlight
    where
        Fut: Future<Output = Result<Vec<HeatmapBin>, HeatmapError>> + Send + 'static,
    {
        let cache = Arc::clone(self);

        // The caller holds the in-flight lock until the key is inserted, so
        // the removal below cannot run first.
        let task = tokio::spawn(async move {
            let result = computation.await.map(Arc::new);

            if let Ok(bins) = &result {
                cache.put(key.0.clone(), Arc::clone(bins), key.1, coverage);
            }
            cache
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);

            result
        });

        task.map(|joined| {
            joined.unwrap_or_else(|e| {
                log::error!("Heatmap computation task failed: {e}");
                Err(HeatmapError::InternalAggregation {
                    message: format!("computation task failed: {e}"),
                })
            })
        })
        .boxed()
        .shared()
    }

    /// Starts a background task that sweeps expired entries every
    /// `interval`. The task stops when the handle is dropped or the cache
    /// is gone.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let cache = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let swept = cache.sweep_expired();
                if swept > 0 {
                    log::debug!("Swept {swept} expired cache entries");
                }
            }
        });

        SweeperHandle { task }
    }
}
