//! Counter state, in the two durability strategies the service supports.
//!
//! `CachedStats` keeps the pair in memory behind lock-free atomics and
//! relies on a periodic flush task for durability: reads and increments
//! never touch the disk, and a crash loses at most one flush interval of
//! increments.
//!
//! `DurableStats` keeps no memory at all: every read or mutation is one
//! read-modify-write transaction against the store, so the persisted pair
//! always matches the last completed request at the cost of a disk
//! transaction per request.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::counter;
use tracing::{debug, error};

use crate::application::error::AppError;
use crate::domain::counters::CounterPair;
use crate::infra::store::{StatsStore, StoreError};

const SOURCE: &str = "application::stats";

/// Eventually-persisted counters: atomic in-memory pair, flushed on a
/// fixed interval by [`run_flush_loop`].
pub struct CachedStats {
    visits: AtomicU64,
    likes: AtomicU64,
    store: Arc<StatsStore>,
}

impl CachedStats {
    /// Seed the in-memory pair from the last persisted values.
    pub fn new(store: Arc<StatsStore>, seed: CounterPair) -> Self {
        Self {
            visits: AtomicU64::new(seed.visits),
            likes: AtomicU64::new(seed.likes),
            store,
        }
    }

    pub fn snapshot(&self) -> CounterPair {
        CounterPair {
            visits: self.visits.load(Ordering::Relaxed),
            likes: self.likes.load(Ordering::Relaxed),
        }
    }

    /// Count a homepage view and return the pair as of this increment.
    /// Non-blocking; durability comes from the next flush tick.
    pub fn record_visit(&self) -> CounterPair {
        let visits = self.visits.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        CounterPair {
            visits,
            likes: self.likes.load(Ordering::Relaxed),
        }
    }

    /// Count a like and return the pair as of this increment.
    pub fn record_like(&self) -> CounterPair {
        let likes = self.likes.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        CounterPair {
            visits: self.visits.load(Ordering::Relaxed),
            likes,
        }
    }

    /// Persist the current in-memory pair. Both counters go into one
    /// transaction so the stored pair is never torn.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.store.save(self.snapshot())
    }
}

/// Strongly-durable counters: each operation is one store transaction.
pub struct DurableStats {
    store: Arc<StatsStore>,
    like_decrements_visits: bool,
}

impl DurableStats {
    pub fn new(store: Arc<StatsStore>, like_decrements_visits: bool) -> Self {
        Self {
            store,
            like_decrements_visits,
        }
    }

    /// Increment the visit counter and return the committed pair.
    pub async fn record_visit(&self) -> Result<CounterPair, AppError> {
        let store = Arc::clone(&self.store);
        run_transaction(move || store.apply(CounterPair::with_visit)).await
    }

    /// Increment the like counter (and, in compatibility mode, decrement
    /// the visit counter) and return the committed pair. A failed
    /// transaction leaves both counters untouched.
    pub async fn record_like(&self) -> Result<CounterPair, AppError> {
        let store = Arc::clone(&self.store);
        let decrement_visits = self.like_decrements_visits;
        run_transaction(move || store.apply(|pair| pair.with_like(decrement_visits))).await
    }

    /// Read the persisted pair without mutating it.
    pub async fn load(&self) -> Result<CounterPair, AppError> {
        let store = Arc::clone(&self.store);
        run_transaction(move || store.load()).await
    }
}

/// Store transactions are synchronous disk I/O; keep them off the
/// request-handling runtime threads.
async fn run_transaction<F, T>(op: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|err| AppError::unexpected(format!("store task failed: {err}")))?
        .map_err(AppError::from)
}

/// Periodic persistence loop for the cached strategy. Runs until the task
/// is dropped at shutdown; a failed flush is logged and retried on the
/// next tick, never escalated.
pub async fn run_flush_loop(stats: Arc<CachedStats>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // the first tick fires immediately; skip it
    loop {
        ticker.tick().await;
        match stats.flush() {
            Ok(()) => {
                counter!("jairo_stats_flush_total").increment(1);
                debug!(target_module = SOURCE, "counters persisted");
            }
            Err(err) => {
                counter!("jairo_stats_flush_error_total").increment(1);
                error!(target_module = SOURCE, error = %err, "failed to persist counters");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Arc<StatsStore>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StatsStore::open(dir.path().join("jairo.db")).expect("open store");
        (dir, Arc::new(store))
    }

    #[test]
    fn cached_increments_are_immediate_and_in_memory() {
        let (_dir, store) = temp_store();
        let stats = CachedStats::new(Arc::clone(&store), CounterPair::new(10, 2));

        assert_eq!(stats.record_visit(), CounterPair::new(11, 2));
        assert_eq!(stats.record_like(), CounterPair::new(11, 3));

        // Nothing persisted until a flush.
        assert_eq!(store.load().expect("load"), CounterPair::default());
    }

    #[test]
    fn cached_flush_persists_both_counters_together() {
        let (_dir, store) = temp_store();
        let stats = CachedStats::new(Arc::clone(&store), CounterPair::new(10, 2));
        stats.record_visit();
        stats.record_like();

        stats.flush().expect("flush");
        assert_eq!(store.load().expect("load"), CounterPair::new(11, 3));
    }

    #[test]
    fn cached_counters_survive_concurrent_increments() {
        let (_dir, store) = temp_store();
        let stats = Arc::new(CachedStats::new(store, CounterPair::default()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = Arc::clone(&stats);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    stats.record_visit();
                    stats.record_like();
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker");
        }

        assert_eq!(stats.snapshot(), CounterPair::new(8000, 8000));
    }

    #[tokio::test]
    async fn durable_likes_accumulate_exactly() {
        let (_dir, store) = temp_store();
        store.save(CounterPair::new(10, 2)).expect("seed");
        let stats = DurableStats::new(Arc::clone(&store), false);

        for _ in 0..3 {
            stats.record_like().await.expect("like");
        }

        assert_eq!(store.load().expect("load"), CounterPair::new(10, 5));
    }

    #[tokio::test]
    async fn durable_like_decrements_visits_in_compatibility_mode() {
        let (_dir, store) = temp_store();
        store.save(CounterPair::new(10, 2)).expect("seed");
        let stats = DurableStats::new(Arc::clone(&store), true);

        let pair = stats.record_like().await.expect("like");
        assert_eq!(pair, CounterPair::new(9, 3));
        assert_eq!(store.load().expect("load"), pair);
    }

    #[tokio::test]
    async fn durable_visit_is_persisted_before_returning() {
        let (_dir, store) = temp_store();
        let stats = DurableStats::new(Arc::clone(&store), true);

        let pair = stats.record_visit().await.expect("visit");
        assert_eq!(pair, CounterPair::new(1, 0));
        assert_eq!(store.load().expect("load"), pair);
    }
}
