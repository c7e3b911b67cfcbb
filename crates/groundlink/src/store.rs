//! In-memory telemetry store for groundlink.
//!
//! The store keeps the most recent K accepted records in a bounded ring with
//! O(1) append and eviction. The ingestion path is the only writer; readers
//! always receive copies, never live references, so a record can never be
//! observed mid-write. The durable half of the store lives in
//! [`crate::storage`] and is fed by the record sink.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::record::TelemetryRecord;

/// Bounded most-recent-records ring.
///
/// Holds exactly `min(capacity, total accepted)` records at all times, which
/// are the most recently accepted ones in arrival order. Eviction is FIFO on
/// overflow only.
#[derive(Debug)]
pub struct RecordCache {
    inner: RwLock<VecDeque<TelemetryRecord>>,
    capacity: usize,
}

impl RecordCache {
    /// Create a cache holding at most `capacity` records.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0; configuration validation rejects that
    /// before construction.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be greater than 0");
        Self {
            inner: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a record, evicting the oldest if the cache is full.
    ///
    /// The critical section is a single push/pop pair, keeping the writer's
    /// lock hold time bounded.
    pub fn push(&self, record: TelemetryRecord) {
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if inner.len() == self.capacity {
            inner.pop_front();
        }
        inner.push_back(record);
    }

    /// A point-in-time copy of the cache contents in arrival order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TelemetryRecord> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// A copy of the `n` most recent records in arrival order.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<TelemetryRecord> {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let skip = inner.len().saturating_sub(n);
        inner.iter().skip(skip).cloned().collect()
    }

    /// Number of records currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured capacity K.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// The in-memory half of the telemetry store.
///
/// Owned by the process, constructed before the pipeline starts and torn
/// down after it drains. Tracks the total number of accepted records across
/// the process lifetime alongside the bounded cache.
#[derive(Debug)]
pub struct TelemetryStore {
    cache: RecordCache,
    accepted: AtomicU64,
}

impl TelemetryStore {
    /// Create a store with the given cache capacity.
    #[must_use]
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            cache: RecordCache::new(cache_capacity),
            accepted: AtomicU64::new(0),
        }
    }

    /// Accept a record from the ingestion path.
    pub fn accept(&self, record: TelemetryRecord) {
        self.cache.push(record);
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// A point-in-time copy of the cached records in arrival order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TelemetryRecord> {
        self.cache.snapshot()
    }

    /// A copy of the `n` most recent records in arrival order.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<TelemetryRecord> {
        self.cache.recent(n)
    }

    /// Total records accepted since construction.
    #[must_use]
    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Number of records currently cached.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// The configured cache capacity K.
    #[must_use]
    pub fn cache_capacity(&self) -> usize {
        self.cache.capacity()
    }
}
