//! Cache decision counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Which response a request was answered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    /// Fresh cache entry.
    Hit,
    /// Origin response (no usable cache).
    Miss,
    /// Expired entry served because the origin failed.
    Stale,
    /// Expired entry served while a refresh runs in the background.
    Revalidated,
    /// Caching skipped (non-GET or disabled).
    Bypass,
}

/// Counters shared across all requests handled by one cache.
#[derive(Debug, Default)]
pub struct SwrMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    stale: AtomicU64,
    revalidated: AtomicU64,
    bypassed: AtomicU64,
    origin_fetches: AtomicU64,
    background_revalidations: AtomicU64,
    store_writes: AtomicU64,
    store_failures: AtomicU64,
}

impl SwrMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a served response.
    pub fn record_served(&self, served: ServedFrom) {
        let counter = match served {
            ServedFrom::Hit => &self.hits,
            ServedFrom::Miss => &self.misses,
            ServedFrom::Stale => &self.stale,
            ServedFrom::Revalidated => &self.revalidated,
            ServedFrom::Bypass => &self.bypassed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an origin call, foreground or background.
    pub fn record_origin_fetch(&self) {
        self.origin_fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a scheduled background revalidation.
    pub fn record_background_revalidation(&self) {
        self.background_revalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a store write and whether it succeeded.
    pub fn record_store(&self, ok: bool) {
        self.store_writes.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.store_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            revalidated: self.revalidated.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
            origin_fetches: self.origin_fetches.load(Ordering::Relaxed),
            background_revalidations: self.background_revalidations.load(Ordering::Relaxed),
            store_writes: self.store_writes.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of `SwrMetrics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub stale: u64,
    pub revalidated: u64,
    pub bypassed: u64,
    pub origin_fetches: u64,
    pub background_revalidations: u64,
    pub store_writes: u64,
    pub store_failures: u64,
}

impl MetricsSnapshot {
    /// Requests answered from cache (fresh or stale).
    pub fn served_from_cache(&self) -> u64 {
        self.hits + self.stale + self.revalidated
    }

    /// Share of cacheable requests answered from cache, in `[0, 1]`.
    pub fn cache_ratio(&self) -> f64 {
        let cacheable = self.served_from_cache() + self.misses;
        if cacheable == 0 {
            return 0.0;
        }
        self.served_from_cache() as f64 / cacheable as f64
    }

    /// Format as JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
