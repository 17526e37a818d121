//! Cache store and origin contracts supplied by the host.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use edge_core::EdgeResponse;

use crate::error::{CacheResult, OriginError};
use crate::key::CacheKey;

/// Key-value store holding cached responses.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a stored response. Backend failures must resolve to `None`.
    async fn lookup(&self, key: &CacheKey) -> Option<EdgeResponse>;

    /// Store a response, replacing any previous one.
    async fn store(&self, key: &CacheKey, response: EdgeResponse) -> CacheResult<()>;
}

/// The real unit of work behind a cached route.
#[async_trait]
pub trait Origin: Send + Sync {
    /// Produce a fresh response. 5xx answers are returned as `Ok`.
    async fn fetch(&self) -> Result<EdgeResponse, OriginError>;
}

/// Adapts an async closure into an `Origin`.
pub struct FnOrigin<F>(pub F);

#[async_trait]
impl<F, Fut> Origin for FnOrigin<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<EdgeResponse, OriginError>> + Send,
{
    async fn fetch(&self) -> Result<EdgeResponse, OriginError> {
        (self.0)().await
    }
}

/// A recorded store write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreWrite {
    pub key: CacheKey,
    pub response: EdgeResponse,
}

/// In-memory store (for development/testing).
///
/// Keeps every write so callers can inspect the write history.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<CacheKey, EdgeResponse>>,
    writes: Mutex<Vec<StoreWrite>>,
    lookups: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry without recording a write.
    pub fn insert(&self, key: CacheKey, response: EdgeResponse) {
        lock(&self.entries).insert(key, response);
    }

    /// Current stored response, without counting a lookup.
    pub fn get(&self, key: &CacheKey) -> Option<EdgeResponse> {
        lock(&self.entries).get(key).cloned()
    }

    /// Every write, oldest first.
    pub fn writes(&self) -> Vec<StoreWrite> {
        lock(&self.writes).clone()
    }

    /// Number of writes so far.
    pub fn write_count(&self) -> usize {
        lock(&self.writes).len()
    }

    /// Number of lookups so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn lookup(&self, key: &CacheKey) -> Option<EdgeResponse> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.get(key)
    }

    async fn store(&self, key: &CacheKey, response: EdgeResponse) -> CacheResult<()> {
        lock(&self.writes).push(StoreWrite {
            key: key.clone(),
            response: response.clone(),
        });
        lock(&self.entries).insert(key.clone(), response);
        Ok(())
    }
}
