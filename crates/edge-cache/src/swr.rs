//! Stale-while-revalidate / stale-if-error decision engine.

use std::sync::Arc;

use http::StatusCode;

use edge_core::{Clock, EdgeResponse, SwrConfig, SystemClock};
use edge_executor::{BackgroundTask, TaskKind, WaitUntil};
use edge_observability::{ServedFrom, SwrMetrics};

use crate::directives::DirectiveSet;
use crate::entry::{CacheEntry, CacheStatus};
use crate::error::{OriginError, SwrError};
use crate::key::{CacheKey, SwrRequest};
use crate::store::{CacheStore, Origin};

/// Result of handling one origin answer.
#[derive(Debug)]
pub(crate) struct Settlement {
    /// What to hand back to whoever called the origin.
    pub response: Result<EdgeResponse, SwrError>,
    /// Counter bucket, when a response was produced.
    pub served: Option<ServedFrom>,
    /// Entry to persist, if any.
    pub write: Option<CacheEntry>,
}

/// Decide what an origin answer means for the cache.
///
/// A transport failure counts as `502 Bad Gateway`. A 5xx answer is replaced
/// by the prior entry, sent in its stored form with the edge error
/// cache-control, when that entry allowed `stale-if-error` and its window is
/// still open. Anything else becomes a new entry, persisted as `HIT` when
/// the origin succeeded and asked for shared caching.
pub(crate) fn settle(
    fresh: Result<EdgeResponse, OriginError>,
    prior: Option<&CacheEntry>,
    now_ms: u64,
    debug: bool,
) -> Settlement {
    let origin_status = match &fresh {
        Ok(response) => response.status,
        Err(_) => StatusCode::BAD_GATEWAY,
    };

    if origin_status.as_u16() >= 500 {
        let fallback = prior.filter(|p| !p.is_stale_if_error_expired(now_ms) && p.allows_stale_if_error());
        if let Some(prior) = fallback {
            let stale = prior.clone().with_status(CacheStatus::Stale);
            let response = stale.serve_stored(debug);
            // An entry already marked stale is not written again.
            let write = (prior.status != CacheStatus::Stale).then_some(stale);
            return Settlement {
                response: Ok(response),
                served: Some(ServedFrom::Stale),
                write,
            };
        }
    }

    let response = match fresh {
        Ok(response) => response,
        Err(err) => {
            return Settlement {
                response: Err(err.into()),
                served: None,
                write: None,
            }
        }
    };

    let directives = DirectiveSet::from_headers(&response.headers);
    let entry = CacheEntry::from_origin(response, &directives, now_ms);
    let write = (origin_status.as_u16() < 500 && directives.is_edge_cacheable())
        .then(|| entry.clone().with_status(CacheStatus::Hit).without_set_cookie());

    Settlement {
        response: Ok(entry.serve(CacheStatus::Miss, debug)),
        served: Some(ServedFrom::Miss),
        write,
    }
}

/// Edge cache implementing RFC 5861 stale-while-revalidate and
/// stale-if-error on top of a host-supplied store.
///
/// Concurrent requests for an expiring key may each start their own
/// background revalidation; there is no single-flight.
pub struct SwrCache<S: CacheStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: SwrConfig,
    metrics: Arc<SwrMetrics>,
}

impl<S: CacheStore + 'static> SwrCache<S> {
    /// Create a cache over `store` using the system clock.
    pub fn new(store: S) -> Self {
        Self::with_shared_store(Arc::new(store))
    }

    /// Create a cache over a store the caller keeps a handle to.
    pub fn with_shared_store(store: Arc<S>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config: SwrConfig::default(),
            metrics: Arc::new(SwrMetrics::new()),
        }
    }

    /// Use a different clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a different configuration.
    pub fn with_config(mut self, config: SwrConfig) -> Self {
        self.config = config;
        self
    }

    /// Shared counters.
    pub fn metrics(&self) -> &Arc<SwrMetrics> {
        &self.metrics
    }

    /// Answer one request.
    ///
    /// Serves the cached entry when it is fresh, serves it stale while a
    /// background task refreshes it when the stale-while-revalidate window
    /// allows, and otherwise calls the origin inline. Store writes are handed
    /// to `wait_until` except for the `REVALIDATED` marker, which is written
    /// before the refresh is scheduled so the refresh cannot be overwritten
    /// by it.
    pub async fn handle<O, W>(
        &self,
        request: &SwrRequest,
        origin: Arc<O>,
        wait_until: &W,
    ) -> Result<EdgeResponse, SwrError>
    where
        O: Origin + 'static,
        W: WaitUntil + ?Sized,
    {
        if self.config.disable || !request.is_cacheable_method() {
            tracing::debug!(key = %request.key, method = %request.method, "bypassing cache");
            self.metrics.record_served(ServedFrom::Bypass);
            self.metrics.record_origin_fetch();
            return Ok(origin.fetch().await?);
        }

        let Some(entry) = self.lookup(&request.key).await else {
            return self.fetch_inline(request, &*origin, None, wait_until).await;
        };

        let now = self.clock.now_ms();

        if entry.status == CacheStatus::Stale && entry.is_stale_if_error_expired(now) {
            tracing::debug!(key = %request.key, "stale-if-error window closed");
            return self.fetch_inline(request, &*origin, Some(entry), wait_until).await;
        }

        let mut served = entry.status;
        if entry.needs_revalidation(now) {
            if entry.status == CacheStatus::Hit && entry.is_stale_while_revalidate_expired(now) {
                tracing::debug!(key = %request.key, "stale-while-revalidate window closed");
                return self.fetch_inline(request, &*origin, Some(entry), wait_until).await;
            }

            // A stale entry stays stale until the origin recovers.
            if entry.status != CacheStatus::Stale {
                served = CacheStatus::Revalidated;
                let marker = entry.clone().with_status(CacheStatus::Revalidated);
                persist(&*self.store, &self.metrics, &request.key, marker).await;
            }

            self.schedule_revalidation(&request.key, origin, entry.clone(), wait_until);
        }

        tracing::debug!(key = %request.key, status = %served, "serving cached entry");
        self.metrics.record_served(served.served_from());
        Ok(entry.serve(served, self.config.debug))
    }

    async fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let stored = self.store.lookup(key).await?;
        match CacheEntry::from_response(stored) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "ignoring unreadable cache entry");
                None
            }
        }
    }

    async fn fetch_inline<O, W>(
        &self,
        request: &SwrRequest,
        origin: &O,
        prior: Option<CacheEntry>,
        wait_until: &W,
    ) -> Result<EdgeResponse, SwrError>
    where
        O: Origin + ?Sized,
        W: WaitUntil + ?Sized,
    {
        self.metrics.record_origin_fetch();
        let fresh = origin.fetch().await;
        let origin_status = fresh.as_ref().map(|r| r.status.as_u16()).ok();
        let settlement = settle(fresh, prior.as_ref(), self.clock.now_ms(), self.config.debug);

        if let Some(entry) = settlement.write {
            self.schedule_store(&request.key, entry, wait_until);
        }
        if let Some(served) = settlement.served {
            tracing::debug!(key = %request.key, origin_status = ?origin_status, served = ?served, "origin answered");
            self.metrics.record_served(served);
        }
        settlement.response
    }

    fn schedule_store<W: WaitUntil + ?Sized>(&self, key: &CacheKey, entry: CacheEntry, wait_until: &W) {
        let store = Arc::clone(&self.store);
        let metrics = Arc::clone(&self.metrics);
        let key = key.clone();
        let label = key.to_string();

        wait_until.wait_until(BackgroundTask::new(TaskKind::Store, label, async move {
            persist(&*store, &metrics, &key, entry).await;
        }));
    }

    fn schedule_revalidation<O, W>(&self, key: &CacheKey, origin: Arc<O>, prior: CacheEntry, wait_until: &W)
    where
        O: Origin + 'static,
        W: WaitUntil + ?Sized,
    {
        let store = Arc::clone(&self.store);
        let metrics = Arc::clone(&self.metrics);
        let clock = Arc::clone(&self.clock);
        let debug = self.config.debug;
        let key = key.clone();
        let label = key.to_string();

        self.metrics.record_background_revalidation();
        wait_until.wait_until(BackgroundTask::new(TaskKind::Revalidate, label, async move {
            metrics.record_origin_fetch();
            let fresh = origin.fetch().await;
            let settlement = settle(fresh, Some(&prior), clock.now_ms(), debug);

            if let Some(entry) = settlement.write {
                persist(&*store, &metrics, &key, entry).await;
            }
            if let Err(err) = settlement.response {
                tracing::warn!(key = %key, error = %err, "background revalidation failed");
            }
        }));
    }
}

async fn persist<S: CacheStore + ?Sized>(store: &S, metrics: &SwrMetrics, key: &CacheKey, entry: CacheEntry) {
    let status = entry.status;
    match store.store(key, entry.to_response()).await {
        Ok(()) => {
            tracing::debug!(key = %key, status = %status, "stored cache entry");
            metrics.record_store(true);
        }
        Err(err) => {
            tracing::warn!(key = %key, status = %status, error = %err, "failed to store cache entry");
            metrics.record_store(false);
        }
    }
}
