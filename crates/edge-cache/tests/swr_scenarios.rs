//! End-to-end request timelines through `SwrCache`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderValue, Method, StatusCode};

use edge_cache::header_names::*;
use edge_cache::{
    CacheEntry, CacheError, CacheKey, CacheResult, CacheStatus, CacheStore, DirectiveSet,
    InMemoryStore, Origin, OriginError, SwrCache, SwrError, SwrRequest,
};
use edge_core::{EdgeResponse, ManualClock, SwrConfig};
use edge_executor::{DeferredTasks, TaskKind};

const T0: u64 = 1_700_000_000_000;
const KEY: &str = "GET http://localhost/";

/// Origin answering from a script, repeating the last answer when it runs out.
struct ScriptedOrigin {
    answers: Mutex<VecDeque<Result<EdgeResponse, OriginError>>>,
    last: Mutex<Option<EdgeResponse>>,
    calls: AtomicUsize,
}

impl ScriptedOrigin {
    fn new(answers: Vec<Result<EdgeResponse, OriginError>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    fn always(response: EdgeResponse) -> Arc<Self> {
        Self::new(vec![Ok(response)])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Origin for ScriptedOrigin {
    async fn fetch(&self) -> Result<EdgeResponse, OriginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.answers.lock().unwrap().pop_front();
        match next {
            Some(Ok(response)) => {
                *self.last.lock().unwrap() = Some(response.clone());
                Ok(response)
            }
            Some(Err(err)) => Err(err),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| OriginError::Unreachable("script exhausted".into())),
        }
    }
}

struct Harness {
    cache: SwrCache<InMemoryStore>,
    store: Arc<InMemoryStore>,
    clock: Arc<ManualClock>,
    tasks: DeferredTasks,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SwrConfig::default())
    }

    fn with_config(config: SwrConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(T0));
        let cache = SwrCache::with_shared_store(Arc::clone(&store))
            .with_clock(clock.clone())
            .with_config(config);
        Self {
            cache,
            store,
            clock,
            tasks: DeferredTasks::new(),
        }
    }

    /// Seed an entry as if the origin had sent `cache_control` at `stored_at`.
    fn seed(&self, status: CacheStatus, cache_control: &'static str, body: &str, stored_at: u64) {
        let response = origin_response(StatusCode::OK, cache_control, body);
        let directives = DirectiveSet::from_headers(&response.headers);
        let entry = CacheEntry::from_origin(response, &directives, stored_at).with_status(status);
        self.store.insert(CacheKey::new(KEY), entry.to_response());
    }

    async fn get(&self, origin: &Arc<ScriptedOrigin>) -> Result<EdgeResponse, SwrError> {
        self.cache
            .handle(&SwrRequest::get(KEY), Arc::clone(origin), &self.tasks)
            .await
    }

    fn stored(&self) -> Option<EdgeResponse> {
        self.store.get(&CacheKey::new(KEY))
    }

    fn written_statuses(&self) -> Vec<String> {
        self.store
            .writes()
            .iter()
            .map(|w| w.response.header(EDGE_CACHE_STATUS).unwrap_or_default().to_string())
            .collect()
    }
}

fn origin_response(status: StatusCode, cache_control: &'static str, body: &str) -> EdgeResponse {
    EdgeResponse::new(status)
        .with_body(body)
        .with_header(CACHE_CONTROL, HeaderValue::from_static(cache_control))
}

fn status_of(response: &EdgeResponse) -> Option<&str> {
    response.header(EDGE_CACHE_STATUS)
}

#[tokio::test]
async fn test_miss_is_stored_as_hit() {
    let h = Harness::new();
    let origin = ScriptedOrigin::always(origin_response(
        StatusCode::OK,
        "public,max-age=60,s-maxage=60,stale-while-revalidate",
        "fresh",
    ));

    let res = h.get(&origin).await.unwrap();
    assert_eq!(status_of(&res), Some("MISS"));
    assert_eq!(res.header(CACHE_CONTROL), Some("public,max-age=60"));
    assert_eq!(res.text(), "fresh");
    assert_eq!(origin.calls(), 1);

    // Persisting happens in the background.
    assert_eq!(h.store.write_count(), 0);
    assert_eq!(h.tasks.scheduled(TaskKind::Store), 1);
    h.tasks.drain().await;

    let stored = h.stored().unwrap();
    assert_eq!(status_of(&stored), Some("HIT"));
    assert_eq!(stored.header(CACHE_CONTROL), Some("public,s-maxage=60"));
    assert_eq!(stored.header(EDGE_CACHE_STALE_EXPIRED_AT), Some("-1"));
    assert_eq!(stored.header(EDGE_CACHE_EXPIRED_AT), Some((T0 + 60_000).to_string().as_str()));
}

#[tokio::test]
async fn test_miss_without_max_age_tells_client_to_revalidate() {
    let h = Harness::new();
    let origin = ScriptedOrigin::always(origin_response(
        StatusCode::OK,
        "public,s-maxage=60,stale-while-revalidate",
        "fresh",
    ));

    let res = h.get(&origin).await.unwrap();
    assert_eq!(res.header(CACHE_CONTROL), Some("public,max-age=0,must-revalidate"));
}

#[tokio::test]
async fn test_response_without_s_maxage_is_not_stored() {
    let h = Harness::new();
    let origin = ScriptedOrigin::always(origin_response(StatusCode::OK, "max-age=60", "fresh"));

    let res = h.get(&origin).await.unwrap();
    assert_eq!(status_of(&res), Some("MISS"));
    assert_eq!(h.tasks.pending(), 0);
    assert!(h.stored().is_none());
}

#[tokio::test]
async fn test_fresh_entry_is_served_without_origin() {
    let h = Harness::new();
    h.seed(CacheStatus::Hit, "s-maxage=60", "cache", T0);
    h.clock.advance(Duration::from_secs(20));
    let origin = ScriptedOrigin::always(origin_response(StatusCode::OK, "s-maxage=60", "fresh"));

    let res = h.get(&origin).await.unwrap();
    assert_eq!(status_of(&res), Some("HIT"));
    assert_eq!(res.text(), "cache");
    assert_eq!(origin.calls(), 0);
    assert_eq!(h.tasks.pending(), 0);
    assert_eq!(h.store.write_count(), 0);
}

#[tokio::test]
async fn test_expired_entry_revalidates_in_background() {
    let h = Harness::new();
    h.seed(CacheStatus::Hit, "s-maxage=60,stale-while-revalidate", "stale", T0);
    h.clock.advance(Duration::from_secs(80));
    let origin = ScriptedOrigin::always(origin_response(
        StatusCode::OK,
        "s-maxage=60,stale-while-revalidate",
        "fresh",
    ));

    let res = h.get(&origin).await.unwrap();
    assert_eq!(status_of(&res), Some("REVALIDATED"));
    assert_eq!(res.text(), "stale");

    // The marker is written before the refresh runs.
    assert_eq!(origin.calls(), 0);
    assert_eq!(h.written_statuses(), vec!["REVALIDATED"]);
    assert_eq!(h.tasks.scheduled(TaskKind::Revalidate), 1);

    h.tasks.drain().await;

    assert_eq!(origin.calls(), 1);
    assert_eq!(h.written_statuses(), vec!["REVALIDATED", "HIT"]);
    assert_eq!(h.stored().unwrap().text(), "fresh");
}

#[tokio::test]
async fn test_revalidating_entry_is_not_revalidated_again() {
    let h = Harness::new();
    h.seed(CacheStatus::Hit, "s-maxage=60,stale-while-revalidate", "stale", T0);
    h.clock.advance(Duration::from_secs(80));
    let origin = ScriptedOrigin::always(origin_response(StatusCode::OK, "s-maxage=60", "fresh"));

    h.get(&origin).await.unwrap();
    // Second request arrives before the refresh has run.
    let res = h.get(&origin).await.unwrap();

    assert_eq!(status_of(&res), Some("REVALIDATED"));
    assert_eq!(res.text(), "stale");
    assert_eq!(h.tasks.scheduled(TaskKind::Revalidate), 1);
    assert_eq!(h.store.write_count(), 1);
}

#[tokio::test]
async fn test_both_windows_expired_fetches_inline() {
    let h = Harness::new();
    h.seed(CacheStatus::Hit, "s-maxage=60,stale-while-revalidate=10", "stale", T0);
    h.clock.advance(Duration::from_secs(120));
    let origin = ScriptedOrigin::always(origin_response(StatusCode::OK, "s-maxage=60", "fresh"));

    let res = h.get(&origin).await.unwrap();
    assert_eq!(status_of(&res), Some("MISS"));
    assert_eq!(res.text(), "fresh");
    assert_eq!(origin.calls(), 1);
    assert_eq!(h.tasks.scheduled(TaskKind::Revalidate), 0);

    h.tasks.drain().await;
    assert_eq!(h.written_statuses(), vec!["HIT"]);
}

#[tokio::test]
async fn test_origin_error_serves_stale_once_persisted() {
    let h = Harness::new();
    h.seed(CacheStatus::Hit, "s-maxage=60,stale-if-error", "old", T0);
    h.clock.advance(Duration::from_secs(120));
    let origin = ScriptedOrigin::always(origin_response(StatusCode::INTERNAL_SERVER_ERROR, "", "boom"));

    // Without a stale-while-revalidate window the origin is called inline.
    let res = h.get(&origin).await.unwrap();
    assert_eq!(status_of(&res), Some("STALE"));
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.text(), "old");
    assert_eq!(
        res.header(CACHE_CONTROL),
        Some("public,s-maxage=60,stale-if-error")
    );
    assert_eq!(origin.calls(), 1);

    h.tasks.drain().await;
    assert_eq!(h.written_statuses(), vec!["STALE"]);
    assert_eq!(
        h.stored().unwrap().header(CACHE_CONTROL),
        Some("public,s-maxage=60,stale-if-error")
    );

    // The second request keeps serving stale and refreshes in the background.
    let res = h.get(&origin).await.unwrap();
    assert_eq!(status_of(&res), Some("STALE"));
    assert_eq!(res.text(), "old");
    assert_eq!(res.header(CACHE_CONTROL), Some("public,max-age=0,must-revalidate"));

    h.tasks.drain().await;
    assert_eq!(origin.calls(), 2);
    assert_eq!(h.written_statuses(), vec!["STALE"]);
}

#[tokio::test]
async fn test_background_error_turns_revalidated_into_stale() {
    let h = Harness::new();
    h.seed(
        CacheStatus::Hit,
        "s-maxage=60,stale-while-revalidate,stale-if-error",
        "old",
        T0,
    );
    h.clock.advance(Duration::from_secs(120));
    let origin = ScriptedOrigin::always(origin_response(StatusCode::SERVICE_UNAVAILABLE, "", "down"));

    let res = h.get(&origin).await.unwrap();
    assert_eq!(status_of(&res), Some("REVALIDATED"));

    h.tasks.drain().await;
    assert_eq!(h.written_statuses(), vec!["REVALIDATED", "STALE"]);
    assert_eq!(h.stored().unwrap().text(), "old");
}

#[tokio::test]
async fn test_origin_recovers_after_stale() {
    let h = Harness::new();
    h.seed(CacheStatus::Stale, "s-maxage=60,stale-if-error", "old", T0);
    h.clock.advance(Duration::from_secs(120));
    let origin = ScriptedOrigin::always(origin_response(StatusCode::OK, "s-maxage=60", "new"));

    let res = h.get(&origin).await.unwrap();
    assert_eq!(status_of(&res), Some("STALE"));

    h.tasks.drain().await;
    assert_eq!(h.written_statuses(), vec!["HIT"]);

    let res = h.get(&origin).await.unwrap();
    assert_eq!(status_of(&res), Some("HIT"));
    assert_eq!(res.text(), "new");
}

#[tokio::test]
async fn test_stale_entry_with_closed_error_window_fetches_inline() {
    let h = Harness::new();
    h.seed(CacheStatus::Stale, "s-maxage=60,stale-if-error=30", "old", T0);
    h.clock.advance(Duration::from_secs(120));
    let origin = ScriptedOrigin::always(origin_response(StatusCode::INTERNAL_SERVER_ERROR, "", "boom"));

    let res = h.get(&origin).await.unwrap();
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(status_of(&res), Some("MISS"));
    assert_eq!(res.text(), "boom");
    assert_eq!(h.tasks.pending(), 0);
}

#[tokio::test]
async fn test_error_without_stale_if_error_is_returned() {
    let h = Harness::new();
    h.seed(CacheStatus::Hit, "s-maxage=60", "old", T0);
    h.clock.advance(Duration::from_secs(120));
    let origin = ScriptedOrigin::always(origin_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "s-maxage=60,stale-while-revalidate",
        "boom",
    ));

    let res = h.get(&origin).await.unwrap();
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.tasks.pending(), 0);
    assert!(h.store.writes().is_empty());
}

#[tokio::test]
async fn test_transport_error_without_cache() {
    let h = Harness::new();
    let origin = ScriptedOrigin::new(vec![Err(OriginError::Timeout)]);

    let err = h.get(&origin).await.unwrap_err();
    assert!(matches!(err, SwrError::Origin(OriginError::Timeout)));
}

#[tokio::test]
async fn test_non_get_bypasses_cache() {
    let h = Harness::new();
    let origin = ScriptedOrigin::always(origin_response(StatusCode::OK, "s-maxage=60", "posted"));
    let request = SwrRequest::new(Method::POST, CacheKey::new(KEY));

    let res = h.cache.handle(&request, Arc::clone(&origin), &h.tasks).await.unwrap();

    assert_eq!(res.text(), "posted");
    assert!(status_of(&res).is_none());
    assert_eq!(res.header(CACHE_CONTROL), Some("s-maxage=60"));
    assert_eq!(origin.calls(), 1);
    assert_eq!(h.store.lookup_count(), 0);
    assert_eq!(h.tasks.pending(), 0);
    assert_eq!(h.store.write_count(), 0);
}

#[tokio::test]
async fn test_disabled_cache_bypasses() {
    let h = Harness::with_config(SwrConfig::new().with_disable(true));
    h.seed(CacheStatus::Hit, "s-maxage=60", "cache", T0);
    let origin = ScriptedOrigin::always(origin_response(StatusCode::OK, "s-maxage=60", "fresh"));

    let res = h.get(&origin).await.unwrap();
    assert_eq!(res.text(), "fresh");
    assert_eq!(h.store.lookup_count(), 0);
    assert_eq!(h.cache.metrics().snapshot().bypassed, 1);
}

#[tokio::test]
async fn test_unreadable_entry_is_a_miss() {
    let h = Harness::new();
    h.store.insert(CacheKey::new(KEY), EdgeResponse::ok("garbage"));
    let origin = ScriptedOrigin::always(origin_response(StatusCode::OK, "s-maxage=60", "fresh"));

    let res = h.get(&origin).await.unwrap();
    assert_eq!(status_of(&res), Some("MISS"));
    assert_eq!(res.text(), "fresh");
}

#[tokio::test]
async fn test_debug_mode_keeps_bookkeeping_headers() {
    let h = Harness::with_config(SwrConfig::new().with_debug(true));
    h.seed(CacheStatus::Hit, "max-age=10,s-maxage=60,stale-if-error", "cache", T0);
    let origin = ScriptedOrigin::always(origin_response(StatusCode::OK, "s-maxage=60", "fresh"));

    let res = h.get(&origin).await.unwrap();
    assert_eq!(res.header(CACHE_CONTROL), Some("public,max-age=10"));
    assert_eq!(res.header(EDGE_CACHE_STALE_ERR_EXPIRED_AT), Some("-1"));
    assert_eq!(res.header(ORIGIN_CACHE_CONTROL), Some("public,s-maxage=60"));
    assert_eq!(res.header(CLIENT_CACHE_CONTROL), Some("public,max-age=10"));
}

#[tokio::test]
async fn test_non_debug_hides_bookkeeping_headers() {
    let h = Harness::new();
    let origin = ScriptedOrigin::always(origin_response(StatusCode::OK, "s-maxage=60", "fresh"));

    let res = h.get(&origin).await.unwrap();
    for name in edge_cache::HIDDEN_HEADERS.iter() {
        assert!(res.headers.get(*name).is_none(), "{} leaked", name);
    }
}

#[tokio::test]
async fn test_metrics_follow_timeline() {
    let h = Harness::new();
    let origin = ScriptedOrigin::always(origin_response(
        StatusCode::OK,
        "s-maxage=60,stale-while-revalidate",
        "fresh",
    ));

    h.get(&origin).await.unwrap();
    h.tasks.drain().await;
    h.get(&origin).await.unwrap();
    h.clock.advance(Duration::from_secs(61));
    h.get(&origin).await.unwrap();
    h.tasks.drain().await;

    let snap = h.cache.metrics().snapshot();
    assert_eq!(snap.misses, 1);
    assert_eq!(snap.hits, 1);
    assert_eq!(snap.revalidated, 1);
    assert_eq!(snap.origin_fetches, 2);
    assert_eq!(snap.background_revalidations, 1);
    assert_eq!(snap.store_writes, 3);
    assert_eq!(snap.store_failures, 0);
}

/// Store whose writes always fail; lookups return a fixed entry.
struct FailingStore {
    entry: Mutex<Option<EdgeResponse>>,
}

impl FailingStore {
    fn new(entry: Option<EdgeResponse>) -> Arc<Self> {
        Arc::new(Self {
            entry: Mutex::new(entry),
        })
    }
}

#[async_trait]
impl CacheStore for FailingStore {
    async fn lookup(&self, _key: &CacheKey) -> Option<EdgeResponse> {
        self.entry.lock().unwrap().clone()
    }

    async fn store(&self, _key: &CacheKey, _response: EdgeResponse) -> CacheResult<()> {
        Err(CacheError::Storage("disk full".into()))
    }
}

fn failing_cache(entry: Option<EdgeResponse>) -> SwrCache<FailingStore> {
    SwrCache::with_shared_store(FailingStore::new(entry))
        .with_clock(Arc::new(ManualClock::new(T0 + 80_000)))
}

#[tokio::test]
async fn test_store_failure_still_serves_miss() {
    let cache = failing_cache(None);
    let tasks = DeferredTasks::new();
    let origin = ScriptedOrigin::always(origin_response(StatusCode::OK, "s-maxage=60", "fresh"));

    let res = cache.handle(&SwrRequest::get(KEY), origin, &tasks).await.unwrap();
    assert_eq!(status_of(&res), Some("MISS"));
    assert_eq!(res.text(), "fresh");

    tasks.drain().await;
    let snap = cache.metrics().snapshot();
    assert_eq!(snap.misses, 1);
    assert_eq!(snap.store_writes, 1);
    assert_eq!(snap.store_failures, 1);
}

#[tokio::test]
async fn test_failed_marker_write_still_serves_old_body() {
    let response = origin_response(StatusCode::OK, "s-maxage=60,stale-while-revalidate", "old");
    let directives = DirectiveSet::from_headers(&response.headers);
    let seeded = CacheEntry::from_origin(response, &directives, T0).with_status(CacheStatus::Hit);
    let cache = failing_cache(Some(seeded.to_response()));
    let tasks = DeferredTasks::new();
    let origin = ScriptedOrigin::always(origin_response(StatusCode::OK, "s-maxage=60", "new"));

    let res = cache.handle(&SwrRequest::get(KEY), Arc::clone(&origin), &tasks).await.unwrap();
    assert_eq!(status_of(&res), Some("REVALIDATED"));
    assert_eq!(res.text(), "old");
    assert_eq!(cache.metrics().snapshot().store_failures, 1);

    tasks.drain().await;
    assert_eq!(origin.calls(), 1);
    let snap = cache.metrics().snapshot();
    assert_eq!(snap.store_writes, 2);
    assert_eq!(snap.store_failures, 2);
}
