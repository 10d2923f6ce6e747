/// Key-based request cache with in-flight deduplication and per-key rate limiting
///
/// Every request for a key goes through three gates:
/// - a valid cached entry is returned without touching the network
/// - an in-flight request for the key is joined instead of duplicated
/// - a new attempt waits until `min_request_interval` has passed since the
///   previous attempt for that key started
///
/// Registries live behind one `parking_lot::Mutex` that is never held across
/// an await point.
use super::entry::{saturating_add, CacheEntry, CacheMetrics, CacheStats, CachedValue, ErasedValue};
use crate::config::CacheSettings;
use crate::errors::{CacheError, CacheResult};
use crate::logger::{self, LogTag};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

type SharedFetch = Shared<BoxFuture<'static, CacheResult<ErasedValue>>>;

/// Per-call options for [`RequestCache::get_cached_or_fetch`]
#[derive(Debug, Clone, PartialEq)]
pub struct RequestConfig {
    pub cache_key: String,
    /// TTL of the written entry, the cache default when `None`
    pub cache_duration: Option<Duration>,
    /// Skip the cache read (the result is still written)
    pub force_refresh: bool,
    /// Join an in-flight request for the same key instead of starting another
    pub dedupe: bool,
}

impl RequestConfig {
    pub fn new(cache_key: impl Into<String>) -> Self {
        Self {
            cache_key: cache_key.into(),
            cache_duration: None,
            force_refresh: false,
            dedupe: true,
        }
    }

    pub fn with_cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = Some(duration);
        self
    }

    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }
}

struct PendingRequest {
    id: u64,
    future: SharedFetch,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    pending: HashMap<String, PendingRequest>,
    /// Start time of the most recent attempt per key (may lie in the future
    /// while an attempt is waiting for its slot)
    last_request: HashMap<String, Instant>,
    metrics: CacheMetrics,
    next_request_id: u64,
}

/// Generic cache in front of one rate-limited resource
pub struct RequestCache {
    settings: CacheSettings,
    state: Arc<Mutex<CacheState>>,
}

impl RequestCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Return the cached value for `config.cache_key` or run `fetch_fn`
    ///
    /// Errors from `fetch_fn` are returned unchanged and never cached; every
    /// caller that joined the same in-flight request sees the same error.
    pub async fn get_cached_or_fetch<T, F, Fut>(
        &self,
        fetch_fn: F,
        config: RequestConfig,
    ) -> CacheResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = CacheResult<T>> + Send + 'static,
    {
        let key = config.cache_key.clone();

        let future = {
            let mut state = self.state.lock();

            if !config.force_refresh {
                let now = Instant::now();
                let hit = state
                    .entries
                    .get(&key)
                    .filter(|entry| entry.is_valid_at(now))
                    .and_then(|entry| entry.downcast::<T>());

                if let Some(data) = hit {
                    state.metrics.hits += 1;
                    return Ok(data);
                }
                state.metrics.misses += 1;
            }

            let joined = if config.dedupe {
                state.pending.get(&key).map(|pending| pending.future.clone())
            } else {
                None
            };

            match joined {
                Some(future) => {
                    state.metrics.dedup_joins += 1;
                    logger::verbose(
                        LogTag::Cache,
                        &format!("Joining in-flight request for {}", key),
                    );
                    future
                }
                None => self.start_request(&mut state, fetch_fn, &config),
            }
        };

        let value = future.await?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or(CacheError::TypeMismatch { key })
    }

    /// Build the shared fetch future and reserve its rate-limit slot
    fn start_request<T, F, Fut>(
        &self,
        state: &mut CacheState,
        fetch_fn: F,
        config: &RequestConfig,
    ) -> SharedFetch
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = CacheResult<T>> + Send + 'static,
    {
        let key = config.cache_key.clone();
        let ttl = config
            .cache_duration
            .unwrap_or_else(|| self.settings.default_cache_duration());

        let id = state.next_request_id;
        state.next_request_id += 1;

        // Reserving the slot now keeps attempt starts spaced even for callers
        // that opted out of deduplication.
        let now = Instant::now();
        let start_at = match state.last_request.get(&key) {
            Some(last) => saturating_add(*last, self.settings.min_request_interval()).max(now),
            None => now,
        };
        state.last_request.insert(key.clone(), start_at);

        let shared_state = Arc::clone(&self.state);
        let settings = self.settings.clone();
        let registered = config.dedupe;

        let future = async move {
            if start_at > Instant::now() {
                logger::debug(
                    LogTag::Rpc,
                    &format!(
                        "Rate limiting {}: waiting {}ms",
                        key,
                        start_at.saturating_duration_since(Instant::now()).as_millis()
                    ),
                );
                tokio::time::sleep_until(start_at).await;
            }

            let started = Instant::now();
            shared_state.lock().metrics.fetches += 1;
            logger::debug(LogTag::Rpc, &format!("Fetching {}", key));

            let result = fetch_fn()
                .await
                .map(|data| Arc::new(data) as ErasedValue);

            let mut state = shared_state.lock();
            if registered && state.pending.get(&key).map(|p| p.id) == Some(id) {
                state.pending.remove(&key);
            }

            match &result {
                Ok(data) => {
                    // Entries read after this fetch started hold newer data
                    let superseded = state
                        .entries
                        .get(&key)
                        .map_or(false, |entry| entry.origin > started);
                    if superseded {
                        logger::debug(
                            LogTag::Cache,
                            &format!("Discarding fetch result for {}: newer entry cached", key),
                        );
                    } else {
                        let entry = CacheEntry::fetched(Arc::clone(data), ttl, started);
                        store_entry(&mut state, &settings, key, entry);
                    }
                }
                Err(e) => {
                    state.metrics.failures += 1;
                    logger::debug(LogTag::Rpc, &format!("Fetch for {} failed: {}", key, e));
                }
            }

            result
        }
        .boxed()
        .shared();

        if registered {
            state.pending.insert(
                config.cache_key.clone(),
                PendingRequest {
                    id,
                    future: future.clone(),
                },
            );
        }

        future
    }

    /// Write a value directly, without fetching or rate limiting
    pub fn insert<T>(&self, key: &str, data: T, ttl: Duration)
    where
        T: Clone + Send + Sync + 'static,
    {
        let entry = CacheEntry::new(Arc::new(data), ttl);
        let mut state = self.state.lock();
        store_entry(&mut state, &self.settings, key.to_string(), entry);
    }

    /// Detach the in-flight request for `key` so the next fetch starts anew
    ///
    /// Callers already waiting on it still get its result. The rate-limit
    /// reservation it made is kept.
    pub fn detach_pending(&self, key: &str) {
        self.state.lock().pending.remove(key);
    }

    /// Raw entry lookup, ignoring expiry
    ///
    /// Returns `None` when the key is absent or holds a different type.
    pub fn peek<T>(&self, key: &str) -> Option<CachedValue<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let state = self.state.lock();
        let entry = state.entries.get(key)?;
        Some(CachedValue {
            data: entry.downcast::<T>()?,
            timestamp: entry.timestamp,
            expires_at: entry.expires_at,
        })
    }

    /// Remove one key from every registry, or everything when `key` is `None`
    ///
    /// In-flight requests keep running; their result is still written when
    /// they settle.
    pub fn clear_cache(&self, key: Option<&str>) {
        let mut state = self.state.lock();
        match key {
            Some(key) => {
                state.entries.remove(key);
                state.pending.remove(key);
                state.last_request.remove(key);
            }
            None => {
                state.entries.clear();
                state.pending.clear();
                state.last_request.clear();
            }
        }
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        let state = self.state.lock();
        let now = Instant::now();
        CacheStats {
            total_entries: state.entries.len(),
            valid_entries: state
                .entries
                .values()
                .filter(|entry| entry.is_valid_at(now))
                .count(),
            pending_requests: state.pending.len(),
            last_request_times: state.last_request.len(),
        }
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.state.lock().metrics.clone()
    }
}

impl std::fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.get_cache_stats();
        f.debug_struct("RequestCache")
            .field("max_cache_size", &self.settings.max_cache_size)
            .field("total_entries", &stats.total_entries)
            .field("pending_requests", &stats.pending_requests)
            .finish()
    }
}

/// Insert an entry, evicting first when a new key would exceed the limit
fn store_entry(state: &mut CacheState, settings: &CacheSettings, key: String, entry: CacheEntry) {
    if !state.entries.contains_key(&key) && state.entries.len() >= settings.max_cache_size {
        evict(state, settings);
    }
    state.entries.insert(key, entry);
    state.metrics.inserts += 1;
}

/// Sweep expired entries, then drop the oldest share by write time if still full
fn evict(state: &mut CacheState, settings: &CacheSettings) {
    let now = Instant::now();

    let before = state.entries.len();
    state.entries.retain(|_, entry| entry.is_valid_at(now));
    let expired = before - state.entries.len();
    state.metrics.expirations += expired as u64;

    // Attempt times older than the interval can no longer delay anything
    let interval = settings.min_request_interval();
    let pending = &state.pending;
    state.last_request.retain(|key, last| {
        pending.contains_key(key) || saturating_add(*last, interval) > now
    });

    let mut evicted = 0;
    if state.entries.len() >= settings.max_cache_size {
        let batch = settings.eviction_batch(state.entries.len());
        let mut by_age: Vec<(Instant, String)> = state
            .entries
            .iter()
            .map(|(key, entry)| (entry.timestamp, key.clone()))
            .collect();
        by_age.sort();

        for (_, key) in by_age.into_iter().take(batch) {
            state.entries.remove(&key);
            evicted += 1;
        }
        state.metrics.evictions += evicted as u64;
    }

    logger::debug(
        LogTag::Cache,
        &format!(
            "Eviction pass: {} expired, {} evicted, {} remaining",
            expired,
            evicted,
            state.entries.len()
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_settings() -> CacheSettings {
        CacheSettings {
            min_request_interval_ms: 2_000,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_value_skips_fetch() {
        let cache = RequestCache::new(test_settings());
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let value: u64 = cache
                .get_cached_or_fetch(
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(42u64)
                    },
                    RequestConfig::new("chama:info:0xabc"),
                )
                .await
                .unwrap();
            assert_eq!(value, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 2);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.fetches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_cache_duration() {
        let cache = RequestCache::new(CacheSettings {
            min_request_interval_ms: 0,
            ..Default::default()
        });
        let config = RequestConfig::new("k").with_cache_duration(Duration::from_secs(1));

        let first: u32 = cache
            .get_cached_or_fetch(|| async { Ok(1u32) }, config.clone())
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(1_500)).await;
        let second: u32 = cache
            .get_cached_or_fetch(|| async { Ok(2u32) }, config)
            .await
            .unwrap();

        assert_eq!((first, second), (1, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_not_cached_and_clears_pending() {
        let cache = RequestCache::new(CacheSettings {
            min_request_interval_ms: 0,
            ..Default::default()
        });

        let err = cache
            .get_cached_or_fetch::<u32, _, _>(
                || async { Err(CacheError::fetch("execution reverted")) },
                RequestConfig::new("k"),
            )
            .await
            .unwrap_err();
        assert_eq!(err, CacheError::fetch("execution reverted"));

        let stats = cache.get_cache_stats();
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.pending_requests, 0);

        let value: u32 = cache
            .get_cached_or_fetch(|| async { Ok(5u32) }, RequestConfig::new("k"))
            .await
            .unwrap();
        assert_eq!(value, 5);
        assert_eq!(cache.metrics().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_refresh_bypasses_read_but_writes() {
        let cache = RequestCache::new(CacheSettings {
            min_request_interval_ms: 0,
            ..Default::default()
        });

        let _: u32 = cache
            .get_cached_or_fetch(|| async { Ok(1u32) }, RequestConfig::new("k"))
            .await
            .unwrap();
        let refreshed: u32 = cache
            .get_cached_or_fetch(
                || async { Ok(2u32) },
                RequestConfig::new("k").with_force_refresh(true),
            )
            .await
            .unwrap();
        let cached: u32 = cache
            .get_cached_or_fetch(|| async { Ok(3u32) }, RequestConfig::new("k"))
            .await
            .unwrap();

        assert_eq!((refreshed, cached), (2, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_spaces_attempts() {
        let cache = RequestCache::new(test_settings());
        let started = Arc::new(Mutex::new(Vec::new()));
        let origin = Instant::now();

        let record = |started: Arc<Mutex<Vec<Duration>>>| {
            move || async move {
                started.lock().push(Instant::now() - origin);
                Ok(1u8)
            }
        };

        let config = RequestConfig::new("k").with_force_refresh(true);
        let _: u8 = cache
            .get_cached_or_fetch(record(Arc::clone(&started)), config.clone())
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        let _: u8 = cache
            .get_cached_or_fetch(record(Arc::clone(&started)), config)
            .await
            .unwrap();

        let started = started.lock().clone();
        assert_eq!(started.len(), 2);
        assert!(started[1] - started[0] >= Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_holds_without_dedupe() {
        let cache = Arc::new(RequestCache::new(test_settings()));
        let started = Arc::new(Mutex::new(Vec::new()));
        let origin = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let cache = Arc::clone(&cache);
            let started = Arc::clone(&started);
            handles.push(tokio::spawn(async move {
                cache
                    .get_cached_or_fetch(
                        move || async move {
                            started.lock().push(Instant::now() - origin);
                            Ok(0u8)
                        },
                        RequestConfig::new("k").with_dedupe(false).with_force_refresh(true),
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut started = started.lock().clone();
        started.sort();
        assert_eq!(started.len(), 3);
        assert!(started[1] - started[0] >= Duration::from_millis(2_000));
        assert!(started[2] - started[1] >= Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_cache_duration_never_expires() {
        let cache = RequestCache::new(test_settings());
        let config = RequestConfig::new("k").with_cache_duration(Duration::MAX);

        let _: u32 = cache
            .get_cached_or_fetch(|| async { Ok(1u32) }, config.clone())
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(86_400)).await;
        let cached: u32 = cache
            .get_cached_or_fetch(|| async { Ok(2u32) }, config)
            .await
            .unwrap();

        assert_eq!(cached, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_request_interval_does_not_overflow() {
        let cache = RequestCache::new(CacheSettings {
            min_request_interval_ms: u64::MAX,
            max_cache_size: 1,
            ..Default::default()
        });

        let _: u32 = cache
            .get_cached_or_fetch(|| async { Ok(1u32) }, RequestConfig::new("a"))
            .await
            .unwrap();
        // Evicting for a second key prunes request times against the interval
        cache.insert("b", 2u32, Duration::from_secs(30));

        assert_eq!(cache.get_cache_stats().total_entries, 1);
        assert_eq!(cache.get_cache_stats().last_request_times, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_does_not_overwrite_newer_write() {
        let cache = Arc::new(RequestCache::new(test_settings()));

        let fetch = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_cached_or_fetch(
                        || async {
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok(1u32)
                        },
                        RequestConfig::new("k"),
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.insert("k", 2u32, Duration::from_secs(30));

        assert_eq!(fetch.await.unwrap(), Ok(1));
        assert_eq!(cache.peek::<u32>("k").map(|v| v.data), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_older_fetch_does_not_replace_newer_one() {
        let cache = Arc::new(RequestCache::new(CacheSettings {
            min_request_interval_ms: 0,
            ..Default::default()
        }));
        let config = RequestConfig::new("k").with_dedupe(false).with_force_refresh(true);

        let slow = {
            let cache = Arc::clone(&cache);
            let config = config.clone();
            tokio::spawn(async move {
                cache
                    .get_cached_or_fetch(
                        || async {
                            tokio::time::sleep(Duration::from_millis(300)).await;
                            Ok(1u32)
                        },
                        config,
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let newer: u32 = cache
            .get_cached_or_fetch(|| async { Ok(2u32) }, config)
            .await
            .unwrap();
        assert_eq!(newer, 2);
        assert_eq!(slow.await.unwrap(), Ok(1));

        assert_eq!(cache.peek::<u32>("k").map(|v| v.data), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_request_is_not_joined() {
        let cache = Arc::new(RequestCache::new(CacheSettings {
            min_request_interval_ms: 0,
            ..Default::default()
        }));

        let slow = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_cached_or_fetch(
                        || async {
                            tokio::time::sleep(Duration::from_secs(1)).await;
                            Ok(1u32)
                        },
                        RequestConfig::new("k"),
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.get_cache_stats().pending_requests, 1);

        cache.detach_pending("k");
        let fresh: u32 = cache
            .get_cached_or_fetch(
                || async { Ok(2u32) },
                RequestConfig::new("k").with_force_refresh(true),
            )
            .await
            .unwrap();

        assert_eq!(fresh, 2);
        assert_eq!(slow.await.unwrap(), Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_single_key() {
        let cache = RequestCache::new(test_settings());
        cache.insert("a", 1u32, Duration::from_secs(30));
        cache.insert("b", 2u32, Duration::from_secs(30));

        cache.clear_cache(Some("a"));
        assert!(cache.peek::<u32>("a").is_none());
        assert_eq!(cache.peek::<u32>("b").map(|v| v.data), Some(2));

        cache.clear_cache(None);
        assert_eq!(cache.get_cache_stats(), CacheStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_count_valid_entries_without_evicting() {
        let cache = RequestCache::new(test_settings());
        cache.insert("short", 1u32, Duration::from_secs(1));
        cache.insert("long", 2u32, Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(2)).await;
        let stats = cache.get_cache_stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.valid_entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_type_mismatch_is_a_miss() {
        let cache = RequestCache::new(test_settings());
        cache.insert("k", "text".to_string(), Duration::from_secs(30));

        assert!(cache.peek::<u64>("k").is_none());
        let value: u64 = cache
            .get_cached_or_fetch(|| async { Ok(9u64) }, RequestConfig::new("k"))
            .await
            .unwrap();
        assert_eq!(value, 9);
        assert_eq!(cache.peek::<u64>("k").map(|v| v.data), Some(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_sweeps_expired_first() {
        let cache = RequestCache::new(CacheSettings {
            max_cache_size: 4,
            ..Default::default()
        });
        cache.insert("old-expired", 0u32, Duration::from_secs(1));
        tokio::time::advance(Duration::from_millis(10)).await;
        for key in ["a", "b", "c"] {
            cache.insert(key, 1u32, Duration::from_secs(60));
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.insert("d", 1u32, Duration::from_secs(60));

        assert!(cache.peek::<u32>("old-expired").is_none());
        for key in ["a", "b", "c", "d"] {
            assert!(cache.peek::<u32>(key).is_some(), "{} should survive", key);
        }
        let metrics = cache.metrics();
        assert_eq!(metrics.expirations, 1);
        assert_eq!(metrics.evictions, 0);
    }
}
