/// Policy-driven cache for chain reads
///
/// Sits on top of [`RequestCache`] and adds:
/// - stale-while-revalidate per [`CachePolicy`]
/// - retry with exponential backoff
/// - priority tiers for batched reads
/// - optimistic writes ahead of confirmation
///
/// The policy is the single freshness authority: entries are written with the
/// policy's `cache_duration` as TTL, and a read that decides to refetch forces
/// the request layer past its own TTL check.
use super::entry::Freshness;
use super::policy::{BatchPriority, CachePolicy, PolicyOverrides};
use super::request_cache::{RequestCache, RequestConfig};
use crate::config::BatchSettings;
use crate::errors::{CacheError, CacheResult};
use crate::logger::{self, LogTag};
use futures::future::{try_join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Boxed fetch function used by batched requests
pub type BoxedFetch<T> = Arc<dyn Fn() -> BoxFuture<'static, CacheResult<T>> + Send + Sync>;

/// One read inside [`BlockchainCache::batch_get`]
pub struct BatchRequest<T> {
    pub key: String,
    pub fetch_fn: BoxedFetch<T>,
    pub overrides: PolicyOverrides,
}

impl<T> BatchRequest<T> {
    pub fn new<F, Fut>(key: impl Into<String>, fetch_fn: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CacheResult<T>> + Send + 'static,
    {
        Self {
            key: key.into(),
            fetch_fn: Arc::new(move || fetch_fn().boxed()),
            overrides: PolicyOverrides::none(),
        }
    }

    pub fn with_policy(mut self, overrides: impl Into<PolicyOverrides>) -> Self {
        self.overrides = overrides.into();
        self
    }
}

struct BackgroundTask {
    id: u64,
    handle: JoinHandle<()>,
}

/// Chain data cache, cheap to clone (all state is shared)
#[derive(Clone)]
pub struct BlockchainCache {
    requests: Arc<RequestCache>,
    batch: BatchSettings,
    default_policy: CachePolicy,
    background_tasks: Arc<Mutex<HashMap<String, BackgroundTask>>>,
    retry_attempts: Arc<Mutex<HashMap<String, u32>>>,
    next_task_id: Arc<AtomicU64>,
}

impl BlockchainCache {
    pub fn new(requests: Arc<RequestCache>, batch: BatchSettings) -> Self {
        Self {
            requests,
            batch,
            default_policy: CachePolicy::default(),
            background_tasks: Arc::new(Mutex::new(HashMap::new())),
            retry_attempts: Arc::new(Mutex::new(HashMap::new())),
            next_task_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the policy that per-call overrides are merged onto
    pub fn with_default_policy(mut self, policy: CachePolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn request_cache(&self) -> &Arc<RequestCache> {
        &self.requests
    }

    pub fn default_policy(&self) -> &CachePolicy {
        &self.default_policy
    }

    /// Read `key`, applying stale-while-revalidate
    ///
    /// - fresh: cached value, no network activity
    /// - stale with background revalidation: cached value, one detached refresh
    ///   is scheduled if none is pending for the key
    /// - otherwise: fetch with retry and wait for the result
    ///
    /// # Panics
    ///
    /// The stale path spawns onto the current tokio runtime, so it must be
    /// awaited inside one.
    pub async fn get<T, F, Fut>(
        &self,
        key: &str,
        fetch_fn: F,
        overrides: impl Into<PolicyOverrides>,
    ) -> CacheResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CacheResult<T>> + Send + 'static,
    {
        let policy = self.default_policy.merged(&overrides.into());
        let fetch_fn = Arc::new(fetch_fn);

        let mut force_refresh = false;
        if let Some(cached) = self.requests.peek::<T>(key) {
            let freshness = if cached.is_expired() {
                Freshness::Expired
            } else {
                Freshness::classify(cached.age(), policy.stale_time, policy.cache_duration)
            };

            match freshness {
                Freshness::Fresh => return Ok(cached.data),
                Freshness::Stale if policy.background_revalidate => {
                    self.schedule_revalidation(key, fetch_fn, policy, false);
                    return Ok(cached.data);
                }
                _ => force_refresh = true,
            }
        }

        self.fetch_with_retry(key, fetch_fn, &policy, force_refresh)
            .await
    }

    /// Fetch through the request cache, retrying failures with backoff
    ///
    /// `policy.retry.attempts` is the total number of attempts; the delay
    /// before retry `n` (0-based) is `delay * backoff^n`. Only the last error
    /// is returned.
    ///
    /// Every attempt also goes through the request cache's per-key spacing,
    /// so a retry starts no earlier than `min_request_interval` after the
    /// previous attempt. With the default 2s spacing, backoff delays shorter
    /// than that (the 500ms of `LiveData`/`RealTime`, the first 1s step of the
    /// default policy) are stretched to 2s.
    async fn fetch_with_retry<T, F, Fut>(
        &self,
        key: &str,
        fetch_fn: Arc<F>,
        policy: &CachePolicy,
        force_refresh: bool,
    ) -> CacheResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CacheResult<T>> + Send + 'static,
    {
        let max_attempts = policy.retry.attempts.max(1);
        let mut failed_attempts = 0u32;
        let _counter = RetryCounterGuard {
            attempts: &self.retry_attempts,
            key,
        };

        loop {
            let config = RequestConfig::new(key)
                .with_cache_duration(policy.cache_duration)
                .with_force_refresh(force_refresh)
                .with_dedupe(policy.dedupe);
            let attempt_fn = Arc::clone(&fetch_fn);

            match self
                .requests
                .get_cached_or_fetch(move || (*attempt_fn)(), config)
                .await
            {
                Ok(data) => return Ok(data),
                Err(e) => {
                    failed_attempts += 1;
                    if failed_attempts >= max_attempts {
                        logger::warning(
                            LogTag::Cache,
                            &format!(
                                "Giving up on {} after {} attempts: {}",
                                key, failed_attempts, e
                            ),
                        );
                        return Err(e);
                    }

                    self.retry_attempts
                        .lock()
                        .insert(key.to_string(), failed_attempts);
                    let delay = policy.retry.delay_for(failed_attempts - 1);
                    logger::warning(
                        LogTag::Cache,
                        &format!(
                            "Fetch for {} failed (attempt {}/{}), retrying in {}ms: {}",
                            key,
                            failed_attempts,
                            max_attempts,
                            delay.as_millis(),
                            e
                        ),
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Spawn a detached refresh for `key`
    ///
    /// When a refresh is already registered it is kept, unless `supersede` is
    /// set, in which case it is aborted and replaced. Failures are logged
    /// only; the value already served stays cached.
    fn schedule_revalidation<T, F, Fut>(
        &self,
        key: &str,
        fetch_fn: Arc<F>,
        policy: CachePolicy,
        supersede: bool,
    ) where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CacheResult<T>> + Send + 'static,
    {
        // The registry lock is held until the task is registered, so a task
        // that finishes early cannot miss its own deregistration.
        let mut tasks = self.background_tasks.lock();
        if let Some(existing) = tasks.get(key) {
            if !supersede {
                return;
            }
            existing.handle.abort();
            logger::debug(
                LogTag::Cache,
                &format!("Superseding background refresh of {}", key),
            );
        }

        let id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let cache = self.clone();
        let task_key = key.to_string();
        let delay = self.requests.settings().background_delay();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let result: CacheResult<T> = cache
                .fetch_with_retry(&task_key, fetch_fn, &policy, true)
                .await;
            match result {
                Ok(_) => logger::debug(
                    LogTag::Cache,
                    &format!("Background refresh of {} completed", task_key),
                ),
                Err(e) => logger::warning(
                    LogTag::Cache,
                    &format!("Background refresh of {} failed: {}", task_key, e),
                ),
            }

            let mut tasks = cache.background_tasks.lock();
            if tasks.get(&task_key).map(|task| task.id) == Some(id) {
                tasks.remove(&task_key);
            }
        });

        tasks.insert(key.to_string(), BackgroundTask { id, handle });
    }

    /// Run batched reads in priority tiers, high first
    ///
    /// Requests are tiered by their merged `stale_time`. Each tier runs
    /// concurrently and must finish before the next starts. The first error
    /// fails the whole batch; results come back in input order.
    pub async fn batch_get<T>(&self, requests: Vec<BatchRequest<T>>) -> CacheResult<Vec<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut tiers: [Vec<(usize, BatchRequest<T>)>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        let total = requests.len();

        for (index, request) in requests.into_iter().enumerate() {
            let stale_time = self.default_policy.merged(&request.overrides).stale_time;
            let tier = match BatchPriority::for_stale_time(stale_time, &self.batch) {
                BatchPriority::High => 0,
                BatchPriority::Medium => 1,
                BatchPriority::Low => 2,
            };
            tiers[tier].push((index, request));
        }

        let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();

        for tier in tiers {
            if tier.is_empty() {
                continue;
            }

            let reads = tier.into_iter().map(|(index, request)| {
                let BatchRequest {
                    key,
                    fetch_fn,
                    overrides,
                } = request;
                async move {
                    self.get(&key, move || (*fetch_fn)(), overrides)
                        .await
                        .map(|data| (index, data))
                }
            });

            for (index, data) in try_join_all(reads).await? {
                results[index] = Some(data);
            }
        }

        results
            .into_iter()
            .collect::<Option<Vec<T>>>()
            .ok_or_else(|| CacheError::fetch("batch finished with missing results"))
    }

    /// Write `data` for `key` immediately, ahead of chain confirmation
    ///
    /// The entry lives for the configured optimistic TTL (30s by default).
    pub fn optimistic_update<T>(&self, key: &str, data: T)
    where
        T: Clone + Send + Sync + 'static,
    {
        let ttl = self.requests.settings().optimistic_ttl();
        self.requests.insert(key, data, ttl);
        logger::debug(
            LogTag::Cache,
            &format!("Optimistic value written for {} ({}ms)", key, ttl.as_millis()),
        );
    }

    /// Optimistic write followed by a background fetch of the real value
    ///
    /// `revalidate_fn` always runs after the background delay. A refresh
    /// already scheduled for the key is aborted and an in-flight fetch is
    /// detached, so neither can answer for the revalidation; if that fetch
    /// still completes for other waiters, its older result does not replace
    /// the optimistic value. A failed revalidation leaves the optimistic value
    /// in place until it expires.
    ///
    /// # Panics
    ///
    /// Spawns onto the current tokio runtime; panics when called outside one.
    pub fn optimistic_update_with<T, F, Fut>(&self, key: &str, data: T, revalidate_fn: F)
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CacheResult<T>> + Send + 'static,
    {
        self.optimistic_update(key, data);
        self.requests.detach_pending(key);
        self.schedule_revalidation(key, Arc::new(revalidate_fn), self.default_policy, true);
    }

    /// Drop the cached entry for exactly `key`
    ///
    /// This is exact-key removal, not pattern matching. A background refresh
    /// already scheduled for the key is not cancelled and will write its result.
    pub fn invalidate(&self, key: &str) {
        self.requests.clear_cache(Some(key));
        self.retry_attempts.lock().remove(key);
    }

    pub fn invalidate_all(&self) {
        self.requests.clear_cache(None);
        self.retry_attempts.lock().clear();
    }

    /// Failed attempts so far for a fetch that is still retrying
    pub fn retry_count(&self, key: &str) -> Option<u32> {
        self.retry_attempts.lock().get(key).copied()
    }

    pub fn background_task_count(&self) -> usize {
        self.background_tasks.lock().len()
    }

    /// Teardown: abort background refreshes and clear every registry
    pub fn shutdown(&self) {
        let tasks: Vec<BackgroundTask> = self
            .background_tasks
            .lock()
            .drain()
            .map(|(_, task)| task)
            .collect();
        let aborted = tasks.len();
        for task in tasks {
            task.handle.abort();
        }

        self.invalidate_all();
        logger::info(
            LogTag::Cache,
            &format!("Cache shut down, {} background refreshes aborted", aborted),
        );
    }
}

/// Clears a key's retry counter however `fetch_with_retry` ends, including
/// when its future is dropped mid-retry
struct RetryCounterGuard<'a> {
    attempts: &'a Mutex<HashMap<String, u32>>,
    key: &'a str,
}

impl Drop for RetryCounterGuard<'_> {
    fn drop(&mut self) {
        self.attempts.lock().remove(self.key);
    }
}

impl std::fmt::Debug for BlockchainCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainCache")
            .field("requests", &self.requests)
            .field("default_policy", &self.default_policy)
            .field("background_tasks", &self.background_task_count())
            .finish()
    }
}
