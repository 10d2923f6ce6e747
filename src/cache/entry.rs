/// Cache entries, freshness classification and metrics
///
/// Values are stored type-erased so one cache can hold every data shape an
/// RPC client produces; callers get them back through `downcast`.
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

/// Stand-in deadline for durations that overflow an `Instant` (about 30 years)
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `instant + duration`, saturating to a far-future instant instead of panicking
pub(crate) fn saturating_add(instant: Instant, duration: Duration) -> Instant {
    instant
        .checked_add(duration)
        .or_else(|| instant.checked_add(FAR_FUTURE))
        .unwrap_or(instant)
}

/// One cached result
#[derive(Clone)]
pub(crate) struct CacheEntry {
    pub data: ErasedValue,
    /// Write time
    pub timestamp: Instant,
    pub expires_at: Instant,
    /// When the data was read: the fetch's start, or the write time for direct writes
    pub origin: Instant,
}

impl CacheEntry {
    /// `ttl` is clamped to at least 1ms so `expires_at > timestamp` always holds.
    /// `Duration::MAX` means "never expires" and saturates to a far-future instant.
    pub fn new(data: ErasedValue, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            data,
            timestamp: now,
            expires_at: saturating_add(now, ttl.max(Duration::from_millis(1))),
            origin: now,
        }
    }

    /// Entry for a fetch result whose read started at `started`
    pub fn fetched(data: ErasedValue, ttl: Duration, started: Instant) -> Self {
        Self {
            origin: started,
            ..Self::new(data, ttl)
        }
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        now <= self.expires_at
    }

    pub fn downcast<T>(&self) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.data.downcast_ref::<T>().cloned()
    }
}

/// Freshness of a cached value relative to a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Age within the stale window, served without any network activity
    Fresh,
    /// Past the stale window but inside the cache duration
    Stale,
    /// Past the cache duration
    Expired,
}

impl Freshness {
    pub fn classify(age: Duration, stale_time: Duration, cache_duration: Duration) -> Self {
        if age <= stale_time {
            Freshness::Fresh
        } else if age <= cache_duration {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }
}

/// A typed view of a raw cache entry, returned without any TTL check
#[derive(Debug, Clone)]
pub struct CachedValue<T> {
    pub data: T,
    pub timestamp: Instant,
    pub expires_at: Instant,
}

impl<T> CachedValue<T> {
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.timestamp)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Snapshot of the request cache registries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub pending_requests: usize,
    pub last_request_times: usize,
}

/// Cache counters for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    /// Callers that joined an already in-flight request
    pub dedup_joins: u64,
    /// Fetch attempts actually started
    pub fetches: u64,
    pub failures: u64,
    /// Entries removed by the age-based pass
    pub evictions: u64,
    /// Entries removed by the expiry sweep
    pub expirations: u64,
    pub inserts: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
