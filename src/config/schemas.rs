/// Configuration schemas - every config structure defined once with defaults
///
/// Durations are stored as milliseconds so the TOML file stays flat;
/// the `*_duration()` helpers convert them for the cache code.
use crate::config_struct;
use std::time::Duration;

// ============================================================================
// CACHE CONFIGURATION
// ============================================================================

config_struct! {
    /// Request cache limits and timings
    pub struct CacheSettings {
        /// Maximum number of cached entries before eviction runs
        max_cache_size: usize = 1000,

        /// Minimum spacing between two fetch attempts for the same key
        min_request_interval_ms: u64 = 2_000,

        /// TTL used when a request does not specify one
        default_cache_duration_ms: u64 = 30_000,

        /// Share of entries dropped (oldest first) when expiry sweeping is not enough
        eviction_fraction: f64 = 0.2,

        /// Delay before a detached background refresh starts
        background_delay_ms: u64 = 100,

        /// Lifetime of an optimistically written entry
        optimistic_ttl_ms: u64 = 30_000,
    }
}

impl CacheSettings {
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn default_cache_duration(&self) -> Duration {
        Duration::from_millis(self.default_cache_duration_ms)
    }

    pub fn background_delay(&self) -> Duration {
        Duration::from_millis(self.background_delay_ms)
    }

    pub fn optimistic_ttl(&self) -> Duration {
        Duration::from_millis(self.optimistic_ttl_ms)
    }

    /// Number of entries removed by one age-based eviction pass
    pub fn eviction_batch(&self, current_len: usize) -> usize {
        let fraction = self.eviction_fraction.clamp(0.0, 1.0);
        ((current_len as f64) * fraction).floor().max(1.0) as usize
    }
}

// ============================================================================
// BATCH CONFIGURATION
// ============================================================================

config_struct! {
    /// Priority thresholds used to bucket batched requests by stale time
    pub struct BatchSettings {
        /// Requests with stale time at or below this run first
        high_priority_stale_ms: u64 = 5_000,

        /// Requests with stale time at or below this run second, the rest last
        medium_priority_stale_ms: u64 = 20_000,
    }
}

impl BatchSettings {
    pub fn high_priority_stale(&self) -> Duration {
        Duration::from_millis(self.high_priority_stale_ms)
    }

    pub fn medium_priority_stale(&self) -> Duration {
        Duration::from_millis(self.medium_priority_stale_ms)
    }
}

// ============================================================================
// ROOT CONFIGURATION
// ============================================================================

config_struct! {
    /// Root configuration structure containing all sub-configurations
    pub struct Config {
        /// Request cache configuration
        cache: CacheSettings = CacheSettings::default(),

        /// Batch prioritisation configuration
        batch: BatchSettings = BatchSettings::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_rate_limited_rpc_profile() {
        let config = Config::default();
        assert_eq!(config.cache.max_cache_size, 1000);
        assert_eq!(config.cache.min_request_interval(), Duration::from_secs(2));
        assert_eq!(config.cache.default_cache_duration(), Duration::from_secs(30));
        assert_eq!(config.cache.background_delay(), Duration::from_millis(100));
        assert_eq!(config.batch.high_priority_stale(), Duration::from_secs(5));
        assert_eq!(config.batch.medium_priority_stale(), Duration::from_secs(20));
    }

    #[test]
    fn test_eviction_batch_is_twenty_percent_and_never_zero() {
        let settings = CacheSettings::default();
        assert_eq!(settings.eviction_batch(1000), 200);
        assert_eq!(settings.eviction_batch(1001), 200);
        assert_eq!(settings.eviction_batch(3), 1);
    }
}
