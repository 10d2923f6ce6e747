/// Caching policies per data class
///
/// Presets are ordered from slow-changing to fast-changing chain data:
/// - Static: contract constants, chama configuration
/// - Membership: member lists, roles
/// - RoscaStatus: current round, payout order
/// - LiveData: balances, contributions in the current round
/// - RealTime: pending transactions, countdowns
use crate::config::BatchSettings;
use std::time::Duration;

/// Upper bound for a single backoff delay
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(3_600);

/// Retry schedule for failed fetches
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub attempts: u32,
    /// Delay before the first retry
    pub delay: Duration,
    /// Multiplier applied per further retry
    pub backoff: f64,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration, backoff: f64) -> Self {
        Self {
            attempts,
            delay,
            backoff,
        }
    }

    /// No retries at all
    pub const fn none() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    /// `delay * backoff^retry_index`, where index 0 is the first retry
    ///
    /// Capped at [`MAX_RETRY_DELAY`]; a negative or NaN backoff counts as 0.
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        if self.delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
        let factor = self.backoff.max(0.0).powi(exponent);
        Duration::try_from_secs_f64(self.delay.as_secs_f64() * factor)
            .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
    }
}

/// Full caching policy for one class of data
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachePolicy {
    /// How long an entry may be served at all
    pub cache_duration: Duration,
    /// Age after which an entry is stale
    pub stale_time: Duration,
    /// Serve stale entries while refreshing them in the background
    pub background_revalidate: bool,
    pub retry: RetryPolicy,
    /// Share in-flight requests for the same key
    pub dedupe: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            cache_duration: Duration::from_secs(30),
            stale_time: Duration::from_secs(10),
            background_revalidate: true,
            retry: RetryPolicy::new(3, Duration::from_millis(1_000), 2.0),
            dedupe: true,
        }
    }
}

impl CachePolicy {
    /// Apply the set fields of `overrides` on top of this policy
    pub fn merged(&self, overrides: &PolicyOverrides) -> Self {
        Self {
            cache_duration: overrides.cache_duration.unwrap_or(self.cache_duration),
            stale_time: overrides.stale_time.unwrap_or(self.stale_time),
            background_revalidate: overrides
                .background_revalidate
                .unwrap_or(self.background_revalidate),
            retry: overrides.retry.unwrap_or(self.retry),
            dedupe: overrides.dedupe.unwrap_or(self.dedupe),
        }
    }

    /// Whether stale-while-revalidate has a window to work with
    ///
    /// Not enforced: a policy with `stale_time > cache_duration` simply never
    /// serves stale data.
    pub fn is_consistent(&self) -> bool {
        self.stale_time <= self.cache_duration
    }
}

/// Partial policy, merged over a default with [`CachePolicy::merged`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PolicyOverrides {
    pub cache_duration: Option<Duration>,
    pub stale_time: Option<Duration>,
    pub background_revalidate: Option<bool>,
    pub retry: Option<RetryPolicy>,
    pub dedupe: Option<bool>,
}

impl PolicyOverrides {
    /// Use the cache's default policy unchanged
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_cache_duration(mut self, duration: Duration) -> Self {
        self.cache_duration = Some(duration);
        self
    }

    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    pub fn with_background_revalidate(mut self, enabled: bool) -> Self {
        self.background_revalidate = Some(enabled);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = Some(dedupe);
        self
    }
}

impl From<CachePolicy> for PolicyOverrides {
    fn from(policy: CachePolicy) -> Self {
        Self {
            cache_duration: Some(policy.cache_duration),
            stale_time: Some(policy.stale_time),
            background_revalidate: Some(policy.background_revalidate),
            retry: Some(policy.retry),
            dedupe: Some(policy.dedupe),
        }
    }
}

impl From<PolicyPreset> for PolicyOverrides {
    fn from(preset: PolicyPreset) -> Self {
        preset.policy().into()
    }
}

/// Named policies, slowest-changing first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyPreset {
    Static,
    Membership,
    RoscaStatus,
    LiveData,
    RealTime,
}

impl PolicyPreset {
    pub fn all() -> [PolicyPreset; 5] {
        [
            PolicyPreset::Static,
            PolicyPreset::Membership,
            PolicyPreset::RoscaStatus,
            PolicyPreset::LiveData,
            PolicyPreset::RealTime,
        ]
    }

    pub fn policy(&self) -> CachePolicy {
        match self {
            PolicyPreset::Static => CachePolicy {
                cache_duration: Duration::from_secs(300),
                stale_time: Duration::from_secs(60),
                background_revalidate: true,
                retry: RetryPolicy::new(2, Duration::from_millis(2_000), 2.0),
                dedupe: true,
            },
            PolicyPreset::Membership => CachePolicy {
                cache_duration: Duration::from_secs(60),
                stale_time: Duration::from_secs(20),
                background_revalidate: true,
                retry: RetryPolicy::new(3, Duration::from_millis(1_000), 2.0),
                dedupe: true,
            },
            PolicyPreset::RoscaStatus => CachePolicy {
                cache_duration: Duration::from_secs(30),
                stale_time: Duration::from_secs(10),
                background_revalidate: true,
                retry: RetryPolicy::new(3, Duration::from_millis(1_000), 2.0),
                dedupe: true,
            },
            PolicyPreset::LiveData => CachePolicy {
                cache_duration: Duration::from_secs(15),
                stale_time: Duration::from_secs(5),
                background_revalidate: true,
                retry: RetryPolicy::new(2, Duration::from_millis(500), 1.5),
                dedupe: true,
            },
            PolicyPreset::RealTime => CachePolicy {
                cache_duration: Duration::from_secs(5),
                stale_time: Duration::from_secs(2),
                background_revalidate: true,
                retry: RetryPolicy::new(2, Duration::from_millis(500), 1.0),
                dedupe: true,
            },
        }
    }
}

/// Execution tier of a batched request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BatchPriority {
    High,
    Medium,
    Low,
}

impl BatchPriority {
    pub fn for_stale_time(stale_time: Duration, settings: &BatchSettings) -> Self {
        if stale_time <= settings.high_priority_stale() {
            BatchPriority::High
        } else if stale_time <= settings.medium_priority_stale() {
            BatchPriority::Medium
        } else {
            BatchPriority::Low
        }
    }
}
