//! Request caching and rate limiting for chain reads
//!
//! Two layers:
//! - [`RequestCache`]: TTL cache, in-flight deduplication and per-key request
//!   spacing in front of a rate-limited RPC endpoint
//! - [`BlockchainCache`]: stale-while-revalidate policies, retry with backoff,
//!   prioritised batches and optimistic updates
//!
//! # Example
//!
//! ```no_run
//! use chama_cache::cache::{create_chama_data_key, global, PolicyPreset};
//!
//! # async fn fetch_round(_: &str) -> chama_cache::errors::CacheResult<u64> { Ok(3) }
//! # async fn demo() -> chama_cache::errors::CacheResult<()> {
//! let cache = global::blockchain_cache();
//! let key = create_chama_data_key("round", "0xABC", &[]);
//!
//! let round: u64 = cache
//!     .get(&key, || fetch_round("0xABC"), PolicyPreset::RoscaStatus)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod blockchain_cache;
mod entry;
pub mod global;
mod keys;
mod policy;
mod request_cache;


pub use blockchain_cache::{BatchRequest, BlockchainCache, BoxedFetch};
pub use entry::{CacheMetrics, CacheStats, CachedValue, Freshness};
pub use keys::{create_chama_data_key, create_user_data_key};
pub use policy::{
    BatchPriority, CachePolicy, PolicyOverrides, PolicyPreset, RetryPolicy, MAX_RETRY_DELAY,
};
pub use request_cache::{RequestCache, RequestConfig};
