/// Process-wide cache instances
///
/// Built lazily from the global configuration (defaults when none was
/// loaded). Code that wants isolated caches, tests in particular, should
/// construct [`RequestCache`] and [`BlockchainCache`] directly instead.
use super::blockchain_cache::BlockchainCache;
use super::request_cache::RequestCache;
use crate::config::get_config_clone;
use once_cell::sync::OnceCell;
use std::sync::Arc;

static REQUEST_CACHE: OnceCell<Arc<RequestCache>> = OnceCell::new();
static BLOCKCHAIN_CACHE: OnceCell<BlockchainCache> = OnceCell::new();

pub fn request_cache() -> Arc<RequestCache> {
    Arc::clone(REQUEST_CACHE.get_or_init(|| Arc::new(RequestCache::new(get_config_clone().cache))))
}

pub fn blockchain_cache() -> BlockchainCache {
    BLOCKCHAIN_CACHE
        .get_or_init(|| BlockchainCache::new(request_cache(), get_config_clone().batch))
        .clone()
}

/// Teardown hook: abort background refreshes and clear all cached state
///
/// Does nothing if the global caches were never used.
pub fn shutdown() {
    if let Some(cache) = BLOCKCHAIN_CACHE.get() {
        cache.shutdown();
    } else if let Some(cache) = REQUEST_CACHE.get() {
        cache.clear_cache(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_global_instances_share_state_until_shutdown() {
        let cache = blockchain_cache();
        assert!(Arc::ptr_eq(cache.request_cache(), &request_cache()));

        cache.optimistic_update("global:test:0x0", 11u32);
        let seen = blockchain_cache()
            .request_cache()
            .peek::<u32>("global:test:0x0")
            .map(|v| v.data);
        assert_eq!(seen, Some(11));

        shutdown();
        assert!(request_cache().peek::<u32>("global:test:0x0").is_none());
        assert_eq!(blockchain_cache().background_task_count(), 0);
    }
}
