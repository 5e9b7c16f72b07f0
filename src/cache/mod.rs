//! Bookmark cache.
//!
//! Per-user sets of bookmarked object ids, one entry per content type, kept
//! in a key-value store in front of the relational bookmarks table:
//!
//! - [`BookmarkCacheService`]: key shape and low-level get/set/add/remove,
//!   absorbing backend failures
//! - [`BookmarkCacheManager`]: batch lookups with preload on miss
//! - [`LifecycleBridge`]: applies write-path events to the cache
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379/0"
//! ttl_secs = 3600
//! bulk_cleanup_threshold = 10
//! async_cleanup_threshold = 50
//! ```

mod config;
mod events;
mod keys;
mod lifecycle;
mod lock;
mod manager;
mod redis_store;
mod service;
mod store;

pub use config::{CacheBackend, CacheConfig};
pub use events::{CacheEvent, Epoch, EventKind, EventSequence};
pub use keys::{BookmarkKey, KEY_PREFIX};
pub use lifecycle::{
    CleanupOutcome, CleanupScheduler, CleanupStrategy, EventOutcome, LifecycleBridge,
    LifecycleError,
};
pub use manager::BookmarkCacheManager;
pub use redis_store::RedisStore;
pub use service::{BookmarkCacheService, CacheStats};
pub use store::{BackendStats, KeyValueStore, MemoryStore, StoreError};

use std::sync::Arc;

/// Builds the configured store. Redis connects lazily on first use.
pub fn build_store(config: &CacheConfig) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    match config.backend {
        CacheBackend::Redis => Ok(Arc::new(RedisStore::open(&config.redis_url)?)),
        CacheBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
