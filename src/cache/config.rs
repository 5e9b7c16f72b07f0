//! Bookmark cache configuration.
//!
//! Controls the cache backend, entry TTL and the entity-cleanup thresholds via
//! the `[cache]` section of `bahk.toml`.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";
const DEFAULT_TTL_SECS: u64 = 3600;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 250;
const DEFAULT_BULK_CLEANUP_THRESHOLD: u64 = 10;
const DEFAULT_ASYNC_CLEANUP_THRESHOLD: u64 = 50;

/// Which key-value store backs the bookmark cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl CacheBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheBackend::Redis => "redis",
            CacheBackend::Memory => "memory",
        }
    }
}

/// Bookmark cache configuration from `bahk.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Disabled caches answer every read with a miss and skip every write.
    pub enabled: bool,
    pub backend: CacheBackend,
    pub redis_url: String,
    /// Sliding TTL applied on set and refreshed on every hit.
    pub ttl_secs: u64,
    /// Upper bound for a single backend round trip.
    pub operation_timeout_ms: u64,
    /// Bookmark count at which entity deletion switches to one bulk cache call.
    pub bulk_cleanup_threshold: u64,
    /// Bookmark count at which entity deletion is deferred to a worker.
    pub async_cleanup_threshold: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Redis,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            ttl_secs: DEFAULT_TTL_SECS,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            bulk_cleanup_threshold: DEFAULT_BULK_CLEANUP_THRESHOLD,
            async_cleanup_threshold: DEFAULT_ASYNC_CLEANUP_THRESHOLD,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            backend: settings.backend,
            redis_url: settings.redis_url.clone(),
            ttl_secs: settings.ttl_secs.get(),
            operation_timeout_ms: settings.operation_timeout_ms.get(),
            bulk_cleanup_threshold: settings.bulk_cleanup_threshold.get(),
            async_cleanup_threshold: settings.async_cleanup_threshold.get(),
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.max(1))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms.max(1))
    }
}
