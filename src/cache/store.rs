//! Key-value store abstraction backing the bookmark cache.
//!
//! The service above treats every backend as best-effort: errors surface as
//! [`StoreError`] and are absorbed there, never by callers of the cache API.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "bahk::cache::store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation `{op}` timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Raw figures reported by a backend for keys under a prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub key_count: u64,
    pub memory_used_bytes: Option<u64>,
    pub memory_used_human: Option<String>,
}

/// Minimal get/set/touch/delete surface with per-entry TTL.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Refreshes the TTL of an existing key. Returns `false` when the key is absent.
    async fn touch(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn delete_many(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut removed = 0;
        for key in keys {
            if self.delete(key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn stats(&self, prefix: &str) -> Result<BackendStats, StoreError>;

    /// Removes every key under `prefix`, returning how many were dropped.
    ///
    /// Maintenance only; the request path never scans.
    async fn clear_prefix(&self, prefix: &str) -> Result<u64, StoreError>;
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local store used when no networked backend is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "len")
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(entries: &mut HashMap<String, MemoryEntry>, now: Instant) {
        entries.retain(|_, entry| entry.is_live(now));
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, "get");
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "set");
        Self::purge_expired(&mut entries, now);
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "touch");
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let removed = rw_write(&self.entries, SOURCE, "delete").remove(key);
        Ok(removed.is_some_and(|entry| entry.is_live(now)))
    }

    async fn stats(&self, prefix: &str) -> Result<BackendStats, StoreError> {
        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, "stats");
        let mut key_count = 0u64;
        let mut bytes = 0u64;
        for (key, entry) in entries.iter() {
            if key.starts_with(prefix) && entry.is_live(now) {
                key_count += 1;
                bytes += (key.len() + entry.value.len()) as u64;
            }
        }
        Ok(BackendStats {
            key_count,
            memory_used_bytes: Some(bytes),
            memory_used_human: Some(format!("{bytes}B")),
        })
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "clear_prefix");
        Self::purge_expired(&mut entries, now);
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let store = MemoryStore::new();
        store.set("a", "[1,2]".into(), TTL).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("[1,2]"));
        assert_eq!(store.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_are_invisible() {
        let store = MemoryStore::new();
        store.set("a", "[]".into(), Duration::ZERO).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(!store.touch("a", TTL).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn touch_only_refreshes_existing_keys() {
        let store = MemoryStore::new();
        assert!(!store.touch("missing", TTL).await.unwrap());
        store.set("a", "[]".into(), TTL).await.unwrap();
        assert!(store.touch("a", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn stats_and_clear_respect_prefix() {
        let store = MemoryStore::new();
        store.set("bookmarks:user:1:ct:1", "[1]".into(), TTL).await.unwrap();
        store.set("bookmarks:user:2:ct:1", "[2]".into(), TTL).await.unwrap();
        store.set("sessions:1", "x".into(), TTL).await.unwrap();

        let stats = store.stats("bookmarks:").await.unwrap();
        assert_eq!(stats.key_count, 2);

        assert_eq!(store.clear_prefix("bookmarks:").await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.get("sessions:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clear_counts_only_live_prefixed_keys() {
        let store = MemoryStore::new();
        let short = Duration::from_millis(30);
        store.set("bookmarks:user:1:ct:1", "[1]".into(), TTL).await.unwrap();
        store.set("bookmarks:user:2:ct:1", "[2]".into(), short).await.unwrap();
        store.set("sessions:1", "x".into(), short).await.unwrap();
        store.set("sessions:2", "y".into(), TTL).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.clear_prefix("bookmarks:").await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("sessions:2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_many_counts_removed_keys() {
        let store = MemoryStore::new();
        store.set("a", "[]".into(), TTL).await.unwrap();
        let removed = store
            .delete_many(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }
}
