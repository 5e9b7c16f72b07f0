//! Low-level bookmark cache operations.
//!
//! Every read and write of a cached bookmark set goes through
//! [`BookmarkCacheService`]. Backend failures and timeouts are logged and
//! degrade to a miss or a no-op so request handling never fails on the cache.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::application::repos::BookmarksRepo;
use crate::domain::content::ContentTypeRegistry;
use crate::domain::types::{ContentTypeId, ObjectId, Viewer};

use super::config::CacheConfig;
use super::keys::{BookmarkKey, KEY_PREFIX};
use super::store::{KeyValueStore, StoreError};

const SOURCE: &str = "bahk::cache::service";

/// Snapshot returned by [`BookmarkCacheService::cache_stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub available: bool,
    pub backend: &'static str,
    pub total_keys: u64,
    pub memory_used: Option<String>,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: Option<f64>,
    pub cache_prefix: &'static str,
    pub cache_ttl_secs: u64,
    pub error: Option<String>,
}

pub struct BookmarkCacheService {
    config: CacheConfig,
    store: Arc<dyn KeyValueStore>,
    bookmarks: Arc<dyn BookmarksRepo>,
    registry: Arc<ContentTypeRegistry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BookmarkCacheService {
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn KeyValueStore>,
        bookmarks: Arc<dyn BookmarksRepo>,
        registry: Arc<ContentTypeRegistry>,
    ) -> Self {
        Self {
            config,
            store,
            bookmarks,
            registry,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn registry(&self) -> &ContentTypeRegistry {
        &self.registry
    }

    /// Cached bookmark ids for `(viewer, content_type)`, refreshing the TTL on hit.
    ///
    /// `None` means miss: anonymous viewer, disabled cache, absent or corrupt
    /// entry, or an unreachable backend.
    pub async fn get_user_bookmarks(
        &self,
        viewer: impl Into<Viewer>,
        content_type: ContentTypeId,
    ) -> Option<HashSet<ObjectId>> {
        let user_id = viewer.into().user_id()?;
        if !self.config.is_enabled() {
            return None;
        }

        let key = BookmarkKey::new(user_id, content_type);
        match self.read_entry(&key).await {
            Some(ids) => {
                self.record_hit();
                let refreshed = self
                    .guarded("touch", self.store.touch(&key.to_string(), self.config.ttl()))
                    .await;
                if let Err(err) = refreshed {
                    warn!(target = SOURCE, key = %key, error = %err, "Failed to refresh bookmark cache TTL");
                }
                Some(ids)
            }
            None => {
                self.record_miss();
                None
            }
        }
    }

    /// Replaces the cached set. Returns `false` when nothing was written.
    pub async fn set_user_bookmarks(
        &self,
        viewer: impl Into<Viewer>,
        content_type: ContentTypeId,
        ids: &HashSet<ObjectId>,
    ) -> bool {
        let Some(user_id) = viewer.into().user_id() else {
            return false;
        };
        if !self.config.is_enabled() {
            return false;
        }
        let key = BookmarkKey::new(user_id, content_type);
        let written = self.write_entry(&key, ids).await;
        if written {
            debug!(
                target = SOURCE,
                user_id,
                content_type_id = content_type,
                count = ids.len(),
                "Cached bookmark set"
            );
        }
        written
    }

    /// Adds `object_id` to an existing entry. Never creates an entry.
    pub async fn add_bookmark_to_cache(
        &self,
        viewer: impl Into<Viewer>,
        content_type: ContentTypeId,
        object_id: ObjectId,
    ) -> bool {
        self.modify_entry(viewer.into(), content_type, "add", |ids| {
            ids.insert(object_id);
        })
        .await
    }

    /// Removes `object_id` from an existing entry. Never creates an entry.
    pub async fn remove_bookmark_from_cache(
        &self,
        viewer: impl Into<Viewer>,
        content_type: ContentTypeId,
        object_id: ObjectId,
    ) -> bool {
        self.modify_entry(viewer.into(), content_type, "remove", |ids| {
            ids.remove(&object_id);
        })
        .await
    }

    /// Removes several ids from one entry with a single read and write.
    ///
    /// Returns how many of `object_ids` were present; zero when no entry existed.
    pub async fn remove_many_from_cache(
        &self,
        viewer: impl Into<Viewer>,
        content_type: ContentTypeId,
        object_ids: &[ObjectId],
    ) -> usize {
        let mut removed = 0;
        self.modify_entry(viewer.into(), content_type, "remove_many", |ids| {
            removed = object_ids.iter().filter(|id| ids.remove(id)).count();
        })
        .await;
        removed
    }

    /// Drops one entry, or every known content type when `content_type` is `None`.
    pub async fn invalidate_user_bookmarks(
        &self,
        viewer: impl Into<Viewer>,
        content_type: Option<ContentTypeId>,
    ) -> bool {
        let Some(user_id) = viewer.into().user_id() else {
            return false;
        };
        if !self.config.is_enabled() {
            return false;
        }

        let content_types = match content_type {
            Some(id) => vec![id],
            None => self.registry.all_ids(),
        };
        let keys: Vec<String> = content_types
            .into_iter()
            .map(|id| BookmarkKey::new(user_id, id).to_string())
            .collect();

        match self.guarded("delete", self.store.delete_many(&keys)).await {
            Ok(removed) => {
                debug!(
                    target = SOURCE,
                    user_id,
                    keys = keys.len(),
                    removed,
                    "Invalidated bookmark cache"
                );
                true
            }
            Err(err) => {
                warn!(target = SOURCE, user_id, error = %err, "Bookmark cache invalidation failed");
                false
            }
        }
    }

    /// Authoritative read from the relational store, written back to the cache.
    ///
    /// Always yields a concrete set; relational failures are logged and
    /// produce an empty set.
    pub async fn preload_user_bookmarks(
        &self,
        viewer: impl Into<Viewer>,
        content_type: ContentTypeId,
    ) -> HashSet<ObjectId> {
        let Some(user_id) = viewer.into().user_id() else {
            return HashSet::new();
        };

        let ids: HashSet<ObjectId> = match self.bookmarks.list_object_ids(user_id, content_type).await
        {
            Ok(ids) => ids.into_iter().collect(),
            Err(err) => {
                error!(
                    target = SOURCE,
                    user_id,
                    content_type_id = content_type,
                    error = %err,
                    "Failed to preload bookmarks"
                );
                return HashSet::new();
            }
        };

        self.set_user_bookmarks(user_id, content_type, &ids).await;
        counter!("bahk_bookmark_cache_preload_total").increment(1);
        ids
    }

    pub async fn cache_stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let hit_ratio = (hits + misses > 0).then(|| hits as f64 / (hits + misses) as f64);
        let mut stats = CacheStats {
            available: false,
            backend: self.store.name(),
            total_keys: 0,
            memory_used: None,
            hits,
            misses,
            hit_ratio,
            cache_prefix: KEY_PREFIX,
            cache_ttl_secs: self.config.ttl().as_secs(),
            error: None,
        };

        match self.guarded("stats", self.store.stats(KEY_PREFIX)).await {
            Ok(backend) => {
                stats.available = true;
                stats.total_keys = backend.key_count;
                stats.memory_used = backend
                    .memory_used_human
                    .or_else(|| backend.memory_used_bytes.map(|bytes| format!("{bytes}B")));
            }
            Err(err) => {
                warn!(target = SOURCE, error = %err, "Failed to collect bookmark cache stats");
                stats.error = Some(err.to_string());
            }
        }
        stats
    }

    /// Removes every bookmark cache entry. Maintenance only.
    pub async fn clear_all(&self) -> Result<u64, StoreError> {
        self.store.clear_prefix(KEY_PREFIX).await
    }

    async fn modify_entry<F>(
        &self,
        viewer: Viewer,
        content_type: ContentTypeId,
        op: &'static str,
        apply: F,
    ) -> bool
    where
        F: FnOnce(&mut HashSet<ObjectId>),
    {
        let Some(user_id) = viewer.user_id() else {
            return false;
        };
        if !self.config.is_enabled() {
            return false;
        }

        let key = BookmarkKey::new(user_id, content_type);
        let Some(mut ids) = self.read_entry(&key).await else {
            return false;
        };
        apply(&mut ids);
        let written = self.write_entry(&key, &ids).await;
        if written {
            debug!(target = SOURCE, key = %key, op, "Updated cached bookmark set");
        }
        written
    }

    async fn read_entry(&self, key: &BookmarkKey) -> Option<HashSet<ObjectId>> {
        let raw = match self.guarded("get", self.store.get(&key.to_string())).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(target = SOURCE, key = %key, error = %err, "Bookmark cache read failed");
                return None;
            }
        };

        match serde_json::from_str::<Vec<ObjectId>>(&raw) {
            Ok(ids) => Some(ids.into_iter().collect()),
            Err(err) => {
                warn!(target = SOURCE, key = %key, error = %err, "Discarding undecodable bookmark cache entry");
                None
            }
        }
    }

    async fn write_entry(&self, key: &BookmarkKey, ids: &HashSet<ObjectId>) -> bool {
        let mut sorted: Vec<ObjectId> = ids.iter().copied().collect();
        sorted.sort_unstable();
        let value = match serde_json::to_string(&sorted) {
            Ok(value) => value,
            Err(err) => {
                warn!(target = SOURCE, key = %key, error = %err, "Failed to encode bookmark set");
                return false;
            }
        };

        match self
            .guarded("set", self.store.set(&key.to_string(), value, self.config.ttl()))
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!(target = SOURCE, key = %key, error = %err, "Bookmark cache write failed");
                false
            }
        }
    }

    /// Applies the operation timeout and records latency and error metrics.
    async fn guarded<T, F>(&self, op: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let started = Instant::now();
        let timeout = self.config.operation_timeout();
        let outcome = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                op,
                timeout_ms: timeout.as_millis() as u64,
            }),
        };
        histogram!("bahk_bookmark_cache_op_ms", "op" => op)
            .record(started.elapsed().as_secs_f64() * 1000.0);
        if outcome.is_err() {
            counter!("bahk_bookmark_cache_error_total", "op" => op).increment(1);
        }
        outcome
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!("bahk_bookmark_cache_hit_total").increment(1);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("bahk_bookmark_cache_miss_total").increment(1);
    }
}

