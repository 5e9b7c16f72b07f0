//! Bridge translating lifecycle events into cache mutations.
//!
//! Entity deletion picks a strategy from the number of referencing bookmarks:
//! below `bulk_cleanup_threshold` each bookmark is removed from the cache on
//! its own, up to `async_cleanup_threshold` a single bulk cache update is
//! issued, and beyond that the work is handed to a background job.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::jobs::TaskHandle;
use crate::application::repos::{BookmarksRepo, RepoError};
use crate::domain::entities::BookmarkRef;
use crate::domain::types::{ContentTypeId, ObjectId};

use super::events::{CacheEvent, EventKind, EventSequence};
use super::manager::BookmarkCacheManager;

const SOURCE: &str = "bahk::cache::lifecycle";

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Hands large entity cleanups to the background worker.
#[async_trait]
pub trait CleanupScheduler: Send + Sync {
    async fn schedule_entity_cleanup(
        &self,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> Result<TaskHandle, RepoError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStrategy {
    Nothing,
    Individual,
    Bulk,
    Deferred,
}

impl CleanupStrategy {
    pub fn for_count(count: u64, bulk_threshold: u64, async_threshold: u64) -> Self {
        if count == 0 {
            CleanupStrategy::Nothing
        } else if count >= async_threshold {
            CleanupStrategy::Deferred
        } else if count >= bulk_threshold {
            CleanupStrategy::Bulk
        } else {
            CleanupStrategy::Individual
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Nothing,
    Individual { deleted: u64 },
    Bulk { deleted: u64, cache_applied: usize },
    Deferred(TaskHandle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Whether an existing cache entry was updated.
    CacheUpdated(bool),
    Cleanup(CleanupOutcome),
}

pub struct LifecycleBridge {
    manager: Arc<BookmarkCacheManager>,
    bookmarks: Arc<dyn BookmarksRepo>,
    scheduler: Option<Arc<dyn CleanupScheduler>>,
    sequence: EventSequence,
    bulk_threshold: u64,
    async_threshold: u64,
}

impl LifecycleBridge {
    pub fn new(
        manager: Arc<BookmarkCacheManager>,
        bookmarks: Arc<dyn BookmarksRepo>,
        scheduler: Option<Arc<dyn CleanupScheduler>>,
    ) -> Self {
        let config = manager.service().config();
        let bulk_threshold = config.bulk_cleanup_threshold;
        let async_threshold = config.async_cleanup_threshold;
        Self {
            manager,
            bookmarks,
            scheduler,
            sequence: EventSequence::new(),
            bulk_threshold,
            async_threshold,
        }
    }

    pub fn manager(&self) -> &BookmarkCacheManager {
        &self.manager
    }

    pub async fn publish(&self, kind: EventKind) -> Result<EventOutcome, LifecycleError> {
        let event = self.sequence.stamp(kind);
        self.dispatch(&event).await
    }

    async fn dispatch(&self, event: &CacheEvent) -> Result<EventOutcome, LifecycleError> {
        match &event.kind {
            EventKind::BookmarkCreated(bookmark) => Ok(EventOutcome::CacheUpdated(
                self.manager
                    .bookmark_created(
                        bookmark.user_id,
                        bookmark.content_type_id,
                        bookmark.object_id,
                    )
                    .await,
            )),
            EventKind::BookmarkDeleting(bookmark) => Ok(EventOutcome::CacheUpdated(
                self.manager
                    .bookmark_deleted(
                        bookmark.user_id,
                        bookmark.content_type_id,
                        bookmark.object_id,
                    )
                    .await,
            )),
            EventKind::EntityDeleted {
                content_type_id,
                object_id,
            } => self
                .cleanup_entity(*content_type_id, *object_id)
                .await
                .map(EventOutcome::Cleanup),
            EventKind::UserDeleted { user_id } => Ok(EventOutcome::CacheUpdated(
                self.manager.user_cache_invalidated(*user_id).await,
            )),
        }
    }

    async fn cleanup_entity(
        &self,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> Result<CleanupOutcome, LifecycleError> {
        let count = self
            .bookmarks
            .count_for_object(content_type_id, object_id)
            .await?;
        let strategy = CleanupStrategy::for_count(count, self.bulk_threshold, self.async_threshold);
        if strategy == CleanupStrategy::Nothing {
            return Ok(CleanupOutcome::Nothing);
        }

        info!(
            target = SOURCE,
            content_type_id,
            object_id,
            count,
            strategy = ?strategy,
            "Cleaning up bookmarks for deleted entity"
        );

        if strategy == CleanupStrategy::Deferred {
            match self.defer(content_type_id, object_id).await {
                Some(handle) => return Ok(CleanupOutcome::Deferred(handle)),
                None => {
                    return self.bulk_cleanup(content_type_id, object_id).await;
                }
            }
        }

        if strategy == CleanupStrategy::Bulk {
            return self.bulk_cleanup(content_type_id, object_id).await;
        }

        let bookmarks = self
            .bookmarks
            .list_for_object(content_type_id, object_id)
            .await?;
        for bookmark in &bookmarks {
            self.manager
                .bookmark_deleted(bookmark.user_id, content_type_id, object_id)
                .await;
        }
        let deleted = self
            .bookmarks
            .delete_for_object(content_type_id, object_id)
            .await?;
        info!(target = SOURCE, content_type_id, object_id, deleted, "Deleted bookmarks");
        Ok(CleanupOutcome::Individual { deleted })
    }

    async fn bulk_cleanup(
        &self,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> Result<CleanupOutcome, LifecycleError> {
        let records: Vec<BookmarkRef> = self
            .bookmarks
            .list_for_object(content_type_id, object_id)
            .await?
            .iter()
            .map(|bookmark| bookmark.identity())
            .collect();
        let cache_applied = self.manager.bulk_bookmark_deleted(&records).await;
        let deleted = self
            .bookmarks
            .delete_for_object(content_type_id, object_id)
            .await?;
        info!(target = SOURCE, content_type_id, object_id, deleted, "Bulk deleted bookmarks");
        Ok(CleanupOutcome::Bulk {
            deleted,
            cache_applied,
        })
    }

    async fn defer(&self, content_type_id: ContentTypeId, object_id: ObjectId) -> Option<TaskHandle> {
        let Some(scheduler) = self.scheduler.as_ref() else {
            warn!(
                target = SOURCE,
                content_type_id,
                object_id,
                "No cleanup worker configured, falling back to synchronous cleanup"
            );
            return None;
        };

        match scheduler
            .schedule_entity_cleanup(content_type_id, object_id)
            .await
        {
            Ok(handle) => {
                info!(
                    target = SOURCE,
                    content_type_id,
                    object_id,
                    job_id = %handle.job_id,
                    run_id = %handle.run_id,
                    "Queued entity bookmark cleanup"
                );
                Some(handle)
            }
            Err(err) => {
                warn!(
                    target = SOURCE,
                    content_type_id,
                    object_id,
                    error = %err,
                    "Failed to queue entity bookmark cleanup, falling back to synchronous cleanup"
                );
                None
            }
        }
    }
}
