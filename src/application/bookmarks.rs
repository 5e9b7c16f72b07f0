//! Bookmark write path.
//!
//! Each mutation performs the relational change and publishes the matching
//! lifecycle event so cached sets follow the table.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{
    BookmarksRepo, ContentRepo, CreateBookmarkParams, RepoError, UsersRepo,
};
use crate::cache::{CleanupOutcome, EventKind, EventOutcome, LifecycleBridge, LifecycleError};
use crate::domain::content::{Bookmarkable, ContentTypeRegistry};
use crate::domain::entities::BookmarkRecord;
use crate::domain::error::DomainError;
use crate::domain::types::UserId;

const SOURCE: &str = "bahk::application::bookmarks";

#[derive(Debug, Error)]
pub enum BookmarkServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

pub struct BookmarkService {
    bookmarks: Arc<dyn BookmarksRepo>,
    users: Arc<dyn UsersRepo>,
    content: Arc<dyn ContentRepo>,
    registry: Arc<ContentTypeRegistry>,
    bridge: Arc<LifecycleBridge>,
}

impl BookmarkService {
    pub fn new(
        bookmarks: Arc<dyn BookmarksRepo>,
        users: Arc<dyn UsersRepo>,
        content: Arc<dyn ContentRepo>,
        registry: Arc<ContentTypeRegistry>,
        bridge: Arc<LifecycleBridge>,
    ) -> Self {
        Self {
            bookmarks,
            users,
            content,
            registry,
            bridge,
        }
    }

    pub async fn create_bookmark<B>(
        &self,
        user_id: UserId,
        target: &B,
        note: Option<String>,
    ) -> Result<BookmarkRecord, BookmarkServiceError>
    where
        B: Bookmarkable + Sync + ?Sized,
    {
        if self.users.find_user(user_id).await?.is_none() {
            return Err(DomainError::not_found("user").into());
        }
        let kind = target.content_kind();
        let object_id = target.object_id();
        let exists = self
            .content
            .existing_object_ids(kind, &[object_id])
            .await?
            .contains(&object_id);
        if !exists {
            return Err(DomainError::not_found("content").into());
        }

        let note = note
            .map(|note| note.trim().to_string())
            .filter(|note| !note.is_empty());
        let record = self
            .bookmarks
            .create_bookmark(CreateBookmarkParams {
                user_id,
                content_type_id: self.registry.resolve(kind),
                object_id,
                note,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => BookmarkServiceError::Domain(
                    DomainError::validation(format!("{kind} {object_id} is already bookmarked")),
                ),
                other => other.into(),
            })?;

        self.bridge
            .publish(EventKind::BookmarkCreated(record.identity()))
            .await?;
        Ok(record)
    }

    /// Deletes the viewer's bookmark on `target`. The cache is updated with
    /// the captured identity before the row goes away.
    pub async fn delete_bookmark<B>(
        &self,
        user_id: UserId,
        target: &B,
    ) -> Result<BookmarkRecord, BookmarkServiceError>
    where
        B: Bookmarkable + Sync + ?Sized,
    {
        let content_type_id = self.registry.resolve(target.content_kind());
        let record = self
            .bookmarks
            .find_bookmark(user_id, content_type_id, target.object_id())
            .await?
            .ok_or_else(|| DomainError::not_found("bookmark"))?;

        self.bridge
            .publish(EventKind::BookmarkDeleting(record.identity()))
            .await?;
        self.bookmarks.delete_bookmark(record.id).await?;
        Ok(record)
    }

    /// Deletes a bookmarkable entity, then cleans up its bookmarks.
    pub async fn delete_entity<B>(&self, target: &B) -> Result<CleanupOutcome, BookmarkServiceError>
    where
        B: Bookmarkable + Sync + ?Sized,
    {
        let kind = target.content_kind();
        let object_id = target.object_id();
        if !self.content.delete_object(kind, object_id).await? {
            return Err(DomainError::not_found("content").into());
        }
        info!(target = SOURCE, kind = kind.as_str(), object_id, "Deleted content entity");

        let outcome = self
            .bridge
            .publish(EventKind::EntityDeleted {
                content_type_id: self.registry.resolve(kind),
                object_id,
            })
            .await?;
        match outcome {
            EventOutcome::Cleanup(cleanup) => Ok(cleanup),
            EventOutcome::CacheUpdated(_) => Ok(CleanupOutcome::Nothing),
        }
    }

    /// Deletes a user. Bookmark rows go by cascade; cached sets are dropped.
    pub async fn delete_user(&self, user_id: UserId) -> Result<(), BookmarkServiceError> {
        if !self.users.delete_user(user_id).await? {
            return Err(DomainError::not_found("user").into());
        }
        self.bridge
            .publish(EventKind::UserDeleted { user_id })
            .await?;
        Ok(())
    }
}
