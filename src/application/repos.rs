//! Repository traits describing persistence adapters.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::content::ContentKind;
use crate::domain::entities::{
    BookmarkRecord, ContentTypeRecord, JobRecord, JobReportRecord, RunProgress, UserRecord,
};
use crate::domain::types::{ContentTypeId, JobType, ObjectId, RunPhase, UserId};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Optional narrowing applied to bookmark scans.
#[derive(Debug, Clone, Copy, Default)]
pub struct BookmarkFilter {
    pub content_type_id: Option<ContentTypeId>,
}

#[derive(Debug, Clone)]
pub struct CreateBookmarkParams {
    pub user_id: UserId,
    pub content_type_id: ContentTypeId,
    pub object_id: ObjectId,
    pub note: Option<String>,
}

#[async_trait]
pub trait BookmarksRepo: Send + Sync {
    /// Object ids bookmarked by `user_id` for one content type.
    async fn list_object_ids(
        &self,
        user_id: UserId,
        content_type_id: ContentTypeId,
    ) -> Result<Vec<ObjectId>, RepoError>;

    async fn find_bookmark(
        &self,
        user_id: UserId,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> Result<Option<BookmarkRecord>, RepoError>;

    async fn create_bookmark(
        &self,
        params: CreateBookmarkParams,
    ) -> Result<BookmarkRecord, RepoError>;

    /// Deletes a single bookmark row by id. Returns `false` when it was already gone.
    async fn delete_bookmark(&self, id: i64) -> Result<bool, RepoError>;

    async fn count_for_object(
        &self,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> Result<u64, RepoError>;

    async fn list_for_object(
        &self,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> Result<Vec<BookmarkRecord>, RepoError>;

    async fn delete_for_object(
        &self,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> Result<u64, RepoError>;

    async fn count_bookmarks(&self, filter: BookmarkFilter) -> Result<u64, RepoError>;

    /// Keyset page of bookmarks ordered by id, strictly after `after_id`.
    async fn list_batch(
        &self,
        filter: BookmarkFilter,
        after_id: i64,
        limit: u32,
    ) -> Result<Vec<BookmarkRecord>, RepoError>;

    async fn count_by_content_type(&self) -> Result<Vec<(ContentTypeId, u64)>, RepoError>;

    async fn count_users_with_bookmarks(&self) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, RepoError>;

    /// Deletes the user; bookmark rows go with it by cascade.
    async fn delete_user(&self, id: UserId) -> Result<bool, RepoError>;

    /// Users owning at least one bookmark, most recently active first.
    async fn list_users_with_bookmarks(&self, limit: u32) -> Result<Vec<UserId>, RepoError>;
}

#[async_trait]
pub trait ContentRepo: Send + Sync {
    /// Subset of `ids` that still resolve to a live entity of `kind`.
    async fn existing_object_ids(
        &self,
        kind: ContentKind,
        ids: &[ObjectId],
    ) -> Result<HashSet<ObjectId>, RepoError>;

    async fn delete_object(&self, kind: ContentKind, id: ObjectId) -> Result<bool, RepoError>;

    async fn sample_object_ids(
        &self,
        kind: ContentKind,
        limit: u32,
    ) -> Result<Vec<ObjectId>, RepoError>;
}

#[async_trait]
pub trait ContentTypesRepo: Send + Sync {
    async fn list_content_types(&self) -> Result<Vec<ContentTypeRecord>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewJobRecord {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub run_at: OffsetDateTime,
    pub max_attempts: i32,
    pub priority: i32,
}

#[async_trait]
pub trait JobsRepo: Send + Sync {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError>;

    async fn find_job(&self, id: &str) -> Result<Option<JobRecord>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct UpsertJobReport {
    pub run_id: Uuid,
    pub job_id: Option<String>,
    pub job_type: JobType,
    pub phase: RunPhase,
    pub attempts: i32,
    pub progress: RunProgress,
    pub result: Option<serde_json::Value>,
    pub last_error: Option<String>,
}

impl UpsertJobReport {
    pub fn new(run_id: Uuid, job_type: JobType) -> Self {
        Self {
            run_id,
            job_id: None,
            job_type,
            phase: RunPhase::Idle,
            attempts: 0,
            progress: RunProgress::default(),
            result: None,
            last_error: None,
        }
    }
}

impl From<&JobReportRecord> for UpsertJobReport {
    fn from(record: &JobReportRecord) -> Self {
        Self {
            run_id: record.run_id,
            job_id: record.job_id.clone(),
            job_type: record.job_type,
            phase: record.phase,
            attempts: record.attempts,
            progress: record.progress.clone(),
            result: record.result.clone(),
            last_error: record.last_error.clone(),
        }
    }
}

#[async_trait]
pub trait JobReportsRepo: Send + Sync {
    async fn upsert_report(&self, report: UpsertJobReport) -> Result<JobReportRecord, RepoError>;

    async fn find_report(&self, run_id: Uuid) -> Result<Option<JobReportRecord>, RepoError>;

    /// Links a report to the queue job created for it.
    async fn attach_job(&self, run_id: Uuid, job_id: &str) -> Result<(), RepoError>;
}
