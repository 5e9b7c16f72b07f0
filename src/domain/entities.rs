//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{
    BookmarkId, ContentTypeId, JobState, JobType, ObjectId, RunPhase, UserId,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookmarkRecord {
    pub id: BookmarkId,
    pub user_id: UserId,
    pub content_type_id: ContentTypeId,
    pub object_id: ObjectId,
    pub note: Option<String>,
    pub created_at: OffsetDateTime,
}

impl BookmarkRecord {
    pub fn identity(&self) -> BookmarkRef {
        BookmarkRef {
            user_id: self.user_id,
            content_type_id: self.content_type_id,
            object_id: self.object_id,
        }
    }
}

/// Plain identity of a bookmark, usable after the row (or the referenced
/// entity) is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookmarkRef {
    pub user_id: UserId,
    pub content_type_id: ContentTypeId,
    pub object_id: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentTypeRecord {
    pub id: ContentTypeId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub state: JobState,
    pub attempts: i32,
    pub max_attempts: i32,
    pub run_at: OffsetDateTime,
    pub done_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
}

/// Progress counters persisted after every processed batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunProgress {
    pub current: u64,
    pub total: u64,
    pub progress_percent: f64,
    pub orphaned_found: u64,
    pub deleted: u64,
}

impl RunProgress {
    pub fn new(current: u64, total: u64, orphaned_found: u64, deleted: u64) -> Self {
        let progress_percent = if total == 0 {
            100.0
        } else {
            ((current as f64 / total as f64) * 10_000.0).round() / 100.0
        };
        Self {
            current,
            total,
            progress_percent,
            orphaned_found,
            deleted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReportRecord {
    pub run_id: Uuid,
    pub job_id: Option<String>,
    pub job_type: JobType,
    pub phase: RunPhase,
    pub attempts: i32,
    pub progress: RunProgress,
    pub result: Option<serde_json::Value>,
    pub last_error: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
