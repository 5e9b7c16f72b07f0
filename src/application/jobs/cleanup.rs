use std::sync::Arc;

use apalis::prelude::{Data, Error as ApalisError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    application::repos::{JobReportsRepo, JobsRepo, RepoError},
    cache::CleanupScheduler,
    domain::{
        entities::{BookmarkRef, RunProgress},
        types::{ContentTypeId, JobType, ObjectId, RunPhase},
    },
};

use super::{
    context::{JobWorkerContext, job_failed},
    queue::{TaskHandle, enqueue_tracked_job},
    report::ReportWriter,
};

const SOURCE: &str = "bahk::application::jobs::process_entity_cleanup_job";
const ENTITY_CLEANUP_MAX_ATTEMPTS: i32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCleanupJobPayload {
    pub run_id: Uuid,
    pub content_type_id: ContentTypeId,
    pub object_id: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCleanupResult {
    pub content_type_id: ContentTypeId,
    pub object_id: ObjectId,
    pub orphaned_found: u64,
    pub deleted: u64,
}

pub async fn enqueue_entity_cleanup_job(
    jobs: &dyn JobsRepo,
    reports: &dyn JobReportsRepo,
    content_type_id: ContentTypeId,
    object_id: ObjectId,
) -> Result<TaskHandle, RepoError> {
    let payload = EntityCleanupJobPayload {
        run_id: Uuid::new_v4(),
        content_type_id,
        object_id,
    };
    enqueue_tracked_job(
        jobs,
        reports,
        JobType::CleanupEntityBookmarks,
        payload.run_id,
        &payload,
        ENTITY_CLEANUP_MAX_ATTEMPTS,
    )
    .await
}

/// Queue-backed [`CleanupScheduler`] used by the lifecycle bridge.
pub struct JobCleanupScheduler {
    jobs: Arc<dyn JobsRepo>,
    reports: Arc<dyn JobReportsRepo>,
}

impl JobCleanupScheduler {
    pub fn new(jobs: Arc<dyn JobsRepo>, reports: Arc<dyn JobReportsRepo>) -> Self {
        Self { jobs, reports }
    }
}

#[async_trait]
impl CleanupScheduler for JobCleanupScheduler {
    async fn schedule_entity_cleanup(
        &self,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> Result<TaskHandle, RepoError> {
        enqueue_entity_cleanup_job(
            self.jobs.as_ref(),
            self.reports.as_ref(),
            content_type_id,
            object_id,
        )
        .await
    }
}

/// Removes every bookmark of a deleted entity: one bulk cache update, then
/// one bulk row delete.
pub async fn process_entity_cleanup_job(
    payload: EntityCleanupJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;
    let writer = ReportWriter::begin(
        ctx.reports.clone(),
        payload.run_id,
        JobType::CleanupEntityBookmarks,
    )
    .await
    .map_err(job_failed)?;

    match run_entity_cleanup(ctx, &payload, &writer).await {
        Ok(result) => {
            info!(
                target = SOURCE,
                run_id = %payload.run_id,
                content_type_id = payload.content_type_id,
                object_id = payload.object_id,
                orphaned_found = result.orphaned_found,
                deleted = result.deleted,
                "entity bookmark cleanup completed"
            );
            let value = serde_json::to_value(&result)
                .map_err(|err| job_failed(RepoError::from_persistence(err)))?;
            writer.finish(value).await.map_err(job_failed)
        }
        Err(err) => {
            warn!(
                target = SOURCE,
                run_id = %payload.run_id,
                error = %err,
                "entity bookmark cleanup failed"
            );
            writer.fail(&err.to_string()).await;
            Err(job_failed(err))
        }
    }
}

async fn run_entity_cleanup(
    ctx: &JobWorkerContext,
    payload: &EntityCleanupJobPayload,
    writer: &ReportWriter,
) -> Result<EntityCleanupResult, RepoError> {
    writer.set_phase(RunPhase::Scanning).await?;
    let records: Vec<BookmarkRef> = ctx
        .bookmarks
        .list_for_object(payload.content_type_id, payload.object_id)
        .await?
        .iter()
        .map(|bookmark| bookmark.identity())
        .collect();
    let orphaned_found = records.len() as u64;
    writer
        .set_progress(&RunProgress::new(0, orphaned_found, orphaned_found, 0))
        .await?;

    writer.set_phase(RunPhase::Deleting).await?;
    ctx.manager.bulk_bookmark_deleted(&records).await;
    let deleted = ctx
        .bookmarks
        .delete_for_object(payload.content_type_id, payload.object_id)
        .await?;
    writer
        .set_progress(&RunProgress::new(
            orphaned_found,
            orphaned_found,
            orphaned_found,
            deleted,
        ))
        .await?;

    Ok(EntityCleanupResult {
        content_type_id: payload.content_type_id,
        object_id: payload.object_id,
        orphaned_found,
        deleted,
    })
}
