use apalis::prelude::{Data, Error as ApalisError};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    application::reconcile::{ReconcileMode, ReconcileOptions},
    application::repos::{JobReportsRepo, JobsRepo, RepoError},
    domain::types::JobType,
};

use super::{
    context::{JobWorkerContext, job_aborted, job_failed},
    queue::{TaskHandle, enqueue_tracked_job},
    report::ReportWriter,
};

const SOURCE: &str = "bahk::application::jobs::process_reconcile_job";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileJobPayload {
    pub run_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub batch_size: u32,
    pub dry_run: bool,
}

impl ReconcileJobPayload {
    pub fn new(options: &ReconcileOptions) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            content_type: options.content_type.clone(),
            batch_size: options.batch_size,
            dry_run: options.mode == ReconcileMode::Report,
        }
    }

    fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            content_type: self.content_type.clone(),
            batch_size: self.batch_size,
            mode: if self.dry_run {
                ReconcileMode::Report
            } else {
                ReconcileMode::Delete
            },
        }
    }
}

pub async fn enqueue_reconcile_job(
    jobs: &dyn JobsRepo,
    reports: &dyn JobReportsRepo,
    options: &ReconcileOptions,
    max_retries: u32,
) -> Result<TaskHandle, RepoError> {
    let payload = ReconcileJobPayload::new(options);
    let max_attempts = i32::try_from(max_retries.saturating_add(1)).unwrap_or(i32::MAX);
    enqueue_tracked_job(
        jobs,
        reports,
        JobType::ReconcileOrphanBookmarks,
        payload.run_id,
        &payload,
        max_attempts,
    )
    .await
}

/// Runs one reconciliation attempt.
///
/// A failed attempt is recorded on the report. When retries remain the worker
/// sleeps for the backoff before handing the error to the retry layer.
pub async fn process_reconcile_job(
    payload: ReconcileJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    let ctx = &*context;
    let writer = ReportWriter::begin(
        ctx.reports.clone(),
        payload.run_id,
        JobType::ReconcileOrphanBookmarks,
    )
    .await
    .map_err(job_failed)?;
    let attempt = writer.attempts().await.max(1) as u32;

    info!(
        target = SOURCE,
        run_id = %payload.run_id,
        attempt,
        dry_run = payload.dry_run,
        batch_size = payload.batch_size,
        content_type = payload.content_type.as_deref().unwrap_or("all"),
        "starting orphan reconciliation"
    );

    match ctx.reconciler.run(&payload.options(), &writer).await {
        Ok(report) => {
            let value = serde_json::to_value(&report)
                .map_err(|err| job_failed(RepoError::from_persistence(err)))?;
            writer.finish(value).await.map_err(job_failed)
        }
        Err(err) if err.is_permanent() => {
            error!(target = SOURCE, run_id = %payload.run_id, error = %err, "orphan reconciliation rejected");
            writer.fail(&err.to_string()).await;
            Err(job_aborted(err))
        }
        Err(err) => {
            writer.fail(&err.to_string()).await;
            if attempt <= ctx.retry.max_retries {
                let delay = ctx.retry.backoff(attempt);
                warn!(
                    target = SOURCE,
                    run_id = %payload.run_id,
                    attempt,
                    retry_in_secs = delay.as_secs(),
                    error = %err,
                    "orphan reconciliation failed, retrying"
                );
                sleep(delay).await;
            } else {
                error!(
                    target = SOURCE,
                    run_id = %payload.run_id,
                    attempt,
                    error = %err,
                    "orphan reconciliation failed permanently"
                );
            }
            Err(job_failed(err))
        }
    }
}
