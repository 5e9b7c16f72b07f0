use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::{Instant, sleep};
use uuid::Uuid;

use crate::{
    application::repos::{JobReportsRepo, JobsRepo, NewJobRecord, RepoError, UpsertJobReport},
    domain::{
        entities::{JobReportRecord, RunProgress},
        types::{JobState, JobType, RunPhase},
    },
};

const DEFAULT_WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Identifies a queued task: the apalis job id plus the run id keying its report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskHandle {
    pub job_id: String,
    pub run_id: Uuid,
}

/// Point-in-time view of a queued task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatus {
    pub run_id: Uuid,
    pub job_id: Option<String>,
    pub job_state: Option<JobState>,
    pub phase: RunPhase,
    pub attempts: i32,
    pub progress: RunProgress,
    pub result: Option<serde_json::Value>,
    pub last_error: Option<String>,
}

impl TaskStatus {
    fn from_parts(report: JobReportRecord, job_state: Option<JobState>) -> Self {
        Self {
            run_id: report.run_id,
            job_id: report.job_id,
            job_state,
            phase: report.phase,
            attempts: report.attempts,
            progress: report.progress,
            result: report.result,
            last_error: report.last_error,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.phase == RunPhase::Done
    }

    /// Failed with no retry left: the report says so and the queue gave up.
    pub fn failed_terminally(&self) -> bool {
        self.phase == RunPhase::Failed
            && self.job_state.is_none_or(|state| state.is_terminal())
    }
}

#[derive(Debug, Error)]
pub enum TaskWaitError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("task `{run_id}` not found")]
    NotFound { run_id: Uuid },
    #[error("task `{run_id}` failed: {message}")]
    Failed { run_id: Uuid, message: String },
    #[error("task `{run_id}` did not finish within {timeout:?}")]
    TimedOut { run_id: Uuid, timeout: Duration },
}

/// Enqueue a job with the provided payload, returning the assigned id.
pub async fn enqueue_job<J, P>(
    repo: &J,
    job_type: JobType,
    payload: &P,
    run_at: Option<OffsetDateTime>,
    max_attempts: i32,
    priority: i32,
) -> Result<String, RepoError>
where
    J: JobsRepo + ?Sized,
    P: serde::Serialize,
{
    let payload = serde_json::to_value(payload)
        .map_err(|err| RepoError::from_persistence(err.to_string()))?;
    let record = NewJobRecord {
        job_type,
        payload,
        run_at: run_at.unwrap_or_else(OffsetDateTime::now_utc),
        max_attempts,
        priority,
    };

    repo.enqueue_job(record).await
}

/// Creates the report row, enqueues the job, then links the two.
pub async fn enqueue_tracked_job<P>(
    jobs: &dyn JobsRepo,
    reports: &dyn JobReportsRepo,
    job_type: JobType,
    run_id: Uuid,
    payload: &P,
    max_attempts: i32,
) -> Result<TaskHandle, RepoError>
where
    P: serde::Serialize + Sync,
{
    reports
        .upsert_report(UpsertJobReport::new(run_id, job_type))
        .await?;
    let job_id = enqueue_job(jobs, job_type, payload, None, max_attempts, 0).await?;
    reports.attach_job(run_id, &job_id).await?;
    Ok(TaskHandle { job_id, run_id })
}

/// Polls reports and queue state for task handles.
#[derive(Clone)]
pub struct TaskTracker {
    jobs: Arc<dyn JobsRepo>,
    reports: Arc<dyn JobReportsRepo>,
    poll_interval: Duration,
}

impl TaskTracker {
    pub fn new(jobs: Arc<dyn JobsRepo>, reports: Arc<dyn JobReportsRepo>) -> Self {
        Self {
            jobs,
            reports,
            poll_interval: DEFAULT_WAIT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub async fn status(&self, handle: &TaskHandle) -> Result<TaskStatus, TaskWaitError> {
        let report = self
            .reports
            .find_report(handle.run_id)
            .await?
            .ok_or(TaskWaitError::NotFound {
                run_id: handle.run_id,
            })?;
        let job_state = self.jobs.find_job(&handle.job_id).await?.map(|job| job.state);
        Ok(TaskStatus::from_parts(report, job_state))
    }

    /// Block until the task finishes or the timeout elapses.
    ///
    /// The task keeps running after a timeout; only the caller stops waiting.
    pub async fn wait(
        &self,
        handle: &TaskHandle,
        timeout: Duration,
    ) -> Result<TaskStatus, TaskWaitError> {
        let deadline = Instant::now() + timeout;

        loop {
            let status = self.status(handle).await?;
            if status.succeeded() {
                return Ok(status);
            }
            if status.failed_terminally() || status.job_state == Some(JobState::Killed) {
                let message = status
                    .last_error
                    .unwrap_or_else(|| "task failed without error text".to_string());
                return Err(TaskWaitError::Failed {
                    run_id: handle.run_id,
                    message,
                });
            }
            if Instant::now() >= deadline {
                return Err(TaskWaitError::TimedOut {
                    run_id: handle.run_id,
                    timeout,
                });
            }

            sleep(self.poll_interval).await;
        }
    }
}
