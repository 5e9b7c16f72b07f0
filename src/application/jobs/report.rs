//! Persisted progress for queued runs.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::{
    application::reconcile::ProgressObserver,
    application::repos::{JobReportsRepo, RepoError, UpsertJobReport},
    domain::{
        entities::RunProgress,
        types::{JobType, RunPhase},
    },
};

/// Owns the report row of one run and applies phase/progress transitions.
pub struct ReportWriter {
    reports: Arc<dyn JobReportsRepo>,
    state: Mutex<UpsertJobReport>,
}

impl ReportWriter {
    /// Loads the existing report for `run_id` (or starts a fresh one) and
    /// counts a new attempt.
    pub async fn begin(
        reports: Arc<dyn JobReportsRepo>,
        run_id: Uuid,
        job_type: JobType,
    ) -> Result<Self, RepoError> {
        let mut state = match reports.find_report(run_id).await? {
            Some(existing) => UpsertJobReport::from(&existing),
            None => UpsertJobReport::new(run_id, job_type),
        };
        state.attempts += 1;
        state.last_error = None;
        reports.upsert_report(state.clone()).await?;
        Ok(Self {
            reports,
            state: Mutex::new(state),
        })
    }

    pub async fn attempts(&self) -> i32 {
        self.state.lock().await.attempts
    }

    pub async fn set_phase(&self, phase: RunPhase) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        if !state.phase.can_transition_to(phase) {
            warn!(
                target = "bahk::application::jobs::report",
                run_id = %state.run_id,
                from = state.phase.as_str(),
                to = phase.as_str(),
                "Ignoring invalid run phase transition"
            );
            return Ok(());
        }
        state.phase = phase;
        self.reports.upsert_report(state.clone()).await.map(|_| ())
    }

    pub async fn set_progress(&self, progress: &RunProgress) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        state.progress = progress.clone();
        self.reports.upsert_report(state.clone()).await.map(|_| ())
    }

    pub async fn finish(&self, result: serde_json::Value) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        state.phase = RunPhase::Done;
        state.result = Some(result);
        state.last_error = None;
        self.reports.upsert_report(state.clone()).await.map(|_| ())
    }

    /// Records the failure. Persistence errors here are logged, not returned,
    /// so the original error reaches the queue.
    pub async fn fail(&self, error: &str) {
        let mut state = self.state.lock().await;
        state.phase = RunPhase::Failed;
        state.last_error = Some(error.to_string());
        if let Err(err) = self.reports.upsert_report(state.clone()).await {
            warn!(
                target = "bahk::application::jobs::report",
                run_id = %state.run_id,
                error = %err,
                "Failed to persist run failure"
            );
        }
    }
}

#[async_trait]
impl ProgressObserver for ReportWriter {
    async fn on_phase(&self, phase: RunPhase) -> Result<(), RepoError> {
        // Done is written by `finish` together with the result.
        if phase == RunPhase::Done {
            return Ok(());
        }
        self.set_phase(phase).await
    }

    async fn on_batch(&self, progress: &RunProgress) -> Result<(), RepoError> {
        self.set_progress(progress).await
    }
}
