use std::convert::TryFrom;

use async_trait::async_trait;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{JobReportsRepo, RepoError, UpsertJobReport},
    domain::{
        entities::{JobReportRecord, RunProgress},
        types::{JobType, RunPhase},
    },
};

use super::{PostgresRepositories, map_sqlx_error};

const REPORT_COLUMNS: &str = "run_id, job_id, job_type, phase, attempts, progress, result, \
                              last_error, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct JobReportRow {
    run_id: Uuid,
    job_id: Option<String>,
    job_type: String,
    phase: String,
    attempts: i32,
    progress: Json<RunProgress>,
    result: Option<serde_json::Value>,
    last_error: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<JobReportRow> for JobReportRecord {
    type Error = RepoError;

    fn try_from(row: JobReportRow) -> Result<Self, Self::Error> {
        let job_type = JobType::try_from(row.job_type.as_str()).map_err(|_| {
            RepoError::from_persistence(format!("unknown job type `{}`", row.job_type))
        })?;
        let phase = RunPhase::try_from(row.phase.as_str()).map_err(|_| {
            RepoError::from_persistence(format!("unknown run phase `{}`", row.phase))
        })?;

        Ok(Self {
            run_id: row.run_id,
            job_id: row.job_id,
            job_type,
            phase,
            attempts: row.attempts,
            progress: row.progress.0,
            result: row.result,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl JobReportsRepo for PostgresRepositories {
    async fn upsert_report(&self, report: UpsertJobReport) -> Result<JobReportRecord, RepoError> {
        let sql = format!(
            r#"
            INSERT INTO bookmark_job_reports
                   (run_id, job_id, job_type, phase, attempts, progress, result, last_error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (run_id) DO UPDATE
               SET job_id = COALESCE(EXCLUDED.job_id, bookmark_job_reports.job_id),
                   phase = EXCLUDED.phase,
                   attempts = EXCLUDED.attempts,
                   progress = EXCLUDED.progress,
                   result = EXCLUDED.result,
                   last_error = EXCLUDED.last_error,
                   updated_at = now()
            RETURNING {REPORT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, JobReportRow>(&sql)
            .bind(report.run_id)
            .bind(report.job_id)
            .bind(report.job_type.as_str())
            .bind(report.phase.as_str())
            .bind(report.attempts)
            .bind(Json(report.progress))
            .bind(report.result)
            .bind(report.last_error)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        JobReportRecord::try_from(row)
    }

    async fn find_report(&self, run_id: Uuid) -> Result<Option<JobReportRecord>, RepoError> {
        let sql = format!("SELECT {REPORT_COLUMNS} FROM bookmark_job_reports WHERE run_id = $1");
        let row = sqlx::query_as::<_, JobReportRow>(&sql)
            .bind(run_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobReportRecord::try_from).transpose()
    }

    async fn attach_job(&self, run_id: Uuid, job_id: &str) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE bookmark_job_reports SET job_id = $2, updated_at = now() WHERE run_id = $1",
        )
        .bind(run_id)
        .bind(job_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}
