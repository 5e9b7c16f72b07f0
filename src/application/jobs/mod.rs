mod cleanup;
mod context;
mod maintenance;
mod queue;
mod reconcile;
mod report;

pub use cleanup::{
    EntityCleanupJobPayload, EntityCleanupResult, JobCleanupScheduler, enqueue_entity_cleanup_job,
    process_entity_cleanup_job,
};
pub use context::{JobWorkerContext, MAX_RETRY_BACKOFF, RetrySettings, job_aborted, job_failed};
pub use maintenance::{
    BookmarkCacheMaintenanceJob, MaintenanceContext, cache_maintenance_schedule,
    process_cache_maintenance_job,
};
pub use queue::{
    TaskHandle, TaskStatus, TaskTracker, TaskWaitError, enqueue_job, enqueue_tracked_job,
};
pub use reconcile::{ReconcileJobPayload, enqueue_reconcile_job, process_reconcile_job};
pub use report::ReportWriter;
