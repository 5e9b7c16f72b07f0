use std::{sync::Arc, time::Duration};

use apalis::prelude::Error as ApalisError;

use crate::{
    application::reconcile::OrphanReconciler,
    application::repos::{BookmarksRepo, JobReportsRepo},
    cache::BookmarkCacheManager,
};

/// Cap applied to the exponential retry backoff.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(15 * 60);

/// Retry knobs shared by the reconcile worker.
#[derive(Debug, Clone, Copy)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetrySettings {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(MAX_RETRY_BACKOFF)
            .min(MAX_RETRY_BACKOFF)
    }
}

/// Shared context passed to job workers.
#[derive(Clone)]
pub struct JobWorkerContext {
    pub bookmarks: Arc<dyn BookmarksRepo>,
    pub reports: Arc<dyn JobReportsRepo>,
    pub manager: Arc<BookmarkCacheManager>,
    pub reconciler: Arc<OrphanReconciler>,
    pub retry: RetrySettings,
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`], eligible for retry.
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}

/// Convert an error that retrying cannot fix into an [`ApalisError::Abort`].
pub fn job_aborted<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Abort(Arc::new(boxed))
}
