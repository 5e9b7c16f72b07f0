//! Cron job logging bookmark cache health.

use std::str::FromStr;
use std::sync::Arc;

use apalis::prelude::*;
use apalis_cron::Schedule;

use crate::cache::BookmarkCacheService;

/// Runs every hour at minute 0.
pub const MAINTENANCE_CRON: &str = "0 0 * * * *";

/// Marker job emitted by the cron stream.
#[derive(Default, Debug, Clone)]
pub struct BookmarkCacheMaintenanceJob;

impl From<chrono::DateTime<chrono::Utc>> for BookmarkCacheMaintenanceJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct MaintenanceContext {
    pub cache: Arc<BookmarkCacheService>,
}

pub async fn process_cache_maintenance_job(
    _job: BookmarkCacheMaintenanceJob,
    ctx: Data<MaintenanceContext>,
) -> Result<(), apalis::prelude::Error> {
    let stats = ctx.cache.cache_stats().await;
    if stats.available {
        tracing::info!(
            target = "bahk::application::jobs::maintenance",
            backend = stats.backend,
            total_keys = stats.total_keys,
            memory_used = stats.memory_used.as_deref().unwrap_or("unknown"),
            hit_ratio = stats.hit_ratio.unwrap_or_default(),
            "Bookmark cache maintenance"
        );
    } else {
        tracing::warn!(
            target = "bahk::application::jobs::maintenance",
            backend = stats.backend,
            error = stats.error.as_deref().unwrap_or("unknown"),
            "Bookmark cache unavailable during maintenance"
        );
    }
    Ok(())
}

pub fn cache_maintenance_schedule() -> Result<Schedule, String> {
    Schedule::from_str(MAINTENANCE_CRON).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_parses_correctly() {
        let schedule = cache_maintenance_schedule().expect("valid cron");
        let upcoming: Vec<_> = schedule.upcoming(chrono::Utc).take(3).collect();
        assert_eq!(upcoming.len(), 3);
    }
}
