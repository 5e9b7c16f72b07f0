//! Shared domain identifiers and enumerations aligned with persisted values.

use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type ContentTypeId = i32;
pub type ObjectId = i64;
pub type BookmarkId = i64;

/// Caller identity as seen by the bookmark cache.
///
/// Only authenticated users own bookmark sets; anonymous viewers never touch
/// the cache backend or the relational store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Viewer {
    Anonymous,
    User(UserId),
}

impl Viewer {
    pub fn user_id(self) -> Option<UserId> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User(id) => Some(id),
        }
    }

    pub fn is_authenticated(self) -> bool {
        matches!(self, Viewer::User(_))
    }
}

impl From<UserId> for Viewer {
    fn from(id: UserId) -> Self {
        Viewer::User(id)
    }
}

impl From<Option<UserId>> for Viewer {
    fn from(id: Option<UserId>) -> Self {
        id.map_or(Viewer::Anonymous, Viewer::User)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Scheduled,
    Running,
    Done,
    Failed,
    Killed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "Pending",
            JobState::Scheduled => "Scheduled",
            JobState::Running => "Running",
            JobState::Done => "Done",
            JobState::Failed => "Failed",
            JobState::Killed => "Killed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Killed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    CleanupEntityBookmarks,
    ReconcileOrphanBookmarks,
    BookmarkCacheMaintenance,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::CleanupEntityBookmarks => "cleanup_entity_bookmarks",
            JobType::ReconcileOrphanBookmarks => "reconcile_orphan_bookmarks",
            JobType::BookmarkCacheMaintenance => "bookmark_cache_maintenance",
        }
    }
}

impl TryFrom<&str> for JobType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "cleanup_entity_bookmarks" => Ok(JobType::CleanupEntityBookmarks),
            "reconcile_orphan_bookmarks" => Ok(JobType::ReconcileOrphanBookmarks),
            "bookmark_cache_maintenance" => Ok(JobType::BookmarkCacheMaintenance),
            _ => Err(()),
        }
    }
}

impl TryFrom<&str> for JobState {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "Pending" | "Latest" => Ok(JobState::Pending),
            "Scheduled" => Ok(JobState::Scheduled),
            "Running" => Ok(JobState::Running),
            "Done" => Ok(JobState::Done),
            "Failed" => Ok(JobState::Failed),
            "Killed" => Ok(JobState::Killed),
            _ => Err(()),
        }
    }
}

/// Phase of a cleanup or reconciliation run.
///
/// `Idle → Scanning → (Reporting | Deleting) → Done`, with `Failed` reachable
/// from every phase. A failed run may re-enter `Scanning` when retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Scanning,
    Reporting,
    Deleting,
    Done,
    Failed,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::Scanning => "scanning",
            RunPhase::Reporting => "reporting",
            RunPhase::Deleting => "deleting",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }

    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        match (self, next) {
            (_, Failed) => self != Done,
            (Idle, Scanning) | (Failed, Scanning) => true,
            (Scanning, Reporting) | (Scanning, Deleting) => true,
            (Reporting, Done) | (Deleting, Done) => true,
            (Idle, Deleting) => true,
            (current, next) => current == next && !current.is_terminal(),
        }
    }
}

impl TryFrom<&str> for RunPhase {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "idle" => Ok(RunPhase::Idle),
            "scanning" => Ok(RunPhase::Scanning),
            "reporting" => Ok(RunPhase::Reporting),
            "deleting" => Ok(RunPhase::Deleting),
            "done" => Ok(RunPhase::Done),
            "failed" => Ok(RunPhase::Failed),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_from_optional_id() {
        assert_eq!(Viewer::from(None), Viewer::Anonymous);
        assert_eq!(Viewer::from(Some(7)), Viewer::User(7));
        assert!(!Viewer::Anonymous.is_authenticated());
        assert_eq!(Viewer::User(3).user_id(), Some(3));
    }

    #[test]
    fn job_type_round_trips_through_str() {
        for job_type in [
            JobType::CleanupEntityBookmarks,
            JobType::ReconcileOrphanBookmarks,
            JobType::BookmarkCacheMaintenance,
        ] {
            assert_eq!(JobType::try_from(job_type.as_str()), Ok(job_type));
        }
        assert!(JobType::try_from("render_post").is_err());
    }

    #[test]
    fn run_phase_transitions_follow_state_machine() {
        assert!(RunPhase::Idle.can_transition_to(RunPhase::Scanning));
        assert!(RunPhase::Scanning.can_transition_to(RunPhase::Reporting));
        assert!(RunPhase::Scanning.can_transition_to(RunPhase::Deleting));
        assert!(RunPhase::Deleting.can_transition_to(RunPhase::Done));
        assert!(RunPhase::Reporting.can_transition_to(RunPhase::Done));
        assert!(RunPhase::Scanning.can_transition_to(RunPhase::Failed));
        assert!(RunPhase::Failed.can_transition_to(RunPhase::Scanning));

        assert!(!RunPhase::Reporting.can_transition_to(RunPhase::Deleting));
        assert!(!RunPhase::Done.can_transition_to(RunPhase::Scanning));
        assert!(!RunPhase::Done.can_transition_to(RunPhase::Failed));
        assert!(!RunPhase::Idle.can_transition_to(RunPhase::Done));
    }
}
