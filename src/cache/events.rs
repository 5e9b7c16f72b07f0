//! Lifecycle events published by the bookmark write path.

use std::sync::atomic::{AtomicU64, Ordering};

use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::domain::entities::BookmarkRef;
use crate::domain::types::{ContentTypeId, ObjectId, UserId};

/// Monotonic, per-process ordering of published events.
pub type Epoch = u64;

#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// Unique identifier for log correlation.
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: EventKind,
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A bookmark row was inserted.
    BookmarkCreated(BookmarkRef),
    /// A bookmark row is about to be removed; carries its identity.
    BookmarkDeleting(BookmarkRef),
    /// A bookmarkable entity was deleted. Its bookmarks still exist.
    EntityDeleted {
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    },
    /// A user was deleted; bookmark rows follow by cascade.
    UserDeleted { user_id: UserId },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::BookmarkCreated(_) => "bookmark_created",
            EventKind::BookmarkDeleting(_) => "bookmark_deleting",
            EventKind::EntityDeleted { .. } => "entity_deleted",
            EventKind::UserDeleted { .. } => "user_deleted",
        }
    }
}

/// Stamps events with ids and epochs before dispatch.
#[derive(Debug, Default)]
pub struct EventSequence {
    epoch_counter: AtomicU64,
}

impl EventSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn stamp(&self, kind: EventKind) -> CacheEvent {
        let event = CacheEvent::new(kind, self.next_epoch());
        info!(
            target = "bahk::cache::events",
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = event.kind.name(),
            "Cache event published"
        );
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epochs_increase_monotonically() {
        let sequence = EventSequence::new();
        let first = sequence.stamp(EventKind::UserDeleted { user_id: 1 });
        let second = sequence.stamp(EventKind::UserDeleted { user_id: 1 });
        assert!(second.epoch > first.epoch);
        assert_ne!(first.id, second.id);
    }
}
