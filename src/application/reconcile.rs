//! Orphan bookmark reconciliation.
//!
//! Walks the bookmarks table in keyset-ordered batches, resolves every
//! referenced entity with one existence query per content type and batch, and
//! either reports or deletes the bookmarks whose target is gone. Deletion
//! removes the id from the cached set before the row is deleted.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::repos::{BookmarkFilter, BookmarksRepo, ContentRepo, RepoError};
use crate::cache::BookmarkCacheManager;
use crate::domain::content::{ContentKind, ContentTypeRegistry};
use crate::domain::entities::{BookmarkRecord, RunProgress};
use crate::domain::error::DomainError;
use crate::domain::types::{BookmarkId, ContentTypeId, ObjectId, RunPhase, UserId};

const SOURCE: &str = "bahk::application::reconcile";

pub const DEFAULT_BATCH_SIZE: u32 = 1000;
pub const MAX_SAMPLES: usize = 5;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl ReconcileError {
    /// Errors that cannot succeed on retry.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ReconcileError::InvalidArgument(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    Report,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    pub content_type: Option<String>,
    pub batch_size: u32,
    pub mode: ReconcileMode,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            content_type: None,
            batch_size: DEFAULT_BATCH_SIZE,
            mode: ReconcileMode::Report,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanSample {
    pub bookmark_id: BookmarkId,
    pub user_id: UserId,
    pub content_type: String,
    pub object_id: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub total_processed: u64,
    pub orphaned_found: u64,
    pub deleted: u64,
    pub orphaned_by_type: BTreeMap<String, u64>,
    pub samples: Vec<OrphanSample>,
    pub dry_run: bool,
    pub content_type: Option<String>,
    pub batch_size: u32,
    pub duration_seconds: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
}

/// Receives phase changes and per-batch progress from a running pass.
#[async_trait]
pub trait ProgressObserver: Send + Sync {
    async fn on_phase(&self, phase: RunPhase) -> Result<(), RepoError>;

    async fn on_batch(&self, progress: &RunProgress) -> Result<(), RepoError>;
}

pub struct NoopObserver;

#[async_trait]
impl ProgressObserver for NoopObserver {
    async fn on_phase(&self, _phase: RunPhase) -> Result<(), RepoError> {
        Ok(())
    }

    async fn on_batch(&self, _progress: &RunProgress) -> Result<(), RepoError> {
        Ok(())
    }
}

pub struct OrphanReconciler {
    bookmarks: Arc<dyn BookmarksRepo>,
    content: Arc<dyn ContentRepo>,
    manager: Arc<BookmarkCacheManager>,
    registry: Arc<ContentTypeRegistry>,
}

impl OrphanReconciler {
    pub fn new(
        bookmarks: Arc<dyn BookmarksRepo>,
        content: Arc<dyn ContentRepo>,
        manager: Arc<BookmarkCacheManager>,
        registry: Arc<ContentTypeRegistry>,
    ) -> Self {
        Self {
            bookmarks,
            content,
            manager,
            registry,
        }
    }

    /// Validates a content-type filter without running a pass.
    pub fn resolve_filter(&self, name: Option<&str>) -> Result<BookmarkFilter, ReconcileError> {
        let content_type_id = name
            .map(|name| self.registry.resolve_name(name))
            .transpose()?;
        Ok(BookmarkFilter { content_type_id })
    }

    pub async fn count_candidates(&self, name: Option<&str>) -> Result<u64, ReconcileError> {
        let filter = self.resolve_filter(name)?;
        Ok(self.bookmarks.count_bookmarks(filter).await?)
    }

    pub async fn run(
        &self,
        options: &ReconcileOptions,
        observer: &dyn ProgressObserver,
    ) -> Result<ReconcileReport, ReconcileError> {
        let filter = self.resolve_filter(options.content_type.as_deref())?;
        let batch_size = options.batch_size.max(1);
        let start_time = OffsetDateTime::now_utc();
        let started = Instant::now();

        observer.on_phase(RunPhase::Scanning).await?;
        let total = self.bookmarks.count_bookmarks(filter).await?;
        info!(
            target = SOURCE,
            total,
            batch_size,
            mode = ?options.mode,
            content_type = options.content_type.as_deref().unwrap_or("all"),
            "Starting orphan bookmark reconciliation"
        );

        observer
            .on_phase(match options.mode {
                ReconcileMode::Report => RunPhase::Reporting,
                ReconcileMode::Delete => RunPhase::Deleting,
            })
            .await?;

        let mut tally = Tally::default();
        let mut after_id = 0;
        loop {
            let batch = self
                .bookmarks
                .list_batch(filter, after_id, batch_size)
                .await?;
            let Some(last) = batch.last() else {
                break;
            };
            after_id = last.id;

            let orphans = self.find_orphans(&batch).await?;
            let batch_orphans = orphans.len();
            for bookmark in orphans {
                tally.record(&bookmark, self.label(bookmark.content_type_id));
                if options.mode == ReconcileMode::Delete && self.delete_orphan(bookmark).await? {
                    tally.deleted += 1;
                }
            }

            tally.processed += batch.len() as u64;
            let progress = RunProgress::new(
                tally.processed,
                total.max(tally.processed),
                tally.orphaned_found,
                tally.deleted,
            );
            info!(
                target = SOURCE,
                processed = progress.current,
                total = progress.total,
                percent = progress.progress_percent,
                batch_orphans,
                "Reconciliation batch processed"
            );
            observer.on_batch(&progress).await?;
        }

        observer.on_phase(RunPhase::Done).await?;
        let report = ReconcileReport {
            total_processed: tally.processed,
            orphaned_found: tally.orphaned_found,
            deleted: tally.deleted,
            orphaned_by_type: tally.by_type,
            samples: tally.samples,
            dry_run: options.mode == ReconcileMode::Report,
            content_type: options.content_type.clone(),
            batch_size,
            duration_seconds: started.elapsed().as_secs_f64(),
            start_time,
            end_time: OffsetDateTime::now_utc(),
        };
        info!(
            target = SOURCE,
            processed = report.total_processed,
            orphaned_found = report.orphaned_found,
            deleted = report.deleted,
            duration_seconds = report.duration_seconds,
            "Orphan bookmark reconciliation finished"
        );
        Ok(report)
    }

    async fn find_orphans<'a>(
        &self,
        batch: &'a [BookmarkRecord],
    ) -> Result<Vec<&'a BookmarkRecord>, ReconcileError> {
        let mut ids_by_type: HashMap<ContentTypeId, Vec<ObjectId>> = HashMap::new();
        for bookmark in batch {
            ids_by_type
                .entry(bookmark.content_type_id)
                .or_default()
                .push(bookmark.object_id);
        }

        let mut live: HashMap<ContentTypeId, HashSet<ObjectId>> = HashMap::new();
        for (content_type_id, ids) in ids_by_type {
            let Some(kind) = self.registry.kind_for(content_type_id) else {
                continue;
            };
            let existing = self.content.existing_object_ids(kind, &ids).await?;
            live.insert(content_type_id, existing);
        }

        Ok(batch
            .iter()
            .filter(|bookmark| {
                live.get(&bookmark.content_type_id)
                    .is_none_or(|ids| !ids.contains(&bookmark.object_id))
            })
            .collect())
    }

    async fn delete_orphan(&self, bookmark: &BookmarkRecord) -> Result<bool, ReconcileError> {
        self.manager
            .bookmark_deleted(bookmark.user_id, bookmark.content_type_id, bookmark.object_id)
            .await;
        match self.bookmarks.delete_bookmark(bookmark.id).await {
            Ok(deleted) => Ok(deleted),
            Err(RepoError::NotFound) => {
                warn!(
                    target = SOURCE,
                    bookmark_id = bookmark.id,
                    "Orphaned bookmark vanished before deletion"
                );
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn label(&self, content_type_id: ContentTypeId) -> String {
        self.registry
            .kind_for(content_type_id)
            .map(ContentKind::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("unknown:{content_type_id}"))
    }
}

#[derive(Default)]
struct Tally {
    processed: u64,
    orphaned_found: u64,
    deleted: u64,
    by_type: BTreeMap<String, u64>,
    samples: Vec<OrphanSample>,
}

impl Tally {
    fn record(&mut self, bookmark: &BookmarkRecord, label: String) {
        self.orphaned_found += 1;
        if self.samples.len() < MAX_SAMPLES {
            self.samples.push(OrphanSample {
                bookmark_id: bookmark.id,
                user_id: bookmark.user_id,
                content_type: label.clone(),
                object_id: bookmark.object_id,
            });
        }
        *self.by_type.entry(label).or_default() += 1;
    }
}
