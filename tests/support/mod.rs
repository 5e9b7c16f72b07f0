//! In-memory fakes of every repository and store seam, plus a harness wiring
//! the real services on top of them.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use apalis::prelude::Data;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use bahk::application::bookmarks::BookmarkService;
use bahk::application::error::AppError;
use bahk::application::jobs::{
    EntityCleanupJobPayload, JobCleanupScheduler, JobWorkerContext, ReconcileJobPayload,
    RetrySettings, process_entity_cleanup_job, process_reconcile_job,
};
use bahk::application::reconcile::OrphanReconciler;
use bahk::application::repos::{
    BookmarkFilter, BookmarksRepo, ContentRepo, ContentTypesRepo, CreateBookmarkParams,
    JobReportsRepo, JobsRepo, NewJobRecord, RepoError, UpsertJobReport, UsersRepo,
};
use bahk::cache::{
    BackendStats, BookmarkCacheManager, BookmarkCacheService, CacheBackend, CacheConfig,
    CleanupScheduler, KeyValueStore, LifecycleBridge, MemoryStore, StoreError,
};
use bahk::commands::{CommandContext, Confirm};
use bahk::domain::content::{ContentKind, ContentTypeRegistry};
use bahk::domain::entities::{
    BookmarkRecord, ContentTypeRecord, JobRecord, JobReportRecord, UserRecord,
};
use bahk::domain::types::{BookmarkId, ContentTypeId, JobState, JobType, ObjectId, UserId};

#[derive(Default)]
struct State {
    users: BTreeMap<UserId, UserRecord>,
    content: HashMap<ContentKind, BTreeSet<ObjectId>>,
    bookmarks: BTreeMap<BookmarkId, BookmarkRecord>,
    next_bookmark_id: BookmarkId,
    jobs: BTreeMap<String, JobRecord>,
    next_job_id: u64,
    reports: HashMap<Uuid, JobReportRecord>,
}

/// Relational store double implementing every repository trait.
pub struct InMemoryDb {
    state: Mutex<State>,
    content_types: Vec<ContentTypeRecord>,
    object_id_reads: AtomicUsize,
    failing_batches: AtomicUsize,
}

impl Default for InMemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDb {
    /// Content types get ids `1..=7` in [`ContentKind::ALL`] order.
    pub fn new() -> Self {
        let content_types = ContentKind::ALL
            .into_iter()
            .enumerate()
            .map(|(index, kind)| ContentTypeRecord {
                id: index as ContentTypeId + 1,
                name: kind.as_str().to_string(),
            })
            .collect();
        Self {
            state: Mutex::new(State {
                next_bookmark_id: 1,
                next_job_id: 1,
                ..State::default()
            }),
            content_types,
            object_id_reads: AtomicUsize::new(0),
            failing_batches: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> ContentTypeRegistry {
        ContentTypeRegistry::from_records(&self.content_types).expect("complete registry")
    }

    pub fn add_user(&self, id: UserId) {
        self.state.lock().unwrap().users.insert(
            id,
            UserRecord {
                id,
                username: format!("user{id}"),
                created_at: OffsetDateTime::now_utc(),
            },
        );
    }

    pub fn add_content(&self, kind: ContentKind, id: ObjectId) {
        self.state
            .lock()
            .unwrap()
            .content
            .entry(kind)
            .or_default()
            .insert(id);
    }

    /// Drops a content row without touching bookmarks, leaving them orphaned.
    pub fn remove_content(&self, kind: ContentKind, id: ObjectId) {
        if let Some(ids) = self.state.lock().unwrap().content.get_mut(&kind) {
            ids.remove(&id);
        }
    }

    /// Inserts a bookmark row directly, bypassing the write path.
    pub fn seed_bookmark(
        &self,
        user_id: UserId,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> BookmarkId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_bookmark_id;
        state.next_bookmark_id += 1;
        state.bookmarks.insert(
            id,
            BookmarkRecord {
                id,
                user_id,
                content_type_id,
                object_id,
                note: None,
                created_at: OffsetDateTime::now_utc(),
            },
        );
        id
    }

    pub fn bookmark_count(&self) -> usize {
        self.state.lock().unwrap().bookmarks.len()
    }

    pub fn object_id_reads(&self) -> usize {
        self.object_id_reads.load(Ordering::SeqCst)
    }

    /// The next `count` calls to `list_batch` fail with a persistence error.
    pub fn fail_next_batches(&self, count: usize) {
        self.failing_batches.store(count, Ordering::SeqCst);
    }

    pub fn jobs(&self) -> Vec<JobRecord> {
        self.state.lock().unwrap().jobs.values().cloned().collect()
    }

    pub fn set_job_state(&self, id: &str, state: JobState, last_error: Option<String>) {
        let mut guard = self.state.lock().unwrap();
        if let Some(job) = guard.jobs.get_mut(id) {
            job.state = state;
            job.last_error = last_error;
            if state.is_terminal() {
                job.done_at = Some(OffsetDateTime::now_utc());
            }
        }
    }

    fn bump_attempts(&self, id: &str) -> (i32, i32) {
        let mut guard = self.state.lock().unwrap();
        let job = guard.jobs.get_mut(id).expect("job exists");
        job.attempts += 1;
        job.state = JobState::Running;
        (job.attempts, job.max_attempts)
    }

    fn matches(filter: BookmarkFilter, bookmark: &BookmarkRecord) -> bool {
        filter
            .content_type_id
            .is_none_or(|id| bookmark.content_type_id == id)
    }
}

#[async_trait]
impl BookmarksRepo for InMemoryDb {
    async fn list_object_ids(
        &self,
        user_id: UserId,
        content_type_id: ContentTypeId,
    ) -> Result<Vec<ObjectId>, RepoError> {
        self.object_id_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(state
            .bookmarks
            .values()
            .filter(|b| b.user_id == user_id && b.content_type_id == content_type_id)
            .map(|b| b.object_id)
            .collect())
    }

    async fn find_bookmark(
        &self,
        user_id: UserId,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> Result<Option<BookmarkRecord>, RepoError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .bookmarks
            .values()
            .find(|b| {
                b.user_id == user_id
                    && b.content_type_id == content_type_id
                    && b.object_id == object_id
            })
            .cloned())
    }

    async fn create_bookmark(
        &self,
        params: CreateBookmarkParams,
    ) -> Result<BookmarkRecord, RepoError> {
        let mut state = self.state.lock().unwrap();
        if !state.users.contains_key(&params.user_id) {
            return Err(RepoError::Integrity {
                message: "bookmarks_user_id_fkey".to_string(),
            });
        }
        let duplicate = state.bookmarks.values().any(|b| {
            b.user_id == params.user_id
                && b.content_type_id == params.content_type_id
                && b.object_id == params.object_id
        });
        if duplicate {
            return Err(RepoError::Duplicate {
                constraint: "bookmarks_user_content_object_key".to_string(),
            });
        }
        let id = state.next_bookmark_id;
        state.next_bookmark_id += 1;
        let record = BookmarkRecord {
            id,
            user_id: params.user_id,
            content_type_id: params.content_type_id,
            object_id: params.object_id,
            note: params.note,
            created_at: OffsetDateTime::now_utc(),
        };
        state.bookmarks.insert(id, record.clone());
        Ok(record)
    }

    async fn delete_bookmark(&self, id: i64) -> Result<bool, RepoError> {
        Ok(self.state.lock().unwrap().bookmarks.remove(&id).is_some())
    }

    async fn count_for_object(
        &self,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> Result<u64, RepoError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .bookmarks
            .values()
            .filter(|b| b.content_type_id == content_type_id && b.object_id == object_id)
            .count() as u64)
    }

    async fn list_for_object(
        &self,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> Result<Vec<BookmarkRecord>, RepoError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .bookmarks
            .values()
            .filter(|b| b.content_type_id == content_type_id && b.object_id == object_id)
            .cloned()
            .collect())
    }

    async fn delete_for_object(
        &self,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> Result<u64, RepoError> {
        let mut state = self.state.lock().unwrap();
        let before = state.bookmarks.len();
        state
            .bookmarks
            .retain(|_, b| !(b.content_type_id == content_type_id && b.object_id == object_id));
        Ok((before - state.bookmarks.len()) as u64)
    }

    async fn count_bookmarks(&self, filter: BookmarkFilter) -> Result<u64, RepoError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .bookmarks
            .values()
            .filter(|b| Self::matches(filter, b))
            .count() as u64)
    }

    async fn list_batch(
        &self,
        filter: BookmarkFilter,
        after_id: i64,
        limit: u32,
    ) -> Result<Vec<BookmarkRecord>, RepoError> {
        let failing = self
            .failing_batches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RepoError::Persistence("connection reset".to_string()));
        }

        let state = self.state.lock().unwrap();
        Ok(state
            .bookmarks
            .range(after_id + 1..)
            .map(|(_, b)| b)
            .filter(|b| Self::matches(filter, b))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_by_content_type(&self) -> Result<Vec<(ContentTypeId, u64)>, RepoError> {
        let state = self.state.lock().unwrap();
        let mut counts: BTreeMap<ContentTypeId, u64> = BTreeMap::new();
        for bookmark in state.bookmarks.values() {
            *counts.entry(bookmark.content_type_id).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn count_users_with_bookmarks(&self) -> Result<u64, RepoError> {
        let state = self.state.lock().unwrap();
        let users: HashSet<UserId> = state.bookmarks.values().map(|b| b.user_id).collect();
        Ok(users.len() as u64)
    }
}

#[async_trait]
impl UsersRepo for InMemoryDb {
    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.state.lock().unwrap().users.get(&id).cloned())
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, RepoError> {
        let mut state = self.state.lock().unwrap();
        if state.users.remove(&id).is_none() {
            return Ok(false);
        }
        state.bookmarks.retain(|_, b| b.user_id != id);
        Ok(true)
    }

    async fn list_users_with_bookmarks(&self, limit: u32) -> Result<Vec<UserId>, RepoError> {
        let state = self.state.lock().unwrap();
        let mut latest: HashMap<UserId, BookmarkId> = HashMap::new();
        for bookmark in state.bookmarks.values() {
            let entry = latest.entry(bookmark.user_id).or_default();
            *entry = (*entry).max(bookmark.id);
        }
        let mut users: Vec<(UserId, BookmarkId)> = latest.into_iter().collect();
        users.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(users
            .into_iter()
            .take(limit as usize)
            .map(|(user, _)| user)
            .collect())
    }
}

#[async_trait]
impl ContentRepo for InMemoryDb {
    async fn existing_object_ids(
        &self,
        kind: ContentKind,
        ids: &[ObjectId],
    ) -> Result<HashSet<ObjectId>, RepoError> {
        let state = self.state.lock().unwrap();
        let live = state.content.get(&kind);
        Ok(ids
            .iter()
            .copied()
            .filter(|id| live.is_some_and(|live| live.contains(id)))
            .collect())
    }

    async fn delete_object(&self, kind: ContentKind, id: ObjectId) -> Result<bool, RepoError> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .content
            .get_mut(&kind)
            .is_some_and(|ids| ids.remove(&id)))
    }

    async fn sample_object_ids(
        &self,
        kind: ContentKind,
        limit: u32,
    ) -> Result<Vec<ObjectId>, RepoError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .content
            .get(&kind)
            .map(|ids| ids.iter().copied().take(limit as usize).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ContentTypesRepo for InMemoryDb {
    async fn list_content_types(&self) -> Result<Vec<ContentTypeRecord>, RepoError> {
        Ok(self.content_types.clone())
    }
}

#[async_trait]
impl JobsRepo for InMemoryDb {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError> {
        let mut state = self.state.lock().unwrap();
        let id = format!("job-{}", state.next_job_id);
        state.next_job_id += 1;
        state.jobs.insert(
            id.clone(),
            JobRecord {
                id: id.clone(),
                job_type: job.job_type,
                payload: job.payload,
                state: JobState::Pending,
                attempts: 0,
                max_attempts: job.max_attempts,
                run_at: job.run_at,
                done_at: None,
                last_error: None,
            },
        );
        Ok(id)
    }

    async fn find_job(&self, id: &str) -> Result<Option<JobRecord>, RepoError> {
        Ok(self.state.lock().unwrap().jobs.get(id).cloned())
    }
}

#[async_trait]
impl JobReportsRepo for InMemoryDb {
    async fn upsert_report(&self, report: UpsertJobReport) -> Result<JobReportRecord, RepoError> {
        let mut state = self.state.lock().unwrap();
        let now = OffsetDateTime::now_utc();
        let existing = state.reports.get(&report.run_id);
        let record = JobReportRecord {
            run_id: report.run_id,
            job_id: report
                .job_id
                .or_else(|| existing.and_then(|r| r.job_id.clone())),
            job_type: report.job_type,
            phase: report.phase,
            attempts: report.attempts,
            progress: report.progress,
            result: report.result,
            last_error: report.last_error,
            created_at: existing.map_or(now, |r| r.created_at),
            updated_at: now,
        };
        state.reports.insert(record.run_id, record.clone());
        Ok(record)
    }

    async fn find_report(&self, run_id: Uuid) -> Result<Option<JobReportRecord>, RepoError> {
        Ok(self.state.lock().unwrap().reports.get(&run_id).cloned())
    }

    async fn attach_job(&self, run_id: Uuid, job_id: &str) -> Result<(), RepoError> {
        let mut state = self.state.lock().unwrap();
        match state.reports.get_mut(&run_id) {
            Some(report) => {
                report.job_id = Some(job_id.to_string());
                Ok(())
            }
            None => Err(RepoError::NotFound),
        }
    }
}

/// Memory store that counts reads.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    gets: AtomicUsize,
}

impl CountingStore {
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for CountingStore {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.inner.set(key, value, ttl).await
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.inner.touch(key, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }

    async fn stats(&self, prefix: &str) -> Result<BackendStats, StoreError> {
        self.inner.stats(prefix).await
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        self.inner.clear_prefix(prefix).await
    }
}

/// Backend that is never reachable.
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn touch(&self, _key: &str, _ttl: Duration) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn stats(&self, _prefix: &str) -> Result<BackendStats, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn clear_prefix(&self, _prefix: &str) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Backend whose calls never complete, so every operation hits the timeout.
pub struct HangingStore;

#[async_trait]
impl KeyValueStore for HangingStore {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        std::future::pending().await
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), StoreError> {
        std::future::pending().await
    }

    async fn touch(&self, _key: &str, _ttl: Duration) -> Result<bool, StoreError> {
        std::future::pending().await
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        std::future::pending().await
    }

    async fn stats(&self, _prefix: &str) -> Result<BackendStats, StoreError> {
        std::future::pending().await
    }

    async fn clear_prefix(&self, _prefix: &str) -> Result<u64, StoreError> {
        std::future::pending().await
    }
}

/// Answers every confirmation prompt the same way and records the prompts.
pub struct ScriptedConfirm {
    answer: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, prompt: &str) -> Result<bool, AppError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer)
    }
}

pub fn memory_config() -> CacheConfig {
    CacheConfig {
        backend: CacheBackend::Memory,
        ..CacheConfig::default()
    }
}

/// Real services wired over [`InMemoryDb`].
pub struct Harness {
    pub db: Arc<InMemoryDb>,
    pub registry: Arc<ContentTypeRegistry>,
    pub cache: Arc<BookmarkCacheService>,
    pub manager: Arc<BookmarkCacheManager>,
    pub bridge: Arc<LifecycleBridge>,
    pub service: BookmarkService,
    pub reconciler: Arc<OrphanReconciler>,
    pub worker: JobWorkerContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_config(store, memory_config())
    }

    pub fn with_config(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        let db = Arc::new(InMemoryDb::new());
        let registry = Arc::new(db.registry());
        let cache = Arc::new(BookmarkCacheService::new(
            config,
            store,
            db.clone(),
            registry.clone(),
        ));
        let manager = Arc::new(BookmarkCacheManager::new(cache.clone(), db.clone()));
        let scheduler: Arc<dyn CleanupScheduler> =
            Arc::new(JobCleanupScheduler::new(db.clone(), db.clone()));
        let bridge = Arc::new(LifecycleBridge::new(
            manager.clone(),
            db.clone(),
            Some(scheduler),
        ));
        let service = BookmarkService::new(
            db.clone(),
            db.clone(),
            db.clone(),
            registry.clone(),
            bridge.clone(),
        );
        let reconciler = Arc::new(OrphanReconciler::new(
            db.clone(),
            db.clone(),
            manager.clone(),
            registry.clone(),
        ));
        let worker = JobWorkerContext {
            bookmarks: db.clone(),
            reports: db.clone(),
            manager: manager.clone(),
            reconciler: reconciler.clone(),
            retry: RetrySettings {
                max_retries: 2,
                backoff_base: Duration::from_millis(1),
            },
        };

        Self {
            db,
            registry,
            cache,
            manager,
            bridge,
            service,
            reconciler,
            worker,
        }
    }

    pub fn content_type(&self, kind: ContentKind) -> ContentTypeId {
        self.registry.resolve(kind)
    }

    pub fn commands(&self) -> CommandContext {
        CommandContext {
            bookmarks: self.db.clone(),
            users: self.db.clone(),
            content: self.db.clone(),
            jobs: self.db.clone(),
            reports: self.db.clone(),
            registry: self.registry.clone(),
            cache: self.cache.clone(),
            manager: self.manager.clone(),
            reconciler: self.reconciler.clone(),
            reconcile_max_retries: self.worker.retry.max_retries,
        }
    }

    /// Runs queued jobs through their handlers until none is pending,
    /// retrying failures up to each job's attempt budget.
    pub async fn run_pending_jobs(&self) -> usize {
        let mut processed = 0;
        loop {
            let Some(job) = self
                .db
                .jobs()
                .into_iter()
                .find(|job| job.state == JobState::Pending)
            else {
                return processed;
            };
            let (attempts, max_attempts) = self.db.bump_attempts(&job.id);
            let data = Data::new(self.worker.clone());
            let outcome = match job.job_type {
                JobType::CleanupEntityBookmarks => {
                    let payload: EntityCleanupJobPayload =
                        serde_json::from_value(job.payload.clone()).expect("cleanup payload");
                    process_entity_cleanup_job(payload, data).await
                }
                JobType::ReconcileOrphanBookmarks => {
                    let payload: ReconcileJobPayload =
                        serde_json::from_value(job.payload.clone()).expect("reconcile payload");
                    process_reconcile_job(payload, data).await
                }
                JobType::BookmarkCacheMaintenance => Ok(()),
            };
            processed += 1;

            match outcome {
                Ok(()) => self.db.set_job_state(&job.id, JobState::Done, None),
                Err(err) if attempts < max_attempts && !is_abort(&err) => {
                    self.db
                        .set_job_state(&job.id, JobState::Pending, Some(err.to_string()))
                }
                Err(err) => {
                    let state = if is_abort(&err) {
                        JobState::Killed
                    } else {
                        JobState::Failed
                    };
                    self.db.set_job_state(&job.id, state, Some(err.to_string()))
                }
            }
        }
    }
}

fn is_abort(err: &apalis::prelude::Error) -> bool {
    matches!(err, apalis::prelude::Error::Abort(_))
}
