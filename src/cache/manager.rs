//! Request-facing façade over [`BookmarkCacheService`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{info, warn};

use crate::application::repos::UsersRepo;
use crate::domain::content::Bookmarkable;
use crate::domain::entities::BookmarkRef;
use crate::domain::types::{ContentTypeId, ObjectId, UserId, Viewer};

use super::service::BookmarkCacheService;

const SOURCE: &str = "bahk::cache::manager";

/// Answers bookmark-status questions, preloading on miss, and applies
/// incremental updates published by the write path.
pub struct BookmarkCacheManager {
    service: Arc<BookmarkCacheService>,
    users: Arc<dyn UsersRepo>,
}

impl BookmarkCacheManager {
    pub fn new(service: Arc<BookmarkCacheService>, users: Arc<dyn UsersRepo>) -> Self {
        Self { service, users }
    }

    pub fn service(&self) -> &BookmarkCacheService {
        &self.service
    }

    pub async fn is_bookmarked<B>(&self, viewer: impl Into<Viewer>, object: &B) -> bool
    where
        B: Bookmarkable + ?Sized,
    {
        let viewer = viewer.into();
        if !viewer.is_authenticated() {
            return false;
        }
        let content_type = self.service.registry().resolve(object.content_kind());
        self.bookmarked_ids(viewer, content_type)
            .await
            .contains(&object.object_id())
    }

    /// Bookmark status for every object, keyed by object id.
    ///
    /// Reads the cache (and preloads on miss) at most once per distinct
    /// content type among `objects`. Types are visited in first-seen order,
    /// so when one id appears under several types the last type seen wins.
    pub async fn bookmarks_for_objects<B>(
        &self,
        viewer: impl Into<Viewer>,
        objects: &[B],
    ) -> HashMap<ObjectId, bool>
    where
        B: Bookmarkable,
    {
        let viewer = viewer.into();
        if !viewer.is_authenticated() || objects.is_empty() {
            return HashMap::new();
        }

        let registry = self.service.registry();
        let mut position: HashMap<ContentTypeId, usize> = HashMap::new();
        let mut groups: Vec<(ContentTypeId, Vec<ObjectId>)> = Vec::new();
        for object in objects {
            let content_type = registry.resolve(object.content_kind());
            let slot = *position.entry(content_type).or_insert_with(|| {
                groups.push((content_type, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(object.object_id());
        }

        let mut status = HashMap::with_capacity(objects.len());
        for (content_type, ids) in groups {
            let bookmarked = self.bookmarked_ids(viewer, content_type).await;
            for id in ids {
                status.insert(id, bookmarked.contains(&id));
            }
        }
        status
    }

    pub async fn bookmark_created(
        &self,
        user_id: UserId,
        content_type: ContentTypeId,
        object_id: ObjectId,
    ) -> bool {
        self.service
            .add_bookmark_to_cache(user_id, content_type, object_id)
            .await
    }

    pub async fn bookmark_deleted(
        &self,
        user_id: UserId,
        content_type: ContentTypeId,
        object_id: ObjectId,
    ) -> bool {
        self.service
            .remove_bookmark_from_cache(user_id, content_type, object_id)
            .await
    }

    pub async fn user_cache_invalidated(&self, user_id: UserId) -> bool {
        self.service.invalidate_user_bookmarks(user_id, None).await
    }

    /// Removes many bookmarks from the cache, grouped by user then content type.
    ///
    /// Groups whose user or content type no longer resolves are skipped with a
    /// warning. Returns the number of records that were applied.
    pub async fn bulk_bookmark_deleted(&self, records: &[BookmarkRef]) -> usize {
        let mut grouped: BTreeMap<UserId, BTreeMap<ContentTypeId, Vec<ObjectId>>> =
            BTreeMap::new();
        for record in records {
            grouped
                .entry(record.user_id)
                .or_default()
                .entry(record.content_type_id)
                .or_default()
                .push(record.object_id);
        }

        let users = grouped.len();
        let mut applied = 0usize;
        for (user_id, content_types) in grouped {
            match self.users.find_user(user_id).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    warn!(target = SOURCE, user_id, "User not found during bulk cache update");
                    continue;
                }
                Err(err) => {
                    warn!(target = SOURCE, user_id, error = %err, "User lookup failed during bulk cache update");
                    continue;
                }
            }

            for (content_type, object_ids) in content_types {
                if self.service.registry().kind_for(content_type).is_none() {
                    warn!(
                        target = SOURCE,
                        user_id,
                        content_type_id = content_type,
                        "Content type not found during bulk cache update"
                    );
                    continue;
                }
                for object_id in &object_ids {
                    self.service
                        .remove_bookmark_from_cache(user_id, content_type, *object_id)
                        .await;
                }
                applied += object_ids.len();
            }
        }

        info!(
            target = SOURCE,
            records = records.len(),
            applied,
            users,
            "Bulk updated bookmark cache"
        );
        applied
    }

    async fn bookmarked_ids(
        &self,
        viewer: Viewer,
        content_type: ContentTypeId,
    ) -> std::collections::HashSet<ObjectId> {
        match self.service.get_user_bookmarks(viewer, content_type).await {
            Some(ids) => ids,
            None => self.service.preload_user_bookmarks(viewer, content_type).await,
        }
    }
}
