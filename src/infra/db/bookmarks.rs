use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{BookmarkFilter, BookmarksRepo, CreateBookmarkParams, RepoError},
    domain::{
        entities::BookmarkRecord,
        types::{ContentTypeId, ObjectId, UserId},
    },
};

use super::{PostgresRepositories, map_sqlx_error, util::count_to_u64};

const BOOKMARK_COLUMNS: &str = "id, user_id, content_type_id, object_id, note, created_at";

#[derive(sqlx::FromRow)]
struct BookmarkRow {
    id: i64,
    user_id: i64,
    content_type_id: i32,
    object_id: i64,
    note: Option<String>,
    created_at: OffsetDateTime,
}

impl From<BookmarkRow> for BookmarkRecord {
    fn from(row: BookmarkRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            content_type_id: row.content_type_id,
            object_id: row.object_id,
            note: row.note,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl BookmarksRepo for PostgresRepositories {
    async fn list_object_ids(
        &self,
        user_id: UserId,
        content_type_id: ContentTypeId,
    ) -> Result<Vec<ObjectId>, RepoError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT object_id FROM bookmarks WHERE user_id = $1 AND content_type_id = $2",
        )
        .bind(user_id)
        .bind(content_type_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn find_bookmark(
        &self,
        user_id: UserId,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> Result<Option<BookmarkRecord>, RepoError> {
        let sql = format!(
            "SELECT {BOOKMARK_COLUMNS} FROM bookmarks \
             WHERE user_id = $1 AND content_type_id = $2 AND object_id = $3"
        );
        let row = sqlx::query_as::<_, BookmarkRow>(&sql)
            .bind(user_id)
            .bind(content_type_id)
            .bind(object_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(BookmarkRecord::from))
    }

    async fn create_bookmark(
        &self,
        params: CreateBookmarkParams,
    ) -> Result<BookmarkRecord, RepoError> {
        let sql = format!(
            "INSERT INTO bookmarks (user_id, content_type_id, object_id, note) \
             VALUES ($1, $2, $3, $4) RETURNING {BOOKMARK_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BookmarkRow>(&sql)
            .bind(params.user_id)
            .bind(params.content_type_id)
            .bind(params.object_id)
            .bind(params.note)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn delete_bookmark(&self, id: i64) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_for_object(
        &self,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> Result<u64, RepoError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM bookmarks WHERE content_type_id = $1 AND object_id = $2",
        )
        .bind(content_type_id)
        .bind(object_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(count_to_u64(count))
    }

    async fn list_for_object(
        &self,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> Result<Vec<BookmarkRecord>, RepoError> {
        let sql = format!(
            "SELECT {BOOKMARK_COLUMNS} FROM bookmarks \
             WHERE content_type_id = $1 AND object_id = $2 ORDER BY id"
        );
        let rows = sqlx::query_as::<_, BookmarkRow>(&sql)
            .bind(content_type_id)
            .bind(object_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(BookmarkRecord::from).collect())
    }

    async fn delete_for_object(
        &self,
        content_type_id: ContentTypeId,
        object_id: ObjectId,
    ) -> Result<u64, RepoError> {
        let result =
            sqlx::query("DELETE FROM bookmarks WHERE content_type_id = $1 AND object_id = $2")
                .bind(content_type_id)
                .bind(object_id)
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn count_bookmarks(&self, filter: BookmarkFilter) -> Result<u64, RepoError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM bookmarks WHERE ($1::INTEGER IS NULL OR content_type_id = $1)",
        )
        .bind(filter.content_type_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(count_to_u64(count))
    }

    async fn list_batch(
        &self,
        filter: BookmarkFilter,
        after_id: i64,
        limit: u32,
    ) -> Result<Vec<BookmarkRecord>, RepoError> {
        let sql = format!(
            "SELECT {BOOKMARK_COLUMNS} FROM bookmarks \
             WHERE id > $1 AND ($2::INTEGER IS NULL OR content_type_id = $2) \
             ORDER BY id LIMIT $3"
        );
        let rows = sqlx::query_as::<_, BookmarkRow>(&sql)
            .bind(after_id)
            .bind(filter.content_type_id)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(BookmarkRecord::from).collect())
    }

    async fn count_by_content_type(&self) -> Result<Vec<(ContentTypeId, u64)>, RepoError> {
        let rows = sqlx::query_as::<_, (i32, i64)>(
            "SELECT content_type_id, COUNT(*) FROM bookmarks \
             GROUP BY content_type_id ORDER BY content_type_id",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows
            .into_iter()
            .map(|(content_type_id, count)| (content_type_id, count_to_u64(count)))
            .collect())
    }

    async fn count_users_with_bookmarks(&self) -> Result<u64, RepoError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(DISTINCT user_id) FROM bookmarks")
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(count_to_u64(count))
    }
}
