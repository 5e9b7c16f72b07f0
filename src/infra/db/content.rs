use std::collections::HashSet;

use async_trait::async_trait;

use crate::{
    application::repos::{ContentRepo, ContentTypesRepo, RepoError},
    domain::{content::ContentKind, entities::ContentTypeRecord, types::ObjectId},
};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl ContentRepo for PostgresRepositories {
    async fn existing_object_ids(
        &self,
        kind: ContentKind,
        ids: &[ObjectId],
    ) -> Result<HashSet<ObjectId>, RepoError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        // Table names come from the closed `ContentKind` set, never from input.
        let sql = format!("SELECT id FROM {} WHERE id = ANY($1)", kind.table());
        let rows = sqlx::query_scalar::<_, i64>(&sql)
            .bind(ids)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().collect())
    }

    async fn delete_object(&self, kind: ContentKind, id: ObjectId) -> Result<bool, RepoError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", kind.table());
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn sample_object_ids(
        &self,
        kind: ContentKind,
        limit: u32,
    ) -> Result<Vec<ObjectId>, RepoError> {
        let sql = format!("SELECT id FROM {} ORDER BY id DESC LIMIT $1", kind.table());
        sqlx::query_scalar::<_, i64>(&sql)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl ContentTypesRepo for PostgresRepositories {
    async fn list_content_types(&self) -> Result<Vec<ContentTypeRecord>, RepoError> {
        let rows = sqlx::query_as::<_, (i32, String)>(
            "SELECT id, name FROM content_types ORDER BY id",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| ContentTypeRecord { id, name })
            .collect())
    }
}
