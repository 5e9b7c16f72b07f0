use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{RepoError, UsersRepo},
    domain::{entities::UserRecord, types::UserId},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    created_at: OffsetDateTime,
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|row| UserRecord {
            id: row.id,
            username: row.username,
            created_at: row.created_at,
        }))
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users_with_bookmarks(&self, limit: u32) -> Result<Vec<UserId>, RepoError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM bookmarks \
             GROUP BY user_id ORDER BY MAX(created_at) DESC, user_id LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}
