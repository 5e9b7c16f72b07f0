//! Postgres-backed repository implementations.

mod bookmarks;
mod content;
mod jobs;
mod reports;
mod users;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use apalis_sql::postgres::PostgresStorage;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    /// Applies the job queue schema, then the bookmark schema. Both share the
    /// sqlx migrations table, so each ignores the other's versions.
    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        let mut queue = PostgresStorage::<()>::migrations();
        queue.set_ignore_missing(true);
        queue.run(pool).await?;

        let mut bookmarks = sqlx::migrate!("./migrations");
        bookmarks.set_ignore_missing(true);
        bookmarks.run(pool).await.map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}
