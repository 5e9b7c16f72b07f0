//! Redis-backed [`KeyValueStore`].

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;
use tracing::info;

use super::store::{BackendStats, KeyValueStore, StoreError};

const SCAN_COUNT: u32 = 500;

/// Redis store whose connection is established on first use, so a down
/// backend never blocks startup.
pub struct RedisStore {
    client: redis::Client,
    manager: OnceCell<ConnectionManager>,
}

impl RedisStore {
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(StoreError::backend)?;
        Ok(Self {
            client,
            manager: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(|err| StoreError::Unavailable(err.to_string()))?;
                info!(
                    target = "bahk::cache::redis",
                    "Connected to redis cache backend"
                );
                Ok::<_, StoreError>(manager)
            })
            .await?;
        Ok(manager.clone())
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(StoreError::backend)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn parse_memory_info(info: &str) -> (Option<u64>, Option<String>) {
    let mut used = None;
    let mut human = None;
    for line in info.lines() {
        if let Some(value) = line.strip_prefix("used_memory:") {
            used = value.trim().parse().ok();
        } else if let Some(value) = line.strip_prefix("used_memory_human:") {
            human = Some(value.trim().to_string());
        }
    }
    (used, human)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await.map_err(StoreError::backend)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(key, value, ttl_secs(ttl))
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let refreshed: bool = conn
            .expire(key, ttl_secs(ttl) as i64)
            .await
            .map_err(StoreError::backend)?;
        Ok(refreshed)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(key).await.map_err(StoreError::backend)?;
        Ok(removed > 0)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(keys).await.map_err(StoreError::backend)?;
        Ok(removed)
    }

    async fn stats(&self, prefix: &str) -> Result<BackendStats, StoreError> {
        let key_count = self.scan_keys(prefix).await?.len() as u64;
        let mut conn = self.connection().await?;
        let info: String = redis::cmd("INFO")
            .arg("memory")
            .query_async(&mut conn)
            .await
            .map_err(StoreError::backend)?;
        let (memory_used_bytes, memory_used_human) = parse_memory_info(&info);
        Ok(BackendStats {
            key_count,
            memory_used_bytes,
            memory_used_human,
        })
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let keys = self.scan_keys(prefix).await?;
        let mut removed = 0;
        for chunk in keys.chunks(SCAN_COUNT as usize) {
            removed += self.delete_many(chunk).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_memory_section() {
        let info = "# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\n";
        let (bytes, human) = parse_memory_info(info);
        assert_eq!(bytes, Some(1_048_576));
        assert_eq!(human.as_deref(), Some("1.00M"));
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(RedisStore::open("not a url").is_err());
    }

    #[test]
    fn ttl_never_rounds_to_zero() {
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(3600)), 3600);
    }
}
