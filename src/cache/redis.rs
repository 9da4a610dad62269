//! Redis cache backend
//!
//! Every key is stored under a namespace prefix so `clear` only removes this
//! application's keys instead of flushing the whole database. Bulk deletion
//! walks the keyspace with `SCAN`, never `KEYS`.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

pub const DEFAULT_NAMESPACE: &str = "jobboard:";

const SCAN_COUNT: usize = 100;

pub struct RedisCache {
    connection: MultiplexedConnection,
    namespace: String,
    default_ttl: Duration,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("namespace", &self.namespace)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    pub async fn new(redis_url: &str) -> Result<Self> {
        Self::with_ttl(redis_url, DEFAULT_TTL).await
    }

    pub async fn with_ttl(redis_url: &str, default_ttl: Duration) -> Result<Self> {
        Self::connect(redis_url, DEFAULT_NAMESPACE, default_ttl).await
    }

    pub async fn connect(redis_url: &str, namespace: &str, default_ttl: Duration) -> Result<Self> {
        let client = Client::open(redis_url).context("Failed to create Redis client")?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            connection,
            namespace: namespace.to_string(),
            default_ttl,
        })
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    async fn delete_matching(&self, full_pattern: &str) -> Result<u64> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0u64;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(full_pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .context("Failed to scan Redis keys")?;

            if !keys.is_empty() {
                let removed: u64 = conn
                    .del(&keys)
                    .await
                    .context("Failed to delete Redis keys")?;
                deleted += removed;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(deleted)
    }
}

#[async_trait]
impl CacheLayer for RedisCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn
            .get(self.key(key))
            .await
            .context("Failed to read from Redis")?;

        raw.map(|json| serde_json::from_str(&json).context("Failed to deserialize cached value"))
            .transpose()
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        // SETEX has whole-second resolution
        let seconds = ttl.as_secs().max(1);

        let _: () = conn
            .set_ex(self.key(key), json, seconds)
            .await
            .context("Failed to write to Redis")?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .del(self.key(key))
            .await
            .context("Failed to delete Redis key")?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let removed = self.delete_matching(&self.key(pattern)).await?;
        tracing::debug!("Removed {} Redis keys matching {}", removed, pattern);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.delete_matching(&self.key("*")).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING failed")?;
        anyhow::ensure!(reply == "PONG", "Unexpected PING reply: {}", reply);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    async fn cache() -> RedisCache {
        RedisCache::connect(&redis_url(), "jobboard-test:", Duration::from_secs(60))
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_round_trip_and_ping() {
        let cache = cache().await;
        cache.ping().await.unwrap();

        cache
            .set("jobs:1", &"Rust Engineer".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let value: Option<String> = cache.get("jobs:1").await.unwrap();
        assert_eq!(value.as_deref(), Some("Rust Engineer"));

        cache.delete("jobs:1").await.unwrap();
        assert!(cache.get::<String>("jobs:1").await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_delete_pattern_stays_in_namespace() {
        let cache = cache().await;
        let other = RedisCache::connect(&redis_url(), "jobboard-other:", Duration::from_secs(60))
            .await
            .unwrap();
        let ttl = Duration::from_secs(60);

        cache.set("jobs:list:1", &1, ttl).await.unwrap();
        cache.set("jobs:categories", &2, ttl).await.unwrap();
        other.set("jobs:list:1", &3, ttl).await.unwrap();

        cache.delete_pattern("jobs:list:*").await.unwrap();

        assert!(cache.get::<i32>("jobs:list:1").await.unwrap().is_none());
        assert_eq!(cache.get::<i32>("jobs:categories").await.unwrap(), Some(2));
        assert_eq!(other.get::<i32>("jobs:list:1").await.unwrap(), Some(3));

        cache.clear().await.unwrap();
        other.clear().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires running Redis server"]
    async fn test_ttl_expiration() {
        let cache = cache().await;
        cache
            .set("short", &"x".to_string(), Duration::from_secs(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert!(cache.get::<String>("short").await.unwrap().is_none());
    }
}
