//! Cache layer
//!
//! Two backends share the `CacheLayer` interface:
//! - in-process `moka` cache (default)
//! - Redis, behind the `redis-cache` feature, for multi-instance deployments
//!
//! `SwrCache` builds stale-while-revalidate reads on top of either backend.
//!
//! ```rust,ignore
//! use jobboard::cache::{create_cache, CacheLayer};
//! use jobboard::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default()).await?;
//! cache.set("jobs:list:page=1", &jobs, Duration::from_secs(60)).await?;
//! ```

pub mod memory;
#[cfg(feature = "redis-cache")]
pub mod redis;
pub mod swr;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheConfig, CacheDriver};

pub use memory::MemoryCache;
#[cfg(feature = "redis-cache")]
pub use redis::RedisCache;
pub use swr::{SwrCache, SwrStatus};

/// Key-value cache with per-entry TTL and glob-style bulk deletion.
///
/// The generic methods make this trait unusable as `dyn CacheLayer`; the
/// `Cache` enum provides runtime selection instead.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key matching `pattern` (`*` and `?` wildcards)
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    /// Round-trip to the backend
    async fn ping(&self) -> Result<()>;
}

#[derive(Debug)]
pub enum Cache {
    Memory(MemoryCache),
    #[cfg(feature = "redis-cache")]
    Redis(RedisCache),
}

impl Cache {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Cache::Memory(_) => "memory",
            #[cfg(feature = "redis-cache")]
            Cache::Redis(_) => "redis",
        }
    }
}

/// Forward a call to whichever backend is active.
macro_rules! dispatch {
    ($self:ident, $cache:ident => $call:expr) => {
        match $self {
            Cache::Memory($cache) => $call,
            #[cfg(feature = "redis-cache")]
            Cache::Redis($cache) => $call,
        }
    };
}

#[async_trait]
impl CacheLayer for Cache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        dispatch!(self, cache => cache.get(key).await)
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        dispatch!(self, cache => cache.set(key, value, ttl).await)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        dispatch!(self, cache => cache.delete(key).await)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        dispatch!(self, cache => cache.delete_pattern(pattern).await)
    }

    async fn clear(&self) -> Result<()> {
        dispatch!(self, cache => cache.clear().await)
    }

    async fn ping(&self) -> Result<()> {
        dispatch!(self, cache => cache.ping().await)
    }
}

/// Build the backend selected by `config.driver`.
///
/// Fails when Redis is selected without a URL, when the `redis-cache`
/// feature is disabled, or when the Redis connection cannot be opened.
pub async fn create_cache(config: &CacheConfig) -> Result<Arc<Cache>> {
    let ttl = Duration::from_secs(config.ttl_seconds);

    match config.driver {
        CacheDriver::Memory => Ok(Arc::new(Cache::Memory(MemoryCache::with_capacity_and_ttl(
            config.max_entries,
            ttl,
        )))),
        CacheDriver::Redis => {
            #[cfg(feature = "redis-cache")]
            {
                let redis_url = config.redis_url.as_deref().ok_or_else(|| {
                    anyhow::anyhow!(
                        "Redis URL is required for the redis cache driver; set cache.redis_url or JOBBOARD_REDIS_URL"
                    )
                })?;
                let cache = RedisCache::with_ttl(redis_url, ttl).await?;
                tracing::info!("Connected to Redis cache");
                Ok(Arc::new(Cache::Redis(cache)))
            }

            #[cfg(not(feature = "redis-cache"))]
            {
                anyhow::bail!(
                    "Redis cache driver is configured but the 'redis-cache' feature is not enabled; \
                     rebuild with `--features redis-cache` or use the memory driver"
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_cache() {
        let cache = create_cache(&CacheConfig::default()).await.unwrap();
        assert_eq!(cache.backend_name(), "memory");

        cache
            .set("jobs:1", &"Rust Engineer".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let value: Option<String> = cache.get("jobs:1").await.unwrap();
        assert_eq!(value.as_deref(), Some("Rust Engineer"));
        cache.ping().await.unwrap();
    }

    #[cfg(not(feature = "redis-cache"))]
    #[tokio::test]
    async fn test_redis_driver_requires_feature() {
        let config = CacheConfig {
            driver: CacheDriver::Redis,
            redis_url: Some("redis://127.0.0.1:6379".to_string()),
            ..Default::default()
        };

        let err = create_cache(&config).await.unwrap_err().to_string();
        assert!(err.contains("redis-cache"));
    }

    #[cfg(feature = "redis-cache")]
    #[tokio::test]
    async fn test_redis_driver_requires_url() {
        let config = CacheConfig {
            driver: CacheDriver::Redis,
            redis_url: None,
            ..Default::default()
        };

        let err = create_cache(&config).await.unwrap_err().to_string();
        assert!(err.contains("Redis URL"));
    }
}
