//! Stale-while-revalidate reads over a [`Cache`].
//!
//! An entry is *fresh* for `fresh_for` after it was stored, then *stale* for
//! another `stale_for`. Fresh hits are returned as is. Stale hits are
//! returned immediately while a single background task reloads the value.
//! Misses, and entries older than `fresh_for + stale_for`, are loaded
//! inline.
//!
//! Every invalidation bumps a generation counter. A load that started under
//! an older generation never writes its result back.

use super::{Cache, CacheLayer};
use anyhow::Result;
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a value was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwrStatus {
    Fresh,
    /// Served from cache; a refresh was started or is already running
    Stale,
    Miss,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    stored_at_ms: i64,
    value: T,
}

#[derive(Clone)]
pub struct SwrCache {
    cache: Arc<Cache>,
    refreshing: Arc<Mutex<HashSet<String>>>,
    generation: Arc<AtomicU64>,
    fresh_for: Duration,
    stale_for: Duration,
}

/// Removes the key from the in-flight set when the refresh ends, even if the
/// loader panicked.
struct RefreshGuard {
    refreshing: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.refreshing.lock() {
            set.remove(&self.key);
        }
    }
}

impl SwrCache {
    pub fn new(cache: Arc<Cache>, fresh_for: Duration, stale_for: Duration) -> Self {
        Self {
            cache,
            refreshing: Arc::new(Mutex::new(HashSet::new())),
            generation: Arc::new(AtomicU64::new(0)),
            fresh_for,
            stale_for,
        }
    }

    pub fn inner(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Read through the cache with the default windows.
    pub async fn get<T, F, Fut>(&self, key: &str, loader: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.get_or_refresh(key, self.fresh_for, self.stale_for, loader)
            .await
    }

    pub async fn get_or_refresh<T, F, Fut>(
        &self,
        key: &str,
        fresh_for: Duration,
        stale_for: Duration,
        loader: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.fetch(key, fresh_for, stale_for, loader)
            .await
            .map(|(value, _)| value)
    }

    /// Like `get_or_refresh`, also reporting where the value came from.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: &str,
        fresh_for: Duration,
        stale_for: Duration,
        loader: F,
    ) -> Result<(T, SwrStatus)>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let cached = match self.cache.get::<Envelope<T>>(key).await {
            Ok(cached) => cached,
            Err(e) => {
                // A broken entry behaves like a miss
                tracing::warn!("Discarding unreadable cache entry {}: {}", key, e);
                None
            }
        };

        if let Some(envelope) = cached {
            let age = age_of(envelope.stored_at_ms);
            if age < fresh_for {
                return Ok((envelope.value, SwrStatus::Fresh));
            }
            if age < fresh_for + stale_for {
                self.spawn_refresh(key, fresh_for, stale_for, loader);
                return Ok((envelope.value, SwrStatus::Stale));
            }
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let value = loader().await?;
        store(&self.cache, &self.generation, generation, key, &value, fresh_for + stale_for).await;
        Ok((value, SwrStatus::Miss))
    }

    fn spawn_refresh<T, F, Fut>(&self, key: &str, fresh_for: Duration, stale_for: Duration, loader: F)
    where
        T: Serialize + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        {
            let Ok(mut set) = self.refreshing.lock() else {
                return;
            };
            if !set.insert(key.to_string()) {
                return;
            }
        }

        let guard = RefreshGuard {
            refreshing: self.refreshing.clone(),
            key: key.to_string(),
        };
        let cache = self.cache.clone();
        let generations = self.generation.clone();
        let generation = generations.load(Ordering::SeqCst);

        tokio::spawn(async move {
            match loader().await {
                Ok(value) => {
                    let ttl = fresh_for + stale_for;
                    store(&cache, &generations, generation, &guard.key, &value, ttl).await
                }
                Err(e) => tracing::warn!("Background refresh of {} failed: {}", guard.key, e),
            }
        });
    }

    /// Whether a background refresh for `key` is running
    pub fn is_refreshing(&self, key: &str) -> bool {
        self.refreshing
            .lock()
            .map(|set| set.contains(key))
            .unwrap_or(false)
    }

    pub async fn invalidate(&self, key: &str) -> Result<()> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.delete(key).await
    }

    pub async fn invalidate_prefix(&self, prefix: &str) -> Result<()> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.delete_pattern(&format!("{}*", prefix)).await
    }
}

fn age_of(stored_at_ms: i64) -> Duration {
    let elapsed = Utc::now().timestamp_millis() - stored_at_ms;
    Duration::from_millis(elapsed.max(0) as u64)
}

/// Write `value` unless an invalidation happened since `loaded_at` was read.
async fn store<T: Serialize + Send + Sync>(
    cache: &Cache,
    generations: &AtomicU64,
    loaded_at: u64,
    key: &str,
    value: &T,
    ttl: Duration,
) {
    if generations.load(Ordering::SeqCst) != loaded_at {
        tracing::debug!("Dropping outdated load of {}", key);
        return;
    }
    let envelope = Envelope {
        stored_at_ms: Utc::now().timestamp_millis(),
        value,
    };
    if let Err(e) = cache.set(key, &envelope, ttl).await {
        tracing::warn!("Failed to cache {}: {}", key, e);
        return;
    }
    // An invalidation that raced the write wins
    if generations.load(Ordering::SeqCst) != loaded_at {
        if let Err(e) = cache.delete(key).await {
            tracing::warn!("Failed to drop outdated cache entry {}: {}", key, e);
        }
    }
}
