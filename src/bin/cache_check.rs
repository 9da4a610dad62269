//! Smoke test for the configured cache backend
//!
//! Usage: cache-check [--config PATH]
//!
//! Pings the backend, round-trips a value and walks one key through the
//! stale-while-revalidate states, printing how long each step took.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use jobboard::cache::{create_cache, CacheLayer, SwrCache, SwrStatus};
use jobboard::config::{resolve_config_path, Config};

const FRESH_FOR: Duration = Duration::from_secs(1);
const STALE_FOR: Duration = Duration::from_secs(10);
const LOADER_DELAY: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cache_check=info,jobboard=info".into()),
        )
        .init();

    let config_path = resolve_config_path(std::env::args().skip(1));
    let config = Config::load_with_env(&config_path)?;

    let started = Instant::now();
    let cache = create_cache(&config.cache).await?;
    tracing::info!(
        "Connected to {} cache in {:?}",
        cache.backend_name(),
        started.elapsed()
    );

    let started = Instant::now();
    cache.ping().await.context("Ping failed")?;
    tracing::info!("Ping: {:?}", started.elapsed());

    let prefix = format!("cache-check:{}:", Uuid::new_v4().simple());
    let result = run_checks(cache.clone(), &prefix).await;

    if let Err(e) = cache.delete_pattern(&format!("{}*", prefix)).await {
        tracing::warn!("Failed to clean up test keys: {}", e);
    }
    result?;

    tracing::info!("All cache checks passed");
    Ok(())
}

async fn run_checks(cache: Arc<jobboard::cache::Cache>, prefix: &str) -> Result<()> {
    // Plain round trip
    let key = format!("{}roundtrip", prefix);
    let value = vec!["rust".to_string(), "axum".to_string()];

    let started = Instant::now();
    cache.set(&key, &value, Duration::from_secs(60)).await?;
    let stored: Option<Vec<String>> = cache.get(&key).await?;
    cache.delete(&key).await?;
    let gone: Option<Vec<String>> = cache.get(&key).await?;
    tracing::info!("Set/get/delete: {:?}", started.elapsed());

    if stored.as_ref() != Some(&value) {
        bail!("Round trip returned {:?}", stored);
    }
    if gone.is_some() {
        bail!("Deleted key is still readable");
    }

    // Stale-while-revalidate
    let swr = SwrCache::new(cache, FRESH_FOR, STALE_FOR);
    let key = format!("{}swr", prefix);

    let (first, status) = timed_fetch(&swr, &key, 1).await?;
    expect(status, SwrStatus::Miss, first, 1)?;

    let (second, status) = timed_fetch(&swr, &key, 2).await?;
    expect(status, SwrStatus::Fresh, second, 1)?;

    tokio::time::sleep(FRESH_FOR + Duration::from_millis(100)).await;
    let (third, status) = timed_fetch(&swr, &key, 3).await?;
    expect(status, SwrStatus::Stale, third, 1)?;

    let deadline = Instant::now() + Duration::from_secs(5);
    while swr.is_refreshing(&key) {
        if Instant::now() > deadline {
            bail!("Background refresh did not finish");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let (fourth, status) = timed_fetch(&swr, &key, 4).await?;
    expect(status, SwrStatus::Fresh, fourth, 3)?;

    Ok(())
}

async fn timed_fetch(swr: &SwrCache, key: &str, version: u32) -> Result<(u32, SwrStatus)> {
    let started = Instant::now();
    let result = swr
        .fetch(key, FRESH_FOR, STALE_FOR, move || async move {
            tokio::time::sleep(LOADER_DELAY).await;
            Ok(version)
        })
        .await?;
    tracing::info!(
        "SWR fetch #{}: {:?} in {:?} (value {})",
        version,
        result.1,
        started.elapsed(),
        result.0
    );
    Ok(result)
}

fn expect(status: SwrStatus, expected_status: SwrStatus, value: u32, expected: u32) -> Result<()> {
    if status != expected_status || value != expected {
        bail!(
            "Expected {:?} with value {}, got {:?} with value {}",
            expected_status,
            expected,
            status,
            value
        );
    }
    Ok(())
}
