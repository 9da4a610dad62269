//! Analytics counter repository
//!
//! One row per (day, metric); recording a hit is a single upsert.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{AnalyticsCounter, Metric};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const UPSERT_SQLITE: &str = r#"
    INSERT INTO analytics (stat_date, metric, hits) VALUES (?, ?, ?)
    ON CONFLICT(stat_date, metric) DO UPDATE SET hits = hits + excluded.hits
"#;

const UPSERT_MYSQL: &str = r#"
    INSERT INTO analytics (stat_date, metric, hits) VALUES (?, ?, ?)
    ON DUPLICATE KEY UPDATE hits = hits + VALUES(hits)
"#;

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Add `by` hits to the counter of `metric` on `date`
    async fn increment(&self, date: NaiveDate, metric: Metric, by: i64) -> Result<()>;

    /// Every counter in the inclusive range `[from, to]`
    async fn range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<AnalyticsCounter>>;
}

pub struct SqlxAnalyticsRepository {
    pool: DynDatabasePool,
}

impl SqlxAnalyticsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AnalyticsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AnalyticsRepository for SqlxAnalyticsRepository {
    async fn increment(&self, date: NaiveDate, metric: Metric, by: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                increment_counter_sqlite(self.pool.sqlite()?, date, metric, by).await
            }
            DatabaseDriver::Mysql => {
                increment_counter_mysql(self.pool.mysql()?, date, metric, by).await
            }
        }
    }

    async fn range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<AnalyticsCounter>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => counters_in_range_sqlite(self.pool.sqlite()?, from, to).await,
            DatabaseDriver::Mysql => counters_in_range_mysql(self.pool.mysql()?, from, to).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn increment_counter_sqlite(
    pool: &SqlitePool,
    date: NaiveDate,
    metric: Metric,
    by: i64,
) -> Result<()> {
    sqlx::query(UPSERT_SQLITE)
        .bind(date_key(date))
        .bind(metric.as_str())
        .bind(by)
        .execute(pool)
        .await
        .context("Failed to record analytics hit")?;

    Ok(())
}

async fn counters_in_range_sqlite(
    pool: &SqlitePool,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<AnalyticsCounter>> {
    let rows = sqlx::query(
        r#"
        SELECT stat_date, metric, hits FROM analytics
        WHERE stat_date >= ? AND stat_date <= ?
        ORDER BY stat_date ASC, metric ASC
        "#,
    )
    .bind(date_key(from))
    .bind(date_key(to))
    .fetch_all(pool)
    .await
    .context("Failed to load analytics counters")?;

    rows.iter().map(row_to_counter_sqlite).collect()
}

fn row_to_counter_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<AnalyticsCounter> {
    let metric: String = row.get("metric");

    Ok(AnalyticsCounter {
        date: row.get("stat_date"),
        metric: Metric::from_str(&metric)?,
        count: row.get("hits"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn increment_counter_mysql(
    pool: &MySqlPool,
    date: NaiveDate,
    metric: Metric,
    by: i64,
) -> Result<()> {
    sqlx::query(UPSERT_MYSQL)
        .bind(date_key(date))
        .bind(metric.as_str())
        .bind(by)
        .execute(pool)
        .await
        .context("Failed to record analytics hit")?;

    Ok(())
}

async fn counters_in_range_mysql(
    pool: &MySqlPool,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<AnalyticsCounter>> {
    let rows = sqlx::query(
        r#"
        SELECT stat_date, metric, hits FROM analytics
        WHERE stat_date >= ? AND stat_date <= ?
        ORDER BY stat_date ASC, metric ASC
        "#,
    )
    .bind(date_key(from))
    .bind(date_key(to))
    .fetch_all(pool)
    .await
    .context("Failed to load analytics counters")?;

    rows.iter().map(row_to_counter_mysql).collect()
}

fn row_to_counter_mysql(row: &sqlx::mysql::MySqlRow) -> Result<AnalyticsCounter> {
    let metric: String = row.get("metric");

    Ok(AnalyticsCounter {
        date: row.get("stat_date"),
        metric: Metric::from_str(&metric)?,
        count: row.get("hits"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> SqlxAnalyticsRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        SqlxAnalyticsRepository::new(pool)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[tokio::test]
    async fn test_increment_accumulates() {
        let repo = setup().await;
        repo.increment(day(1), Metric::JobView, 1).await.unwrap();
        repo.increment(day(1), Metric::JobView, 1).await.unwrap();
        repo.increment(day(1), Metric::JobPosted, 3).await.unwrap();

        let counters = repo.range(day(1), day(1)).await.unwrap();
        let views = counters
            .iter()
            .find(|c| c.metric == Metric::JobView)
            .unwrap();
        assert_eq!(views.count, 2);
        assert_eq!(views.date, "2026-03-01");
        assert_eq!(counters.len(), 2);
    }

    #[tokio::test]
    async fn test_range_is_inclusive() {
        let repo = setup().await;
        for d in 1..=5 {
            repo.increment(day(d), Metric::UserRegistered, 1).await.unwrap();
        }

        let counters = repo.range(day(2), day(4)).await.unwrap();
        let dates: Vec<_> = counters.iter().map(|c| c.date.as_str()).collect();
        assert_eq!(dates, vec!["2026-03-02", "2026-03-03", "2026-03-04"]);
    }

    #[test]
    fn test_date_key_zero_pads() {
        assert_eq!(date_key(day(9)), "2026-03-09");
    }
}
