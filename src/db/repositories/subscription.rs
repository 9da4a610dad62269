//! Subscription repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, Plan, Subscription, SubscriptionFilter, SubscriptionStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan, status, price, order_id, starts_at, expires_at, created_at, updated_at";

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create(&self, subscription: &Subscription) -> Result<Subscription>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Subscription>>;

    /// The active, unexpired subscription of a user with the latest expiry
    async fn get_current(&self, user_id: i64, now: DateTime<Utc>) -> Result<Option<Subscription>>;

    async fn list(
        &self,
        filter: &SubscriptionFilter,
        params: &ListParams,
    ) -> Result<(Vec<Subscription>, i64)>;

    /// Persist status and validity window
    async fn update(&self, subscription: &Subscription) -> Result<Subscription>;

    /// Mark the user's other active subscriptions expired
    async fn expire_active_for_user(&self, user_id: i64, except_id: i64) -> Result<u64>;

    /// Mark every active subscription whose window ended before `now` expired
    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64>;
}

pub struct SqlxSubscriptionRepository {
    pool: DynDatabasePool,
}

impl SqlxSubscriptionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SubscriptionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn create(&self, subscription: &Subscription) -> Result<Subscription> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_subscription_sqlite(self.pool.sqlite()?, subscription).await
            }
            DatabaseDriver::Mysql => {
                create_subscription_mysql(self.pool.mysql()?, subscription).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Subscription>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_subscription_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_subscription_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_current(&self, user_id: i64, now: DateTime<Utc>) -> Result<Option<Subscription>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_current_subscription_sqlite(self.pool.sqlite()?, user_id, now).await
            }
            DatabaseDriver::Mysql => {
                get_current_subscription_mysql(self.pool.mysql()?, user_id, now).await
            }
        }
    }

    async fn list(
        &self,
        filter: &SubscriptionFilter,
        params: &ListParams,
    ) -> Result<(Vec<Subscription>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_subscriptions_sqlite(self.pool.sqlite()?, filter, params).await
            }
            DatabaseDriver::Mysql => {
                list_subscriptions_mysql(self.pool.mysql()?, filter, params).await
            }
        }
    }

    async fn update(&self, subscription: &Subscription) -> Result<Subscription> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_subscription_sqlite(self.pool.sqlite()?, subscription).await
            }
            DatabaseDriver::Mysql => {
                update_subscription_mysql(self.pool.mysql()?, subscription).await
            }
        }
    }

    async fn expire_active_for_user(&self, user_id: i64, except_id: i64) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                expire_active_for_user_sqlite(self.pool.sqlite()?, user_id, except_id).await
            }
            DatabaseDriver::Mysql => {
                expire_active_for_user_mysql(self.pool.mysql()?, user_id, except_id).await
            }
        }
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => expire_due_subscriptions_sqlite(self.pool.sqlite()?, now).await,
            DatabaseDriver::Mysql => expire_due_subscriptions_mysql(self.pool.mysql()?, now).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_subscription_sqlite(
    pool: &SqlitePool,
    subscription: &Subscription,
) -> Result<Subscription> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO subscriptions (user_id, plan, status, price, order_id, starts_at, expires_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(subscription.user_id)
    .bind(subscription.plan.as_str())
    .bind(subscription.status.as_str())
    .bind(subscription.price)
    .bind(&subscription.order_id)
    .bind(subscription.starts_at)
    .bind(subscription.expires_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create subscription")?;

    get_subscription_by_id_sqlite(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| anyhow::anyhow!("Subscription not found after insert"))
}

async fn get_subscription_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Subscription>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM subscriptions WHERE id = ?",
        SUBSCRIPTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get subscription by ID")?;

    row.as_ref().map(row_to_subscription_sqlite).transpose()
}

async fn get_current_subscription_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<Subscription>> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {} FROM subscriptions
        WHERE user_id = ? AND status = 'active' AND expires_at > ?
        ORDER BY expires_at DESC
        LIMIT 1
        "#,
        SUBSCRIPTION_COLUMNS
    ))
    .bind(user_id)
    .bind(now)
    .fetch_optional(pool)
    .await
    .context("Failed to get current subscription")?;

    row.as_ref().map(row_to_subscription_sqlite).transpose()
}

async fn list_subscriptions_sqlite(
    pool: &SqlitePool,
    filter: &SubscriptionFilter,
    params: &ListParams,
) -> Result<(Vec<Subscription>, i64)> {
    let status = filter.status.map(|s| s.to_string());

    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM subscriptions
        WHERE (? IS NULL OR user_id = ?) AND (? IS NULL OR status = ?)
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
        SUBSCRIPTION_COLUMNS
    ))
    .bind(filter.user_id)
    .bind(filter.user_id)
    .bind(&status)
    .bind(&status)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await
    .context("Failed to list subscriptions")?;

    let count_row = sqlx::query(
        r#"
        SELECT COUNT(*) AS count FROM subscriptions
        WHERE (? IS NULL OR user_id = ?) AND (? IS NULL OR status = ?)
        "#,
    )
    .bind(filter.user_id)
    .bind(filter.user_id)
    .bind(&status)
    .bind(&status)
    .fetch_one(pool)
    .await
    .context("Failed to count subscriptions")?;

    let subscriptions = rows
        .iter()
        .map(row_to_subscription_sqlite)
        .collect::<Result<Vec<_>>>()?;

    Ok((subscriptions, count_row.get("count")))
}

async fn update_subscription_sqlite(
    pool: &SqlitePool,
    subscription: &Subscription,
) -> Result<Subscription> {
    sqlx::query(
        "UPDATE subscriptions SET status = ?, starts_at = ?, expires_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(subscription.status.as_str())
    .bind(subscription.starts_at)
    .bind(subscription.expires_at)
    .bind(Utc::now())
    .bind(subscription.id)
    .execute(pool)
    .await
    .context("Failed to update subscription")?;

    get_subscription_by_id_sqlite(pool, subscription.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Subscription not found after update"))
}

async fn expire_active_for_user_sqlite(pool: &SqlitePool, user_id: i64, except_id: i64) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE subscriptions SET status = 'expired', updated_at = ? WHERE user_id = ? AND status = 'active' AND id <> ?",
    )
    .bind(Utc::now())
    .bind(user_id)
    .bind(except_id)
    .execute(pool)
    .await
    .context("Failed to expire previous subscriptions")?;

    Ok(result.rows_affected())
}

async fn expire_due_subscriptions_sqlite(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE subscriptions SET status = 'expired', updated_at = ? WHERE status = 'active' AND expires_at <= ?",
    )
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to expire due subscriptions")?;

    Ok(result.rows_affected())
}

fn row_to_subscription_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Subscription> {
    let plan: String = row.get("plan");
    let status: String = row.get("status");

    Ok(Subscription {
        id: row.get("id"),
        user_id: row.get("user_id"),
        plan: Plan::from_str(&plan)?,
        status: SubscriptionStatus::from_str(&status)?,
        price: row.get("price"),
        order_id: row.get("order_id"),
        starts_at: row.get("starts_at"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_subscription_mysql(
    pool: &MySqlPool,
    subscription: &Subscription,
) -> Result<Subscription> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO subscriptions (user_id, plan, status, price, order_id, starts_at, expires_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(subscription.user_id)
    .bind(subscription.plan.as_str())
    .bind(subscription.status.as_str())
    .bind(subscription.price)
    .bind(&subscription.order_id)
    .bind(subscription.starts_at)
    .bind(subscription.expires_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create subscription")?;

    get_subscription_by_id_mysql(pool, result.last_insert_id() as i64)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Subscription not found after insert"))
}

async fn get_subscription_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Subscription>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM subscriptions WHERE id = ?",
        SUBSCRIPTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get subscription by ID")?;

    row.as_ref().map(row_to_subscription_mysql).transpose()
}

async fn get_current_subscription_mysql(
    pool: &MySqlPool,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<Subscription>> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {} FROM subscriptions
        WHERE user_id = ? AND status = 'active' AND expires_at > ?
        ORDER BY expires_at DESC
        LIMIT 1
        "#,
        SUBSCRIPTION_COLUMNS
    ))
    .bind(user_id)
    .bind(now)
    .fetch_optional(pool)
    .await
    .context("Failed to get current subscription")?;

    row.as_ref().map(row_to_subscription_mysql).transpose()
}

async fn list_subscriptions_mysql(
    pool: &MySqlPool,
    filter: &SubscriptionFilter,
    params: &ListParams,
) -> Result<(Vec<Subscription>, i64)> {
    let status = filter.status.map(|s| s.to_string());

    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM subscriptions
        WHERE (? IS NULL OR user_id = ?) AND (? IS NULL OR status = ?)
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
        "#,
        SUBSCRIPTION_COLUMNS
    ))
    .bind(filter.user_id)
    .bind(filter.user_id)
    .bind(&status)
    .bind(&status)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await
    .context("Failed to list subscriptions")?;

    let count_row = sqlx::query(
        r#"
        SELECT COUNT(*) AS count FROM subscriptions
        WHERE (? IS NULL OR user_id = ?) AND (? IS NULL OR status = ?)
        "#,
    )
    .bind(filter.user_id)
    .bind(filter.user_id)
    .bind(&status)
    .bind(&status)
    .fetch_one(pool)
    .await
    .context("Failed to count subscriptions")?;

    let subscriptions = rows
        .iter()
        .map(row_to_subscription_mysql)
        .collect::<Result<Vec<_>>>()?;

    Ok((subscriptions, count_row.get("count")))
}

async fn update_subscription_mysql(
    pool: &MySqlPool,
    subscription: &Subscription,
) -> Result<Subscription> {
    sqlx::query(
        "UPDATE subscriptions SET status = ?, starts_at = ?, expires_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(subscription.status.as_str())
    .bind(subscription.starts_at)
    .bind(subscription.expires_at)
    .bind(Utc::now())
    .bind(subscription.id)
    .execute(pool)
    .await
    .context("Failed to update subscription")?;

    get_subscription_by_id_mysql(pool, subscription.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Subscription not found after update"))
}

async fn expire_active_for_user_mysql(pool: &MySqlPool, user_id: i64, except_id: i64) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE subscriptions SET status = 'expired', updated_at = ? WHERE user_id = ? AND status = 'active' AND id <> ?",
    )
    .bind(Utc::now())
    .bind(user_id)
    .bind(except_id)
    .execute(pool)
    .await
    .context("Failed to expire previous subscriptions")?;

    Ok(result.rows_affected())
}

async fn expire_due_subscriptions_mysql(pool: &MySqlPool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE subscriptions SET status = 'expired', updated_at = ? WHERE status = 'active' AND expires_at <= ?",
    )
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to expire due subscriptions")?;

    Ok(result.rows_affected())
}

fn row_to_subscription_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Subscription> {
    let plan: String = row.get("plan");
    let status: String = row.get("status");

    Ok(Subscription {
        id: row.get("id"),
        user_id: row.get("user_id"),
        plan: Plan::from_str(&plan)?,
        status: SubscriptionStatus::from_str(&status)?,
        price: row.get("price"),
        order_id: row.get("order_id"),
        starts_at: row.get("starts_at"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{User, UserRole};
    use chrono::Duration;

    async fn setup() -> (SqlxSubscriptionRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let employer = SqlxUserRepository::new(pool.clone())
            .create(&User::new(
                "Acme".to_string(),
                "hr@acme.test".to_string(),
                "hash".to_string(),
                UserRole::Employer,
            ))
            .await
            .unwrap();
        (SqlxSubscriptionRepository::new(pool), employer.id)
    }

    fn pending(user_id: i64, order_id: &str) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: 0,
            user_id,
            plan: Plan::Basic,
            status: SubscriptionStatus::Pending,
            price: 99_000,
            order_id: order_id.to_string(),
            starts_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn activate(
        repo: &SqlxSubscriptionRepository,
        mut sub: Subscription,
        expires_in: Duration,
    ) -> Subscription {
        let now = Utc::now();
        sub.status = SubscriptionStatus::Active;
        sub.starts_at = Some(now);
        sub.expires_at = Some(now + expires_in);
        repo.update(&sub).await.unwrap()
    }

    #[tokio::test]
    async fn test_current_requires_active_and_unexpired() {
        let (repo, user_id) = setup().await;
        let sub = repo.create(&pending(user_id, "SUB-1")).await.unwrap();
        assert!(repo.get_current(user_id, Utc::now()).await.unwrap().is_none());

        let active = activate(&repo, sub, Duration::days(30)).await;
        let current = repo.get_current(user_id, Utc::now()).await.unwrap().unwrap();
        assert_eq!(current.id, active.id);
        assert!(repo
            .get_current(user_id, Utc::now() + Duration::days(31))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_order_id_unique() {
        let (repo, user_id) = setup().await;
        repo.create(&pending(user_id, "SUB-1")).await.unwrap();
        assert!(repo.create(&pending(user_id, "SUB-1")).await.is_err());
    }

    #[tokio::test]
    async fn test_expire_previous_and_due() {
        let (repo, user_id) = setup().await;
        let first = repo.create(&pending(user_id, "SUB-1")).await.unwrap();
        let first = activate(&repo, first, Duration::days(30)).await;
        let second = repo.create(&pending(user_id, "SUB-2")).await.unwrap();
        let second = activate(&repo, second, Duration::days(30)).await;

        assert_eq!(repo.expire_active_for_user(user_id, second.id).await.unwrap(), 1);
        let first = repo.get_by_id(first.id).await.unwrap().unwrap();
        assert_eq!(first.status, SubscriptionStatus::Expired);

        assert_eq!(repo.expire_due(Utc::now()).await.unwrap(), 0);
        assert_eq!(
            repo.expire_due(Utc::now() + Duration::days(31)).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_list_filter() {
        let (repo, user_id) = setup().await;
        let a = repo.create(&pending(user_id, "SUB-1")).await.unwrap();
        activate(&repo, a, Duration::days(30)).await;
        repo.create(&pending(user_id, "SUB-2")).await.unwrap();

        let params = ListParams::new(1, 10);
        let (all, total) = repo
            .list(
                &SubscriptionFilter {
                    user_id: Some(user_id),
                    status: None,
                },
                &params,
            )
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(all.len(), 2);

        let (pending_only, _) = repo
            .list(
                &SubscriptionFilter {
                    user_id: None,
                    status: Some(SubscriptionStatus::Pending),
                },
                &params,
            )
            .await
            .unwrap();
        assert_eq!(pending_only.len(), 1);
        assert_eq!(pending_only[0].order_id, "SUB-2");
    }
}
