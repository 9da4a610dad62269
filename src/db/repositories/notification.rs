//! Notification repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{NewNotification, Notification, NotificationKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, message, link, is_read, created_at";

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, notification: &NewNotification) -> Result<Notification>;

    /// Latest `limit` notifications of a user, newest first
    async fn list_recent(&self, user_id: i64, limit: i64) -> Result<Vec<Notification>>;

    /// The newest `limit` notifications of a user with an id above
    /// `after_id`, returned oldest first
    async fn list_after(&self, user_id: i64, after_id: i64, limit: i64) -> Result<Vec<Notification>>;

    async fn unread_count(&self, user_id: i64) -> Result<i64>;

    /// Returns false when the notification does not belong to the user
    async fn mark_read(&self, id: i64, user_id: i64) -> Result<bool>;

    async fn mark_all_read(&self, user_id: i64) -> Result<u64>;
}

pub struct SqlxNotificationRepository {
    pool: DynDatabasePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NotificationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn create(&self, notification: &NewNotification) -> Result<Notification> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_notification_sqlite(self.pool.sqlite()?, notification).await
            }
            DatabaseDriver::Mysql => {
                create_notification_mysql(self.pool.mysql()?, notification).await
            }
        }
    }

    async fn list_recent(&self, user_id: i64, limit: i64) -> Result<Vec<Notification>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_recent_notifications_sqlite(self.pool.sqlite()?, user_id, limit).await
            }
            DatabaseDriver::Mysql => {
                list_recent_notifications_mysql(self.pool.mysql()?, user_id, limit).await
            }
        }
    }

    async fn list_after(&self, user_id: i64, after_id: i64, limit: i64) -> Result<Vec<Notification>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_notifications_after_sqlite(self.pool.sqlite()?, user_id, after_id, limit).await
            }
            DatabaseDriver::Mysql => {
                list_notifications_after_mysql(self.pool.mysql()?, user_id, after_id, limit).await
            }
        }
    }

    async fn unread_count(&self, user_id: i64) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => unread_count_sqlite(self.pool.sqlite()?, user_id).await,
            DatabaseDriver::Mysql => unread_count_mysql(self.pool.mysql()?, user_id).await,
        }
    }

    async fn mark_read(&self, id: i64, user_id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => mark_read_sqlite(self.pool.sqlite()?, id, user_id).await,
            DatabaseDriver::Mysql => mark_read_mysql(self.pool.mysql()?, id, user_id).await,
        }
    }

    async fn mark_all_read(&self, user_id: i64) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => mark_all_read_sqlite(self.pool.sqlite()?, user_id).await,
            DatabaseDriver::Mysql => mark_all_read_mysql(self.pool.mysql()?, user_id).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_notification_sqlite(
    pool: &SqlitePool,
    notification: &NewNotification,
) -> Result<Notification> {
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, kind, title, message, link, is_read, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(notification.user_id)
    .bind(notification.kind.as_str())
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(&notification.link)
    .bind(false)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to create notification")?;

    let row = sqlx::query(&format!(
        "SELECT {} FROM notifications WHERE id = ?",
        NOTIFICATION_COLUMNS
    ))
    .bind(result.last_insert_rowid())
    .fetch_one(pool)
    .await
    .context("Failed to load notification")?;

    row_to_notification_sqlite(&row)
}

async fn list_recent_notifications_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<Notification>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM notifications WHERE user_id = ? ORDER BY id DESC LIMIT ?",
        NOTIFICATION_COLUMNS
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list notifications")?;

    rows.iter().map(row_to_notification_sqlite).collect()
}

async fn list_notifications_after_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    after_id: i64,
    limit: i64,
) -> Result<Vec<Notification>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM notifications WHERE user_id = ? AND id > ? ORDER BY id DESC LIMIT ?",
        NOTIFICATION_COLUMNS
    ))
    .bind(user_id)
    .bind(after_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list missed notifications")?;

    let mut items = rows
        .iter()
        .map(row_to_notification_sqlite)
        .collect::<Result<Vec<_>>>()?;
    items.reverse();
    Ok(items)
}

async fn unread_count_sqlite(pool: &SqlitePool, user_id: i64) -> Result<i64> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM notifications WHERE user_id = ? AND is_read = ?",
    )
    .bind(user_id)
    .bind(false)
    .fetch_one(pool)
    .await
    .context("Failed to count unread notifications")?;

    Ok(row.get("count"))
}

async fn mark_read_sqlite(pool: &SqlitePool, id: i64, user_id: i64) -> Result<bool> {
    let owned = sqlx::query("SELECT COUNT(*) AS count FROM notifications WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .fetch_one(pool)
        .await
        .context("Failed to look up notification")?;
    let count: i64 = owned.get("count");
    if count == 0 {
        return Ok(false);
    }

    sqlx::query("UPDATE notifications SET is_read = ? WHERE id = ? AND user_id = ?")
        .bind(true)
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to mark notification read")?;

    Ok(true)
}

async fn mark_all_read_sqlite(pool: &SqlitePool, user_id: i64) -> Result<u64> {
    let result = sqlx::query("UPDATE notifications SET is_read = ? WHERE user_id = ? AND is_read = ?")
        .bind(true)
        .bind(user_id)
        .bind(false)
        .execute(pool)
        .await
        .context("Failed to mark notifications read")?;

    Ok(result.rows_affected())
}

fn row_to_notification_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Notification> {
    let kind: String = row.get("kind");

    Ok(Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: NotificationKind::from_str(&kind)?,
        title: row.get("title"),
        message: row.get("message"),
        link: row.get("link"),
        is_read: row.get("is_read"),
        created_at: row.get("created_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_notification_mysql(
    pool: &MySqlPool,
    notification: &NewNotification,
) -> Result<Notification> {
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, kind, title, message, link, is_read, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(notification.user_id)
    .bind(notification.kind.as_str())
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(&notification.link)
    .bind(false)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to create notification")?;

    let row = sqlx::query(&format!(
        "SELECT {} FROM notifications WHERE id = ?",
        NOTIFICATION_COLUMNS
    ))
    .bind(result.last_insert_id() as i64)
    .fetch_one(pool)
    .await
    .context("Failed to load notification")?;

    row_to_notification_mysql(&row)
}

async fn list_recent_notifications_mysql(
    pool: &MySqlPool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<Notification>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM notifications WHERE user_id = ? ORDER BY id DESC LIMIT ?",
        NOTIFICATION_COLUMNS
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list notifications")?;

    rows.iter().map(row_to_notification_mysql).collect()
}

async fn list_notifications_after_mysql(
    pool: &MySqlPool,
    user_id: i64,
    after_id: i64,
    limit: i64,
) -> Result<Vec<Notification>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM notifications WHERE user_id = ? AND id > ? ORDER BY id DESC LIMIT ?",
        NOTIFICATION_COLUMNS
    ))
    .bind(user_id)
    .bind(after_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list missed notifications")?;

    let mut items = rows
        .iter()
        .map(row_to_notification_mysql)
        .collect::<Result<Vec<_>>>()?;
    items.reverse();
    Ok(items)
}

async fn unread_count_mysql(pool: &MySqlPool, user_id: i64) -> Result<i64> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM notifications WHERE user_id = ? AND is_read = ?",
    )
    .bind(user_id)
    .bind(false)
    .fetch_one(pool)
    .await
    .context("Failed to count unread notifications")?;

    Ok(row.get("count"))
}

async fn mark_read_mysql(pool: &MySqlPool, id: i64, user_id: i64) -> Result<bool> {
    let owned = sqlx::query("SELECT COUNT(*) AS count FROM notifications WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .fetch_one(pool)
        .await
        .context("Failed to look up notification")?;
    let count: i64 = owned.get("count");
    if count == 0 {
        return Ok(false);
    }

    sqlx::query("UPDATE notifications SET is_read = ? WHERE id = ? AND user_id = ?")
        .bind(true)
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to mark notification read")?;

    Ok(true)
}

async fn mark_all_read_mysql(pool: &MySqlPool, user_id: i64) -> Result<u64> {
    let result = sqlx::query("UPDATE notifications SET is_read = ? WHERE user_id = ? AND is_read = ?")
        .bind(true)
        .bind(user_id)
        .bind(false)
        .execute(pool)
        .await
        .context("Failed to mark notifications read")?;

    Ok(result.rows_affected())
}

fn row_to_notification_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Notification> {
    let kind: String = row.get("kind");

    Ok(Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: NotificationKind::from_str(&kind)?,
        title: row.get("title"),
        message: row.get("message"),
        link: row.get("link"),
        is_read: row.get("is_read"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{User, UserRole};

    async fn setup() -> (SqlxNotificationRepository, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let users = SqlxUserRepository::new(pool.clone());
        let a = users
            .create(&User::new(
                "A".to_string(),
                "a@mail.test".to_string(),
                "hash".to_string(),
                UserRole::Jobseeker,
            ))
            .await
            .unwrap();
        let b = users
            .create(&User::new(
                "B".to_string(),
                "b@mail.test".to_string(),
                "hash".to_string(),
                UserRole::Employer,
            ))
            .await
            .unwrap();
        (SqlxNotificationRepository::new(pool), a.id, b.id)
    }

    fn note(user_id: i64, title: &str) -> NewNotification {
        NewNotification {
            user_id,
            kind: NotificationKind::System,
            title: title.to_string(),
            message: "body".to_string(),
            link: None,
        }
    }

    #[tokio::test]
    async fn test_list_recent_is_capped_and_newest_first() {
        let (repo, user_id, _) = setup().await;
        for i in 0..5 {
            repo.create(&note(user_id, &format!("n{}", i))).await.unwrap();
        }

        let items = repo.list_recent(user_id, 3).await.unwrap();
        let titles: Vec<_> = items.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["n4", "n3", "n2"]);
        assert_eq!(repo.unread_count(user_id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_list_after_returns_the_gap_oldest_first() {
        let (repo, a, b) = setup().await;
        let first = repo.create(&note(a, "seen")).await.unwrap();
        repo.create(&note(b, "other user")).await.unwrap();
        repo.create(&note(a, "missed 1")).await.unwrap();
        repo.create(&note(a, "missed 2")).await.unwrap();

        let missed = repo.list_after(a, first.id, 10).await.unwrap();
        let titles: Vec<_> = missed.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["missed 1", "missed 2"]);

        let newest = repo.list_after(a, first.id, 1).await.unwrap();
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0].title, "missed 2");
    }

    #[tokio::test]
    async fn test_mark_read_is_owner_scoped() {
        let (repo, a, b) = setup().await;
        let created = repo.create(&note(a, "hello")).await.unwrap();
        assert!(!created.is_read);

        assert!(!repo.mark_read(created.id, b).await.unwrap());
        assert_eq!(repo.unread_count(a).await.unwrap(), 1);

        assert!(repo.mark_read(created.id, a).await.unwrap());
        assert_eq!(repo.unread_count(a).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_all_read() {
        let (repo, a, b) = setup().await;
        repo.create(&note(a, "1")).await.unwrap();
        repo.create(&note(a, "2")).await.unwrap();
        repo.create(&note(b, "3")).await.unwrap();

        assert_eq!(repo.mark_all_read(a).await.unwrap(), 2);
        assert_eq!(repo.unread_count(a).await.unwrap(), 0);
        assert_eq!(repo.unread_count(b).await.unwrap(), 1);
    }
}
