//! Admin activity log repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{AdminAction, AdminActivity, AdminActivityFilter, ListParams, NewAdminActivity};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const ACTIVITY_SELECT: &str = r#"
    SELECT l.id, l.admin_id, l.action, l.target_type, l.target_id, l.details, l.created_at,
           u.name AS admin_name
    FROM admin_activities l
    JOIN users u ON u.id = l.admin_id
"#;

const ACTIVITY_FILTER: &str = "(? IS NULL OR l.admin_id = ?) AND (? IS NULL OR l.action = ?)";

#[async_trait]
pub trait AdminActivityRepository: Send + Sync {
    async fn create(&self, activity: &NewAdminActivity) -> Result<AdminActivity>;

    /// Newest first
    async fn list(
        &self,
        filter: &AdminActivityFilter,
        params: &ListParams,
    ) -> Result<(Vec<AdminActivity>, i64)>;
}

pub struct SqlxAdminActivityRepository {
    pool: DynDatabasePool,
}

impl SqlxAdminActivityRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AdminActivityRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AdminActivityRepository for SqlxAdminActivityRepository {
    async fn create(&self, activity: &NewAdminActivity) -> Result<AdminActivity> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_activity_sqlite(self.pool.sqlite()?, activity).await,
            DatabaseDriver::Mysql => create_activity_mysql(self.pool.mysql()?, activity).await,
        }
    }

    async fn list(
        &self,
        filter: &AdminActivityFilter,
        params: &ListParams,
    ) -> Result<(Vec<AdminActivity>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_activities_sqlite(self.pool.sqlite()?, filter, params).await,
            DatabaseDriver::Mysql => list_activities_mysql(self.pool.mysql()?, filter, params).await,
        }
    }
}

fn encode_details(details: &Option<serde_json::Value>) -> Option<String> {
    details.as_ref().map(|d| d.to_string())
}

/// Unparseable details are dropped rather than failing the listing
fn decode_details(raw: Option<String>) -> Option<serde_json::Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_activity_sqlite(
    pool: &SqlitePool,
    activity: &NewAdminActivity,
) -> Result<AdminActivity> {
    let result = sqlx::query(
        r#"
        INSERT INTO admin_activities (admin_id, action, target_type, target_id, details, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(activity.admin_id)
    .bind(activity.action.as_str())
    .bind(activity.target_type)
    .bind(activity.target_id)
    .bind(encode_details(&activity.details))
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to record admin activity")?;

    let row = sqlx::query(&format!("{} WHERE l.id = ?", ACTIVITY_SELECT))
        .bind(result.last_insert_rowid())
        .fetch_one(pool)
        .await
        .context("Failed to load admin activity")?;

    row_to_activity_sqlite(&row)
}

async fn list_activities_sqlite(
    pool: &SqlitePool,
    filter: &AdminActivityFilter,
    params: &ListParams,
) -> Result<(Vec<AdminActivity>, i64)> {
    let action = filter.action.map(|a| a.to_string());

    let rows = sqlx::query(&format!(
        "{} WHERE {} ORDER BY l.created_at DESC, l.id DESC LIMIT ? OFFSET ?",
        ACTIVITY_SELECT, ACTIVITY_FILTER
    ))
    .bind(filter.admin_id)
    .bind(filter.admin_id)
    .bind(&action)
    .bind(&action)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await
    .context("Failed to list admin activities")?;

    let count_row = sqlx::query(&format!(
        "SELECT COUNT(*) AS count FROM admin_activities l WHERE {}",
        ACTIVITY_FILTER
    ))
    .bind(filter.admin_id)
    .bind(filter.admin_id)
    .bind(&action)
    .bind(&action)
    .fetch_one(pool)
    .await
    .context("Failed to count admin activities")?;

    let activities = rows
        .iter()
        .map(row_to_activity_sqlite)
        .collect::<Result<Vec<_>>>()?;

    Ok((activities, count_row.get("count")))
}

fn row_to_activity_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<AdminActivity> {
    let action: String = row.get("action");

    Ok(AdminActivity {
        id: row.get("id"),
        admin_id: row.get("admin_id"),
        action: AdminAction::from_str(&action)?,
        target_type: row.get("target_type"),
        target_id: row.get("target_id"),
        details: decode_details(row.get("details")),
        created_at: row.get("created_at"),
        admin_name: row.get("admin_name"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_activity_mysql(
    pool: &MySqlPool,
    activity: &NewAdminActivity,
) -> Result<AdminActivity> {
    let result = sqlx::query(
        r#"
        INSERT INTO admin_activities (admin_id, action, target_type, target_id, details, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(activity.admin_id)
    .bind(activity.action.as_str())
    .bind(activity.target_type)
    .bind(activity.target_id)
    .bind(encode_details(&activity.details))
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to record admin activity")?;

    let row = sqlx::query(&format!("{} WHERE l.id = ?", ACTIVITY_SELECT))
        .bind(result.last_insert_id() as i64)
        .fetch_one(pool)
        .await
        .context("Failed to load admin activity")?;

    row_to_activity_mysql(&row)
}

async fn list_activities_mysql(
    pool: &MySqlPool,
    filter: &AdminActivityFilter,
    params: &ListParams,
) -> Result<(Vec<AdminActivity>, i64)> {
    let action = filter.action.map(|a| a.to_string());

    let rows = sqlx::query(&format!(
        "{} WHERE {} ORDER BY l.created_at DESC, l.id DESC LIMIT ? OFFSET ?",
        ACTIVITY_SELECT, ACTIVITY_FILTER
    ))
    .bind(filter.admin_id)
    .bind(filter.admin_id)
    .bind(&action)
    .bind(&action)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await
    .context("Failed to list admin activities")?;

    let count_row = sqlx::query(&format!(
        "SELECT COUNT(*) AS count FROM admin_activities l WHERE {}",
        ACTIVITY_FILTER
    ))
    .bind(filter.admin_id)
    .bind(filter.admin_id)
    .bind(&action)
    .bind(&action)
    .fetch_one(pool)
    .await
    .context("Failed to count admin activities")?;

    let activities = rows
        .iter()
        .map(row_to_activity_mysql)
        .collect::<Result<Vec<_>>>()?;

    Ok((activities, count_row.get("count")))
}

fn row_to_activity_mysql(row: &sqlx::mysql::MySqlRow) -> Result<AdminActivity> {
    let action: String = row.get("action");

    Ok(AdminActivity {
        id: row.get("id"),
        admin_id: row.get("admin_id"),
        action: AdminAction::from_str(&action)?,
        target_type: row.get("target_type"),
        target_id: row.get("target_id"),
        details: decode_details(row.get("details")),
        created_at: row.get("created_at"),
        admin_name: row.get("admin_name"),
    })
}
