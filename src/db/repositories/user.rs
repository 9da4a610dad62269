//! User repository
//!
//! - `UserRepository` trait defining user data access
//! - `SqlxUserRepository` implementing it for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, User, UserFilter, UserRole, UserStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const USER_COLUMNS: &str = "id, name, email, password_hash, role, status, phone, location, bio, \
     avatar, resume_url, company_name, company_website, created_at, updated_at";

const USER_FILTER: &str = "(? IS NULL OR role = ?) AND (? IS NULL OR status = ?) \
     AND (? IS NULL OR name LIKE ? OR email LIKE ? OR company_name LIKE ?)";

/// Persistence for user accounts
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user and return it with its new id
    async fn create(&self, user: &User) -> Result<User>;

    /// Get a user by id
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Lookup by email (expects a normalized, lowercase address)
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Persist every mutable column of `user`
    async fn update(&self, user: &User) -> Result<User>;

    /// Delete a user; dependent rows go with it
    async fn delete(&self, id: i64) -> Result<()>;

    /// Count users matching `filter`
    async fn count(&self, filter: &UserFilter) -> Result<i64>;

    /// Newest first
    async fn list(&self, filter: &UserFilter, params: &ListParams) -> Result<(Vec<User>, i64)>;
}

/// SQLx-based user repository implementation
/// SQLx-backed users for SQLite and MySQL.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a repository over the shared pool
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Boxed form handed to services
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_user_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_email_sqlite(self.pool.sqlite()?, email).await,
            DatabaseDriver::Mysql => get_user_by_email_mysql(self.pool.mysql()?, email).await,
        }
    }

    async fn update(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => update_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_user_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_user_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn count(&self, filter: &UserFilter) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_users_sqlite(self.pool.sqlite()?, filter).await,
            DatabaseDriver::Mysql => count_users_mysql(self.pool.mysql()?, filter).await,
        }
    }

    async fn list(&self, filter: &UserFilter, params: &ListParams) -> Result<(Vec<User>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_users_sqlite(self.pool.sqlite()?, filter, params).await,
            DatabaseDriver::Mysql => list_users_mysql(self.pool.mysql()?, filter, params).await,
        }
    }
}

/// Bind values for `USER_FILTER`, in placeholder order.
struct UserFilterBinds {
    role: Option<String>,
    status: Option<String>,
    pattern: Option<String>,
}

impl From<&UserFilter> for UserFilterBinds {
    fn from(filter: &UserFilter) -> Self {
        Self {
            role: filter.role.map(|r| r.to_string()),
            status: filter.status.map(|s| s.to_string()),
            pattern: filter
                .keyword
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(|k| format!("%{}%", k)),
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, role, status, phone, location, bio,
                           avatar, resume_url, company_name, company_website, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(user.status.as_str())
    .bind(&user.phone)
    .bind(&user.location)
    .bind(&user.bio)
    .bind(&user.avatar)
    .bind(&user.resume_url)
    .bind(&user.company_name)
    .bind(&user.company_website)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn get_user_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn update_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    sqlx::query(
        r#"
        UPDATE users
        SET name = ?, email = ?, password_hash = ?, role = ?, status = ?, phone = ?, location = ?,
            bio = ?, avatar = ?, resume_url = ?, company_name = ?, company_website = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(user.status.as_str())
    .bind(&user.phone)
    .bind(&user.location)
    .bind(&user.bio)
    .bind(&user.avatar)
    .bind(&user.resume_url)
    .bind(&user.company_name)
    .bind(&user.company_website)
    .bind(Utc::now())
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    get_user_by_id_sqlite(pool, user.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

async fn delete_user_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete user")?;

    Ok(())
}

async fn count_users_sqlite(pool: &SqlitePool, filter: &UserFilter) -> Result<i64> {
    let binds = UserFilterBinds::from(filter);
    let row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM users WHERE {}", USER_FILTER))
        .bind(&binds.role)
        .bind(&binds.role)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn list_users_sqlite(
    pool: &SqlitePool,
    filter: &UserFilter,
    params: &ListParams,
) -> Result<(Vec<User>, i64)> {
    let binds = UserFilterBinds::from(filter);
    let rows = sqlx::query(&format!(
        "SELECT {} FROM users WHERE {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        USER_COLUMNS, USER_FILTER
    ))
    .bind(&binds.role)
    .bind(&binds.role)
    .bind(&binds.status)
    .bind(&binds.status)
    .bind(&binds.pattern)
    .bind(&binds.pattern)
    .bind(&binds.pattern)
    .bind(&binds.pattern)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await
    .context("Failed to list users")?;

    let users = rows.iter().map(row_to_user_sqlite).collect::<Result<Vec<_>>>()?;
    let total = count_users_sqlite(pool, filter).await?;

    Ok((users, total))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;
    let status_str: String = row.get("status");
    let status = UserStatus::from_str(&status_str).unwrap_or_default();

    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        status,
        phone: row.get("phone"),
        location: row.get("location"),
        bio: row.get("bio"),
        avatar: row.get("avatar"),
        resume_url: row.get("resume_url"),
        company_name: row.get("company_name"),
        company_website: row.get("company_website"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, role, status, phone, location, bio,
                           avatar, resume_url, company_name, company_website, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(user.status.as_str())
    .bind(&user.phone)
    .bind(&user.location)
    .bind(&user.bio)
    .bind(&user.avatar)
    .bind(&user.resume_url)
    .bind(&user.company_name)
    .bind(&user.company_website)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn get_user_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn update_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    sqlx::query(
        r#"
        UPDATE users
        SET name = ?, email = ?, password_hash = ?, role = ?, status = ?, phone = ?, location = ?,
            bio = ?, avatar = ?, resume_url = ?, company_name = ?, company_website = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(user.status.as_str())
    .bind(&user.phone)
    .bind(&user.location)
    .bind(&user.bio)
    .bind(&user.avatar)
    .bind(&user.resume_url)
    .bind(&user.company_name)
    .bind(&user.company_website)
    .bind(Utc::now())
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    get_user_by_id_mysql(pool, user.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

async fn delete_user_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete user")?;

    Ok(())
}

async fn count_users_mysql(pool: &MySqlPool, filter: &UserFilter) -> Result<i64> {
    let binds = UserFilterBinds::from(filter);
    let row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM users WHERE {}", USER_FILTER))
        .bind(&binds.role)
        .bind(&binds.role)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn list_users_mysql(
    pool: &MySqlPool,
    filter: &UserFilter,
    params: &ListParams,
) -> Result<(Vec<User>, i64)> {
    let binds = UserFilterBinds::from(filter);
    let rows = sqlx::query(&format!(
        "SELECT {} FROM users WHERE {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        USER_COLUMNS, USER_FILTER
    ))
    .bind(&binds.role)
    .bind(&binds.role)
    .bind(&binds.status)
    .bind(&binds.status)
    .bind(&binds.pattern)
    .bind(&binds.pattern)
    .bind(&binds.pattern)
    .bind(&binds.pattern)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await
    .context("Failed to list users")?;

    let users = rows.iter().map(row_to_user_mysql).collect::<Result<Vec<_>>>()?;
    let total = count_users_mysql(pool, filter).await?;

    Ok((users, total))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;
    let status_str: String = row.get("status");
    let status = UserStatus::from_str(&status_str).unwrap_or_default();

    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        status,
        phone: row.get("phone"),
        location: row.get("location"),
        bio: row.get("bio"),
        avatar: row.get("avatar"),
        resume_url: row.get("resume_url"),
        company_name: row.get("company_name"),
        company_website: row.get("company_website"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
