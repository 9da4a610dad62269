//! Database connection pool abstraction
//!
//! A unified interface over SQLite and MySQL. The backend is chosen from
//! `DatabaseConfig::driver`; repositories branch on `driver()` and borrow the
//! concrete pool through `sqlite()` / `mysql()`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions},
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{DatabaseConfig, DatabaseDriver};

const SQLITE_MAX_CONNECTIONS: u32 = 16;
const MYSQL_MAX_CONNECTIONS: u32 = 20;
/// Writers wait this long for the SQLite lock before failing
const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Backend-neutral handle shared by every repository.
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Run a statement that returns no rows; yields the affected row count.
    async fn execute(&self, query: &str) -> Result<u64>;

    async fn ping(&self) -> Result<()>;

    async fn close(&self);

    fn driver(&self) -> DatabaseDriver;

    fn as_sqlite(&self) -> Option<&SqlitePool>;

    fn as_mysql(&self) -> Option<&MySqlPool>;

    /// SQLite pool, or an error when the backend is MySQL
    fn sqlite(&self) -> Result<&SqlitePool> {
        self.as_sqlite().context("Expected a SQLite connection pool")
    }

    /// MySQL pool, or an error when the backend is SQLite
    fn mysql(&self) -> Result<&MySqlPool> {
        self.as_mysql().context("Expected a MySQL connection pool")
    }
}

pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let connected = if is_memory_url(url) {
            // Each connection to `:memory:` opens its own database, so the
            // pool holds exactly one connection for its whole life.
            let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
        } else {
            let options = sqlite_file_options(url)?;
            SqlitePoolOptions::new()
                .max_connections(SQLITE_MAX_CONNECTIONS)
                .connect_with(options)
                .await
        };
        let pool =
            connected.with_context(|| format!("Failed to connect to SQLite database: {}", url))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_memory_url(url: &str) -> bool {
    url == ":memory:" || url.starts_with("sqlite::memory:")
}

/// Options for a file database; the parent directory is created on demand.
fn sqlite_file_options(url: &str) -> Result<SqliteConnectOptions> {
    let path = url.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
    }

    let options = if url.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid SQLite URL: {}", url))?
    } else {
        SqliteConnectOptions::new().filename(path)
    };

    Ok(options
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(SQLITE_BUSY_TIMEOUT))
}

#[async_trait]
impl DatabasePool for SqliteDatabase {
    async fn execute(&self, query: &str) -> Result<u64> {
        let result = sqlx::query(query)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to execute query: {}", query))?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("SQLite ping failed")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Sqlite
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        Some(&self.pool)
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        None
    }
}

pub struct MysqlDatabase {
    pool: MySqlPool,
}

impl MysqlDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let url = if url.starts_with("mysql://") {
            url.to_string()
        } else {
            format!("mysql://{}", url)
        };
        let options = MySqlConnectOptions::from_str(&url)
            .context("Invalid MySQL URL")?
            .charset("utf8mb4");

        let pool = MySqlPoolOptions::new()
            .max_connections(MYSQL_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .context("Failed to connect to MySQL database")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl DatabasePool for MysqlDatabase {
    async fn execute(&self, query: &str) -> Result<u64> {
        let result = sqlx::query(query)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to execute query: {}", query))?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("MySQL ping failed")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Mysql
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        None
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        Some(&self.pool)
    }
}

pub type DynDatabasePool = Arc<dyn DatabasePool>;

pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let pool: DynDatabasePool = match config.driver {
        DatabaseDriver::Sqlite => Arc::new(SqliteDatabase::new(&config.url).await?),
        DatabaseDriver::Mysql => Arc::new(MysqlDatabase::new(&config.url).await?),
    };
    Ok(pool)
}

/// Whether a repository error was caused by a UNIQUE constraint.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .is_some_and(|db| db.is_unique_violation())
    })
}

/// In-memory SQLite pool for tests.
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    let config = DatabaseConfig {
        driver: DatabaseDriver::Sqlite,
        url: ":memory:".to_string(),
    };
    create_pool(&config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_config(url: impl Into<String>) -> DatabaseConfig {
        DatabaseConfig {
            driver: DatabaseDriver::Sqlite,
            url: url.into(),
        }
    }

    #[tokio::test]
    async fn test_memory_pool() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        assert_eq!(pool.driver(), DatabaseDriver::Sqlite);
        assert!(pool.sqlite().is_ok());
        assert!(pool.mysql().is_err());
        pool.ping().await.expect("Ping should succeed");
    }

    #[tokio::test]
    async fn test_memory_pool_keeps_state_across_queries() {
        let pool = create_test_pool().await.unwrap();
        pool.execute("CREATE TABLE jobs_scratch (id INTEGER PRIMARY KEY)")
            .await
            .unwrap();
        for _ in 0..5 {
            let affected = pool.execute("INSERT INTO jobs_scratch DEFAULT VALUES").await.unwrap();
            assert_eq!(affected, 1);
        }
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs_scratch")
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn test_memory_pool_enforces_foreign_keys() {
        let pool = create_test_pool().await.unwrap();
        pool.execute("CREATE TABLE employers (id INTEGER PRIMARY KEY)")
            .await
            .unwrap();
        pool.execute(
            "CREATE TABLE postings (id INTEGER PRIMARY KEY, \
             employer_id INTEGER NOT NULL REFERENCES employers(id))",
        )
        .await
        .unwrap();

        let orphan = pool
            .execute("INSERT INTO postings (employer_id) VALUES (42)")
            .await;
        assert!(orphan.is_err());
    }

    #[tokio::test]
    async fn test_unique_violation_detection() {
        let pool = create_test_pool().await.unwrap();
        pool.execute("CREATE TABLE accounts (email TEXT NOT NULL UNIQUE)")
            .await
            .unwrap();
        pool.execute("INSERT INTO accounts (email) VALUES ('a@b.test')")
            .await
            .unwrap();

        let duplicate = pool
            .execute("INSERT INTO accounts (email) VALUES ('a@b.test')")
            .await
            .unwrap_err();
        assert!(is_unique_violation(&duplicate));

        let other = pool.execute("INSERT INTO missing_table VALUES (1)").await.unwrap_err();
        assert!(!is_unique_violation(&other));
    }

    #[tokio::test]
    async fn test_file_pool_creates_nested_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("data").join("nested").join("jobboard.db");

        let pool = create_pool(&sqlite_config(db_path.to_string_lossy()))
            .await
            .expect("Failed to create pool");
        pool.ping().await.expect("Ping should succeed");
        assert!(db_path.exists());

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn test_file_pool_accepts_sqlite_urls() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("jobboard.db");
        let url = format!("sqlite:{}", db_path.display());

        let pool = create_pool(&sqlite_config(url)).await.expect("Failed to create pool");
        pool.ping().await.unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_is_memory_url() {
        assert!(is_memory_url(":memory:"));
        assert!(is_memory_url("sqlite::memory:"));
        assert!(!is_memory_url("data/jobboard.db"));
    }

    // Set MYSQL_TEST_URL to run against a real server
    #[tokio::test]
    #[ignore = "Requires MySQL server"]
    async fn test_mysql_pool() {
        let url = std::env::var("MYSQL_TEST_URL")
            .unwrap_or_else(|_| "mysql://root@localhost/jobboard_test".to_string());
        let config = DatabaseConfig {
            driver: DatabaseDriver::Mysql,
            url,
        };

        let pool = create_pool(&config).await.expect("Failed to create pool");
        assert_eq!(pool.driver(), DatabaseDriver::Mysql);
        assert!(pool.mysql().is_ok());
        pool.ping().await.expect("Ping should succeed");
    }
}
