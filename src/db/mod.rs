//! Database layer
//!
//! SQLite is the default backend (a single file next to the binary); MySQL
//! is selected with `database.driver: mysql`. Both sit behind the
//! `DatabasePool` trait so repositories and services never name a backend.
//!
//! ```ignore
//! use jobboard::config::DatabaseConfig;
//! use jobboard::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, is_unique_violation, DatabasePool, DynDatabasePool,
    MysqlDatabase, SqliteDatabase,
};
