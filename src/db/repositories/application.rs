//! Application repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Application, ApplicationFilter, ApplicationStatus, ListParams};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const APPLICATION_SELECT: &str = r#"
    SELECT a.id, a.job_id, a.applicant_id, a.cover_letter, a.resume_url, a.status,
           a.created_at, a.updated_at,
           j.title AS job_title, j.employer_id AS employer_id,
           e.company_name AS company_name,
           u.name AS applicant_name, u.email AS applicant_email
    FROM applications a
    JOIN jobs j ON j.id = a.job_id
    JOIN users e ON e.id = j.employer_id
    JOIN users u ON u.id = a.applicant_id
"#;

const APPLICATION_FILTER: &str = r#"
    (? IS NULL OR a.job_id = ?)
    AND (? IS NULL OR a.applicant_id = ?)
    AND (? IS NULL OR j.employer_id = ?)
    AND (? IS NULL OR a.status = ?)
"#;

#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn create(&self, application: &Application) -> Result<Application>;

    /// Get an application with its job and applicant display columns
    async fn get_by_id(&self, id: i64) -> Result<Option<Application>>;

    /// Whether the applicant already applied to the job
    async fn exists(&self, job_id: i64, applicant_id: i64) -> Result<bool>;

    /// A page of applications, newest first, plus the total
    async fn list(
        &self,
        filter: &ApplicationFilter,
        params: &ListParams,
    ) -> Result<(Vec<Application>, i64)>;

    async fn count(&self, filter: &ApplicationFilter) -> Result<i64>;

    /// Set the status and return the updated row
    async fn update_status(&self, id: i64, status: ApplicationStatus) -> Result<Application>;

    async fn delete(&self, id: i64) -> Result<()>;
}

pub struct SqlxApplicationRepository {
    pool: DynDatabasePool,
}

impl SqlxApplicationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ApplicationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ApplicationRepository for SqlxApplicationRepository {
    async fn create(&self, application: &Application) -> Result<Application> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_application_sqlite(self.pool.sqlite()?, application).await
            }
            DatabaseDriver::Mysql => create_application_mysql(self.pool.mysql()?, application).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Application>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_application_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_application_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn exists(&self, job_id: i64, applicant_id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                application_exists_sqlite(self.pool.sqlite()?, job_id, applicant_id).await
            }
            DatabaseDriver::Mysql => {
                application_exists_mysql(self.pool.mysql()?, job_id, applicant_id).await
            }
        }
    }

    async fn list(
        &self,
        filter: &ApplicationFilter,
        params: &ListParams,
    ) -> Result<(Vec<Application>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_applications_sqlite(self.pool.sqlite()?, filter, params).await
            }
            DatabaseDriver::Mysql => {
                list_applications_mysql(self.pool.mysql()?, filter, params).await
            }
        }
    }

    async fn count(&self, filter: &ApplicationFilter) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_applications_sqlite(self.pool.sqlite()?, filter).await,
            DatabaseDriver::Mysql => count_applications_mysql(self.pool.mysql()?, filter).await,
        }
    }

    async fn update_status(&self, id: i64, status: ApplicationStatus) -> Result<Application> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_application_status_sqlite(self.pool.sqlite()?, id, status).await
            }
            DatabaseDriver::Mysql => {
                update_application_status_mysql(self.pool.mysql()?, id, status).await
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_application_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_application_mysql(self.pool.mysql()?, id).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_application_sqlite(
    pool: &SqlitePool,
    application: &Application,
) -> Result<Application> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO applications (job_id, applicant_id, cover_letter, resume_url, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(application.job_id)
    .bind(application.applicant_id)
    .bind(&application.cover_letter)
    .bind(&application.resume_url)
    .bind(application.status.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create application")?;

    get_application_by_id_sqlite(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| anyhow::anyhow!("Application not found after insert"))
}

async fn get_application_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Application>> {
    let row = sqlx::query(&format!("{} WHERE a.id = ?", APPLICATION_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get application by ID")?;

    row.as_ref().map(row_to_application_sqlite).transpose()
}

async fn application_exists_sqlite(pool: &SqlitePool, job_id: i64, applicant_id: i64) -> Result<bool> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM applications WHERE job_id = ? AND applicant_id = ?",
    )
    .bind(job_id)
    .bind(applicant_id)
    .fetch_one(pool)
    .await
    .context("Failed to check existing application")?;

    let count: i64 = row.get("count");
    Ok(count > 0)
}

async fn list_applications_sqlite(
    pool: &SqlitePool,
    filter: &ApplicationFilter,
    params: &ListParams,
) -> Result<(Vec<Application>, i64)> {
    let status = filter.status.map(|s| s.to_string());
    let sql = format!(
        "{} WHERE {} ORDER BY a.created_at DESC, a.id DESC LIMIT ? OFFSET ?",
        APPLICATION_SELECT, APPLICATION_FILTER
    );

    let rows = sqlx::query(&sql)
        .bind(filter.job_id)
        .bind(filter.job_id)
        .bind(filter.applicant_id)
        .bind(filter.applicant_id)
        .bind(filter.employer_id)
        .bind(filter.employer_id)
        .bind(&status)
        .bind(&status)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list applications")?;

    let applications = rows
        .iter()
        .map(row_to_application_sqlite)
        .collect::<Result<Vec<_>>>()?;
    let total = count_applications_sqlite(pool, filter).await?;

    Ok((applications, total))
}

async fn count_applications_sqlite(pool: &SqlitePool, filter: &ApplicationFilter) -> Result<i64> {
    let status = filter.status.map(|s| s.to_string());
    let sql = format!(
        "SELECT COUNT(*) AS count FROM applications a JOIN jobs j ON j.id = a.job_id WHERE {}",
        APPLICATION_FILTER
    );

    let row = sqlx::query(&sql)
        .bind(filter.job_id)
        .bind(filter.job_id)
        .bind(filter.applicant_id)
        .bind(filter.applicant_id)
        .bind(filter.employer_id)
        .bind(filter.employer_id)
        .bind(&status)
        .bind(&status)
        .fetch_one(pool)
        .await
        .context("Failed to count applications")?;

    Ok(row.get("count"))
}

async fn update_application_status_sqlite(
    pool: &SqlitePool,
    id: i64,
    status: ApplicationStatus,
) -> Result<Application> {
    sqlx::query("UPDATE applications SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update application status")?;

    get_application_by_id_sqlite(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Application not found after update"))
}

async fn delete_application_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM applications WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete application")?;

    Ok(())
}

fn row_to_application_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Application> {
    let status: String = row.get("status");

    Ok(Application {
        id: row.get("id"),
        job_id: row.get("job_id"),
        applicant_id: row.get("applicant_id"),
        cover_letter: row.get("cover_letter"),
        resume_url: row.get("resume_url"),
        status: ApplicationStatus::from_str(&status)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        job_title: row.get("job_title"),
        employer_id: row.get("employer_id"),
        company_name: row.get("company_name"),
        applicant_name: row.get("applicant_name"),
        applicant_email: row.get("applicant_email"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_application_mysql(
    pool: &MySqlPool,
    application: &Application,
) -> Result<Application> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO applications (job_id, applicant_id, cover_letter, resume_url, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(application.job_id)
    .bind(application.applicant_id)
    .bind(&application.cover_letter)
    .bind(&application.resume_url)
    .bind(application.status.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create application")?;

    get_application_by_id_mysql(pool, result.last_insert_id() as i64)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Application not found after insert"))
}

async fn get_application_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Application>> {
    let row = sqlx::query(&format!("{} WHERE a.id = ?", APPLICATION_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get application by ID")?;

    row.as_ref().map(row_to_application_mysql).transpose()
}

async fn application_exists_mysql(pool: &MySqlPool, job_id: i64, applicant_id: i64) -> Result<bool> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM applications WHERE job_id = ? AND applicant_id = ?",
    )
    .bind(job_id)
    .bind(applicant_id)
    .fetch_one(pool)
    .await
    .context("Failed to check existing application")?;

    let count: i64 = row.get("count");
    Ok(count > 0)
}

async fn list_applications_mysql(
    pool: &MySqlPool,
    filter: &ApplicationFilter,
    params: &ListParams,
) -> Result<(Vec<Application>, i64)> {
    let status = filter.status.map(|s| s.to_string());
    let sql = format!(
        "{} WHERE {} ORDER BY a.created_at DESC, a.id DESC LIMIT ? OFFSET ?",
        APPLICATION_SELECT, APPLICATION_FILTER
    );

    let rows = sqlx::query(&sql)
        .bind(filter.job_id)
        .bind(filter.job_id)
        .bind(filter.applicant_id)
        .bind(filter.applicant_id)
        .bind(filter.employer_id)
        .bind(filter.employer_id)
        .bind(&status)
        .bind(&status)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list applications")?;

    let applications = rows
        .iter()
        .map(row_to_application_mysql)
        .collect::<Result<Vec<_>>>()?;
    let total = count_applications_mysql(pool, filter).await?;

    Ok((applications, total))
}

async fn count_applications_mysql(pool: &MySqlPool, filter: &ApplicationFilter) -> Result<i64> {
    let status = filter.status.map(|s| s.to_string());
    let sql = format!(
        "SELECT COUNT(*) AS count FROM applications a JOIN jobs j ON j.id = a.job_id WHERE {}",
        APPLICATION_FILTER
    );

    let row = sqlx::query(&sql)
        .bind(filter.job_id)
        .bind(filter.job_id)
        .bind(filter.applicant_id)
        .bind(filter.applicant_id)
        .bind(filter.employer_id)
        .bind(filter.employer_id)
        .bind(&status)
        .bind(&status)
        .fetch_one(pool)
        .await
        .context("Failed to count applications")?;

    Ok(row.get("count"))
}

async fn update_application_status_mysql(
    pool: &MySqlPool,
    id: i64,
    status: ApplicationStatus,
) -> Result<Application> {
    sqlx::query("UPDATE applications SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update application status")?;

    get_application_by_id_mysql(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Application not found after update"))
}

async fn delete_application_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM applications WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete application")?;

    Ok(())
}

fn row_to_application_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Application> {
    let status: String = row.get("status");

    Ok(Application {
        id: row.get("id"),
        job_id: row.get("job_id"),
        applicant_id: row.get("applicant_id"),
        cover_letter: row.get("cover_letter"),
        resume_url: row.get("resume_url"),
        status: ApplicationStatus::from_str(&status)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        job_title: row.get("job_title"),
        employer_id: row.get("employer_id"),
        company_name: row.get("company_name"),
        applicant_name: row.get("applicant_name"),
        applicant_email: row.get("applicant_email"),
    })
}
