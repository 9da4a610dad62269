//! Job repository
//!
//! Listing queries join the employer row for display fields and count
//! applications per job. Filters are a fixed `WHERE` clause where every
//! condition is disabled by binding NULL, so the SQL text only varies by
//! sort order.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    CategoryCount, ExperienceLevel, Job, JobFilter, JobStatus, JobType, ListParams,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::database::HasArguments;
use sqlx::query::Query;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const JOB_SELECT: &str = r#"
    SELECT j.id, j.employer_id, j.title, j.description, j.requirements, j.location, j.category,
           j.job_type, j.experience_level, j.salary_min, j.salary_max, j.currency, j.is_remote,
           j.status, j.views, j.deadline, j.created_at, j.updated_at,
           u.name AS employer_name, u.company_name AS company_name,
           (SELECT COUNT(*) FROM applications a WHERE a.job_id = j.id) AS applications_count
    FROM jobs j
    JOIN users u ON u.id = j.employer_id
"#;

const JOB_FILTER: &str = r#"
    (? IS NULL OR j.title LIKE ? OR j.description LIKE ? OR u.company_name LIKE ?)
    AND (? IS NULL OR j.location LIKE ?)
    AND (? IS NULL OR LOWER(j.category) = LOWER(?))
    AND (? IS NULL OR j.job_type = ?)
    AND (? IS NULL OR j.experience_level = ?)
    AND (? IS NULL OR j.is_remote = ?)
    AND (? IS NULL OR COALESCE(j.salary_max, j.salary_min) >= ?)
    AND (? IS NULL OR COALESCE(j.salary_min, j.salary_max) <= ?)
    AND (? IS NULL OR j.employer_id = ?)
    AND (? IS NULL OR j.status = ?)
"#;

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a job and return it with its new id
    async fn create(&self, job: &Job) -> Result<Job>;

    /// Get a job with its employer display columns
    async fn get_by_id(&self, id: i64) -> Result<Option<Job>>;

    /// Persist every mutable column of `job`
    async fn update(&self, job: &Job) -> Result<Job>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// A page of jobs plus the total number of matches
    async fn list(&self, filter: &JobFilter, params: &ListParams) -> Result<(Vec<Job>, i64)>;

    async fn count(&self, filter: &JobFilter) -> Result<i64>;

    /// Bump the view counter by one
    async fn increment_views(&self, id: i64) -> Result<()>;

    /// Open-job counts per category, largest first
    async fn categories(&self) -> Result<Vec<CategoryCount>>;
}

pub struct SqlxJobRepository {
    pool: DynDatabasePool,
}

impl SqlxJobRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn JobRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl JobRepository for SqlxJobRepository {
    async fn create(&self, job: &Job) -> Result<Job> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_job_sqlite(self.pool.sqlite()?, job).await,
            DatabaseDriver::Mysql => create_job_mysql(self.pool.mysql()?, job).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Job>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_job_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_job_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn update(&self, job: &Job) -> Result<Job> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_job_sqlite(self.pool.sqlite()?, job).await,
            DatabaseDriver::Mysql => update_job_mysql(self.pool.mysql()?, job).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_job_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_job_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list(&self, filter: &JobFilter, params: &ListParams) -> Result<(Vec<Job>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_jobs_sqlite(self.pool.sqlite()?, filter, params).await,
            DatabaseDriver::Mysql => list_jobs_mysql(self.pool.mysql()?, filter, params).await,
        }
    }

    async fn count(&self, filter: &JobFilter) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_jobs_sqlite(self.pool.sqlite()?, filter).await,
            DatabaseDriver::Mysql => count_jobs_mysql(self.pool.mysql()?, filter).await,
        }
    }

    async fn increment_views(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => increment_job_views_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => increment_job_views_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn categories(&self) -> Result<Vec<CategoryCount>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => job_categories_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => job_categories_mysql(self.pool.mysql()?).await,
        }
    }
}

/// Bind values for `JOB_FILTER`
struct JobFilterBinds {
    keyword: Option<String>,
    location: Option<String>,
    category: Option<String>,
    job_type: Option<String>,
    experience_level: Option<String>,
    remote: Option<bool>,
    salary_min: Option<i64>,
    salary_max: Option<i64>,
    employer_id: Option<i64>,
    status: Option<String>,
}

fn like_pattern(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| format!("%{}%", v))
}

impl From<&JobFilter> for JobFilterBinds {
    fn from(filter: &JobFilter) -> Self {
        Self {
            keyword: like_pattern(filter.keyword.as_deref()),
            location: like_pattern(filter.location.as_deref()),
            category: filter
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            job_type: filter.job_type.map(|t| t.to_string()),
            experience_level: filter.experience_level.map(|e| e.to_string()),
            remote: filter.remote,
            salary_min: filter.salary_min,
            salary_max: filter.salary_max,
            employer_id: filter.employer_id,
            status: filter.status.map(|s| s.to_string()),
        }
    }
}

type ArgumentsOf<'q, DB> = <DB as HasArguments<'q>>::Arguments;

/// Bind `JOB_FILTER` placeholders in order; shared by both backends.
fn bind_job_filter<'q, DB>(
    query: Query<'q, DB, ArgumentsOf<'q, DB>>,
    f: &JobFilterBinds,
) -> Query<'q, DB, ArgumentsOf<'q, DB>>
where
    DB: sqlx::Database,
    Option<String>: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    Option<bool>: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    Option<i64>: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
{
    query
        .bind(f.keyword.clone())
        .bind(f.keyword.clone())
        .bind(f.keyword.clone())
        .bind(f.keyword.clone())
        .bind(f.location.clone())
        .bind(f.location.clone())
        .bind(f.category.clone())
        .bind(f.category.clone())
        .bind(f.job_type.clone())
        .bind(f.job_type.clone())
        .bind(f.experience_level.clone())
        .bind(f.experience_level.clone())
        .bind(f.remote)
        .bind(f.remote)
        .bind(f.salary_min)
        .bind(f.salary_min)
        .bind(f.salary_max)
        .bind(f.salary_max)
        .bind(f.employer_id)
        .bind(f.employer_id)
        .bind(f.status.clone())
        .bind(f.status.clone())
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_job_sqlite(pool: &SqlitePool, job: &Job) -> Result<Job> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO jobs (employer_id, title, description, requirements, location, category,
                          job_type, experience_level, salary_min, salary_max, currency, is_remote,
                          status, views, deadline, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(job.employer_id)
    .bind(&job.title)
    .bind(&job.description)
    .bind(&job.requirements)
    .bind(&job.location)
    .bind(&job.category)
    .bind(job.job_type.as_str())
    .bind(job.experience_level.as_str())
    .bind(job.salary_min)
    .bind(job.salary_max)
    .bind(&job.currency)
    .bind(job.is_remote)
    .bind(job.status.as_str())
    .bind(job.deadline)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create job")?;

    get_job_by_id_sqlite(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| anyhow::anyhow!("Job not found after insert"))
}

async fn get_job_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Job>> {
    let row = sqlx::query(&format!("{} WHERE j.id = ?", JOB_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get job by ID")?;

    row.as_ref().map(row_to_job_sqlite).transpose()
}

async fn update_job_sqlite(pool: &SqlitePool, job: &Job) -> Result<Job> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET title = ?, description = ?, requirements = ?, location = ?, category = ?,
            job_type = ?, experience_level = ?, salary_min = ?, salary_max = ?, currency = ?,
            is_remote = ?, status = ?, deadline = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&job.title)
    .bind(&job.description)
    .bind(&job.requirements)
    .bind(&job.location)
    .bind(&job.category)
    .bind(job.job_type.as_str())
    .bind(job.experience_level.as_str())
    .bind(job.salary_min)
    .bind(job.salary_max)
    .bind(&job.currency)
    .bind(job.is_remote)
    .bind(job.status.as_str())
    .bind(job.deadline)
    .bind(Utc::now())
    .bind(job.id)
    .execute(pool)
    .await
    .context("Failed to update job")?;

    get_job_by_id_sqlite(pool, job.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Job not found after update"))
}

async fn delete_job_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM jobs WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete job")?;

    Ok(())
}

async fn list_jobs_sqlite(
    pool: &SqlitePool,
    filter: &JobFilter,
    params: &ListParams,
) -> Result<(Vec<Job>, i64)> {
    let binds = JobFilterBinds::from(filter);
    let sql = format!(
        "{} WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
        JOB_SELECT,
        JOB_FILTER,
        filter.sort.order_clause()
    );

    let rows = bind_job_filter(sqlx::query(&sql), &binds)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list jobs")?;

    let jobs = rows.iter().map(row_to_job_sqlite).collect::<Result<Vec<_>>>()?;
    let total = count_jobs_sqlite(pool, filter).await?;

    Ok((jobs, total))
}

async fn count_jobs_sqlite(pool: &SqlitePool, filter: &JobFilter) -> Result<i64> {
    let binds = JobFilterBinds::from(filter);
    let sql = format!(
        "SELECT COUNT(*) AS count FROM jobs j JOIN users u ON u.id = j.employer_id WHERE {}",
        JOB_FILTER
    );

    let row = bind_job_filter(sqlx::query(&sql), &binds)
        .fetch_one(pool)
        .await
        .context("Failed to count jobs")?;

    Ok(row.get("count"))
}

async fn increment_job_views_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE jobs SET views = views + 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to increment job views")?;

    Ok(())
}

async fn job_categories_sqlite(pool: &SqlitePool) -> Result<Vec<CategoryCount>> {
    let rows = sqlx::query(
        r#"
        SELECT category, COUNT(*) AS count
        FROM jobs
        WHERE status = 'open'
        GROUP BY category
        ORDER BY count DESC, category ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to aggregate job categories")?;

    Ok(rows
        .iter()
        .map(|row| CategoryCount {
            category: row.get("category"),
            count: row.get("count"),
        })
        .collect())
}

fn row_to_job_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Job> {
    let job_type: String = row.get("job_type");
    let experience_level: String = row.get("experience_level");
    let status: String = row.get("status");

    Ok(Job {
        id: row.get("id"),
        employer_id: row.get("employer_id"),
        title: row.get("title"),
        description: row.get("description"),
        requirements: row.get("requirements"),
        location: row.get("location"),
        category: row.get("category"),
        job_type: JobType::from_str(&job_type)?,
        experience_level: ExperienceLevel::from_str(&experience_level)?,
        salary_min: row.get("salary_min"),
        salary_max: row.get("salary_max"),
        currency: row.get("currency"),
        is_remote: row.get("is_remote"),
        status: JobStatus::from_str(&status)?,
        views: row.get("views"),
        deadline: row.get("deadline"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        employer_name: row.get("employer_name"),
        company_name: row.get("company_name"),
        applications_count: row.get("applications_count"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_job_mysql(pool: &MySqlPool, job: &Job) -> Result<Job> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO jobs (employer_id, title, description, requirements, location, category,
                          job_type, experience_level, salary_min, salary_max, currency, is_remote,
                          status, views, deadline, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(job.employer_id)
    .bind(&job.title)
    .bind(&job.description)
    .bind(&job.requirements)
    .bind(&job.location)
    .bind(&job.category)
    .bind(job.job_type.as_str())
    .bind(job.experience_level.as_str())
    .bind(job.salary_min)
    .bind(job.salary_max)
    .bind(&job.currency)
    .bind(job.is_remote)
    .bind(job.status.as_str())
    .bind(job.deadline)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create job")?;

    get_job_by_id_mysql(pool, result.last_insert_id() as i64)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Job not found after insert"))
}

async fn get_job_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Job>> {
    let row = sqlx::query(&format!("{} WHERE j.id = ?", JOB_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get job by ID")?;

    row.as_ref().map(row_to_job_mysql).transpose()
}

async fn update_job_mysql(pool: &MySqlPool, job: &Job) -> Result<Job> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET title = ?, description = ?, requirements = ?, location = ?, category = ?,
            job_type = ?, experience_level = ?, salary_min = ?, salary_max = ?, currency = ?,
            is_remote = ?, status = ?, deadline = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&job.title)
    .bind(&job.description)
    .bind(&job.requirements)
    .bind(&job.location)
    .bind(&job.category)
    .bind(job.job_type.as_str())
    .bind(job.experience_level.as_str())
    .bind(job.salary_min)
    .bind(job.salary_max)
    .bind(&job.currency)
    .bind(job.is_remote)
    .bind(job.status.as_str())
    .bind(job.deadline)
    .bind(Utc::now())
    .bind(job.id)
    .execute(pool)
    .await
    .context("Failed to update job")?;

    get_job_by_id_mysql(pool, job.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Job not found after update"))
}

async fn delete_job_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM jobs WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete job")?;

    Ok(())
}

async fn list_jobs_mysql(
    pool: &MySqlPool,
    filter: &JobFilter,
    params: &ListParams,
) -> Result<(Vec<Job>, i64)> {
    let binds = JobFilterBinds::from(filter);
    let sql = format!(
        "{} WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
        JOB_SELECT,
        JOB_FILTER,
        filter.sort.order_clause()
    );

    let rows = bind_job_filter(sqlx::query(&sql), &binds)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list jobs")?;

    let jobs = rows.iter().map(row_to_job_mysql).collect::<Result<Vec<_>>>()?;
    let total = count_jobs_mysql(pool, filter).await?;

    Ok((jobs, total))
}

async fn count_jobs_mysql(pool: &MySqlPool, filter: &JobFilter) -> Result<i64> {
    let binds = JobFilterBinds::from(filter);
    let sql = format!(
        "SELECT COUNT(*) AS count FROM jobs j JOIN users u ON u.id = j.employer_id WHERE {}",
        JOB_FILTER
    );

    let row = bind_job_filter(sqlx::query(&sql), &binds)
        .fetch_one(pool)
        .await
        .context("Failed to count jobs")?;

    Ok(row.get("count"))
}

async fn increment_job_views_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("UPDATE jobs SET views = views + 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to increment job views")?;

    Ok(())
}

async fn job_categories_mysql(pool: &MySqlPool) -> Result<Vec<CategoryCount>> {
    let rows = sqlx::query(
        r#"
        SELECT category, COUNT(*) AS count
        FROM jobs
        WHERE status = 'open'
        GROUP BY category
        ORDER BY count DESC, category ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to aggregate job categories")?;

    Ok(rows
        .iter()
        .map(|row| CategoryCount {
            category: row.get("category"),
            count: row.get("count"),
        })
        .collect())
}

fn row_to_job_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Job> {
    let job_type: String = row.get("job_type");
    let experience_level: String = row.get("experience_level");
    let status: String = row.get("status");

    Ok(Job {
        id: row.get("id"),
        employer_id: row.get("employer_id"),
        title: row.get("title"),
        description: row.get("description"),
        requirements: row.get("requirements"),
        location: row.get("location"),
        category: row.get("category"),
        job_type: JobType::from_str(&job_type)?,
        experience_level: ExperienceLevel::from_str(&experience_level)?,
        salary_min: row.get("salary_min"),
        salary_max: row.get("salary_max"),
        currency: row.get("currency"),
        is_remote: row.get("is_remote"),
        status: JobStatus::from_str(&status)?,
        views: row.get("views"),
        deadline: row.get("deadline"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        employer_name: row.get("employer_name"),
        company_name: row.get("company_name"),
        applications_count: row.get("applications_count"),
    })
}
