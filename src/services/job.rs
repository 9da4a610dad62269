//! Job service
//!
//! Public listings and the category aggregate are served through the
//! stale-while-revalidate cache under the `jobs:` prefix; every mutation
//! drops that prefix. Employers are held to the job-post quota of their
//! current plan.

use crate::cache::SwrCache;
use crate::db::repositories::JobRepository;
use crate::models::{
    CategoryCount, CreateJobInput, Job, JobFilter, JobStatus, ListParams, Metric, PagedResult,
    UpdateJobInput, User,
};
use crate::services::analytics::AnalyticsService;
use crate::services::subscription::{SubscriptionService, SubscriptionServiceError};
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const CACHE_PREFIX: &str = "jobs:";
const CATEGORIES_KEY: &str = "jobs:categories";

const MAX_TITLE_LENGTH: usize = 255;
const DEFAULT_CURRENCY: &str = "IDR";

#[derive(Debug, thiserror::Error)]
pub enum JobServiceError {
    #[error("Job not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Job post limit reached: your plan allows {limit} open jobs")]
    QuotaExceeded { limit: i64 },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<SubscriptionServiceError> for JobServiceError {
    fn from(e: SubscriptionServiceError) -> Self {
        JobServiceError::InternalError(anyhow::anyhow!(e))
    }
}

pub struct JobService {
    repo: Arc<dyn JobRepository>,
    cache: SwrCache,
    subscriptions: Arc<SubscriptionService>,
    analytics: Arc<AnalyticsService>,
}

impl JobService {
    pub fn new(
        repo: Arc<dyn JobRepository>,
        cache: SwrCache,
        subscriptions: Arc<SubscriptionService>,
        analytics: Arc<AnalyticsService>,
    ) -> Self {
        Self {
            repo,
            cache,
            subscriptions,
            analytics,
        }
    }

    /// Open jobs matching `filter`, cached per query and page.
    pub async fn list_public(
        &self,
        filter: &JobFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Job>, JobServiceError> {
        let mut filter = filter.clone();
        filter.status = Some(JobStatus::Open);

        let key = format!(
            "{}list:{}|p={}|n={}",
            CACHE_PREFIX,
            filter.cache_fragment(),
            params.page,
            params.per_page
        );
        let repo = self.repo.clone();
        let params = *params;

        let page = self
            .cache
            .get(&key, move || async move {
                let (items, total) = repo.list(&filter, &params).await?;
                Ok(PagedResult::new(items, total, &params))
            })
            .await?;
        Ok(page)
    }

    /// Uncached listing in any status (employer dashboards and admin)
    pub async fn list(
        &self,
        filter: &JobFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Job>, JobServiceError> {
        let (items, total) = self
            .repo
            .list(filter, params)
            .await
            .context("Failed to list jobs")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn list_for_employer(
        &self,
        employer_id: i64,
        status: Option<JobStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<Job>, JobServiceError> {
        let filter = JobFilter {
            employer_id: Some(employer_id),
            status,
            ..Default::default()
        };
        self.list(&filter, params).await
    }

    pub async fn count(&self, filter: &JobFilter) -> Result<i64, JobServiceError> {
        Ok(self.repo.count(filter).await.context("Failed to count jobs")?)
    }

    pub async fn categories(&self) -> Result<Vec<CategoryCount>, JobServiceError> {
        let repo = self.repo.clone();
        let categories = self
            .cache
            .get(CATEGORIES_KEY, move || async move { repo.categories().await })
            .await?;
        Ok(categories)
    }

    pub async fn get(&self, id: i64) -> Result<Job, JobServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get job")?
            .ok_or(JobServiceError::NotFound)
    }

    /// Fetch a job for its detail page and count the view.
    pub async fn view(&self, id: i64) -> Result<Job, JobServiceError> {
        let mut job = self.get(id).await?;
        self.repo
            .increment_views(id)
            .await
            .context("Failed to count job view")?;
        job.views += 1;
        self.analytics.record(Metric::JobView).await;
        Ok(job)
    }

    pub async fn create(&self, user: &User, input: CreateJobInput) -> Result<Job, JobServiceError> {
        if !user.can_post_jobs() {
            return Err(JobServiceError::Forbidden(
                "Only employers can post jobs".to_string(),
            ));
        }

        let now = Utc::now();
        let mut job = Job {
            id: 0,
            employer_id: user.id,
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            requirements: input.requirements.filter(|r| !r.trim().is_empty()),
            location: input.location.trim().to_string(),
            category: input.category.trim().to_string(),
            job_type: input.job_type,
            experience_level: input.experience_level,
            salary_min: input.salary_min,
            salary_max: input.salary_max,
            currency: normalize_currency(input.currency.as_deref()),
            is_remote: input.is_remote,
            status: JobStatus::Open,
            views: 0,
            deadline: input.deadline,
            created_at: now,
            updated_at: now,
            employer_name: String::new(),
            company_name: None,
            applications_count: 0,
        };
        validate_job(&job)?;
        validate_deadline(job.deadline, now)?;

        if user.is_employer() {
            self.check_quota(user.id).await?;
        }

        job = self
            .repo
            .create(&job)
            .await
            .context("Failed to create job")?;

        self.analytics.record(Metric::JobPosted).await;
        self.invalidate().await;
        tracing::info!("User {} posted job {}", user.id, job.id);
        Ok(job)
    }

    pub async fn update(
        &self,
        user: &User,
        id: i64,
        input: UpdateJobInput,
    ) -> Result<Job, JobServiceError> {
        let mut job = self.get_managed(user, id).await?;

        if let Some(title) = input.title {
            job.title = title.trim().to_string();
        }
        if let Some(description) = input.description {
            job.description = description.trim().to_string();
        }
        if let Some(requirements) = input.requirements {
            job.requirements = Some(requirements).filter(|r| !r.trim().is_empty());
        }
        if let Some(location) = input.location {
            job.location = location.trim().to_string();
        }
        if let Some(category) = input.category {
            job.category = category.trim().to_string();
        }
        if let Some(job_type) = input.job_type {
            job.job_type = job_type;
        }
        if let Some(level) = input.experience_level {
            job.experience_level = level;
        }
        if input.salary_min.is_some() {
            job.salary_min = input.salary_min;
        }
        if input.salary_max.is_some() {
            job.salary_max = input.salary_max;
        }
        if let Some(currency) = input.currency.as_deref() {
            job.currency = normalize_currency(Some(currency));
        }
        if let Some(remote) = input.is_remote {
            job.is_remote = remote;
        }
        if input.deadline.is_some() {
            validate_deadline(input.deadline, Utc::now())?;
            job.deadline = input.deadline;
        }
        validate_job(&job)?;
        job.updated_at = Utc::now();

        let updated = self
            .repo
            .update(&job)
            .await
            .context("Failed to update job")?;
        self.invalidate().await;
        Ok(updated)
    }

    /// Open or close a job. Reopening counts against the quota again.
    pub async fn set_status(
        &self,
        user: &User,
        id: i64,
        status: JobStatus,
    ) -> Result<Job, JobServiceError> {
        let mut job = self.get_managed(user, id).await?;
        if job.status == status {
            return Ok(job);
        }
        if status == JobStatus::Open && user.is_employer() {
            self.check_quota(job.employer_id).await?;
        }

        job.status = status;
        job.updated_at = Utc::now();
        let updated = self
            .repo
            .update(&job)
            .await
            .context("Failed to update job status")?;
        self.invalidate().await;
        Ok(updated)
    }

    /// Delete a job together with its applications.
    pub async fn delete(&self, user: &User, id: i64) -> Result<Job, JobServiceError> {
        let job = self.get_managed(user, id).await?;
        self.repo
            .delete(id)
            .await
            .context("Failed to delete job")?;
        self.invalidate().await;
        Ok(job)
    }

    pub async fn invalidate(&self) {
        if let Err(e) = self.cache.invalidate_prefix(CACHE_PREFIX).await {
            tracing::warn!("Failed to invalidate job cache: {}", e);
        }
    }

    async fn get_managed(&self, user: &User, id: i64) -> Result<Job, JobServiceError> {
        let job = self.get(id).await?;
        if !user.can_manage(job.employer_id) {
            return Err(JobServiceError::Forbidden(
                "You can only manage your own jobs".to_string(),
            ));
        }
        Ok(job)
    }

    async fn check_quota(&self, employer_id: i64) -> Result<(), JobServiceError> {
        let plan = self.subscriptions.effective_plan(employer_id).await?;
        let Some(limit) = plan.job_post_limit else {
            return Ok(());
        };

        let open = self
            .count(&JobFilter {
                employer_id: Some(employer_id),
                status: Some(JobStatus::Open),
                ..Default::default()
            })
            .await?;
        if open >= limit {
            return Err(JobServiceError::QuotaExceeded { limit });
        }
        Ok(())
    }
}

fn normalize_currency(currency: Option<&str>) -> String {
    currency
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
}

fn validate_job(job: &Job) -> Result<(), JobServiceError> {
    let required = [
        ("Title", &job.title),
        ("Description", &job.description),
        ("Location", &job.location),
        ("Category", &job.category),
    ];
    for (field, value) in required {
        if value.is_empty() {
            return Err(JobServiceError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
    }
    if job.title.chars().count() > MAX_TITLE_LENGTH {
        return Err(JobServiceError::ValidationError(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    if job.currency.len() != 3 || !job.currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(JobServiceError::ValidationError(
            "Currency must be a 3-letter code".to_string(),
        ));
    }
    if job.salary_min.is_some_and(|v| v < 0) || job.salary_max.is_some_and(|v| v < 0) {
        return Err(JobServiceError::ValidationError(
            "Salaries cannot be negative".to_string(),
        ));
    }
    if let (Some(min), Some(max)) = (job.salary_min, job.salary_max) {
        if min > max {
            return Err(JobServiceError::ValidationError(
                "salary_min cannot exceed salary_max".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_deadline(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<(), JobServiceError> {
    match deadline {
        Some(d) if d <= now => Err(JobServiceError::ValidationError(
            "Deadline must be in the future".to_string(),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, MemoryCache};
    use crate::db::repositories::{
        SqlxAnalyticsRepository, SqlxJobRepository, SqlxSubscriptionRepository,
        SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{JobSort, JobType, Plan, UserRole};
    use chrono::Duration;

    struct Fixture {
        pool: DynDatabasePool,
        service: JobService,
        subscriptions: Arc<SubscriptionService>,
        admin: User,
        employer: User,
        seeker: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let admin = users
            .create(&User::new("Admin".into(), "admin@j.test".into(), "h".into(), UserRole::Admin))
            .await
            .unwrap();
        let mut employer = User::new("Rina".into(), "rina@acme.test".into(), "h".into(), UserRole::Employer);
        employer.company_name = Some("Acme".into());
        let employer = users.create(&employer).await.unwrap();
        let seeker = users
            .create(&User::new("Budi".into(), "budi@j.test".into(), "h".into(), UserRole::Jobseeker))
            .await
            .unwrap();

        let swr = SwrCache::new(
            Arc::new(Cache::Memory(MemoryCache::new())),
            std::time::Duration::from_secs(60),
            std::time::Duration::from_secs(300),
        );
        let subscriptions = Arc::new(SubscriptionService::new(
            SqlxSubscriptionRepository::boxed(pool.clone()),
            2,
        ));
        let analytics = Arc::new(AnalyticsService::new(SqlxAnalyticsRepository::boxed(pool.clone())));
        let service = JobService::new(
            SqlxJobRepository::boxed(pool.clone()),
            swr,
            subscriptions.clone(),
            analytics,
        );

        Fixture {
            pool,
            service,
            subscriptions,
            admin,
            employer,
            seeker,
        }
    }

    fn input(title: &str) -> CreateJobInput {
        CreateJobInput {
            title: title.to_string(),
            description: "Build and run services".to_string(),
            requirements: None,
            location: "Jakarta".to_string(),
            category: "Engineering".to_string(),
            job_type: JobType::FullTime,
            experience_level: Default::default(),
            salary_min: Some(10_000_000),
            salary_max: Some(20_000_000),
            currency: None,
            is_remote: false,
            deadline: Some(Utc::now() + Duration::days(14)),
        }
    }

    #[tokio::test]
    async fn test_create_and_view() {
        let fx = setup().await;
        let job = fx.service.create(&fx.employer, input("Backend Engineer")).await.unwrap();
        assert_eq!(job.status, JobStatus::Open);
        assert_eq!(job.currency, "IDR");
        assert_eq!(job.company_name.as_deref(), Some("Acme"));

        let viewed = fx.service.view(job.id).await.unwrap();
        assert_eq!(viewed.views, 1);
        assert_eq!(fx.service.get(job.id).await.unwrap().views, 1);

        assert!(matches!(fx.service.view(9999).await, Err(JobServiceError::NotFound)));
    }

    #[tokio::test]
    async fn test_create_permissions_and_validation() {
        let fx = setup().await;
        assert!(matches!(
            fx.service.create(&fx.seeker, input("Nope")).await,
            Err(JobServiceError::Forbidden(_))
        ));

        let mut bad = input("  ");
        assert!(matches!(
            fx.service.create(&fx.employer, bad.clone()).await,
            Err(JobServiceError::ValidationError(_))
        ));

        bad = input("Salary");
        bad.salary_min = Some(30);
        bad.salary_max = Some(20);
        assert!(matches!(
            fx.service.create(&fx.employer, bad).await,
            Err(JobServiceError::ValidationError(_))
        ));

        bad = input("Negative");
        bad.salary_min = Some(-1);
        bad.salary_max = None;
        assert!(matches!(
            fx.service.create(&fx.employer, bad).await,
            Err(JobServiceError::ValidationError(_))
        ));

        bad = input("Past");
        bad.deadline = Some(Utc::now() - Duration::days(1));
        assert!(matches!(
            fx.service.create(&fx.employer, bad).await,
            Err(JobServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_quota_follows_plan() {
        let fx = setup().await;
        fx.service.create(&fx.employer, input("One")).await.unwrap();
        let second = fx.service.create(&fx.employer, input("Two")).await.unwrap();

        assert!(matches!(
            fx.service.create(&fx.employer, input("Three")).await,
            Err(JobServiceError::QuotaExceeded { limit: 2 })
        ));

        // Closing a job frees a slot; reopening it is then refused
        fx.service
            .set_status(&fx.employer, second.id, JobStatus::Closed)
            .await
            .unwrap();
        fx.service.create(&fx.employer, input("Three")).await.unwrap();
        assert!(matches!(
            fx.service
                .set_status(&fx.employer, second.id, JobStatus::Open)
                .await,
            Err(JobServiceError::QuotaExceeded { .. })
        ));

        // Premium lifts the limit
        let order = fx.subscriptions.create(&fx.employer, Plan::Premium).await.unwrap();
        fx.subscriptions.activate(order.id).await.unwrap();
        fx.service.create(&fx.employer, input("Four")).await.unwrap();

        // Admins are never limited
        for i in 0..3 {
            fx.service
                .create(&fx.admin, input(&format!("Admin {}", i)))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_public_listing_is_cached_and_invalidated() {
        let fx = setup().await;
        fx.service.create(&fx.employer, input("Rust Developer")).await.unwrap();

        let filter = JobFilter {
            keyword: Some("rust".into()),
            ..Default::default()
        };
        let first = fx
            .service
            .list_public(&filter, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(first.total, 1);

        // A write behind the service's back is not visible while fresh
        let repo = SqlxJobRepository::new(fx.pool.clone());
        let mut sneaky = fx.service.get(first.items[0].id).await.unwrap();
        sneaky.status = JobStatus::Closed;
        repo.update(&sneaky).await.unwrap();
        let cached = fx
            .service
            .list_public(&filter, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(cached.total, 1);

        // A write through the service invalidates
        fx.service.create(&fx.employer, input("Senior Rust Developer")).await.unwrap();
        let fresh = fx
            .service
            .list_public(&filter, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(fresh.total, 1);
        assert_eq!(fresh.items[0].title, "Senior Rust Developer");
    }

    #[tokio::test]
    async fn test_public_listing_hides_closed_jobs() {
        let fx = setup().await;
        let a = fx.service.create(&fx.employer, input("Open role")).await.unwrap();
        let b = fx.service.create(&fx.employer, input("Closed role")).await.unwrap();
        fx.service
            .set_status(&fx.employer, b.id, JobStatus::Closed)
            .await
            .unwrap();

        let filter = JobFilter {
            status: Some(JobStatus::Closed),
            sort: JobSort::Oldest,
            ..Default::default()
        };
        let page = fx
            .service
            .list_public(&filter, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(page.items.iter().map(|j| j.id).collect::<Vec<_>>(), vec![a.id]);

        let mine = fx
            .service
            .list_for_employer(fx.employer.id, None, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(mine.total, 2);
    }

    #[tokio::test]
    async fn test_categories() {
        let fx = setup().await;
        fx.service.create(&fx.employer, input("A")).await.unwrap();
        let mut design = input("B");
        design.category = "Design".into();
        fx.service.create(&fx.admin, design).await.unwrap();
        fx.service.create(&fx.admin, input("C")).await.unwrap();

        let categories = fx.service.categories().await.unwrap();
        assert_eq!(
            categories,
            vec![
                CategoryCount { category: "Engineering".into(), count: 2 },
                CategoryCount { category: "Design".into(), count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_update_and_delete_ownership() {
        let fx = setup().await;
        let job = fx.service.create(&fx.employer, input("Original")).await.unwrap();

        let other = SqlxUserRepository::new(fx.pool.clone())
            .create(&User::new("Other".into(), "other@j.test".into(), "h".into(), UserRole::Employer))
            .await
            .unwrap();
        assert!(matches!(
            fx.service.update(&other, job.id, UpdateJobInput::default()).await,
            Err(JobServiceError::Forbidden(_))
        ));

        let updated = fx
            .service
            .update(
                &fx.employer,
                job.id,
                UpdateJobInput {
                    title: Some("Renamed".into()),
                    salary_max: Some(25_000_000),
                    currency: Some("usd".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.salary_max, Some(25_000_000));
        assert_eq!(updated.currency, "USD");

        let invalid = fx
            .service
            .update(
                &fx.employer,
                job.id,
                UpdateJobInput {
                    salary_min: Some(30_000_000),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(invalid, Err(JobServiceError::ValidationError(_))));

        // Admin may delete anyone's job
        fx.service.delete(&fx.admin, job.id).await.unwrap();
        assert!(matches!(fx.service.get(job.id).await, Err(JobServiceError::NotFound)));
    }
}
