//! Admin dashboard aggregation

use crate::db::repositories::{
    ApplicationRepository, ArticleRepository, JobRepository, SubscriptionRepository, UserRepository,
};
use crate::models::{
    AdminActivity, ApplicationFilter, ApplicationStatus, ArticleFilter, ArticleStatus, JobFilter,
    JobStatus, ListParams, SubscriptionFilter, SubscriptionStatus, UserFilter, UserRole, UserStatus,
};
use crate::services::admin_activity::AdminActivityService;
use anyhow::Context;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

const RECENT_ACTIVITY_LIMIT: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum AdminServiceError {
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct UserCounts {
    pub total: i64,
    /// Keyed by role name
    pub by_role: BTreeMap<String, i64>,
    pub banned: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobCounts {
    pub open: i64,
    pub closed: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub users: UserCounts,
    pub jobs: JobCounts,
    /// Keyed by application status
    pub applications: BTreeMap<String, i64>,
    pub active_subscriptions: i64,
    pub published_articles: i64,
    pub recent_activities: Vec<AdminActivity>,
}

pub struct AdminService {
    users: Arc<dyn UserRepository>,
    jobs: Arc<dyn JobRepository>,
    applications: Arc<dyn ApplicationRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    articles: Arc<dyn ArticleRepository>,
    activities: Arc<AdminActivityService>,
}

impl AdminService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        jobs: Arc<dyn JobRepository>,
        applications: Arc<dyn ApplicationRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        articles: Arc<dyn ArticleRepository>,
        activities: Arc<AdminActivityService>,
    ) -> Self {
        Self {
            users,
            jobs,
            applications,
            subscriptions,
            articles,
            activities,
        }
    }

    pub async fn dashboard(&self) -> Result<Dashboard, AdminServiceError> {
        let mut by_role = BTreeMap::new();
        for role in UserRole::ALL {
            let count = self
                .users
                .count(&UserFilter {
                    role: Some(*role),
                    ..Default::default()
                })
                .await
                .context("Failed to count users")?;
            by_role.insert(role.to_string(), count);
        }
        let banned = self
            .users
            .count(&UserFilter {
                status: Some(UserStatus::Banned),
                ..Default::default()
            })
            .await
            .context("Failed to count banned users")?;

        let open = self.count_jobs(JobStatus::Open).await?;
        let closed = self.count_jobs(JobStatus::Closed).await?;

        let mut applications = BTreeMap::new();
        for status in ApplicationStatus::ALL {
            let count = self
                .applications
                .count(&ApplicationFilter {
                    status: Some(*status),
                    ..Default::default()
                })
                .await
                .context("Failed to count applications")?;
            applications.insert(status.to_string(), count);
        }

        let (_, active_subscriptions) = self
            .subscriptions
            .list(
                &SubscriptionFilter {
                    status: Some(SubscriptionStatus::Active),
                    ..Default::default()
                },
                &ListParams::new(1, 1),
            )
            .await
            .context("Failed to count subscriptions")?;

        let published_articles = self
            .articles
            .count(&ArticleFilter {
                status: Some(ArticleStatus::Published),
                ..Default::default()
            })
            .await
            .context("Failed to count articles")?;

        let recent_activities = self
            .activities
            .recent(RECENT_ACTIVITY_LIMIT)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        Ok(Dashboard {
            users: UserCounts {
                total: by_role.values().sum(),
                by_role,
                banned,
            },
            jobs: JobCounts { open, closed },
            applications,
            active_subscriptions,
            published_articles,
            recent_activities,
        })
    }

    async fn count_jobs(&self, status: JobStatus) -> Result<i64, AdminServiceError> {
        Ok(self
            .jobs
            .count(&JobFilter {
                status: Some(status),
                ..Default::default()
            })
            .await
            .context("Failed to count jobs")?)
    }
}

/// `"45.2 MB"` style formatting
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// `"2d 3h 4m"`, dropping leading zero units
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxAdminActivityRepository, SqlxApplicationRepository, SqlxArticleRepository,
        SqlxJobRepository, SqlxSubscriptionRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{AdminAction, NewAdminActivity, User};

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(47_395_635), "45.2 MB");
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m");
        assert_eq!(format_uptime(3 * 3600 + 60), "3h 1m");
        assert_eq!(format_uptime(2 * 86_400 + 3 * 3600 + 4 * 60), "2d 3h 4m");
    }

    #[tokio::test]
    async fn test_dashboard_counts() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::boxed(pool.clone());
        let admin = users
            .create(&User::new("A".into(), "a@d.test".into(), "h".into(), UserRole::Admin))
            .await
            .unwrap();
        users
            .create(&User::new("E".into(), "e@d.test".into(), "h".into(), UserRole::Employer))
            .await
            .unwrap();
        let mut banned = User::new("S".into(), "s@d.test".into(), "h".into(), UserRole::Jobseeker);
        banned.status = UserStatus::Banned;
        users.create(&banned).await.unwrap();

        let activities = Arc::new(AdminActivityService::new(SqlxAdminActivityRepository::boxed(
            pool.clone(),
        )));
        activities
            .record(NewAdminActivity::new(admin.id, AdminAction::CacheCleared, "cache"))
            .await;

        let service = AdminService::new(
            users,
            SqlxJobRepository::boxed(pool.clone()),
            SqlxApplicationRepository::boxed(pool.clone()),
            SqlxSubscriptionRepository::boxed(pool.clone()),
            SqlxArticleRepository::boxed(pool.clone()),
            activities,
        );

        let dashboard = service.dashboard().await.unwrap();
        assert_eq!(dashboard.users.total, 3);
        assert_eq!(dashboard.users.by_role["employer"], 1);
        assert_eq!(dashboard.users.banned, 1);
        assert_eq!(dashboard.jobs.open, 0);
        assert_eq!(dashboard.applications["pending"], 0);
        assert_eq!(dashboard.applications.len(), ApplicationStatus::ALL.len());
        assert_eq!(dashboard.active_subscriptions, 0);
        assert_eq!(dashboard.recent_activities.len(), 1);
    }
}
