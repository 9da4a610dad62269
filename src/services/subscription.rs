//! Subscription service
//!
//! Employers buy a plan to lift the free job-post quota. Orders start out
//! `pending`; an admin activates them once payment is confirmed elsewhere.
//! At most one subscription per user is active: activation expires the rest.

use crate::db::repositories::SubscriptionRepository;
use crate::models::{
    ListParams, NotificationKind, PagedResult, Plan, PlanInfo, Subscription, SubscriptionFilter,
    SubscriptionStatus, User,
};
use crate::services::notification::NotificationHub;
use anyhow::Context;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const HISTORY_LIMIT: u32 = 20;

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionServiceError {
    #[error("Subscription not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The subscription is not in a state that allows the operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// What `GET /api/subscriptions/me` returns
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionOverview {
    pub plan: PlanInfo,
    pub current: Option<Subscription>,
    pub history: Vec<Subscription>,
}

pub struct SubscriptionService {
    repo: Arc<dyn SubscriptionRepository>,
    notifications: Option<Arc<NotificationHub>>,
    free_job_post_limit: i64,
}

impl SubscriptionService {
    pub fn new(repo: Arc<dyn SubscriptionRepository>, free_job_post_limit: i64) -> Self {
        Self {
            repo,
            notifications: None,
            free_job_post_limit,
        }
    }

    pub fn with_notifications(mut self, hub: Arc<NotificationHub>) -> Self {
        self.notifications = Some(hub);
        self
    }

    pub fn plans(&self) -> Vec<PlanInfo> {
        Plan::ALL
            .iter()
            .map(|plan| plan.info(self.free_job_post_limit))
            .collect()
    }

    pub async fn current(&self, user_id: i64) -> Result<Option<Subscription>, SubscriptionServiceError> {
        Ok(self
            .repo
            .get_current(user_id, Utc::now())
            .await
            .context("Failed to load current subscription")?)
    }

    /// The plan in effect for a user; free when nothing is active.
    pub async fn effective_plan(&self, user_id: i64) -> Result<PlanInfo, SubscriptionServiceError> {
        let plan = self
            .current(user_id)
            .await?
            .map_or(Plan::Free, |s| s.plan);
        Ok(plan.info(self.free_job_post_limit))
    }

    pub async fn overview(&self, user_id: i64) -> Result<SubscriptionOverview, SubscriptionServiceError> {
        let current = self.current(user_id).await?;
        let plan = current
            .as_ref()
            .map_or(Plan::Free, |s| s.plan)
            .info(self.free_job_post_limit);

        let filter = SubscriptionFilter {
            user_id: Some(user_id),
            ..Default::default()
        };
        let (history, _) = self
            .repo
            .list(&filter, &ListParams::new(1, HISTORY_LIMIT))
            .await
            .context("Failed to load subscription history")?;

        Ok(SubscriptionOverview {
            plan,
            current,
            history,
        })
    }

    /// Place an order for a paid plan.
    pub async fn create(&self, user: &User, plan: Plan) -> Result<Subscription, SubscriptionServiceError> {
        if !user.is_employer() {
            return Err(SubscriptionServiceError::Forbidden(
                "Only employers can subscribe".to_string(),
            ));
        }
        if !plan.is_paid() {
            return Err(SubscriptionServiceError::ValidationError(
                "The free plan does not need a subscription".to_string(),
            ));
        }

        let info = plan.info(self.free_job_post_limit);
        let now = Utc::now();
        let subscription = Subscription {
            id: 0,
            user_id: user.id,
            plan,
            status: SubscriptionStatus::Pending,
            price: info.price,
            order_id: generate_order_id(user.id),
            starts_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };

        let created = self
            .repo
            .create(&subscription)
            .await
            .context("Failed to create subscription")?;
        tracing::info!(
            "User {} ordered the {} plan ({})",
            user.id,
            plan,
            created.order_id
        );
        Ok(created)
    }

    pub async fn get(&self, id: i64) -> Result<Subscription, SubscriptionServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get subscription")?
            .ok_or(SubscriptionServiceError::NotFound)
    }

    /// Cancel a pending or active subscription (owner or admin).
    pub async fn cancel(&self, actor: &User, id: i64) -> Result<Subscription, SubscriptionServiceError> {
        let mut subscription = self.get(id).await?;
        if !actor.can_manage(subscription.user_id) {
            return Err(SubscriptionServiceError::Forbidden(
                "Not your subscription".to_string(),
            ));
        }
        if !matches!(
            subscription.status,
            SubscriptionStatus::Pending | SubscriptionStatus::Active
        ) {
            return Err(SubscriptionServiceError::InvalidState(format!(
                "A {} subscription cannot be cancelled",
                subscription.status
            )));
        }

        subscription.status = SubscriptionStatus::Cancelled;
        subscription.updated_at = Utc::now();
        let updated = self
            .repo
            .update(&subscription)
            .await
            .context("Failed to cancel subscription")?;
        Ok(updated)
    }

    /// Start a pending subscription now; any other active one expires.
    pub async fn activate(&self, id: i64) -> Result<Subscription, SubscriptionServiceError> {
        let mut subscription = self.get(id).await?;
        if subscription.status != SubscriptionStatus::Pending {
            return Err(SubscriptionServiceError::InvalidState(format!(
                "Only pending subscriptions can be activated (this one is {})",
                subscription.status
            )));
        }

        let info = subscription.plan.info(self.free_job_post_limit);
        let now = Utc::now();
        subscription.status = SubscriptionStatus::Active;
        subscription.starts_at = Some(now);
        subscription.expires_at = Some(now + Duration::days(info.duration_days));
        subscription.updated_at = now;

        let activated = self
            .repo
            .update(&subscription)
            .await
            .context("Failed to activate subscription")?;
        let replaced = self
            .repo
            .expire_active_for_user(activated.user_id, activated.id)
            .await
            .context("Failed to expire previous subscriptions")?;
        if replaced > 0 {
            tracing::info!(
                "Subscription {} replaced {} earlier subscription(s) of user {}",
                activated.id,
                replaced,
                activated.user_id
            );
        }

        if let Some(hub) = &self.notifications {
            hub.notify_quietly(
                activated.user_id,
                NotificationKind::Subscription,
                format!("{} plan active", info.name),
                format!(
                    "Your {} subscription is active for {} days.",
                    info.name, info.duration_days
                ),
                Some("/subscriptions".to_string()),
            )
            .await;
        }

        Ok(activated)
    }

    pub async fn list(
        &self,
        filter: &SubscriptionFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Subscription>, SubscriptionServiceError> {
        let (items, total) = self
            .repo
            .list(filter, params)
            .await
            .context("Failed to list subscriptions")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Mark every active subscription past its end date expired.
    pub async fn expire_due(&self) -> Result<u64, SubscriptionServiceError> {
        Ok(self
            .repo
            .expire_due(Utc::now())
            .await
            .context("Failed to expire subscriptions")?)
    }

    /// Run [`expire_due`](Self::expire_due) every `interval` until cancelled.
    pub fn spawn_expiry_task(
        self: Arc<Self>,
        interval: std::time::Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => match self.expire_due().await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!("Expired {} subscription(s)", n),
                        Err(e) => tracing::warn!("Subscription expiry check failed: {}", e),
                    },
                }
            }
            tracing::debug!("Subscription expiry task stopped");
        })
    }
}

/// `SUB-<user>-<unix seconds>-<8 hex chars>`
fn generate_order_id(user_id: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "SUB-{}-{}-{}",
        user_id,
        Utc::now().timestamp(),
        &suffix[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxNotificationRepository, SqlxSubscriptionRepository, SqlxUserRepository,
        UserRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::UserRole;

    async fn setup() -> (DynDatabasePool, SubscriptionService, User, User) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let admin = users
            .create(&User::new("Admin".into(), "admin@s.test".into(), "h".into(), UserRole::Admin))
            .await
            .unwrap();
        let employer = users
            .create(&User::new("Emp".into(), "emp@s.test".into(), "h".into(), UserRole::Employer))
            .await
            .unwrap();

        let hub = Arc::new(NotificationHub::new(SqlxNotificationRepository::boxed(pool.clone())));
        let service = SubscriptionService::new(SqlxSubscriptionRepository::boxed(pool.clone()), 3)
            .with_notifications(hub);
        (pool, service, admin, employer)
    }

    #[tokio::test]
    async fn test_plans_catalog() {
        let (_pool, service, _, _) = setup().await;
        let plans = service.plans();
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[0].plan, Plan::Free);
        assert_eq!(plans[0].job_post_limit, Some(3));
        assert!(plans.iter().any(|p| p.featured_jobs));
    }

    #[tokio::test]
    async fn test_create_rules() {
        let (_pool, service, admin, employer) = setup().await;

        let order = service.create(&employer, Plan::Basic).await.unwrap();
        assert_eq!(order.status, SubscriptionStatus::Pending);
        assert_eq!(order.price, Plan::Basic.info(3).price);
        assert!(order.order_id.starts_with(&format!("SUB-{}-", employer.id)));

        assert!(matches!(
            service.create(&employer, Plan::Free).await,
            Err(SubscriptionServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.create(&admin, Plan::Basic).await,
            Err(SubscriptionServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_activation_replaces_previous() {
        let (_pool, service, _, employer) = setup().await;
        assert_eq!(service.effective_plan(employer.id).await.unwrap().plan, Plan::Free);

        let basic = service.create(&employer, Plan::Basic).await.unwrap();
        let basic = service.activate(basic.id).await.unwrap();
        assert_eq!(basic.status, SubscriptionStatus::Active);
        let window = basic.expires_at.unwrap() - basic.starts_at.unwrap();
        assert_eq!(window.num_days(), 30);
        assert_eq!(service.effective_plan(employer.id).await.unwrap().plan, Plan::Basic);

        let premium = service.create(&employer, Plan::Premium).await.unwrap();
        service.activate(premium.id).await.unwrap();

        assert_eq!(service.get(basic.id).await.unwrap().status, SubscriptionStatus::Expired);
        let overview = service.overview(employer.id).await.unwrap();
        assert_eq!(overview.plan.plan, Plan::Premium);
        assert_eq!(overview.current.map(|s| s.id), Some(premium.id));
        assert_eq!(overview.history.len(), 2);

        // Activating twice is refused
        assert!(matches!(
            service.activate(premium.id).await,
            Err(SubscriptionServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_permissions_and_state() {
        let (pool, service, admin, employer) = setup().await;
        let other = SqlxUserRepository::new(pool)
            .create(&User::new("Other".into(), "o@s.test".into(), "h".into(), UserRole::Employer))
            .await
            .unwrap();

        let order = service.create(&employer, Plan::Basic).await.unwrap();
        assert!(matches!(
            service.cancel(&other, order.id).await,
            Err(SubscriptionServiceError::Forbidden(_))
        ));

        let cancelled = service.cancel(&employer, order.id).await.unwrap();
        assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
        assert!(matches!(
            service.cancel(&admin, order.id).await,
            Err(SubscriptionServiceError::InvalidState(_))
        ));
        assert!(matches!(
            service.cancel(&admin, 9999).await,
            Err(SubscriptionServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_expire_due() {
        let (pool, service, _, employer) = setup().await;
        let order = service.create(&employer, Plan::Basic).await.unwrap();
        let mut active = service.activate(order.id).await.unwrap();

        // Nothing is due yet
        assert_eq!(service.expire_due().await.unwrap(), 0);

        active.expires_at = Some(Utc::now() - Duration::minutes(1));
        SqlxSubscriptionRepository::new(pool).update(&active).await.unwrap();

        assert_eq!(service.expire_due().await.unwrap(), 1);
        assert_eq!(service.get(order.id).await.unwrap().status, SubscriptionStatus::Expired);
        assert_eq!(service.effective_plan(employer.id).await.unwrap().plan, Plan::Free);
    }

    #[tokio::test]
    async fn test_list_filter() {
        let (_pool, service, _, employer) = setup().await;
        let a = service.create(&employer, Plan::Basic).await.unwrap();
        service.create(&employer, Plan::Premium).await.unwrap();
        service.activate(a.id).await.unwrap();

        let active = service
            .list(
                &SubscriptionFilter {
                    status: Some(SubscriptionStatus::Active),
                    ..Default::default()
                },
                &ListParams::default(),
            )
            .await
            .unwrap();
        assert_eq!(active.total, 1);
        assert_eq!(active.items[0].id, a.id);
    }
}
