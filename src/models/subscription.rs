//! Employer subscription model
//!
//! Plans gate how many open jobs an employer may hold at once. Payment
//! collection happens outside this service; an administrator activates a
//! pending subscription once it has been paid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    /// Price at the time of ordering, in minor currency units
    pub price: i64,
    pub order_id: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Active and not yet expired.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.expires_at.map_or(false, |e| e > now)
    }
}

string_enum! {
    pub enum Plan {
        Free => "free",
        Basic => "basic",
        Premium => "premium",
    }
}

string_enum! {
    pub enum SubscriptionStatus {
        Pending => "pending",
        Active => "active",
        Expired => "expired",
        Cancelled => "cancelled",
    }
}

/// Catalog entry for a plan
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlanInfo {
    pub plan: Plan,
    pub name: &'static str,
    pub price: i64,
    pub currency: &'static str,
    pub duration_days: i64,
    /// `None` means unlimited
    pub job_post_limit: Option<i64>,
    pub featured_jobs: bool,
}

impl Plan {
    /// Catalog entry; the free tier's quota comes from configuration.
    pub fn info(&self, free_job_post_limit: i64) -> PlanInfo {
        match self {
            Plan::Free => PlanInfo {
                plan: Plan::Free,
                name: "Free",
                price: 0,
                currency: "IDR",
                duration_days: 0,
                job_post_limit: Some(free_job_post_limit),
                featured_jobs: false,
            },
            Plan::Basic => PlanInfo {
                plan: Plan::Basic,
                name: "Basic",
                price: 99_000,
                currency: "IDR",
                duration_days: 30,
                job_post_limit: Some(10),
                featured_jobs: false,
            },
            Plan::Premium => PlanInfo {
                plan: Plan::Premium,
                name: "Premium",
                price: 249_000,
                currency: "IDR",
                duration_days: 30,
                job_post_limit: None,
                featured_jobs: true,
            },
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, Plan::Free)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    pub user_id: Option<i64>,
    pub status: Option<SubscriptionStatus>,
}
