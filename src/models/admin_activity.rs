//! Admin activity log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit record of an administrative action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminActivity {
    pub id: i64,
    pub admin_id: i64,
    pub action: AdminAction,
    /// Kind of the affected record, e.g. `user` or `job`
    pub target_type: String,
    pub target_id: Option<i64>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub admin_name: String,
}

string_enum! {
    pub enum AdminAction {
        UserRoleChanged => "user_role_changed",
        UserBanned => "user_banned",
        UserUnbanned => "user_unbanned",
        UserDeleted => "user_deleted",
        JobStatusChanged => "job_status_changed",
        JobDeleted => "job_deleted",
        ApplicationDeleted => "application_deleted",
        ArticleCreated => "article_created",
        ArticleUpdated => "article_updated",
        ArticleDeleted => "article_deleted",
        SubscriptionActivated => "subscription_activated",
        SubscriptionCancelled => "subscription_cancelled",
        CacheCleared => "cache_cleared",
    }
}

#[derive(Debug, Clone)]
pub struct NewAdminActivity {
    pub admin_id: i64,
    pub action: AdminAction,
    pub target_type: &'static str,
    pub target_id: Option<i64>,
    pub details: Option<serde_json::Value>,
}

impl NewAdminActivity {
    pub fn new(admin_id: i64, action: AdminAction, target_type: &'static str) -> Self {
        Self {
            admin_id,
            action,
            target_type,
            target_id: None,
            details: None,
        }
    }

    pub fn target(mut self, id: i64) -> Self {
        self.target_id = Some(id);
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdminActivityFilter {
    pub admin_id: Option<i64>,
    pub action: Option<AdminAction>,
}
