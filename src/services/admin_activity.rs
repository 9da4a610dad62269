//! Admin activity log
//!
//! Audit trail of admin mutations. Logging is best effort: a failed insert is
//! reported but never undoes the action it describes.

use crate::db::repositories::AdminActivityRepository;
use crate::models::{AdminActivity, AdminActivityFilter, ListParams, NewAdminActivity, PagedResult};
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AdminActivityServiceError {
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct AdminActivityService {
    repo: Arc<dyn AdminActivityRepository>,
}

impl AdminActivityService {
    pub fn new(repo: Arc<dyn AdminActivityRepository>) -> Self {
        Self { repo }
    }

    pub async fn record(&self, activity: NewAdminActivity) {
        let action = activity.action;
        match self.repo.create(&activity).await {
            Ok(entry) => tracing::info!(
                "Admin {} performed {} on {} {:?}",
                entry.admin_id,
                entry.action,
                entry.target_type,
                entry.target_id
            ),
            Err(e) => tracing::error!("Failed to record admin activity {}: {:#}", action, e),
        }
    }

    pub async fn list(
        &self,
        filter: &AdminActivityFilter,
        params: &ListParams,
    ) -> Result<PagedResult<AdminActivity>, AdminActivityServiceError> {
        let (items, total) = self
            .repo
            .list(filter, params)
            .await
            .context("Failed to list admin activities")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn recent(&self, limit: u32) -> Result<Vec<AdminActivity>, AdminActivityServiceError> {
        let page = self
            .list(&AdminActivityFilter::default(), &ListParams::new(1, limit))
            .await?;
        Ok(page.items)
    }
}
