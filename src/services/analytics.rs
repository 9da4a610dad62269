//! Analytics service
//!
//! Daily counters for site activity. Recording never fails the request that
//! triggered it; storage errors are logged and dropped.

use crate::db::repositories::AnalyticsRepository;
use crate::models::{AnalyticsReport, Metric};
use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use std::sync::Arc;

pub const DEFAULT_REPORT_DAYS: u32 = 30;
pub const MAX_REPORT_DAYS: u32 = 365;

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct AnalyticsService {
    repo: Arc<dyn AnalyticsRepository>,
}

impl AnalyticsService {
    pub fn new(repo: Arc<dyn AnalyticsRepository>) -> Self {
        Self { repo }
    }

    /// Count one occurrence of `metric` today (UTC).
    pub async fn record(&self, metric: Metric) {
        self.record_on(Utc::now().date_naive(), metric).await;
    }

    pub async fn record_on(&self, date: NaiveDate, metric: Metric) {
        if let Err(e) = self.repo.increment(date, metric, 1).await {
            tracing::warn!("Failed to record {} metric: {:#}", metric, e);
        }
    }

    /// Zero-filled daily series for the last `days` days, today included.
    pub async fn report(&self, days: Option<u32>) -> Result<AnalyticsReport, AnalyticsServiceError> {
        self.report_until(Utc::now().date_naive(), days).await
    }

    pub async fn report_until(
        &self,
        to: NaiveDate,
        days: Option<u32>,
    ) -> Result<AnalyticsReport, AnalyticsServiceError> {
        let days = days.unwrap_or(DEFAULT_REPORT_DAYS);
        if !(1..=MAX_REPORT_DAYS).contains(&days) {
            return Err(AnalyticsServiceError::ValidationError(format!(
                "days must be between 1 and {}",
                MAX_REPORT_DAYS
            )));
        }

        let from = to - Duration::days(days as i64 - 1);
        let counters = self
            .repo
            .range(from, to)
            .await
            .context("Failed to load analytics")?;

        Ok(AnalyticsReport::build(&counters, to, days))
    }
}
