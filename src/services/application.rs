//! Application service
//!
//! Job seekers apply once per job while it accepts applications. The job's
//! owner moves the application forward through review; each side is
//! notified of the other's action.

use crate::db::is_unique_violation;
use crate::db::repositories::{ApplicationRepository, JobRepository};
use crate::models::{
    Application, ApplicationFilter, ApplicationStatus, CreateApplicationInput, ListParams, Metric,
    NotificationKind, PagedResult, User,
};
use crate::services::analytics::AnalyticsService;
use crate::services::notification::NotificationHub;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

const MAX_COVER_LETTER_LENGTH: usize = 5000;

#[derive(Debug, thiserror::Error)]
pub enum ApplicationServiceError {
    #[error("Application not found")]
    NotFound,

    #[error("Job not found")]
    JobNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("You have already applied to this job")]
    Conflict,

    #[error("Invalid status change: {0}")]
    InvalidTransition(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ApplicationService {
    repo: Arc<dyn ApplicationRepository>,
    jobs: Arc<dyn JobRepository>,
    notifications: Arc<NotificationHub>,
    analytics: Arc<AnalyticsService>,
}

impl ApplicationService {
    pub fn new(
        repo: Arc<dyn ApplicationRepository>,
        jobs: Arc<dyn JobRepository>,
        notifications: Arc<NotificationHub>,
        analytics: Arc<AnalyticsService>,
    ) -> Self {
        Self {
            repo,
            jobs,
            notifications,
            analytics,
        }
    }

    pub async fn apply(
        &self,
        applicant: &User,
        job_id: i64,
        input: CreateApplicationInput,
    ) -> Result<Application, ApplicationServiceError> {
        if !applicant.is_jobseeker() {
            return Err(ApplicationServiceError::Forbidden(
                "Only job seekers can apply".to_string(),
            ));
        }

        let job = self
            .jobs
            .get_by_id(job_id)
            .await
            .context("Failed to get job")?
            .ok_or(ApplicationServiceError::JobNotFound)?;
        let now = Utc::now();
        if !job.accepts_applications(now) {
            return Err(ApplicationServiceError::ValidationError(
                "This job is no longer accepting applications".to_string(),
            ));
        }

        let cover_letter = input
            .cover_letter
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if cover_letter
            .as_ref()
            .is_some_and(|c| c.chars().count() > MAX_COVER_LETTER_LENGTH)
        {
            return Err(ApplicationServiceError::ValidationError(format!(
                "Cover letter must be at most {} characters",
                MAX_COVER_LETTER_LENGTH
            )));
        }
        let resume_url = input
            .resume_url
            .filter(|r| !r.trim().is_empty())
            .or_else(|| applicant.resume_url.clone());

        if self
            .repo
            .exists(job_id, applicant.id)
            .await
            .context("Failed to check existing application")?
        {
            return Err(ApplicationServiceError::Conflict);
        }

        let application = self
            .repo
            .create(&Application {
                id: 0,
                job_id,
                applicant_id: applicant.id,
                cover_letter,
                resume_url,
                status: ApplicationStatus::Pending,
                created_at: now,
                updated_at: now,
                job_title: String::new(),
                employer_id: 0,
                company_name: None,
                applicant_name: String::new(),
                applicant_email: String::new(),
            })
            .await
            .map_err(|e| {
                // A concurrent apply for the same job won the insert
                if is_unique_violation(&e) {
                    ApplicationServiceError::Conflict
                } else {
                    ApplicationServiceError::InternalError(e.context("Failed to create application"))
                }
            })?;

        self.analytics.record(Metric::ApplicationSubmitted).await;
        self.notifications
            .notify_quietly(
                job.employer_id,
                NotificationKind::ApplicationReceived,
                "New application",
                format!("{} applied to {}", applicant.name, job.title),
                Some(format!("/employer/jobs/{}/applications", job.id)),
            )
            .await;

        tracing::info!("User {} applied to job {}", applicant.id, job_id);
        Ok(application)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Application, ApplicationServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get application")?
            .ok_or(ApplicationServiceError::NotFound)
    }

    /// Visible to the applicant, the job's owner and admins.
    pub async fn get(&self, user: &User, id: i64) -> Result<Application, ApplicationServiceError> {
        let application = self.get_by_id(id).await?;
        if !(user.is_admin()
            || user.id == application.applicant_id
            || user.id == application.employer_id)
        {
            return Err(ApplicationServiceError::Forbidden(
                "You cannot view this application".to_string(),
            ));
        }
        Ok(application)
    }

    pub async fn list_mine(
        &self,
        applicant: &User,
        status: Option<ApplicationStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<Application>, ApplicationServiceError> {
        let filter = ApplicationFilter {
            applicant_id: Some(applicant.id),
            status,
            ..Default::default()
        };
        self.list(&filter, params).await
    }

    pub async fn list_for_job(
        &self,
        user: &User,
        job_id: i64,
        status: Option<ApplicationStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<Application>, ApplicationServiceError> {
        let job = self
            .jobs
            .get_by_id(job_id)
            .await
            .context("Failed to get job")?
            .ok_or(ApplicationServiceError::JobNotFound)?;
        if !user.can_manage(job.employer_id) {
            return Err(ApplicationServiceError::Forbidden(
                "You can only view applications to your own jobs".to_string(),
            ));
        }

        let filter = ApplicationFilter {
            job_id: Some(job_id),
            status,
            ..Default::default()
        };
        self.list(&filter, params).await
    }

    pub async fn list(
        &self,
        filter: &ApplicationFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Application>, ApplicationServiceError> {
        let (items, total) = self
            .repo
            .list(filter, params)
            .await
            .context("Failed to list applications")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn count(&self, filter: &ApplicationFilter) -> Result<i64, ApplicationServiceError> {
        Ok(self
            .repo
            .count(filter)
            .await
            .context("Failed to count applications")?)
    }

    pub async fn update_status(
        &self,
        user: &User,
        id: i64,
        status: ApplicationStatus,
    ) -> Result<Application, ApplicationServiceError> {
        let application = self.get_by_id(id).await?;
        if !user.can_manage(application.employer_id) {
            return Err(ApplicationServiceError::Forbidden(
                "Only the job owner can review applications".to_string(),
            ));
        }
        if !application.status.can_transition_to(status) {
            return Err(ApplicationServiceError::InvalidTransition(format!(
                "{} -> {}",
                application.status, status
            )));
        }

        let updated = self
            .repo
            .update_status(id, status)
            .await
            .context("Failed to update application status")?;

        self.notifications
            .notify_quietly(
                updated.applicant_id,
                NotificationKind::ApplicationStatus,
                "Application update",
                format!(
                    "Your application for {} is now {}",
                    updated.job_title, updated.status
                ),
                Some(format!("/applications/{}", updated.id)),
            )
            .await;

        Ok(updated)
    }

    /// Applicants may withdraw until a final decision; admins may always
    /// delete.
    pub async fn delete(&self, user: &User, id: i64) -> Result<Application, ApplicationServiceError> {
        let application = self.get_by_id(id).await?;
        if !user.is_admin() {
            if user.id != application.applicant_id {
                return Err(ApplicationServiceError::Forbidden(
                    "You can only withdraw your own applications".to_string(),
                ));
            }
            if application.status.is_terminal() {
                return Err(ApplicationServiceError::InvalidTransition(format!(
                    "cannot withdraw an application that was {}",
                    application.status
                )));
            }
        }

        self.repo
            .delete(id)
            .await
            .context("Failed to delete application")?;
        Ok(application)
    }
}
