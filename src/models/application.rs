//! Job application model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A job seeker's application to a job. One per (job, applicant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub job_id: i64,
    pub applicant_id: i64,
    pub cover_letter: Option<String>,
    pub resume_url: Option<String>,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Joined from jobs / users
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub employer_id: i64,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub applicant_name: String,
    #[serde(default)]
    pub applicant_email: String,
}

string_enum! {
    pub enum ApplicationStatus {
        Pending => "pending",
        Reviewed => "reviewed",
        Shortlisted => "shortlisted",
        Accepted => "accepted",
        Rejected => "rejected",
    }
}

impl Default for ApplicationStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl ApplicationStatus {
    /// Accepted and rejected are final decisions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Accepted | ApplicationStatus::Rejected)
    }

    fn rank(&self) -> u8 {
        match self {
            ApplicationStatus::Pending => 0,
            ApplicationStatus::Reviewed => 1,
            ApplicationStatus::Shortlisted => 2,
            ApplicationStatus::Accepted | ApplicationStatus::Rejected => 3,
        }
    }

    /// Review only moves forward, and never out of a final decision.
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateApplicationInput {
    #[serde(default)]
    pub cover_letter: Option<String>,
    /// Falls back to the applicant's profile resume when absent
    #[serde(default)]
    pub resume_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ApplicationFilter {
    pub job_id: Option<i64>,
    pub applicant_id: Option<i64>,
    /// Applications to any job owned by this employer
    pub employer_id: Option<i64>,
    pub status: Option<ApplicationStatus>,
}
