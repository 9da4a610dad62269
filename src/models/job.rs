//! Job posting model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A job posting owned by an employer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub employer_id: i64,
    pub title: String,
    pub description: String,
    pub requirements: Option<String>,
    pub location: String,
    pub category: String,
    pub job_type: JobType,
    pub experience_level: ExperienceLevel,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub currency: String,
    pub is_remote: bool,
    pub status: JobStatus,
    pub views: i64,
    /// Applications are refused after this instant
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Joined from the employer row
    #[serde(default)]
    pub employer_name: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub applications_count: i64,
}

impl Job {
    pub fn is_open(&self) -> bool {
        self.status == JobStatus::Open
    }

    /// Open and not past its deadline.
    pub fn accepts_applications(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.deadline.map_or(true, |d| d > now)
    }
}

string_enum! {
    pub enum JobType {
        FullTime => "full_time",
        PartTime => "part_time",
        Contract => "contract",
        Internship => "internship",
        Freelance => "freelance",
    }
}

impl Default for JobType {
    fn default() -> Self {
        Self::FullTime
    }
}

string_enum! {
    pub enum ExperienceLevel {
        Entry => "entry",
        Mid => "mid",
        Senior => "senior",
        Lead => "lead",
    }
}

impl Default for ExperienceLevel {
    fn default() -> Self {
        Self::Entry
    }
}

string_enum! {
    pub enum JobStatus {
        Open => "open",
        Closed => "closed",
    }
}

string_enum! {
    /// Listing order
    pub enum JobSort {
        Newest => "newest",
        Oldest => "oldest",
        SalaryHigh => "salary_high",
        SalaryLow => "salary_low",
    }
}

impl Default for JobSort {
    fn default() -> Self {
        Self::Newest
    }
}

impl JobSort {
    /// ORDER BY clause for the jobs query (`j` aliases the jobs table).
    pub fn order_clause(&self) -> &'static str {
        match self {
            JobSort::Newest => "j.created_at DESC, j.id DESC",
            JobSort::Oldest => "j.created_at ASC, j.id ASC",
            JobSort::SalaryHigh => "COALESCE(j.salary_max, j.salary_min, 0) DESC, j.id DESC",
            JobSort::SalaryLow => "COALESCE(j.salary_min, j.salary_max, 0) ASC, j.id ASC",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobInput {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub requirements: Option<String>,
    pub location: String,
    pub category: String,
    #[serde(default)]
    pub job_type: JobType,
    #[serde(default)]
    pub experience_level: ExperienceLevel,
    #[serde(default)]
    pub salary_min: Option<i64>,
    #[serde(default)]
    pub salary_max: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub is_remote: bool,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateJobInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub job_type: Option<JobType>,
    pub experience_level: Option<ExperienceLevel>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub currency: Option<String>,
    pub is_remote: Option<bool>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Search filter for job listings. Every field is optional; salary bounds
/// match jobs whose advertised range overlaps the requested one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    pub keyword: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub job_type: Option<JobType>,
    pub experience_level: Option<ExperienceLevel>,
    pub remote: Option<bool>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub employer_id: Option<i64>,
    pub status: Option<JobStatus>,
    pub sort: JobSort,
}

impl JobFilter {
    /// Stable digest of the normalized filter, used to build cache keys.
    ///
    /// Fields are JSON-encoded before hashing so free-text values cannot
    /// spill into their neighbours.
    pub fn cache_fragment(&self) -> String {
        let lower = |v: &Option<String>| v.as_deref().map(str::to_lowercase);
        let normalized = serde_json::json!([
            lower(&self.keyword),
            lower(&self.location),
            lower(&self.category),
            self.job_type.map(|t| t.as_str()),
            self.experience_level.map(|e| e.as_str()),
            self.remote,
            self.salary_min,
            self.salary_max,
            self.employer_id,
            self.status.map(|s| s.as_str()),
            self.sort.as_str(),
        ]);
        format!("{:x}", Sha256::digest(normalized.to_string().as_bytes()))
    }
}

/// Number of open jobs in a category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}
