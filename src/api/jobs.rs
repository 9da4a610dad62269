//! Job API endpoints
//!
//! Public:
//! - GET /api/jobs
//! - GET /api/jobs/categories
//! - GET /api/jobs/{id}
//!
//! Authenticated:
//! - GET    /api/jobs/mine
//! - POST   /api/jobs
//! - PUT    /api/jobs/{id}
//! - PATCH  /api/jobs/{id}/status
//! - DELETE /api/jobs/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::common::{default_page, default_per_page, non_empty};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::{ApiError, PageResponse};
use crate::models::{
    AdminAction, CategoryCount, CreateJobInput, ExperienceLevel, Job, JobFilter, JobSort, JobStatus,
    JobType, ListParams, NewAdminActivity, UpdateJobInput, UserSummary,
};

#[derive(Debug, Deserialize)]
pub struct JobsQuery {
    pub keyword: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub job_type: Option<JobType>,
    pub experience_level: Option<ExperienceLevel>,
    pub remote: Option<bool>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub employer_id: Option<i64>,
    /// Ignored on the public listing
    pub status: Option<JobStatus>,
    pub sort: Option<JobSort>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl JobsQuery {
    pub fn filter(&self) -> JobFilter {
        JobFilter {
            keyword: non_empty(self.keyword.clone()),
            location: non_empty(self.location.clone()),
            category: non_empty(self.category.clone()),
            job_type: self.job_type,
            experience_level: self.experience_level,
            remote: self.remote,
            salary_min: self.salary_min,
            salary_max: self.salary_max,
            employer_id: self.employer_id,
            status: self.status,
            sort: self.sort.unwrap_or_default(),
        }
    }

    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: JobStatus,
}

#[derive(Debug, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: Job,
    pub employer: Option<UserSummary>,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs))
        .route("/categories", get(categories))
        .route("/{id}", get(get_job))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_job))
        .route("/mine", get(my_jobs))
        .route("/{id}", axum::routing::put(update_job).delete(delete_job))
        .route("/{id}/status", patch(set_status))
}

/// GET /api/jobs - open jobs only
async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<PageResponse<Job>>, ApiError> {
    let page = state
        .job_service
        .list_public(&query.filter(), &query.params())
        .await?;
    Ok(Json(page.into()))
}

/// GET /api/jobs/categories
async fn categories(State(state): State<AppState>) -> Result<Json<Vec<CategoryCount>>, ApiError> {
    Ok(Json(state.job_service.categories().await?))
}

/// GET /api/jobs/{id}
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<JobDetail>, ApiError> {
    let job = state.job_service.view(id).await?;
    let employer = state
        .user_service
        .get_by_id(job.employer_id)
        .await
        .ok()
        .map(|u| UserSummary::from(&u));
    Ok(Json(JobDetail { job, employer }))
}

/// GET /api/jobs/mine
async fn my_jobs(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(query): Query<JobsQuery>,
) -> Result<Json<PageResponse<Job>>, ApiError> {
    if !auth.user().can_post_jobs() {
        return Err(ApiError::forbidden("Only employers have job listings"));
    }
    let page = state
        .job_service
        .list_for_employer(auth.id(), query.status, &query.params())
        .await?;
    Ok(Json(page.into()))
}

/// POST /api/jobs
async fn create_job(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(body): Json<CreateJobInput>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.job_service.create(auth.user(), body).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// PUT /api/jobs/{id}
async fn update_job(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateJobInput>,
) -> Result<Json<Job>, ApiError> {
    let job = state.job_service.update(auth.user(), id, body).await?;
    Ok(Json(job))
}

/// PATCH /api/jobs/{id}/status
async fn set_status(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Job>, ApiError> {
    let job = state
        .job_service
        .set_status(auth.user(), id, body.status)
        .await?;

    if auth.user().is_admin() && job.employer_id != auth.id() {
        state
            .admin_activity
            .record(
                NewAdminActivity::new(auth.id(), AdminAction::JobStatusChanged, "job")
                    .target(id)
                    .details(json!({ "status": job.status })),
            )
            .await;
    }
    Ok(Json(job))
}

/// DELETE /api/jobs/{id} - applications go with it
async fn delete_job(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let job = state.job_service.delete(auth.user(), id).await?;

    if auth.user().is_admin() && job.employer_id != auth.id() {
        state
            .admin_activity
            .record(
                NewAdminActivity::new(auth.id(), AdminAction::JobDeleted, "job")
                    .target(id)
                    .details(json!({ "title": job.title, "employer_id": job.employer_id })),
            )
            .await;
    }
    Ok(StatusCode::NO_CONTENT)
}
