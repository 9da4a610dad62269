//! Application API endpoints (all authenticated)
//!
//! - POST   /api/applications/{job_id}      JSON or multipart
//! - GET    /api/applications/mine
//! - GET    /api/applications/job/{job_id}
//! - GET    /api/applications/{id}
//! - PUT    /api/applications/{id}/status
//! - DELETE /api/applications/{id}

use axum::{
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::common::{default_page, default_per_page};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::{ApiError, PageResponse};
use crate::api::upload::{store_field, FILE_FIELD};
use crate::config::UploadKind;
use crate::models::{
    AdminAction, Application, ApplicationStatus, CreateApplicationInput, ListParams,
    NewAdminActivity,
};

const COVER_LETTER_FIELD: &str = "cover_letter";
const RESUME_FIELD: &str = "resume";

#[derive(Debug, Deserialize)]
pub struct ApplicationsQuery {
    pub status: Option<ApplicationStatus>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl ApplicationsQuery {
    fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: ApplicationStatus,
}

/// Requires the auth middleware
pub fn router() -> Router<AppState> {
    // `{id}` is the job id for POST and the application id otherwise
    Router::new()
        .route("/mine", get(my_applications))
        .route("/job/{job_id}", get(job_applications))
        .route(
            "/{id}",
            get(get_application)
                .post(apply)
                .delete(delete_application),
        )
        .route("/{id}/status", put(update_status))
}

/// POST /api/applications/{job_id}
async fn apply(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(job_id): Path<i64>,
    request: Request,
) -> Result<impl IntoResponse, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let input = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::validation_error(e.body_text()))?;
        read_multipart(&state, multipart).await?
    } else {
        let Json(input) = Json::<CreateApplicationInput>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::validation_error(e.body_text()))?;
        input
    };

    let application = state
        .application_service
        .apply(auth.user(), job_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(application)))
}

/// `cover_letter` text field plus an optional `resume` (or `file`) upload.
async fn read_multipart(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<CreateApplicationInput, ApiError> {
    let mut input = CreateApplicationInput::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        match field.name() {
            Some(COVER_LETTER_FIELD) => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation_error(e.to_string()))?;
                input.cover_letter = Some(text);
            }
            Some(RESUME_FIELD) | Some(FILE_FIELD) => {
                let stored = store_field(&state.config.upload, UploadKind::Resume, field).await?;
                input.resume_url = Some(stored.url);
            }
            _ => {}
        }
    }
    Ok(input)
}

/// GET /api/applications/mine
async fn my_applications(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(query): Query<ApplicationsQuery>,
) -> Result<Json<PageResponse<Application>>, ApiError> {
    let page = state
        .application_service
        .list_mine(auth.user(), query.status, &query.params())
        .await?;
    Ok(Json(page.into()))
}

/// GET /api/applications/job/{job_id}
async fn job_applications(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(job_id): Path<i64>,
    Query(query): Query<ApplicationsQuery>,
) -> Result<Json<PageResponse<Application>>, ApiError> {
    let page = state
        .application_service
        .list_for_job(auth.user(), job_id, query.status, &query.params())
        .await?;
    Ok(Json(page.into()))
}

/// GET /api/applications/{id}
async fn get_application(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Application>, ApiError> {
    Ok(Json(state.application_service.get(auth.user(), id).await?))
}

/// PUT /api/applications/{id}/status
async fn update_status(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Application>, ApiError> {
    let application = state
        .application_service
        .update_status(auth.user(), id, body.status)
        .await?;
    Ok(Json(application))
}

/// DELETE /api/applications/{id}
async fn delete_application(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let application = state.application_service.delete(auth.user(), id).await?;

    if auth.user().is_admin() && application.applicant_id != auth.id() {
        state
            .admin_activity
            .record(
                NewAdminActivity::new(auth.id(), AdminAction::ApplicationDeleted, "application")
                    .target(id)
                    .details(json!({
                        "job_id": application.job_id,
                        "applicant_id": application.applicant_id,
                    })),
            )
            .await;
    }
    Ok(StatusCode::NO_CONTENT)
}
