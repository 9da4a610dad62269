//! Admin API endpoints
//!
//! Everything here sits behind the admin gate. Routes owned by other
//! resources (articles, subscriptions) are nested by `api::build_api_router`.
//!
//! - GET    /api/admin/dashboard
//! - GET    /api/admin/stats
//! - GET    /api/admin/analytics?days=N
//! - GET    /api/admin/users
//! - PUT    /api/admin/users/{id}/role
//! - PUT    /api/admin/users/{id}/status
//! - DELETE /api/admin/users/{id}
//! - GET    /api/admin/jobs
//! - GET    /api/admin/activities
//! - POST   /api/admin/cache/clear

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::process;
use sysinfo::{Pid, System};

use crate::api::common::{default_page, default_per_page, non_empty};
use crate::api::jobs::JobsQuery;
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::{ApiError, MessageResponse, PageResponse};
use crate::cache::CacheLayer;
use crate::models::{
    AdminAction, AdminActivity, AdminActivityFilter, AnalyticsReport, Job, ListParams,
    NewAdminActivity, User, UserFilter, UserRole, UserStatus,
};
use crate::services::admin::{format_bytes, format_uptime};
use crate::services::Dashboard;

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize)]
pub struct SystemStatsResponse {
    pub version: String,
    /// Process resident memory in bytes
    pub memory_bytes: u64,
    pub memory_formatted: String,
    pub system_total_memory: u64,
    pub system_used_memory: u64,
    pub os_name: String,
    pub cache_backend: &'static str,
    pub uptime_seconds: u64,
    pub uptime_formatted: String,
    pub total_requests: u64,
    pub total_errors: u64,
    pub avg_response_time_ms: f64,
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub keyword: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

#[derive(Debug, Deserialize)]
pub struct ActivitiesQuery {
    pub admin_id: Option<i64>,
    pub action: Option<AdminAction>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct UserStatusRequest {
    pub status: UserStatus,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/stats", get(get_system_stats))
        .route("/analytics", get(get_analytics))
        .route("/users", get(list_users))
        .route("/users/{id}", delete(delete_user))
        .route("/users/{id}/role", put(set_user_role))
        .route("/users/{id}/status", put(set_user_status))
        .route("/jobs", get(list_jobs))
        .route("/activities", get(list_activities))
        .route("/cache/clear", post(clear_cache))
}

/// GET /api/admin/dashboard
async fn get_dashboard(State(state): State<AppState>) -> Result<Json<Dashboard>, ApiError> {
    Ok(Json(state.admin_service.dashboard().await?))
}

/// GET /api/admin/stats
async fn get_system_stats(State(state): State<AppState>) -> Json<SystemStatsResponse> {
    let mut sys = System::new_all();
    sys.refresh_all();

    let pid = Pid::from_u32(process::id());
    let memory_bytes = sys.process(pid).map_or(0, |p| p.memory());

    let stats = &state.request_stats;
    let uptime_seconds = stats.uptime_seconds();

    Json(SystemStatsResponse {
        version: APP_VERSION.to_string(),
        memory_bytes,
        memory_formatted: format_bytes(memory_bytes),
        system_total_memory: sys.total_memory(),
        system_used_memory: sys.used_memory(),
        os_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
        cache_backend: state.cache.backend_name(),
        uptime_seconds,
        uptime_formatted: format_uptime(uptime_seconds),
        total_requests: stats.total_requests(),
        total_errors: stats.total_errors(),
        avg_response_time_ms: stats.avg_response_time_us() / 1000.0,
    })
}

/// GET /api/admin/analytics
async fn get_analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsReport>, ApiError> {
    Ok(Json(state.analytics.report(query.days).await?))
}

/// GET /api/admin/users
async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UsersQuery>,
) -> Result<Json<PageResponse<User>>, ApiError> {
    let filter = UserFilter {
        role: query.role,
        status: query.status,
        keyword: non_empty(query.keyword),
    };
    let page = state
        .user_service
        .list_users(&filter, &ListParams::new(query.page, query.per_page))
        .await?;
    Ok(Json(page.into()))
}

/// PUT /api/admin/users/{id}/role
async fn set_user_role(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<RoleRequest>,
) -> Result<Json<User>, ApiError> {
    let user = state.user_service.set_role(auth.id(), id, body.role).await?;

    state
        .admin_activity
        .record(
            NewAdminActivity::new(auth.id(), AdminAction::UserRoleChanged, "user")
                .target(id)
                .details(json!({ "role": user.role })),
        )
        .await;
    Ok(Json(user))
}

/// PUT /api/admin/users/{id}/status
async fn set_user_status(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UserStatusRequest>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .user_service
        .set_status(auth.id(), id, body.status)
        .await?;

    let action = match user.status {
        UserStatus::Banned => AdminAction::UserBanned,
        _ => AdminAction::UserUnbanned,
    };
    state
        .admin_activity
        .record(
            NewAdminActivity::new(auth.id(), action, "user")
                .target(id)
                .details(json!({ "email": user.email })),
        )
        .await;
    Ok(Json(user))
}

/// DELETE /api/admin/users/{id}
async fn delete_user(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let user = state.user_service.delete_user(auth.id(), id).await?;
    // Their jobs are gone from every listing
    state.job_service.invalidate().await;

    state
        .admin_activity
        .record(
            NewAdminActivity::new(auth.id(), AdminAction::UserDeleted, "user")
                .target(id)
                .details(json!({ "email": user.email, "role": user.role })),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/admin/jobs - every status unless filtered
async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<PageResponse<Job>>, ApiError> {
    let page = state
        .job_service
        .list(&query.filter(), &query.params())
        .await?;
    Ok(Json(page.into()))
}

/// GET /api/admin/activities
async fn list_activities(
    State(state): State<AppState>,
    Query(query): Query<ActivitiesQuery>,
) -> Result<Json<PageResponse<AdminActivity>>, ApiError> {
    let filter = AdminActivityFilter {
        admin_id: query.admin_id,
        action: query.action,
    };
    let page = state
        .admin_activity
        .list(&filter, &ListParams::new(query.page, query.per_page))
        .await?;
    Ok(Json(page.into()))
}

/// POST /api/admin/cache/clear
async fn clear_cache(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<MessageResponse>, ApiError> {
    state.cache.clear().await?;

    state
        .admin_activity
        .record(
            NewAdminActivity::new(auth.id(), AdminAction::CacheCleared, "cache")
                .details(json!({ "backend": state.cache.backend_name() })),
        )
        .await;
    Ok(MessageResponse::new("Cache cleared"))
}
