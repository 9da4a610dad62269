//! Subscription API endpoints
//!
//! Public:
//! - GET  /api/subscriptions/plans
//!
//! Authenticated:
//! - GET  /api/subscriptions/me
//! - POST /api/subscriptions
//! - POST /api/subscriptions/{id}/cancel
//!
//! Admin:
//! - GET  /api/admin/subscriptions
//! - POST /api/admin/subscriptions/{id}/activate

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::common::{default_page, default_per_page};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::{ApiError, PageResponse};
use crate::models::{
    AdminAction, ListParams, NewAdminActivity, Plan, PlanInfo, Subscription, SubscriptionFilter,
    SubscriptionStatus,
};
use crate::services::SubscriptionOverview;

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub plan: Plan,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionsQuery {
    pub status: Option<SubscriptionStatus>,
    pub user_id: Option<i64>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/plans", get(plans))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_subscription))
        .route("/me", get(my_subscription))
        .route("/{id}/cancel", post(cancel_subscription))
}

/// Mounted at /admin/subscriptions
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_subscriptions))
        .route("/{id}/activate", post(activate_subscription))
}

/// GET /api/subscriptions/plans
async fn plans(State(state): State<AppState>) -> Json<Vec<PlanInfo>> {
    Json(state.subscription_service.plans())
}

/// GET /api/subscriptions/me
async fn my_subscription(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<SubscriptionOverview>, ApiError> {
    Ok(Json(state.subscription_service.overview(auth.id()).await?))
}

/// POST /api/subscriptions
async fn create_subscription(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(body): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = state
        .subscription_service
        .create(auth.user(), body.plan)
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// POST /api/subscriptions/{id}/cancel
async fn cancel_subscription(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Subscription>, ApiError> {
    let subscription = state.subscription_service.cancel(auth.user(), id).await?;

    if auth.user().is_admin() && subscription.user_id != auth.id() {
        state
            .admin_activity
            .record(
                NewAdminActivity::new(auth.id(), AdminAction::SubscriptionCancelled, "subscription")
                    .target(id)
                    .details(json!({
                        "user_id": subscription.user_id,
                        "plan": subscription.plan,
                    })),
            )
            .await;
    }
    Ok(Json(subscription))
}

/// GET /api/admin/subscriptions
async fn list_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionsQuery>,
) -> Result<Json<PageResponse<Subscription>>, ApiError> {
    let filter = SubscriptionFilter {
        user_id: query.user_id,
        status: query.status,
    };
    let page = state
        .subscription_service
        .list(&filter, &ListParams::new(query.page, query.per_page))
        .await?;
    Ok(Json(page.into()))
}

/// POST /api/admin/subscriptions/{id}/activate
async fn activate_subscription(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Subscription>, ApiError> {
    let subscription = state.subscription_service.activate(id).await?;

    state
        .admin_activity
        .record(
            NewAdminActivity::new(auth.id(), AdminAction::SubscriptionActivated, "subscription")
                .target(id)
                .details(json!({
                    "user_id": subscription.user_id,
                    "plan": subscription.plan,
                    "expires_at": subscription.expires_at,
                })),
        )
        .await;
    Ok(Json(subscription))
}
