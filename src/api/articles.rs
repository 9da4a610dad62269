//! Article API endpoints
//!
//! Public:
//! - GET /api/articles
//! - GET /api/articles/{slug}
//!
//! Admin:
//! - GET    /api/admin/articles
//! - GET    /api/admin/articles/{id}
//! - POST   /api/admin/articles
//! - PUT    /api/admin/articles/{id}
//! - DELETE /api/admin/articles/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::common::{default_page, default_per_page, non_empty};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::{ApiError, PageResponse};
use crate::models::{
    AdminAction, Article, ArticleFilter, ArticleStatus, CreateArticleInput, ListParams,
    NewAdminActivity, UpdateArticleInput,
};

#[derive(Debug, Deserialize)]
pub struct ArticlesQuery {
    pub keyword: Option<String>,
    /// Admin listing only
    pub status: Option<ArticleStatus>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl ArticlesQuery {
    fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_articles))
        .route("/{slug}", get(get_article))
}

/// Mounted at /admin/articles behind the admin gate
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(admin_list_articles).post(create_article))
        .route(
            "/{id}",
            get(get_article_by_id)
                .put(update_article)
                .delete(delete_article),
        )
}

/// GET /api/articles
async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<ArticlesQuery>,
) -> Result<Json<PageResponse<Article>>, ApiError> {
    let page = state
        .article_service
        .list_published(query.keyword.clone(), &query.params())
        .await?;
    Ok(Json(page.into()))
}

/// GET /api/articles/{slug}
async fn get_article(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Article>, ApiError> {
    Ok(Json(state.article_service.view_by_slug(&slug).await?))
}

/// GET /api/admin/articles
async fn admin_list_articles(
    State(state): State<AppState>,
    Query(query): Query<ArticlesQuery>,
) -> Result<Json<PageResponse<Article>>, ApiError> {
    let filter = ArticleFilter {
        status: query.status,
        keyword: non_empty(query.keyword.clone()),
    };
    let page = state.article_service.list(&filter, &query.params()).await?;
    Ok(Json(page.into()))
}

/// GET /api/admin/articles/{id}
async fn get_article_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Article>, ApiError> {
    Ok(Json(state.article_service.get_by_id(id).await?))
}

/// POST /api/admin/articles
async fn create_article(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(body): Json<CreateArticleInput>,
) -> Result<impl IntoResponse, ApiError> {
    let article = state.article_service.create(auth.user(), body).await?;

    state
        .admin_activity
        .record(
            NewAdminActivity::new(auth.id(), AdminAction::ArticleCreated, "article")
                .target(article.id)
                .details(json!({ "title": article.title, "status": article.status })),
        )
        .await;
    Ok((StatusCode::CREATED, Json(article)))
}

/// PUT /api/admin/articles/{id}
async fn update_article(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateArticleInput>,
) -> Result<Json<Article>, ApiError> {
    let article = state.article_service.update(id, body).await?;

    state
        .admin_activity
        .record(
            NewAdminActivity::new(auth.id(), AdminAction::ArticleUpdated, "article")
                .target(id)
                .details(json!({ "status": article.status })),
        )
        .await;
    Ok(Json(article))
}

/// DELETE /api/admin/articles/{id}
async fn delete_article(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let article = state.article_service.delete(id).await?;

    state
        .admin_activity
        .record(
            NewAdminActivity::new(auth.id(), AdminAction::ArticleDeleted, "article")
                .target(id)
                .details(json!({ "title": article.title })),
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}
