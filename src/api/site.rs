//! Site endpoints
//!
//! - GET  /api/health
//! - POST /api/site/render   (markdown preview)

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::admin::APP_VERSION;
use crate::api::middleware::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the database does not answer
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub html: String,
}

pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/render", post(render_content))
}

/// GET /api/health - 503 while the database is unreachable
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.pool.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                version: APP_VERSION,
                database: "connected",
            }),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    version: APP_VERSION,
                    database: "unreachable",
                }),
            )
        }
    }
}

/// POST /api/site/render
async fn render_content(
    State(state): State<AppState>,
    Json(body): Json<RenderRequest>,
) -> Json<RenderResponse> {
    Json(RenderResponse {
        html: state.article_service.render_markdown(&body.content),
    })
}
