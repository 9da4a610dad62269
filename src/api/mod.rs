//! API layer - HTTP handlers and routing
//!
//! Every endpoint lives under `/api`:
//! - auth, jobs, applications, articles, subscriptions, notifications
//! - uploads (files are served back from `/uploads`)
//! - admin back-office under `/api/admin`
//! - health check

pub mod admin;
pub mod applications;
pub mod articles;
pub mod auth;
pub mod common;
pub mod jobs;
pub mod middleware;
pub mod notifications;
pub mod responses;
pub mod site;
pub mod subscriptions;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::Config;

pub use middleware::{AppState, AuthenticatedUser, RequestStats};
pub use responses::{ApiError, MessageResponse, PageResponse};

/// Multipart framing on top of the largest accepted file
const BODY_LIMIT_OVERHEAD: usize = 64 * 1024;

/// Routes under `/api`
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .nest("/admin/articles", articles::admin_router())
        .nest("/admin/subscriptions", subscriptions::admin_router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (any signed-in user)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/jobs", jobs::protected_router())
        .nest("/applications", applications::router())
        .nest("/subscriptions", subscriptions::protected_router())
        .nest("/notifications", notifications::router())
        .nest("/upload", upload::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .merge(site::health_router())
        .nest("/site", site::router())
        .nest("/auth", auth::public_router())
        .nest("/jobs", jobs::public_router())
        .nest("/articles", articles::public_router())
        .nest("/subscriptions", subscriptions::public_router())
        .merge(admin_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .nest_service("/uploads", ServeDir::new(&config.upload.path))
        .layer(DefaultBodyLimit::max(body_limit(&config)))
        .layer(cors_layer(&config.server.cors_origin))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        // Outermost, so rejected requests are counted too
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_stats_middleware,
        ))
        .with_state(state)
}

fn body_limit(config: &Config) -> usize {
    let largest = config.upload.max_file_size.max(config.upload.max_resume_size);
    usize::try_from(largest)
        .unwrap_or(usize::MAX)
        .saturating_add(BODY_LIMIT_OVERHEAD)
}

/// Cookie auth needs an exact origin; `*` allows any origin without
/// credentials.
fn cors_layer(origin: &str) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
    ];

    if origin.trim() == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    match origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
            .allow_credentials(true),
        Err(_) => {
            tracing::warn!("Invalid CORS origin {:?}; cross-origin requests are disabled", origin);
            CorsLayer::new()
        }
    }
}
