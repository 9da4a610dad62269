//! API middleware
//!
//! Contains:
//! - Application state shared by every handler
//! - Authentication (JWT from header, cookie or query string)
//! - Authorization (admin gate)
//! - Request statistics

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::api::responses::ApiError;
use crate::cache::{Cache, SwrCache};
use crate::config::Config;
use crate::db::repositories::{
    SqlxAdminActivityRepository, SqlxAnalyticsRepository, SqlxApplicationRepository,
    SqlxArticleRepository, SqlxJobRepository, SqlxNotificationRepository, SqlxSessionRepository,
    SqlxSubscriptionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    AdminActivityService, AdminService, AnalyticsService, ApplicationService, ArticleService,
    AuthUser, CredentialDecryptor, JobService, LoginRateLimiter, MarkdownRenderer,
    NotificationHub, SubscriptionService, TokenService, UserService,
};

/// Cookie and query parameter carrying the token
pub const TOKEN_NAME: &str = "token";

// ============================================================================
// Request Statistics
// ============================================================================

/// Lock-free request counters
pub struct RequestStats {
    total_requests: AtomicU64,
    /// Responses with a 5xx status
    total_errors: AtomicU64,
    total_response_time_us: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, duration_us: u64, is_error: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(duration_us, Ordering::Relaxed);
        if is_error {
            self.total_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let total_time = self.total_response_time_us.load(Ordering::Relaxed);
        total_time as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: DynDatabasePool,
    pub cache: Arc<Cache>,
    pub user_service: Arc<UserService>,
    pub job_service: Arc<JobService>,
    pub application_service: Arc<ApplicationService>,
    pub article_service: Arc<ArticleService>,
    pub subscription_service: Arc<SubscriptionService>,
    pub notifications: Arc<NotificationHub>,
    pub analytics: Arc<AnalyticsService>,
    pub admin_service: Arc<AdminService>,
    pub admin_activity: Arc<AdminActivityService>,
    pub request_stats: Arc<RequestStats>,
    /// Fired on shutdown; long-lived responses end with it
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire every service over one pool and cache.
    pub fn build(
        config: Config,
        pool: DynDatabasePool,
        cache: Arc<Cache>,
        credentials: Arc<CredentialDecryptor>,
    ) -> Self {
        let swr = SwrCache::new(
            cache.clone(),
            Duration::from_secs(config.cache.fresh_seconds),
            Duration::from_secs(config.cache.stale_seconds),
        );

        let tokens = Arc::new(TokenService::new(
            &config.auth.jwt_secret_or_generate(),
            chrono::Duration::hours(config.auth.token_ttl_hours),
        ));
        let notifications = Arc::new(NotificationHub::with_limits(
            SqlxNotificationRepository::boxed(pool.clone()),
            config.notifications.channel_capacity,
            config.notifications.history_limit,
        ));
        let user_service = Arc::new(
            UserService::new(
                SqlxUserRepository::boxed(pool.clone()),
                SqlxSessionRepository::boxed(pool.clone()),
                tokens,
                credentials,
                Arc::new(LoginRateLimiter::new()),
            )
            .with_encryption_detection(config.auth.encryption_heuristic)
            .with_notifications(notifications.clone()),
        );

        let analytics = Arc::new(AnalyticsService::new(SqlxAnalyticsRepository::boxed(
            pool.clone(),
        )));
        let subscription_service = Arc::new(
            SubscriptionService::new(
                SqlxSubscriptionRepository::boxed(pool.clone()),
                config.subscriptions.free_job_post_limit,
            )
            .with_notifications(notifications.clone()),
        );

        let job_service = Arc::new(JobService::new(
            SqlxJobRepository::boxed(pool.clone()),
            swr.clone(),
            subscription_service.clone(),
            analytics.clone(),
        ));
        let application_service = Arc::new(ApplicationService::new(
            SqlxApplicationRepository::boxed(pool.clone()),
            SqlxJobRepository::boxed(pool.clone()),
            notifications.clone(),
            analytics.clone(),
        ));
        let article_service = Arc::new(ArticleService::new(
            SqlxArticleRepository::boxed(pool.clone()),
            swr,
            MarkdownRenderer::new(),
            analytics.clone(),
        ));

        let admin_activity = Arc::new(AdminActivityService::new(
            SqlxAdminActivityRepository::boxed(pool.clone()),
        ));
        let admin_service = Arc::new(AdminService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxJobRepository::boxed(pool.clone()),
            SqlxApplicationRepository::boxed(pool.clone()),
            SqlxSubscriptionRepository::boxed(pool.clone()),
            SqlxArticleRepository::boxed(pool.clone()),
            admin_activity.clone(),
        ));

        Self {
            config: Arc::new(config),
            pool,
            cache,
            user_service,
            job_service,
            application_service,
            article_service,
            subscription_service,
            notifications,
            analytics,
            admin_service,
            admin_activity,
            request_stats: Arc::new(RequestStats::new()),
            shutdown: CancellationToken::new(),
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Authenticated caller, inserted by [`require_auth`]
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub AuthUser);

impl AuthenticatedUser {
    pub fn user(&self) -> &User {
        &self.0.user
    }

    pub fn id(&self) -> i64 {
        self.0.user.id
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Client address: the socket peer, or the first `X-Forwarded-For` hop when
/// `server.trusted_proxy` is set.
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let socket = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIp(client_ip(
            &parts.headers,
            socket,
            state.config.server.trusted_proxy,
        )))
    }
}

fn client_ip(headers: &HeaderMap, socket: Option<IpAddr>, trust_forwarded: bool) -> Option<IpAddr> {
    if !trust_forwarded {
        return socket;
    }
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .or(socket)
}

/// Token from `Authorization: Bearer`, the `token` cookie, or `?token=`.
pub fn extract_token(request: &Request) -> Option<String> {
    if let Some(token) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }

    if let Some(cookies) = request
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
    {
        for cookie in cookies.split(';') {
            if let Some(token) = cookie
                .trim()
                .strip_prefix(TOKEN_NAME)
                .and_then(|rest| rest.strip_prefix('='))
            {
                return Some(token.to_string());
            }
        }
    }

    request.uri().query().and_then(|query| {
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == TOKEN_NAME && !value.is_empty()).then(|| value.to_string())
        })
    })
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let auth = state.user_service.authenticate(&token).await?;
    request.extensions_mut().insert(AuthenticatedUser(auth));
    Ok(next.run(request).await)
}

/// Must run after [`require_auth`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.user().is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;

    let duration_us = start.elapsed().as_micros() as u64;
    state
        .request_stats
        .record(duration_us, response.status().is_server_error());

    response
}
