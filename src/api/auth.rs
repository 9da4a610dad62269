//! Authentication API endpoints
//!
//! - POST /api/auth/register
//! - POST /api/auth/login
//! - GET  /api/auth/public-key
//! - POST /api/auth/logout
//! - GET  /api/auth/me
//! - PUT  /api/auth/profile
//! - PUT  /api/auth/password
//!
//! Successful sign-in returns the JWT in the body and also sets it as the
//! `token` cookie.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;

use crate::api::middleware::{AppState, AuthenticatedUser, ClientIp, TOKEN_NAME};
use crate::api::responses::{ApiError, MessageResponse};
use crate::models::{ChangePasswordInput, LoginInput, Metric, RegisterInput, UpdateProfileInput, User};
use crate::services::credentials::ALGORITHM;
use crate::services::AuthSession;

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize)]
pub struct PublicKeyResponse {
    pub public_key: String,
    pub algorithm: &'static str,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/public-key", get(public_key))
}

/// Requires the auth middleware
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/profile", put(update_profile))
        .route("/password", put(change_password))
}

fn token_cookie(session: &AuthSession) -> HeaderMap {
    let max_age = (session.expires_at - Utc::now()).num_seconds().max(0);
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        TOKEN_NAME, session.token, max_age
    );

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.insert(header::SET_COOKIE, value);
    }
    headers
}

fn auth_response(session: AuthSession) -> (HeaderMap, Json<AuthResponse>) {
    let headers = token_cookie(&session);
    (
        headers,
        Json(AuthResponse {
            expires_at: session.expires_at.to_rfc3339(),
            user: session.user,
            token: session.token,
        }),
    )
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.user_service.register(body).await?;
    state.analytics.record(Metric::UserRegistered).await;

    let (headers, body) = auth_response(session);
    Ok((StatusCode::CREATED, headers, body))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.user_service.login(body, ip).await?;
    Ok(auth_response(session))
}

/// GET /api/auth/public-key
async fn public_key(State(state): State<AppState>) -> Json<PublicKeyResponse> {
    Json(PublicKeyResponse {
        public_key: state.user_service.credentials().public_key_pem().to_string(),
        algorithm: ALGORITHM,
    })
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    state.user_service.logout(auth.0.session_id()).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    Ok((headers, MessageResponse::new("Logged out")))
}

/// GET /api/auth/me
async fn me(auth: AuthenticatedUser) -> Json<User> {
    Json(auth.0.user)
}

/// PUT /api/auth/profile
async fn update_profile(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(body): Json<UpdateProfileInput>,
) -> Result<Json<User>, ApiError> {
    let user = state.user_service.update_profile(auth.id(), body).await?;
    Ok(Json(user))
}

/// PUT /api/auth/password
async fn change_password(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(body): Json<ChangePasswordInput>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.user_service.change_password(auth.id(), body).await?;
    Ok(MessageResponse::new("Password updated"))
}
