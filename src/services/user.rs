//! User service
//!
//! Registration, login and session handling, profiles, and the admin side of
//! user management.
//!
//! - The very first account becomes admin; nobody else may pick that role.
//! - Every issued token is backed by a session row. Logout, bans and
//!   deletion remove those rows, which revokes the tokens.
//! - Passwords may arrive RSA-encrypted, see [`CredentialDecryptor`].

use crate::db::is_unique_violation;
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{
    ChangePasswordInput, ListParams, LoginInput, PagedResult, RegisterInput, Session,
    UpdateProfileInput, User, UserFilter, UserRole, UserStatus,
};
use crate::services::credentials::CredentialDecryptor;
use crate::services::notification::NotificationHub;
use crate::services::password::{check_password_policy, hash_password, verify_password};
use crate::services::rate_limiter::{LoginRateLimiter, LoginThrottle};
use crate::services::token::{Claims, TokenError, TokenService};
use anyhow::Context;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

const MAX_NAME_LENGTH: usize = 100;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
});

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Bad credentials or an unusable token
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found")]
    NotFound,

    #[error("Account is banned")]
    UserBanned,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too many login attempts, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: i64 },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<LoginThrottle> for UserServiceError {
    fn from(throttle: LoginThrottle) -> Self {
        UserServiceError::RateLimited {
            retry_after_secs: throttle.retry_after_secs(),
        }
    }
}

/// A signed-in user and the token that proves it
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// The caller behind a validated token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub claims: Claims,
}

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn session_id(&self) -> &str {
        &self.claims.jti
    }
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    tokens: Arc<TokenService>,
    credentials: Arc<CredentialDecryptor>,
    rate_limiter: Arc<LoginRateLimiter>,
    detect_encrypted: bool,
    notifications: Option<Arc<NotificationHub>>,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        tokens: Arc<TokenService>,
        credentials: Arc<CredentialDecryptor>,
        rate_limiter: Arc<LoginRateLimiter>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            tokens,
            credentials,
            rate_limiter,
            detect_encrypted: true,
            notifications: None,
        }
    }

    /// Close notification streams when their session ends
    pub fn with_notifications(mut self, hub: Arc<NotificationHub>) -> Self {
        self.notifications = Some(hub);
        self
    }

    /// Toggle the ciphertext sniffing for requests without an `encrypted` flag
    pub fn with_encryption_detection(mut self, detect: bool) -> Self {
        self.detect_encrypted = detect;
        self
    }

    pub fn credentials(&self) -> &CredentialDecryptor {
        &self.credentials
    }

    pub fn rate_limiter(&self) -> &Arc<LoginRateLimiter> {
        &self.rate_limiter
    }

    /// Register a new account and sign it in.
    pub async fn register(&self, input: RegisterInput) -> Result<AuthSession, UserServiceError> {
        let name = input.name.trim().to_string();
        let email = normalize_email(&input.email);
        validate_name(&name)?;
        validate_email(&email)?;

        if input.role == Some(UserRole::Admin) {
            return Err(UserServiceError::ValidationError(
                "The admin role cannot be chosen at registration".to_string(),
            ));
        }

        let password = self.plaintext_password(&input.password, input.encrypted)?;
        if let Some(reason) = check_password_policy(&password) {
            return Err(UserServiceError::ValidationError(reason));
        }

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let role = if self.is_first_user().await? {
            UserRole::Admin
        } else {
            input.role.unwrap_or_default()
        };

        let password_hash = hash_password(&password).context("Failed to hash password")?;
        let mut user = User::new(name, email, password_hash, role);
        user.company_name = non_empty(input.company_name);

        let created = self.user_repo.create(&user).await.map_err(|e| {
            if is_unique_violation(&e) {
                UserServiceError::UserExists(format!(
                    "Email '{}' is already registered",
                    user.email
                ))
            } else {
                UserServiceError::InternalError(e.context("Failed to create user"))
            }
        })?;

        tracing::info!("Registered user {} as {}", created.id, created.role);
        self.start_session(created).await
    }

    /// Verify credentials and issue a token.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login(
        &self,
        input: LoginInput,
        ip: Option<IpAddr>,
    ) -> Result<AuthSession, UserServiceError> {
        let email = normalize_email(&input.email);
        self.rate_limiter.check_attempt(&email, ip).await?;

        let password = self.plaintext_password(&input.password, input.encrypted)?;

        let user = match self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to get user by email")?
        {
            Some(user) => user,
            None => return Err(invalid_credentials()),
        };

        let valid = verify_password(&password, &user.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            tracing::debug!("Failed login for user {}", user.id);
            return Err(invalid_credentials());
        }

        if user.is_banned() {
            return Err(UserServiceError::UserBanned);
        }

        self.rate_limiter.record_success(&email).await;
        self.start_session(user).await
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        if let Some(hub) = &self.notifications {
            hub.close_session(session_id);
        }
        Ok(())
    }

    /// Resolve a bearer token to its user.
    ///
    /// The token must verify, its session must still exist and be unexpired,
    /// and the user must not be banned.
    pub async fn authenticate(&self, token: &str) -> Result<AuthUser, UserServiceError> {
        let claims = self.tokens.decode(token).map_err(|e| match e {
            TokenError::Expired => UserServiceError::AuthenticationError("Token expired".to_string()),
            other => UserServiceError::AuthenticationError(other.to_string()),
        })?;

        let session = self
            .session_repo
            .get_by_id(&claims.jti)
            .await
            .context("Failed to get session")?
            .ok_or_else(|| UserServiceError::AuthenticationError("Session revoked".to_string()))?;

        if session.is_expired() || session.user_id != claims.sub {
            if let Err(e) = self.session_repo.delete(&session.id).await {
                tracing::warn!("Failed to delete expired session {}: {}", session.id, e);
            }
            return Err(UserServiceError::AuthenticationError(
                "Session expired".to_string(),
            ));
        }

        let user = self
            .user_repo
            .get_by_id(claims.sub)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| UserServiceError::AuthenticationError("User no longer exists".to_string()))?;

        if user.is_banned() {
            return Err(UserServiceError::UserBanned);
        }

        Ok(AuthUser { user, claims })
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?
            .ok_or(UserServiceError::NotFound)
    }

    pub async fn update_profile(
        &self,
        user_id: i64,
        input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        let mut user = self.get_by_id(user_id).await?;

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            validate_name(&name)?;
            user.name = name;
        }
        if let Some(website) = input.company_website.as_deref() {
            let website = website.trim();
            if !website.is_empty()
                && !(website.starts_with("http://") || website.starts_with("https://"))
            {
                return Err(UserServiceError::ValidationError(
                    "Company website must be an http(s) URL".to_string(),
                ));
            }
        }

        // Present-but-empty clears a field
        apply_optional(&mut user.phone, input.phone);
        apply_optional(&mut user.location, input.location);
        apply_optional(&mut user.bio, input.bio);
        apply_optional(&mut user.avatar, input.avatar);
        apply_optional(&mut user.resume_url, input.resume_url);
        apply_optional(&mut user.company_name, input.company_name);
        apply_optional(&mut user.company_website, input.company_website);
        user.updated_at = Utc::now();

        let updated = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update user")?;
        Ok(updated)
    }

    pub async fn change_password(
        &self,
        user_id: i64,
        input: ChangePasswordInput,
    ) -> Result<(), UserServiceError> {
        let mut user = self.get_by_id(user_id).await?;

        let current = self.plaintext_password(&input.current_password, input.encrypted)?;
        let new_password = self.plaintext_password(&input.new_password, input.encrypted)?;

        if !verify_password(&current, &user.password_hash).context("Failed to verify password")? {
            return Err(UserServiceError::AuthenticationError(
                "Current password is incorrect".to_string(),
            ));
        }
        if let Some(reason) = check_password_policy(&new_password) {
            return Err(UserServiceError::ValidationError(reason));
        }

        user.password_hash = hash_password(&new_password).context("Failed to hash password")?;
        user.updated_at = Utc::now();
        self.user_repo
            .update(&user)
            .await
            .context("Failed to update password")?;

        tracing::info!("User {} changed their password", user.id);
        Ok(())
    }

    // ========================================================================
    // Admin operations
    // ========================================================================

    pub async fn list_users(
        &self,
        filter: &UserFilter,
        params: &ListParams,
    ) -> Result<PagedResult<User>, UserServiceError> {
        let (users, total) = self
            .user_repo
            .list(filter, params)
            .await
            .context("Failed to list users")?;
        Ok(PagedResult::new(users, total, params))
    }

    pub async fn count_users(&self, filter: &UserFilter) -> Result<i64, UserServiceError> {
        Ok(self
            .user_repo
            .count(filter)
            .await
            .context("Failed to count users")?)
    }

    pub async fn set_role(
        &self,
        admin_id: i64,
        user_id: i64,
        role: UserRole,
    ) -> Result<User, UserServiceError> {
        if admin_id == user_id {
            return Err(UserServiceError::Forbidden(
                "You cannot change your own role".to_string(),
            ));
        }

        let mut user = self.get_by_id(user_id).await?;
        user.role = role;
        user.updated_at = Utc::now();
        let updated = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update role")?;

        // Tokens carry the role; force a fresh login
        self.revoke_sessions(user_id).await?;
        Ok(updated)
    }

    /// Ban or unban a user. Banning signs the user out everywhere.
    pub async fn set_status(
        &self,
        admin_id: i64,
        user_id: i64,
        status: UserStatus,
    ) -> Result<User, UserServiceError> {
        if admin_id == user_id {
            return Err(UserServiceError::Forbidden(
                "You cannot change your own status".to_string(),
            ));
        }

        let mut user = self.get_by_id(user_id).await?;
        user.status = status;
        user.updated_at = Utc::now();
        let updated = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update status")?;

        if status == UserStatus::Banned {
            let revoked = self.revoke_sessions(user_id).await?;
            tracing::info!("Banned user {}, revoked {} sessions", user_id, revoked);
        }
        Ok(updated)
    }

    /// Delete a user; their jobs, applications and sessions go with them.
    pub async fn delete_user(&self, admin_id: i64, user_id: i64) -> Result<User, UserServiceError> {
        if admin_id == user_id {
            return Err(UserServiceError::Forbidden(
                "You cannot delete your own account".to_string(),
            ));
        }

        let user = self.get_by_id(user_id).await?;
        self.revoke_sessions(user_id).await?;
        self.user_repo
            .delete(user_id)
            .await
            .context("Failed to delete user")?;
        Ok(user)
    }

    /// Delete all expired sessions; returns how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self
            .user_repo
            .count(&UserFilter::default())
            .await
            .context("Failed to count users")?;
        Ok(count == 0)
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    fn plaintext_password(
        &self,
        raw: &str,
        encrypted: Option<bool>,
    ) -> Result<String, UserServiceError> {
        self.credentials
            .resolve_password(raw, encrypted, self.detect_encrypted)
            .map_err(|e| UserServiceError::ValidationError(e.to_string()))
    }

    async fn start_session(&self, user: User) -> Result<AuthSession, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user.id,
            expires_at: now + self.tokens.ttl(),
            created_at: now,
        };
        let session = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        let issued = self
            .tokens
            .issue(user.id, user.role, &session.id)
            .map_err(|e| UserServiceError::InternalError(anyhow::anyhow!(e)))?;

        Ok(AuthSession {
            user,
            token: issued.token,
            expires_at: session.expires_at,
        })
    }

    async fn revoke_sessions(&self, user_id: i64) -> Result<u64, UserServiceError> {
        let revoked = self
            .session_repo
            .delete_by_user(user_id)
            .await
            .context("Failed to revoke sessions")?;
        if let Some(hub) = &self.notifications {
            hub.close_user_streams(user_id);
        }
        Ok(revoked)
    }
}

fn invalid_credentials() -> UserServiceError {
    UserServiceError::AuthenticationError("Invalid email or password".to_string())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    if email.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Email cannot be empty".to_string(),
        ));
    }
    if email.len() > 255 || !EMAIL_PATTERN.is_match(email) {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), UserServiceError> {
    if name.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(UserServiceError::ValidationError(format!(
            "Name must be at most {} characters",
            MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn apply_optional(field: &mut Option<String>, update: Option<String>) {
    if update.is_some() {
        *field = non_empty(update);
    }
}
