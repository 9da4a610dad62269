//! Shared API response types
//!
//! Every failure leaves the API as `{"error": {"code", "message"}}` with the
//! HTTP status derived from the code. Service errors convert into
//! [`ApiError`] here so handlers can use `?` directly.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::models::PagedResult;
use crate::services::{
    AdminActivityServiceError, AdminServiceError, AnalyticsServiceError, ApplicationServiceError,
    ArticleServiceError, JobServiceError, NotificationServiceError, SubscriptionServiceError,
    UserServiceError,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
    #[serde(skip)]
    retry_after: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
            retry_after: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new("PAYLOAD_TOO_LARGE", message)
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        let mut error = Self::new(
            "RATE_LIMITED",
            format!("Too many attempts, retry in {}s", retry_after_secs),
        )
        .with_details(serde_json::json!({ "retry_after_secs": retry_after_secs }));
        error.retry_after = Some(retry_after_secs);
        error
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" | "USER_BANNED" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "PAYLOAD_TOO_LARGE" => StatusCode::PAYLOAD_TOO_LARGE,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Log the cause of a 500 and hide it from the client.
    fn internal(e: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {}", e);
        Self::internal_error("Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = self.retry_after;
        let mut response = (status, Json(self)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::NotFound => ApiError::not_found("User not found"),
            UserServiceError::UserBanned => ApiError::new("USER_BANNED", "Account is banned"),
            UserServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            UserServiceError::RateLimited { retry_after_secs } => {
                ApiError::rate_limited(retry_after_secs.max(1) as u64)
            }
            UserServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<JobServiceError> for ApiError {
    fn from(e: JobServiceError) -> Self {
        match e {
            JobServiceError::NotFound => ApiError::not_found("Job not found"),
            JobServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            JobServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            e @ JobServiceError::QuotaExceeded { .. } => ApiError::forbidden(e.to_string()),
            JobServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<ApplicationServiceError> for ApiError {
    fn from(e: ApplicationServiceError) -> Self {
        match e {
            ApplicationServiceError::NotFound => ApiError::not_found("Application not found"),
            ApplicationServiceError::JobNotFound => ApiError::not_found("Job not found"),
            ApplicationServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ApplicationServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            e @ ApplicationServiceError::Conflict => ApiError::conflict(e.to_string()),
            e @ ApplicationServiceError::InvalidTransition(_) => {
                ApiError::validation_error(e.to_string())
            }
            ApplicationServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<ArticleServiceError> for ApiError {
    fn from(e: ArticleServiceError) -> Self {
        match e {
            ArticleServiceError::NotFound => ApiError::not_found("Article not found"),
            ArticleServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            e @ ArticleServiceError::DuplicateSlug(_) => ApiError::conflict(e.to_string()),
            ArticleServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<SubscriptionServiceError> for ApiError {
    fn from(e: SubscriptionServiceError) -> Self {
        match e {
            SubscriptionServiceError::NotFound => ApiError::not_found("Subscription not found"),
            SubscriptionServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            SubscriptionServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            SubscriptionServiceError::InvalidState(msg) => ApiError::conflict(msg),
            SubscriptionServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<NotificationServiceError> for ApiError {
    fn from(e: NotificationServiceError) -> Self {
        match e {
            NotificationServiceError::NotFound => ApiError::not_found("Notification not found"),
            NotificationServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<AnalyticsServiceError> for ApiError {
    fn from(e: AnalyticsServiceError) -> Self {
        match e {
            AnalyticsServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            AnalyticsServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<AdminServiceError> for ApiError {
    fn from(e: AdminServiceError) -> Self {
        match e {
            AdminServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<AdminActivityServiceError> for ApiError {
    fn from(e: AdminActivityServiceError) -> Self {
        match e {
            AdminActivityServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::internal(e)
    }
}

/// Generic `{"message": ...}` body
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// Page of results with navigation hints
#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> From<PagedResult<T>> for PageResponse<T> {
    fn from(page: PagedResult<T>) -> Self {
        Self {
            total_pages: page.total_pages(),
            has_next: page.has_next(),
            has_prev: page.has_prev(),
            items: page.items,
            total: page.total,
            page: page.page,
            per_page: page.per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::new("USER_BANNED", "x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::rate_limited(30).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ApiError::payload_too_large("x").status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::new("SOMETHING_ELSE", "x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::rate_limited(42).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn test_service_error_mapping() {
        let banned: ApiError = UserServiceError::UserBanned.into();
        assert_eq!(banned.error.code, "USER_BANNED");

        let quota: ApiError = JobServiceError::QuotaExceeded { limit: 3 }.into();
        assert_eq!(quota.status(), StatusCode::FORBIDDEN);
        assert!(quota.error.message.contains('3'));

        let dup: ApiError = ApplicationServiceError::Conflict.into();
        assert_eq!(dup.status(), StatusCode::CONFLICT);

        let internal: ApiError = UserServiceError::InternalError(anyhow::anyhow!("db down")).into();
        assert_eq!(internal.error.message, "Internal server error");
    }

    #[test]
    fn test_page_response() {
        let params = crate::models::ListParams::new(2, 10);
        let page: PageResponse<i32> = PagedResult::new(vec![1, 2], 25, &params).into();
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);
        assert!(page.has_prev);
    }
}
