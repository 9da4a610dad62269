//! Services layer - Business logic
//!
//! Services own validation, permission checks and side effects
//! (notifications, analytics, cache invalidation). Handlers stay thin and
//! repositories stay dumb.

pub mod admin;
pub mod admin_activity;
pub mod analytics;
pub mod application;
pub mod article;
pub mod credentials;
pub mod job;
pub mod markdown;
pub mod notification;
pub mod password;
pub mod rate_limiter;
pub mod subscription;
pub mod token;
pub mod user;

pub use admin::{AdminService, AdminServiceError, Dashboard};
pub use admin_activity::{AdminActivityService, AdminActivityServiceError};
pub use analytics::{AnalyticsService, AnalyticsServiceError};
pub use application::{ApplicationService, ApplicationServiceError};
pub use article::{generate_slug, ArticleService, ArticleServiceError};
pub use credentials::{looks_encrypted, CredentialDecryptor, CredentialError};
pub use job::{JobService, JobServiceError};
pub use markdown::MarkdownRenderer;
pub use notification::{NotificationHub, NotificationList, NotificationServiceError};
pub use password::{hash_password, verify_password};
pub use rate_limiter::LoginRateLimiter;
pub use subscription::{SubscriptionOverview, SubscriptionService, SubscriptionServiceError};
pub use token::{Claims, TokenError, TokenService};
pub use user::{AuthSession, AuthUser, UserService, UserServiceError};
