//! Database repositories
//!
//! One repository per table. Each exposes an `async_trait` interface and a
//! `Sqlx*Repository` implementation that dispatches on the configured driver.

pub mod admin_activity;
pub mod analytics;
pub mod application;
pub mod article;
pub mod job;
pub mod notification;
pub mod session;
pub mod subscription;
pub mod user;

pub use admin_activity::{AdminActivityRepository, SqlxAdminActivityRepository};
pub use analytics::{AnalyticsRepository, SqlxAnalyticsRepository};
pub use application::{ApplicationRepository, SqlxApplicationRepository};
pub use article::{ArticleRepository, SqlxArticleRepository};
pub use job::{JobRepository, SqlxJobRepository};
pub use notification::{NotificationRepository, SqlxNotificationRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use subscription::{SqlxSubscriptionRepository, SubscriptionRepository};
pub use user::{SqlxUserRepository, UserRepository};
