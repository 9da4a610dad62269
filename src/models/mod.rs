//! Data models
//!
//! Database entities, their enums and the input/filter types the services
//! accept. Enum values are stored as lowercase strings in both SQLite and
//! MySQL, so every enum round-trips through `Display` / `FromStr`.

/// Declares a fieldless enum backed by fixed lowercase strings, with
/// serde, `Display` and case-insensitive `FromStr`.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(anyhow::anyhow!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }
    };
}

mod admin_activity;
mod analytics;
mod application;
mod article;
mod job;
mod notification;
mod pagination;
mod session;
mod subscription;
mod user;

pub use admin_activity::{AdminAction, AdminActivity, AdminActivityFilter, NewAdminActivity};
pub use analytics::{AnalyticsCounter, AnalyticsReport, DailyPoint, Metric, MetricSeries};
pub use application::{
    Application, ApplicationFilter, ApplicationStatus, CreateApplicationInput,
};
pub use article::{
    Article, ArticleFilter, ArticleStatus, CreateArticleInput, UpdateArticleInput,
};
pub use job::{
    CategoryCount, CreateJobInput, ExperienceLevel, Job, JobFilter, JobSort, JobStatus, JobType,
    UpdateJobInput,
};
pub use notification::{NewNotification, Notification, NotificationKind};
pub use pagination::{ListParams, PagedResult};
pub use session::Session;
pub use subscription::{Plan, PlanInfo, Subscription, SubscriptionFilter, SubscriptionStatus};
pub use user::{
    ChangePasswordInput, LoginInput, RegisterInput, UpdateProfileInput, User, UserFilter, UserRole,
    UserStatus, UserSummary,
};
