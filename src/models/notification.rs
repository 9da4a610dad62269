//! User notification model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Frontend route the notification points at
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

string_enum! {
    pub enum NotificationKind {
        ApplicationReceived => "application_received",
        ApplicationStatus => "application_status",
        Subscription => "subscription",
        System => "system",
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
}
