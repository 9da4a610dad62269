//! Notification hub
//!
//! Notifications are stored first and then pushed to whoever is listening on
//! the user's SSE stream. Each online user gets one broadcast channel; a
//! channel whose receivers are all gone is dropped on the next send or
//! [`NotificationHub::prune`].
//!
//! Streams are also tied to the session that opened them: logging out or
//! having sessions revoked closes every stream of that session.

use crate::db::repositories::NotificationRepository;
use crate::models::{NewNotification, Notification, NotificationKind};
use anyhow::Context;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const DEFAULT_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_HISTORY_LIMIT: i64 = 20;

#[derive(Debug, thiserror::Error)]
pub enum NotificationServiceError {
    #[error("Notification not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Latest notifications plus the unread total
#[derive(Debug, Clone, Serialize)]
pub struct NotificationList {
    pub items: Vec<Notification>,
    pub unread_count: i64,
}

pub struct NotificationHub {
    repo: Arc<dyn NotificationRepository>,
    channels: Mutex<HashMap<i64, broadcast::Sender<Notification>>>,
    /// session id -> (user id, token cancelled when the session ends)
    sessions: Mutex<HashMap<String, (i64, CancellationToken)>>,
    capacity: usize,
    history_limit: i64,
}

impl NotificationHub {
    pub fn new(repo: Arc<dyn NotificationRepository>) -> Self {
        Self::with_limits(repo, DEFAULT_CHANNEL_CAPACITY, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_limits(
        repo: Arc<dyn NotificationRepository>,
        capacity: usize,
        history_limit: i64,
    ) -> Self {
        Self {
            repo,
            channels: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            history_limit: history_limit.max(1),
        }
    }

    /// Live feed for one user. Only notifications sent after this call arrive.
    pub fn subscribe(&self, user_id: i64) -> broadcast::Receiver<Notification> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Token cancelled once `session_id` is logged out or revoked.
    pub fn session_closed(&self, user_id: i64, session_id: &str) -> CancellationToken {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| (user_id, CancellationToken::new()))
            .1
            .clone()
    }

    pub fn close_session(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, token)) = sessions.remove(session_id) {
            token.cancel();
        }
    }

    /// End every open stream of a user; returns how many sessions were closed.
    pub fn close_user_streams(&self, user_id: i64) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, (owner, token)| {
            if *owner == user_id {
                token.cancel();
                false
            } else {
                true
            }
        });
        before - sessions.len()
    }

    /// Stored notifications newer than `last_id`, oldest first. Only the
    /// newest `history_limit` of them are returned.
    pub async fn missed_since(
        &self,
        user_id: i64,
        last_id: i64,
    ) -> Result<Vec<Notification>, NotificationServiceError> {
        Ok(self
            .repo
            .list_after(user_id, last_id, self.history_limit)
            .await
            .context("Failed to load missed notifications")?)
    }

    /// Persist a notification and deliver it to live subscribers.
    pub async fn notify(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, NotificationServiceError> {
        let stored = self
            .repo
            .create(&notification)
            .await
            .context("Failed to store notification")?;

        self.publish(&stored);
        Ok(stored)
    }

    /// Convenience wrapper that logs instead of failing; used where a
    /// notification is a side effect of another operation.
    pub async fn notify_quietly(
        &self,
        user_id: i64,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        link: Option<String>,
    ) {
        let notification = NewNotification {
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            link,
        };
        if let Err(e) = self.notify(notification).await {
            tracing::warn!("Failed to notify user {}: {}", user_id, e);
        }
    }

    fn publish(&self, notification: &Notification) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = channels.get(&notification.user_id) else {
            return;
        };

        if sender.send(notification.clone()).is_err() {
            // Every receiver is gone
            channels.remove(&notification.user_id);
        }
    }

    pub async fn list(&self, user_id: i64) -> Result<NotificationList, NotificationServiceError> {
        let items = self
            .repo
            .list_recent(user_id, self.history_limit)
            .await
            .context("Failed to list notifications")?;
        let unread_count = self
            .repo
            .unread_count(user_id)
            .await
            .context("Failed to count unread notifications")?;

        Ok(NotificationList {
            items,
            unread_count,
        })
    }

    pub async fn mark_read(&self, user_id: i64, id: i64) -> Result<(), NotificationServiceError> {
        let updated = self
            .repo
            .mark_read(id, user_id)
            .await
            .context("Failed to mark notification read")?;
        if updated {
            Ok(())
        } else {
            Err(NotificationServiceError::NotFound)
        }
    }

    pub async fn mark_all_read(&self, user_id: i64) -> Result<u64, NotificationServiceError> {
        Ok(self
            .repo
            .mark_all_read(user_id)
            .await
            .context("Failed to mark notifications read")?)
    }

    /// Drop channels nobody listens to; returns how many remain.
    pub fn prune(&self) -> usize {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.retain(|_, sender| sender.receiver_count() > 0);

        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.retain(|_, (user_id, _)| channels.contains_key(user_id));
        channels.len()
    }

    pub fn subscriber_count(&self, user_id: i64) -> usize {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.get(&user_id).map_or(0, |s| s.receiver_count())
    }

    pub fn history_limit(&self) -> i64 {
        self.history_limit
    }
}
