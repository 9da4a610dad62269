//! Notification API endpoints (all authenticated)
//!
//! - GET /api/notifications
//! - PUT /api/notifications/{id}/read
//! - PUT /api/notifications/read-all
//! - GET /api/notifications/stream   (SSE, `?token=` accepted)

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, put},
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::{ApiError, MessageResponse};
use crate::models::Notification;
use crate::services::NotificationList;

pub const READY_EVENT: &str = "ready";
pub const NOTIFICATION_EVENT: &str = "notification";

/// Requires the auth middleware
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/read-all", put(mark_all_read))
        .route("/stream", get(stream_notifications))
        .route("/{id}/read", put(mark_read))
}

/// GET /api/notifications
async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<NotificationList>, ApiError> {
    Ok(Json(state.notifications.list(auth.id()).await?))
}

/// PUT /api/notifications/{id}/read
async fn mark_read(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.notifications.mark_read(auth.id(), id).await?;
    Ok(MessageResponse::new("Notification marked as read"))
}

/// PUT /api/notifications/read-all
async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state.notifications.mark_all_read(auth.id()).await?;
    Ok(Json(json!({ "updated": updated })))
}

/// GET /api/notifications/stream
///
/// With `Last-Event-ID`, stored notifications newer than that id are sent
/// before the live ones. The stream ends on shutdown or when its session is
/// logged out or revoked.
async fn stream_notifications(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let user_id = auth.id();
    // Subscribe before reading the backlog so nothing falls in between
    let rx = state.notifications.subscribe(user_id);
    let session_closed = state
        .notifications
        .session_closed(user_id, auth.0.session_id());

    let missed = match last_event_id(&headers) {
        Some(last) => state.notifications.missed_since(user_id, last).await?,
        None => Vec::new(),
    };
    let replayed_up_to = missed.last().map(|n| n.id);
    tracing::debug!(
        "User {} opened a notification stream ({} listening, {} replayed)",
        user_id,
        state.notifications.subscriber_count(user_id),
        missed.len()
    );

    let ready = stream::once(async move {
        Ok(Event::default()
            .event(READY_EVENT)
            .data(json!({ "user_id": user_id }).to_string()))
    });
    let live = live_notifications(rx)
        .filter(move |n| futures::future::ready(replayed_up_to.map_or(true, |id| n.id > id)));
    let updates = stream::iter(missed).chain(live).map(|notification| {
        Event::default()
            .event(NOTIFICATION_EVENT)
            .id(notification.id.to_string())
            .json_data(&notification)
    });

    let shutdown = state.shutdown.clone();
    let stop = async move {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = session_closed.cancelled() => {}
        }
    };
    let events = ready.chain(updates).take_until(stop);
    let keepalive = Duration::from_secs(state.config.notifications.keepalive_seconds.max(1));
    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(keepalive)))
}

fn last_event_id(headers: &HeaderMap) -> Option<i64> {
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Notifications from a broadcast receiver. A lagging reader skips what it
/// missed; the stream ends when the channel closes.
pub fn live_notifications(
    rx: broadcast::Receiver<Notification>,
) -> impl Stream<Item = Notification> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(notification) => return Some((notification, rx)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Notification stream lagged, skipped {}", skipped);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationKind;
    use chrono::Utc;

    fn notification(id: i64) -> Notification {
        Notification {
            id,
            user_id: 1,
            kind: NotificationKind::System,
            title: format!("n{}", id),
            message: String::new(),
            link: None,
            is_read: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_last_event_id_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(last_event_id(&headers), None);

        headers.insert("Last-Event-ID", " 42".parse().unwrap());
        assert_eq!(last_event_id(&headers), Some(42));

        headers.insert("Last-Event-ID", "abc".parse().unwrap());
        assert_eq!(last_event_id(&headers), None);
    }

    #[tokio::test]
    async fn test_live_notifications_ends_when_channel_closes() {
        let (tx, rx) = broadcast::channel(8);
        tx.send(notification(1)).unwrap();
        tx.send(notification(2)).unwrap();
        drop(tx);

        let ids: Vec<i64> = live_notifications(rx).map(|n| n.id).collect().await;
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_live_notifications_skips_lagged_messages() {
        let (tx, rx) = broadcast::channel(2);
        for id in 1..=5 {
            tx.send(notification(id)).unwrap();
        }
        drop(tx);

        let ids: Vec<i64> = live_notifications(rx).map(|n| n.id).collect().await;
        assert_eq!(ids, vec![4, 5]);
    }
}
