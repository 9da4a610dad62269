//! Supervised notification stream consumer
//!
//! Holds a connection to `GET /api/notifications/stream` open, feeding every
//! `notification` event into a shared [`NotificationFeed`]. Dropped
//! connections are retried with the configured [`RetryPolicy`]; the loop
//! ends on cancellation, when the policy gives up, or when the server
//! rejects the token. A connection that closes before its first event counts
//! as a failed attempt.

use futures::StreamExt;
use reqwest::{header, StatusCode};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::feed::NotificationFeed;
use super::retry::RetryPolicy;
use super::sse::{SseEvent, SseParser};
use crate::models::Notification;

pub const STREAM_PATH: &str = "/api/notifications/stream";

/// Why [`NotificationStream::run`] returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    Cancelled,
    /// The retry cap was reached after this many consecutive failures
    RetriesExhausted(u32),
    /// 401 or 403; retrying with the same token is pointless
    Unauthorized(StatusCode),
}

/// How a single connection ended
enum Disconnect {
    Cancelled,
    Rejected(StatusCode),
    Failed(String),
}

pub struct NotificationStream {
    http: reqwest::Client,
    base_url: String,
    token: String,
    policy: RetryPolicy,
    parser: SseParser,
    feed: Arc<Mutex<NotificationFeed>>,
    sender: Option<mpsc::UnboundedSender<Notification>>,
}

impl NotificationStream {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            policy: RetryPolicy::default(),
            parser: SseParser::new(),
            feed: Arc::new(Mutex::new(NotificationFeed::new())),
            sender: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Also forward each new notification to `sender`
    pub fn with_sender(mut self, sender: mpsc::UnboundedSender<Notification>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Shared handle to the list the stream keeps up to date
    pub fn feed(&self) -> Arc<Mutex<NotificationFeed>> {
        self.feed.clone()
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, STREAM_PATH)
    }

    /// Connect and reconnect until cancelled, rejected or out of retries.
    pub async fn run(mut self, cancel: CancellationToken) -> StreamEnd {
        loop {
            match self.connect_once(&cancel).await {
                Disconnect::Cancelled => return StreamEnd::Cancelled,
                Disconnect::Rejected(status) => {
                    tracing::warn!("Notification stream rejected with {}", status);
                    return StreamEnd::Unauthorized(status);
                }
                Disconnect::Failed(reason) => {
                    let Some(delay) = self.policy.next_delay() else {
                        tracing::warn!(
                            "Notification stream giving up after {} attempts: {}",
                            self.policy.attempt(),
                            reason
                        );
                        return StreamEnd::RetriesExhausted(self.policy.attempt());
                    };

                    tracing::debug!(
                        "Notification stream disconnected ({}); retrying in {:?}",
                        reason,
                        delay
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return StreamEnd::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn connect_once(&mut self, cancel: &CancellationToken) -> Disconnect {
        let mut request = self
            .http
            .get(self.url())
            .query(&[("token", self.token.as_str())])
            .header(header::ACCEPT, "text/event-stream");
        if let Some(id) = self.parser.last_event_id() {
            request = request.header("Last-Event-ID", id);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Disconnect::Cancelled,
            result = request.send() => match result {
                Ok(response) => response,
                Err(e) => return Disconnect::Failed(e.to_string()),
            },
        };

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Disconnect::Rejected(status);
        }
        if !status.is_success() {
            return Disconnect::Failed(format!("server answered {}", status));
        }

        self.parser.reset();
        let mut body = response.bytes_stream();
        // The backoff restarts only once the server actually delivers events
        let mut delivering = false;

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Disconnect::Cancelled,
                chunk = body.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    for event in self.parser.feed(&bytes) {
                        if !delivering {
                            delivering = true;
                            self.policy.reset();
                        }
                        self.handle_event(event);
                    }
                }
                Some(Err(e)) => return Disconnect::Failed(e.to_string()),
                None => return Disconnect::Failed("stream closed".to_string()),
            }
        }
    }

    fn handle_event(&self, event: SseEvent) {
        match event.event.as_str() {
            "ready" => tracing::debug!("Notification stream ready"),
            "notification" => match serde_json::from_str::<Notification>(&event.data) {
                Ok(notification) => self.deliver(notification),
                Err(e) => tracing::warn!("Malformed notification event: {}", e),
            },
            other => tracing::trace!("Ignoring {} event", other),
        }
    }

    fn deliver(&self, notification: Notification) {
        let added = self
            .feed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.clone());

        if added {
            if let Some(sender) = &self.sender {
                let _ = sender.send(notification);
            }
        }
    }
}
