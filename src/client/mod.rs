//! Notification stream client
//!
//! Consumer side of `GET /api/notifications/stream`: an incremental SSE
//! parser, a capped notification list and a reconnecting stream driver.
//!
//! ```rust,ignore
//! use jobboard::client::{NotificationStream, RetryPolicy};
//!
//! let stream = NotificationStream::new("http://localhost:8080", token)
//!     .with_policy(RetryPolicy::default().with_max_retries(Some(10)));
//! let feed = stream.feed();
//! let end = stream.run(cancel.clone()).await;
//! ```

pub mod feed;
pub mod retry;
pub mod sse;
pub mod stream;

pub use feed::{NotificationFeed, DEFAULT_FEED_CAPACITY};
pub use retry::RetryPolicy;
pub use sse::{SseEvent, SseParser};
pub use stream::{NotificationStream, StreamEnd};
