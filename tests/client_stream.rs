mod common;

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::stream::{self, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use jobboard::api::build_router;
use jobboard::client::{NotificationStream, RetryPolicy, SseParser, StreamEnd};
use jobboard::client::stream::STREAM_PATH;
use jobboard::models::{NewNotification, Notification, NotificationKind};

use common::TestApp;

/// Serve `router` on an ephemeral port and return its base URL.
async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn fast_policy(max_retries: Option<u32>) -> RetryPolicy {
    RetryPolicy::new(Duration::from_millis(5), 2.0, Duration::from_millis(20))
        .with_jitter(0.0)
        .with_max_retries(max_retries)
}

fn notification_event(id: i64, title: &str) -> String {
    let data = json!({
        "id": id,
        "user_id": 7,
        "kind": "system",
        "title": title,
        "message": "",
        "link": null,
        "is_read": false,
        "created_at": "2024-05-01T12:00:00Z",
    });
    format!("event: notification\nid: {}\ndata: {}\n\n", id, data)
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

#[tokio::test]
async fn test_rejected_token_stops_the_stream() {
    let router = Router::new().route(STREAM_PATH, get(|| async { StatusCode::UNAUTHORIZED }));
    let base = spawn_server(router).await;

    let end = NotificationStream::new(base, "bad-token")
        .with_policy(fast_policy(None))
        .run(CancellationToken::new())
        .await;
    assert_eq!(end, StreamEnd::Unauthorized(StatusCode::UNAUTHORIZED));
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let router = Router::new().route(
        STREAM_PATH,
        get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let base = spawn_server(router).await;

    let end = NotificationStream::new(base, "token")
        .with_policy(fast_policy(Some(2)))
        .run(CancellationToken::new())
        .await;
    assert_eq!(end, StreamEnd::RetriesExhausted(2));
}

#[tokio::test]
async fn test_accepting_then_closing_counts_as_a_failure() {
    let router = Router::new().route(
        STREAM_PATH,
        get(|| async { ([(header::CONTENT_TYPE, "text/event-stream")], "") }),
    );
    let base = spawn_server(router).await;

    let end = tokio::time::timeout(
        Duration::from_secs(5),
        NotificationStream::new(base, "token")
            .with_policy(fast_policy(Some(3)))
            .run(CancellationToken::new()),
    )
    .await
    .expect("retry cap reached in time");
    assert_eq!(end, StreamEnd::RetriesExhausted(3));
}

#[tokio::test]
async fn test_cancel_before_connecting() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    // Nothing listens on port 9 of localhost; cancellation wins anyway
    let end = NotificationStream::new("http://127.0.0.1:9", "token")
        .with_policy(fast_policy(None))
        .run(cancel)
        .await;
    assert_eq!(end, StreamEnd::Cancelled);
}

#[tokio::test]
async fn test_events_fill_the_feed() {
    async fn events() -> Response {
        let chunks = vec![
            ": connected\n\n".to_string(),
            "event: ready\ndata: {\"user_id\":7}\n\n".to_string(),
            notification_event(1, "first"),
            // Split mid-event to exercise buffering
            notification_event(2, "second")[..10].to_string(),
            notification_event(2, "second")[10..].to_string(),
            notification_event(1, "first"),
        ];
        let body = stream::iter(
            chunks
                .into_iter()
                .map(|chunk| Ok::<_, Infallible>(Bytes::from(chunk))),
        )
        .chain(stream::pending());

        (
            [(header::CONTENT_TYPE, "text/event-stream")],
            Body::from_stream(body),
        )
            .into_response()
    }

    let base = spawn_server(Router::new().route(STREAM_PATH, get(events))).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = NotificationStream::new(base, "token")
        .with_policy(fast_policy(None))
        .with_sender(tx);
    let feed = client.feed();

    let cancel = CancellationToken::new();
    let task = tokio::spawn(client.run(cancel.clone()));

    let watched = feed.clone();
    wait_for(move || watched.lock().unwrap().len() == 2).await;

    let titles: Vec<String> = feed
        .lock()
        .unwrap()
        .iter()
        .map(|n| n.title.clone())
        .collect();
    assert_eq!(titles, vec!["second", "first"]);

    // The repeated event was not forwarded twice
    assert_eq!(rx.recv().await.map(|n| n.id), Some(1));
    assert_eq!(rx.recv().await.map(|n| n.id), Some(2));
    assert!(rx.try_recv().is_err());

    cancel.cancel();
    assert_eq!(task.await.unwrap(), StreamEnd::Cancelled);
}

#[tokio::test]
async fn test_live_notifications_reach_the_client() {
    let app = TestApp::start().await;
    app.admin().await;
    let (employer, employer_id) = app.register("Acme", "employer").await;
    let (seeker, _) = app.register("Sam", "jobseeker").await;
    let job = app.post_job(&employer, "Rust Engineer").await;

    let base = spawn_server(build_router(app.state.clone())).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = NotificationStream::new(base, employer.clone())
        .with_policy(fast_policy(None))
        .with_sender(tx);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(client.run(cancel.clone()));

    let hub = app.state.notifications.clone();
    wait_for(move || hub.subscriber_count(employer_id) > 0).await;

    app.server
        .post(&format!("/api/applications/{}", job["id"]))
        .authorization_bearer(&seeker)
        .json(&json!({ "cover_letter": "Hello" }))
        .await
        .assert_status(StatusCode::CREATED);

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notification in time")
        .expect("stream still open");
    assert_eq!(received.user_id, employer_id);
    assert_eq!(received.title, "New application");

    // Server shutdown ends the response; the client keeps retrying until told to stop
    app.state.shutdown.cancel();
    cancel.cancel();
    assert_eq!(task.await.unwrap(), StreamEnd::Cancelled);
}

fn system_note(user_id: i64, title: &str) -> NewNotification {
    NewNotification {
        user_id,
        kind: NotificationKind::System,
        title: title.to_string(),
        message: String::new(),
        link: None,
    }
}

#[tokio::test]
async fn test_reconnect_replays_missed_notifications() {
    let app = TestApp::start().await;
    let (token, user_id) = app.admin().await;
    let hub = app.state.notifications.clone();

    let seen = hub.notify(system_note(user_id, "seen")).await.unwrap();
    hub.notify(system_note(user_id, "missed 1")).await.unwrap();
    hub.notify(system_note(user_id, "missed 2")).await.unwrap();

    let base = spawn_server(build_router(app.state.clone())).await;
    let response = reqwest::Client::new()
        .get(format!("{}{}", base, STREAM_PATH))
        .query(&[("token", token.as_str())])
        .header("Last-Event-ID", seen.id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.bytes_stream();
    let mut parser = SseParser::new();
    let mut titles = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while titles.len() < 2 {
            let chunk = body.next().await.expect("stream open").unwrap();
            for event in parser.feed(&chunk) {
                if event.event == "notification" {
                    let n: Notification = serde_json::from_str(&event.data).unwrap();
                    titles.push(n.title);
                }
            }
        }
    })
    .await
    .expect("replayed in time");

    assert_eq!(titles, vec!["missed 1", "missed 2"]);
    app.state.shutdown.cancel();
}

#[tokio::test]
async fn test_logout_closes_the_stream() {
    let app = TestApp::start().await;
    app.admin().await;
    let (seeker, seeker_id) = app.register("Sam", "jobseeker").await;
    let base = spawn_server(build_router(app.state.clone())).await;

    let task = tokio::spawn(
        NotificationStream::new(base, seeker.clone())
            .with_policy(fast_policy(None))
            .run(CancellationToken::new()),
    );
    let hub = app.state.notifications.clone();
    wait_for(move || hub.subscriber_count(seeker_id) > 0).await;

    app.server
        .post("/api/auth/logout")
        .authorization_bearer(&seeker)
        .await
        .assert_status_ok();

    // The open stream ends and the reconnect is refused
    let end = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("stream closed in time")
        .unwrap();
    assert_eq!(end, StreamEnd::Unauthorized(StatusCode::UNAUTHORIZED));
}

#[tokio::test]
async fn test_ban_closes_the_stream() {
    let app = TestApp::start().await;
    let (admin, _) = app.admin().await;
    let (seeker, seeker_id) = app.register("Sam", "jobseeker").await;
    let base = spawn_server(build_router(app.state.clone())).await;

    let task = tokio::spawn(
        NotificationStream::new(base, seeker)
            .with_policy(fast_policy(None))
            .run(CancellationToken::new()),
    );
    let hub = app.state.notifications.clone();
    wait_for(move || hub.subscriber_count(seeker_id) > 0).await;

    app.server
        .put(&format!("/api/admin/users/{}/status", seeker_id))
        .authorization_bearer(&admin)
        .json(&json!({ "status": "banned" }))
        .await
        .assert_status_ok();

    let end = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("stream closed in time")
        .unwrap();
    assert_eq!(end, StreamEnd::Unauthorized(StatusCode::UNAUTHORIZED));
}
