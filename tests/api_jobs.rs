mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{job_body, TestApp};

#[tokio::test]
async fn test_only_employers_post_jobs() {
    let app = TestApp::start().await;
    app.admin().await;
    let (employer, employer_id) = app.register("Acme", "employer").await;
    let (seeker, _) = app.register("Sam", "jobseeker").await;

    let job = app.post_job(&employer, "Rust Engineer").await;
    assert_eq!(job["employer_id"], employer_id);
    assert_eq!(job["status"], "open");
    assert_eq!(job["currency"], "IDR");

    app.server
        .post("/api/jobs")
        .authorization_bearer(&seeker)
        .json(&job_body("Not allowed"))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.server
        .post("/api/jobs")
        .json(&job_body("Anonymous"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_salary_range_is_rejected() {
    let app = TestApp::start().await;
    app.admin().await;
    let (employer, _) = app.register("Acme", "employer").await;

    let mut body = job_body("Backwards salary");
    body["salary_min"] = json!(50);
    body["salary_max"] = json!(10);

    app.server
        .post("/api/jobs")
        .authorization_bearer(&employer)
        .json(&body)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_free_plan_quota_limits_open_jobs() {
    let app = TestApp::start().await;
    app.admin().await;
    let (employer, _) = app.register("Acme", "employer").await;

    let first = app.post_job(&employer, "First").await;
    app.post_job(&employer, "Second").await;

    let over = app
        .server
        .post("/api/jobs")
        .authorization_bearer(&employer)
        .json(&job_body("Third"))
        .await;
    over.assert_status(StatusCode::FORBIDDEN);

    // Closing a job frees a slot
    app.server
        .patch(&format!("/api/jobs/{}/status", first["id"]))
        .authorization_bearer(&employer)
        .json(&json!({ "status": "closed" }))
        .await
        .assert_status_ok();
    app.post_job(&employer, "Third").await;
}

#[tokio::test]
async fn test_public_listing_hides_closed_jobs() {
    let app = TestApp::start().await;
    app.admin().await;
    let (employer, _) = app.register("Acme", "employer").await;

    let open = app.post_job(&employer, "Open role").await;
    let closing = app.post_job(&employer, "Closing role").await;

    let listed: Value = app.server.get("/api/jobs").await.json();
    assert_eq!(listed["total"], 2);

    app.server
        .patch(&format!("/api/jobs/{}/status", closing["id"]))
        .authorization_bearer(&employer)
        .json(&json!({ "status": "closed" }))
        .await
        .assert_status_ok();

    let listed: Value = app.server.get("/api/jobs").await.json();
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["items"][0]["id"], open["id"]);

    // The owner still sees both
    let mine: Value = app
        .server
        .get("/api/jobs/mine")
        .authorization_bearer(&employer)
        .await
        .json();
    assert_eq!(mine["total"], 2);
}

#[tokio::test]
async fn test_listing_filters_by_keyword() {
    let app = TestApp::start().await;
    app.admin().await;
    let (employer, _) = app.register("Acme", "employer").await;
    app.post_job(&employer, "Rust Engineer").await;
    app.post_job(&employer, "Product Designer").await;

    let listed: Value = app
        .server
        .get("/api/jobs")
        .add_query_param("keyword", "rust")
        .await
        .json();
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["items"][0]["title"], "Rust Engineer");
}

#[tokio::test]
async fn test_categories_count_open_jobs() {
    let app = TestApp::start().await;
    app.admin().await;
    let (employer, _) = app.register("Acme", "employer").await;
    app.post_job(&employer, "One").await;
    app.post_job(&employer, "Two").await;

    let categories: Value = app.server.get("/api/jobs/categories").await.json();
    assert_eq!(categories[0]["category"], "Engineering");
    assert_eq!(categories[0]["count"], 2);
}

#[tokio::test]
async fn test_viewing_a_job_counts_views() {
    let app = TestApp::start().await;
    app.admin().await;
    let (employer, _) = app.register("Acme", "employer").await;
    let job = app.post_job(&employer, "Rust Engineer").await;
    let path = format!("/api/jobs/{}", job["id"]);

    let first: Value = app.server.get(&path).await.json();
    assert_eq!(first["views"], 1);
    assert_eq!(first["employer"]["name"], "Acme");

    let second: Value = app.server.get(&path).await.json();
    assert_eq!(second["views"], 2);

    app.server
        .get("/api/jobs/9999")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_only_the_owner_edits_a_job() {
    let app = TestApp::start().await;
    app.admin().await;
    let (owner, _) = app.register("Acme", "employer").await;
    let (other, _) = app.register("Globex", "employer").await;
    let job = app.post_job(&owner, "Rust Engineer").await;
    let path = format!("/api/jobs/{}", job["id"]);

    app.server
        .put(&path)
        .authorization_bearer(&other)
        .json(&json!({ "title": "Hijacked" }))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let updated: Value = app
        .server
        .put(&path)
        .authorization_bearer(&owner)
        .json(&json!({ "title": "Senior Rust Engineer" }))
        .await
        .json();
    assert_eq!(updated["title"], "Senior Rust Engineer");

    app.server
        .delete(&path)
        .authorization_bearer(&owner)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    app.server
        .get(&path)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
