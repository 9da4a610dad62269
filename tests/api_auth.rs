mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{TestApp, PASSWORD};

#[tokio::test]
async fn test_first_account_becomes_admin() {
    let app = TestApp::start().await;

    let response = app
        .server
        .post("/api/auth/register")
        .json(&json!({
            "name": "Founder",
            "email": "founder@example.com",
            "password": PASSWORD,
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["user"]["role"], "admin");
    assert!(body["user"].get("password_hash").is_none());
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));

    let (_, _) = app.register("Employer", "employer").await;
    let me: Value = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "employer@example.com", "password": PASSWORD }))
        .await
        .json();
    assert_eq!(me["user"]["role"], "employer");
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_admin_role() {
    let app = TestApp::start().await;
    app.admin().await;
    app.register("Dana", "jobseeker").await;

    let duplicate = app
        .server
        .post("/api/auth/register")
        .json(&json!({
            "name": "Dana Again",
            "email": "DANA@example.com",
            "password": PASSWORD,
        }))
        .await;
    duplicate.assert_status(StatusCode::CONFLICT);

    let admin = app
        .server
        .post("/api/auth/register")
        .json(&json!({
            "name": "Mallory",
            "email": "mallory@example.com",
            "password": PASSWORD,
            "role": "admin",
        }))
        .await;
    admin.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = admin.json();
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_login_with_wrong_password_is_unauthorized() {
    let app = TestApp::start().await;
    app.admin().await;

    let response = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "admin@example.com", "password": "not-the-password" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_requires_a_token() {
    let app = TestApp::start().await;
    let (token, id) = app.admin().await;

    let me = app
        .server
        .get("/api/auth/me")
        .authorization_bearer(&token)
        .await;
    me.assert_status_ok();
    let body: Value = me.json();
    assert_eq!(body["id"], id);
    assert_eq!(body["email"], "admin@example.com");

    app.server
        .get("/api/auth/me")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    app.server
        .get("/api/auth/me")
        .authorization_bearer("not-a-jwt")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_the_session() {
    let app = TestApp::start().await;
    let (token, _) = app.admin().await;

    app.server
        .post("/api/auth/logout")
        .authorization_bearer(&token)
        .await
        .assert_status_ok();

    app.server
        .get("/api/auth/me")
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_public_key_is_published() {
    let app = TestApp::start().await;

    let body: Value = app.server.get("/api/auth/public-key").await.json();
    assert_eq!(body["algorithm"], "RSA-OAEP-256");
    assert!(body["public_key"]
        .as_str()
        .is_some_and(|pem| pem.starts_with("-----BEGIN PUBLIC KEY-----")));
}

#[tokio::test]
async fn test_health_reports_database() {
    let app = TestApp::start().await;

    let response = app.server.get("/api/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "connected");
}
