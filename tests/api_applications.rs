mod common;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use serde_json::{json, Value};

use common::TestApp;

struct Hiring {
    app: TestApp,
    employer: String,
    seeker: String,
    seeker_id: i64,
    job_id: i64,
}

async fn hiring() -> Hiring {
    let app = TestApp::start().await;
    app.admin().await;
    let (employer, _) = app.register("Acme", "employer").await;
    let (seeker, seeker_id) = app.register("Sam", "jobseeker").await;
    let job = app.post_job(&employer, "Rust Engineer").await;
    let job_id = job["id"].as_i64().expect("job id");
    Hiring {
        app,
        employer,
        seeker,
        seeker_id,
        job_id,
    }
}

impl Hiring {
    async fn apply(&self) -> Value {
        let response = self
            .app
            .server
            .post(&format!("/api/applications/{}", self.job_id))
            .authorization_bearer(&self.seeker)
            .json(&json!({ "cover_letter": "I write a lot of Rust." }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json()
    }

    async fn set_status(&self, id: &Value, status: &str) -> axum_test::TestResponse {
        self.app
            .server
            .put(&format!("/api/applications/{}/status", id))
            .authorization_bearer(&self.employer)
            .json(&json!({ "status": status }))
            .await
    }
}

#[tokio::test]
async fn test_apply_once_per_job() {
    let h = hiring().await;

    let application = h.apply().await;
    assert_eq!(application["status"], "pending");
    assert_eq!(application["applicant_id"], h.seeker_id);
    assert_eq!(application["cover_letter"], "I write a lot of Rust.");

    h.app
        .server
        .post(&format!("/api/applications/{}", h.job_id))
        .authorization_bearer(&h.seeker)
        .json(&json!({}))
        .await
        .assert_status(StatusCode::CONFLICT);

    // Employers cannot apply
    h.app
        .server
        .post(&format!("/api/applications/{}", h.job_id))
        .authorization_bearer(&h.employer)
        .json(&json!({}))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    h.app
        .server
        .post("/api/applications/9999")
        .authorization_bearer(&h.seeker)
        .json(&json!({}))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_employer_is_notified_of_new_applications() {
    let h = hiring().await;
    h.apply().await;

    let inbox: Value = h
        .app
        .server
        .get("/api/notifications")
        .authorization_bearer(&h.employer)
        .await
        .json();
    assert_eq!(inbox["unread_count"], 1);
    assert_eq!(inbox["items"][0]["kind"], "application_received");

    let id = inbox["items"][0]["id"].clone();
    h.app
        .server
        .put(&format!("/api/notifications/{}/read", id))
        .authorization_bearer(&h.employer)
        .await
        .assert_status_ok();

    let inbox: Value = h
        .app
        .server
        .get("/api/notifications")
        .authorization_bearer(&h.employer)
        .await
        .json();
    assert_eq!(inbox["unread_count"], 0);
    assert_eq!(inbox["items"][0]["is_read"], true);
}

#[tokio::test]
async fn test_status_moves_forward_only() {
    let h = hiring().await;
    let application = h.apply().await;
    let id = application["id"].clone();

    let reviewed: Value = h.set_status(&id, "reviewed").await.json();
    assert_eq!(reviewed["status"], "reviewed");

    h.set_status(&id, "pending")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let accepted: Value = h.set_status(&id, "accepted").await.json();
    assert_eq!(accepted["status"], "accepted");

    // Decisions are final
    h.set_status(&id, "rejected")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    // The applicant heard about both changes
    let inbox: Value = h
        .app
        .server
        .get("/api/notifications")
        .authorization_bearer(&h.seeker)
        .await
        .json();
    assert_eq!(inbox["unread_count"], 2);

    let marked: Value = h
        .app
        .server
        .put("/api/notifications/read-all")
        .authorization_bearer(&h.seeker)
        .await
        .json();
    assert_eq!(marked["updated"], 2);
}

#[tokio::test]
async fn test_applicant_cannot_review_their_own_application() {
    let h = hiring().await;
    let application = h.apply().await;

    h.app
        .server
        .put(&format!("/api/applications/{}/status", application["id"]))
        .authorization_bearer(&h.seeker)
        .json(&json!({ "status": "accepted" }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_withdraw_until_a_decision() {
    let h = hiring().await;
    let application = h.apply().await;
    let path = format!("/api/applications/{}", application["id"]);

    h.app
        .server
        .delete(&path)
        .authorization_bearer(&h.seeker)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    // Applying again after withdrawing is allowed
    let again = h.apply().await;
    h.set_status(&again["id"], "rejected").await.assert_status_ok();

    h.app
        .server
        .delete(&format!("/api/applications/{}", again["id"]))
        .authorization_bearer(&h.seeker)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_employer_lists_applications_for_their_job() {
    let h = hiring().await;
    h.apply().await;
    let (other, _) = h.app.register("Globex", "employer").await;
    let path = format!("/api/applications/job/{}", h.job_id);

    let listed: Value = h
        .app
        .server
        .get(&path)
        .authorization_bearer(&h.employer)
        .await
        .json();
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["items"][0]["applicant_name"], "Sam");

    h.app
        .server
        .get(&path)
        .authorization_bearer(&other)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let mine: Value = h
        .app
        .server
        .get("/api/applications/mine")
        .authorization_bearer(&h.seeker)
        .await
        .json();
    assert_eq!(mine["total"], 1);
    assert_eq!(mine["items"][0]["job_title"], "Rust Engineer");
}

#[tokio::test]
async fn test_multipart_application_stores_the_resume() {
    let h = hiring().await;
    let pdf = b"%PDF-1.4\n% test resume\n".to_vec();

    let form = MultipartForm::new()
        .add_text("cover_letter", "Resume attached")
        .add_part(
            "resume",
            Part::bytes(pdf.clone())
                .file_name("resume.pdf")
                .mime_type("application/pdf"),
        );
    let response = h
        .app
        .server
        .post(&format!("/api/applications/{}", h.job_id))
        .authorization_bearer(&h.seeker)
        .multipart(form)
        .await;
    response.assert_status(StatusCode::CREATED);

    let application: Value = response.json();
    let url = application["resume_url"].as_str().expect("resume url");
    assert!(url.starts_with("/uploads/") && url.ends_with(".pdf"));

    let stored = h.app.uploads.path().join(url.trim_start_matches("/uploads/"));
    assert_eq!(std::fs::read(stored).expect("stored resume"), pdf);

    let served = h.app.server.get(url).await;
    served.assert_status_ok();
    assert_eq!(served.as_bytes().as_ref(), pdf.as_slice());
}

#[tokio::test]
async fn test_multipart_rejects_unsupported_resume_types() {
    let h = hiring().await;

    let form = MultipartForm::new().add_part(
        "resume",
        Part::bytes(b"MZ".to_vec())
            .file_name("resume.exe")
            .mime_type("application/x-msdownload"),
    );
    h.app
        .server
        .post(&format!("/api/applications/{}", h.job_id))
        .authorization_bearer(&h.seeker)
        .multipart(form)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}
