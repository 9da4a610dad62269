#![allow(dead_code)]

use std::sync::Arc;

use axum_test::TestServer;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tempfile::TempDir;

use jobboard::api::{build_router, AppState};
use jobboard::cache::{Cache, MemoryCache};
use jobboard::config::Config;
use jobboard::db::{create_test_pool, migrations::run_migrations};
use jobboard::services::CredentialDecryptor;

pub const PASSWORD: &str = "correct-horse-battery";

// Key generation dominates start-up; every test in a binary shares one key.
static KEYS: Lazy<Arc<CredentialDecryptor>> =
    Lazy::new(|| Arc::new(CredentialDecryptor::generate(1024).expect("generate test key")));

/// A fully wired app over an in-memory database.
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub uploads: TempDir,
}

impl TestApp {
    pub async fn start() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let uploads = tempfile::tempdir().expect("create upload dir");

        let mut config = Config::default();
        config.auth.jwt_secret = Some("integration-test-secret-0123456789abcdef".to_string());
        config.upload.path = uploads.path().to_path_buf();
        config.subscriptions.free_job_post_limit = 2;
        customize(&mut config);

        let pool = create_test_pool().await.expect("create test pool");
        run_migrations(&pool).await.expect("run migrations");
        let cache = Arc::new(Cache::Memory(MemoryCache::new()));

        let state = AppState::build(config, pool, cache, KEYS.clone());
        let server = TestServer::new(build_router(state.clone())).expect("start test server");

        Self {
            server,
            state,
            uploads,
        }
    }

    /// Register an account and return its token and id.
    pub async fn register(&self, name: &str, role: &str) -> (String, i64) {
        let email = format!("{}@example.com", name.to_lowercase());
        let response = self
            .server
            .post("/api/auth/register")
            .json(&json!({
                "name": name,
                "email": email,
                "password": PASSWORD,
                "role": role,
                "company_name": format!("{} Ltd", name),
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);

        let body: Value = response.json();
        let token = body["token"].as_str().expect("token").to_string();
        let id = body["user"]["id"].as_i64().expect("user id");
        (token, id)
    }

    /// The first account becomes admin, so call this before anything else.
    pub async fn admin(&self) -> (String, i64) {
        self.register("Admin", "jobseeker").await
    }

    pub async fn post_job(&self, token: &str, title: &str) -> Value {
        let response = self
            .server
            .post("/api/jobs")
            .authorization_bearer(token)
            .json(&job_body(title))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json()
    }
}

pub fn job_body(title: &str) -> Value {
    json!({
        "title": title,
        "description": "Build and run backend services",
        "location": "Jakarta",
        "category": "Engineering",
        "job_type": "full_time",
        "experience_level": "mid",
        "salary_min": 10_000_000,
        "salary_max": 20_000_000,
        "is_remote": true,
    })
}
