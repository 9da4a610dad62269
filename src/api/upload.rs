//! Upload API endpoints
//!
//! - POST /api/upload/image  (field `file`; image types, `max_file_size`)
//! - POST /api/upload/resume (field `file`; pdf/doc/docx, `max_resume_size`)
//!
//! Files are stored under `upload.path` with UUID names and served from
//! `/uploads`.

use axum::{
    extract::{multipart::Field, Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::ApiError;
use crate::config::{UploadConfig, UploadKind};

pub const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub filename: String,
    pub size: u64,
    pub content_type: String,
}

/// Requires the auth middleware
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/image", post(upload_image))
        .route("/resume", post(upload_resume))
}

/// POST /api/upload/image
async fn upload_image(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let uploaded = receive_file(&state.config.upload, UploadKind::Image, multipart).await?;
    Ok(Json(uploaded))
}

/// POST /api/upload/resume
async fn upload_resume(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let uploaded = receive_file(&state.config.upload, UploadKind::Resume, multipart).await?;
    Ok(Json(uploaded))
}

async fn receive_file(
    config: &UploadConfig,
    kind: UploadKind,
    mut multipart: Multipart,
) -> Result<UploadResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() == Some(FILE_FIELD) {
            return store_field(config, kind, field).await;
        }
    }

    Err(ApiError::validation_error("No file provided"))
}

/// Validate and persist one multipart file field.
pub async fn store_field(
    config: &UploadConfig,
    kind: UploadKind,
    field: Field<'_>,
) -> Result<UploadResponse, ApiError> {
    let content_type = field
        .content_type()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    if !config.is_type_allowed(kind, &content_type) {
        let allowed = match kind {
            UploadKind::Image => &config.allowed_image_types,
            UploadKind::Resume => &config.allowed_resume_types,
        };
        return Err(ApiError::validation_error(format!(
            "Invalid file type: {}. Allowed types: {}",
            content_type,
            allowed.join(", ")
        )));
    }

    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

    store_bytes(config, kind, &content_type, &data).await
}

pub async fn store_bytes(
    config: &UploadConfig,
    kind: UploadKind,
    content_type: &str,
    data: &[u8],
) -> Result<UploadResponse, ApiError> {
    let max = config.max_size(kind);
    if data.len() as u64 > max {
        return Err(ApiError::payload_too_large(format!(
            "File too large. Maximum size: {} bytes ({} MB)",
            max,
            max / 1024 / 1024
        )));
    }
    if data.is_empty() {
        return Err(ApiError::validation_error("File is empty"));
    }

    ensure_upload_dir(&config.path).await?;

    let filename = format!("{}.{}", Uuid::new_v4(), UploadConfig::get_extension(content_type));
    fs::write(config.path.join(&filename), data)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to save file: {}", e)))?;

    tracing::debug!("Stored upload {} ({} bytes)", filename, data.len());
    Ok(UploadResponse {
        url: format!("/uploads/{}", filename),
        filename,
        size: data.len() as u64,
        content_type: content_type.to_string(),
    })
}

async fn ensure_upload_dir(path: &Path) -> Result<(), ApiError> {
    if !path.exists() {
        fs::create_dir_all(path)
            .await
            .map_err(|e| ApiError::internal_error(format!("Failed to create upload dir: {}", e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn config(dir: &Path) -> UploadConfig {
        UploadConfig {
            path: dir.join("uploads"),
            max_file_size: 16,
            max_resume_size: 32,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_store_bytes_writes_uuid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let uploaded = store_bytes(&config, UploadKind::Resume, "application/pdf", b"%PDF-1.4")
            .await
            .unwrap();
        assert!(uploaded.filename.ends_with(".pdf"));
        assert_eq!(uploaded.url, format!("/uploads/{}", uploaded.filename));
        assert_eq!(
            std::fs::read(config.path.join(&uploaded.filename)).unwrap(),
            b"%PDF-1.4"
        );
    }

    #[tokio::test]
    async fn test_size_limit_depends_on_kind() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let data = [0u8; 20];

        let err = store_bytes(&config, UploadKind::Image, "image/png", &data)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);

        store_bytes(&config, UploadKind::Resume, "application/pdf", &data)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = store_bytes(&config(dir.path()), UploadKind::Image, "image/png", b"")
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
