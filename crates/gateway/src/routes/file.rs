//! File routes.
//!
//! Placeholders for the file storage service: each handler requires an
//! authenticated caller and acknowledges the request without contacting
//! storage.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Path};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::middleware::Identity;
use crate::state::AppState;

/// Upload acknowledgement.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub filename: String,
    pub size: usize,
    pub uploaded_by: String,
    pub user_id: String,
}

/// Download acknowledgement.
#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub message: &'static str,
    pub file_id: String,
    pub user_id: String,
}

/// Delete acknowledgement.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
    pub file_id: String,
    pub deleted_by: String,
}

/// Create the file router. Upload bodies are capped at `upload_max_bytes`.
pub fn router(upload_max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/files/upload",
            post(upload).layer(DefaultBodyLimit::max(upload_max_bytes)),
        )
        .route("/files/{id}", get(download).delete(delete))
}

async fn upload(
    identity: Identity,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let Ok(mut multipart) = multipart else {
        return Err(ApiError::Validation("No file uploaded".to_string()));
    };

    while let Some(field) = multipart.next_field().await.map_err(read_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("unnamed").to_string();
        let data = field.bytes().await.map_err(read_error)?;

        info!(
            filename = %filename,
            size = data.len(),
            user_id = %identity.user_id,
            "file upload accepted"
        );

        return Ok(Json(UploadResponse {
            message: "File uploaded successfully",
            filename,
            size: data.len(),
            uploaded_by: identity.username,
            user_id: identity.user_id,
        }));
    }

    Err(ApiError::Validation("No file uploaded".to_string()))
}

async fn download(identity: Identity, Path(file_id): Path<String>) -> Json<DownloadResponse> {
    Json(DownloadResponse {
        message: "File download initiated",
        file_id,
        user_id: identity.user_id,
    })
}

async fn delete(identity: Identity, Path(file_id): Path<String>) -> Json<DeleteResponse> {
    info!(file_id = %file_id, user_id = %identity.user_id, "file delete requested");

    Json(DeleteResponse {
        message: "File deleted successfully",
        file_id,
        deleted_by: identity.username,
    })
}

fn read_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("File too large".to_string())
    } else {
        ApiError::Validation(format!("Failed to read upload: {}", err.body_text()))
    }
}
