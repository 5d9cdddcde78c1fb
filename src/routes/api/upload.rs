use axum::extract::multipart::{Field, MultipartError};

use crate::error::{AppError, Result};
use crate::services::note_service::UploadedFile;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

pub(crate) fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body is too large".to_string())
    } else {
        AppError::ValidationError(err.body_text())
    }
}

/// Reads one file part, failing with 413 as soon as it passes `max_bytes`.
pub(crate) async fn read_file(mut field: Field<'_>, max_bytes: usize) -> Result<UploadedFile> {
    let name = field.file_name().unwrap_or("file").to_string();
    let content_type = field
        .content_type()
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());

    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "{} exceeds the upload size limit",
                name
            )));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(UploadedFile {
        name,
        content_type,
        bytes,
    })
}

/// Reads a plain text part.
pub(crate) async fn read_text(field: Field<'_>) -> Result<String> {
    field.text().await.map_err(multipart_error)
}
