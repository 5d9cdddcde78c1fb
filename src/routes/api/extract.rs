use axum::{
    Router,
    extract::{Multipart, State},
    response::Json,
    routing::post,
};
use serde::Serialize;

use super::upload::{multipart_error, read_file};
use crate::{
    auth::AuthUser,
    error::{AppError, Result},
    server::AppState,
    services::text_extraction::{detect_kind, extract_text},
};

pub fn create_extract_routes() -> Router<AppState> {
    Router::new().route("/extract-text", post(handle_extract_text))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractedText {
    text: String,
    file_name: String,
}

async fn handle_extract_text(
    State(state): State<AppState>,
    _caller: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ExtractedText>> {
    let max_file_bytes = state.config.uploads.max_file_bytes;
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("file") {
            upload = Some(read_file(field, max_file_bytes).await?);
            break;
        }
    }
    let file = upload.ok_or_else(|| AppError::ValidationError("No file uploaded".to_string()))?;

    let kind = detect_kind(&file.content_type, &file.name).ok_or_else(|| {
        AppError::ValidationError("Only PDF and DOCX files are supported".to_string())
    })?;
    let text = extract_text(kind, file.bytes).await?;
    tracing::debug!(file = %file.name, chars = text.len(), "Extracted text");

    Ok(Json(ExtractedText {
        text,
        file_name: file.name,
    }))
}
