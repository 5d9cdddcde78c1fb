use axum::{
    Router,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::upload::{multipart_error, read_file, read_text};
use crate::{
    auth::AuthUser,
    error::{AppError, Result},
    models::parse_object_id,
    repositories::{NoteListQuery, NoteResponse, NoteUpdateRequest},
    server::AppState,
    services::{enhance_service::Enhancement, note_service::NewNoteForm},
};

pub fn create_note_routes() -> Router<AppState> {
    Router::new()
        .route("/notes", get(handle_list_notes).post(handle_create_note))
        .route("/notes/enhance", post(handle_enhance_content))
        .route(
            "/notes/{id}",
            get(handle_get_note)
                .put(handle_update_note)
                .delete(handle_delete_note),
        )
        .route("/notes/{id}/enhance", post(handle_enhance_note))
        .route(
            "/notes/{id}/attachments/{attachment_id}",
            get(handle_download_attachment).delete(handle_delete_attachment),
        )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnhanceRequest {
    enhance_type: Option<String>,
    platform: Option<String>,
    content: Option<String>,
}

impl EnhanceRequest {
    fn enhancement(&self) -> Result<Enhancement> {
        let enhance_type = self
            .enhance_type
            .as_deref()
            .ok_or_else(|| AppError::ValidationError("Enhance type is required".to_string()))?;
        Enhancement::from_request(enhance_type, self.platform.as_deref())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnhancedNote {
    enhanced_content: String,
    note: NoteResponse,
}

async fn handle_list_notes(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<NoteListQuery>,
) -> Result<Json<Vec<NoteResponse>>> {
    let notes = state.note_service.list(caller.user_id, query).await?;
    Ok(Json(notes.iter().map(NoteResponse::from).collect()))
}

async fn handle_get_note(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<NoteResponse>> {
    let id = parse_object_id(&id, "note")?;
    let note = state.note_service.get(caller.user_id, id).await?;
    Ok(Json(NoteResponse::from(&note)))
}

async fn read_note_form(mut multipart: Multipart, max_file_bytes: usize) -> Result<NewNoteForm> {
    let mut form = NewNoteForm::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "attachments" => {
                if field.file_name().is_some() {
                    form.files.push(read_file(field, max_file_bytes).await?);
                }
            }
            "title" => form.title = Some(read_text(field).await?),
            "content" => form.content = Some(read_text(field).await?),
            "personalityId" => form.personality_id = Some(read_text(field).await?),
            "folderId" => form.folder_id = Some(read_text(field).await?),
            "category" => form.category = Some(read_text(field).await?),
            "tags" => form.tags = Some(read_text(field).await?),
            "isVoiceNote" => form.is_voice_note = Some(read_text(field).await?),
            "audioUrl" => form.audio_url = Some(read_text(field).await?),
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }
    Ok(form)
}

async fn handle_create_note(
    State(state): State<AppState>,
    caller: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<NoteResponse>)> {
    let max_file_bytes = state.note_service.upload_limits().max_file_bytes;
    let form = read_note_form(multipart, max_file_bytes).await?;
    let note = state.note_service.create(caller.user_id, form).await?;
    Ok((StatusCode::CREATED, Json(NoteResponse::from(&note))))
}

async fn handle_update_note(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<NoteUpdateRequest>,
) -> Result<Json<NoteResponse>> {
    let id = parse_object_id(&id, "note")?;
    let note = state.note_service.update(caller.user_id, id, req).await?;
    Ok(Json(NoteResponse::from(&note)))
}

async fn handle_delete_note(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let note_id = parse_object_id(&id, "note")?;
    state.note_service.delete(caller.user_id, note_id).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Note deleted successfully"
    })))
}

async fn handle_download_attachment(
    State(state): State<AppState>,
    caller: AuthUser,
    Path((id, attachment_id)): Path<(String, String)>,
) -> Result<Response> {
    let note_id = parse_object_id(&id, "note")?;
    let attachment_id = parse_object_id(&attachment_id, "attachment")?;
    let (attachment, bytes) = state
        .note_service
        .download_attachment(caller.user_id, note_id, attachment_id)
        .await?;

    let content_type = HeaderValue::from_str(&attachment.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let file_name = attachment.name.replace(['"', '\r', '\n'], "_");
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

async fn handle_delete_attachment(
    State(state): State<AppState>,
    caller: AuthUser,
    Path((id, attachment_id)): Path<(String, String)>,
) -> Result<Json<NoteResponse>> {
    let note_id = parse_object_id(&id, "note")?;
    let attachment_id = parse_object_id(&attachment_id, "attachment")?;
    let note = state
        .note_service
        .delete_attachment(caller.user_id, note_id, attachment_id)
        .await?;
    Ok(Json(NoteResponse::from(&note)))
}

async fn handle_enhance_note(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<EnhanceRequest>,
) -> Result<Json<EnhancedNote>> {
    let note_id = parse_object_id(&id, "note")?;
    let (enhanced_content, note) = state
        .note_service
        .enhance_note(caller.user_id, note_id, req.enhancement()?)
        .await?;
    Ok(Json(EnhancedNote {
        enhanced_content,
        note: NoteResponse::from(&note),
    }))
}

async fn handle_enhance_content(
    State(state): State<AppState>,
    _caller: AuthUser,
    Json(req): Json<EnhanceRequest>,
) -> Result<Json<Value>> {
    let enhancement = req.enhancement()?;
    let content = req
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::ValidationError("Content is required".to_string()))?;
    let enhanced = state
        .note_service
        .enhance_content(enhancement, &content)
        .await?;
    Ok(Json(json!({ "enhancedContent": enhanced })))
}
