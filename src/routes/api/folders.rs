use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    auth::AuthUser,
    error::Result,
    models::{parse_object_id, parse_optional_object_id},
    repositories::{FolderCreateRequest, FolderResponse, FolderUpdateRequest, NoteResponse},
    server::AppState,
};

pub fn create_folder_routes() -> Router<AppState> {
    Router::new()
        .route("/folders", get(handle_list_folders).post(handle_create_folder))
        .route(
            "/folders/{id}",
            get(handle_get_folder)
                .put(handle_update_folder)
                .delete(handle_delete_folder),
        )
        .route("/folders/{id}/notes", get(handle_get_folder_notes))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FolderListQuery {
    personality_id: Option<String>,
}

async fn handle_list_folders(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<FolderListQuery>,
) -> Result<Json<Vec<FolderResponse>>> {
    let personality_id = parse_optional_object_id(query.personality_id.as_deref(), "personality")?;
    let folders = state
        .folder_service
        .list(caller.user_id, personality_id)
        .await?;
    Ok(Json(folders.iter().map(FolderResponse::from).collect()))
}

async fn handle_get_folder(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<FolderResponse>> {
    let id = parse_object_id(&id, "folder")?;
    let folder = state.folder_service.get(caller.user_id, id).await?;
    Ok(Json(FolderResponse::from(&folder)))
}

async fn handle_get_folder_notes(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<NoteResponse>>> {
    let id = parse_object_id(&id, "folder")?;
    let notes = state.folder_service.notes(caller.user_id, id).await?;
    Ok(Json(notes.iter().map(NoteResponse::from).collect()))
}

async fn handle_create_folder(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(req): Json<FolderCreateRequest>,
) -> Result<(StatusCode, Json<FolderResponse>)> {
    let folder = state.folder_service.create(caller.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(FolderResponse::from(&folder))))
}

async fn handle_update_folder(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<FolderUpdateRequest>,
) -> Result<Json<FolderResponse>> {
    let id = parse_object_id(&id, "folder")?;
    let folder = state.folder_service.update(caller.user_id, id, req).await?;
    Ok(Json(FolderResponse::from(&folder)))
}

async fn handle_delete_folder(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let folder_id = parse_object_id(&id, "folder")?;
    let deletion = state.folder_service.delete(caller.user_id, folder_id).await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("Folder \"{}\" deleted", deletion.folder.name),
        "deletedNotes": deletion.deleted_notes
    })))
}
