use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::{
    auth::AuthUser,
    error::Result,
    models::parse_object_id,
    repositories::{DraftCreateRequest, DraftListQuery, DraftResponse, DraftUpdateRequest},
    server::AppState,
};

pub fn create_draft_routes() -> Router<AppState> {
    Router::new()
        .route("/drafts", get(handle_list_drafts).post(handle_create_draft))
        .route(
            "/drafts/{id}",
            get(handle_get_draft)
                .put(handle_update_draft)
                .delete(handle_delete_draft),
        )
        .route("/drafts/{id}/publish", post(handle_publish_draft))
}

async fn handle_list_drafts(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<DraftListQuery>,
) -> Result<Json<Vec<DraftResponse>>> {
    let drafts = state.draft_service.list(caller.user_id, query).await?;
    Ok(Json(drafts.iter().map(DraftResponse::from).collect()))
}

async fn handle_get_draft(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DraftResponse>> {
    let id = parse_object_id(&id, "draft")?;
    let draft = state.draft_service.get(caller.user_id, id).await?;
    Ok(Json(DraftResponse::from(&draft)))
}

async fn handle_create_draft(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(req): Json<DraftCreateRequest>,
) -> Result<(StatusCode, Json<DraftResponse>)> {
    let draft = state.draft_service.create(caller.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(DraftResponse::from(&draft))))
}

async fn handle_update_draft(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<DraftUpdateRequest>,
) -> Result<Json<DraftResponse>> {
    let id = parse_object_id(&id, "draft")?;
    let draft = state.draft_service.update(caller.user_id, id, req).await?;
    Ok(Json(DraftResponse::from(&draft)))
}

async fn handle_delete_draft(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let draft_id = parse_object_id(&id, "draft")?;
    state.draft_service.delete(caller.user_id, draft_id).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Draft deleted successfully"
    })))
}

async fn handle_publish_draft(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DraftResponse>> {
    let id = parse_object_id(&id, "draft")?;
    let draft = state.draft_service.publish(caller.user_id, id).await?;
    Ok(Json(DraftResponse::from(&draft)))
}
