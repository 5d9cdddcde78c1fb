use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::{
    auth::AuthUser,
    error::{AppError, Result},
    models::parse_object_id,
    repositories::{PersonalityRequest, PersonalityResponse},
    server::AppState,
};

pub fn create_personality_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/personalities",
            get(handle_list_personalities).post(handle_create_personality),
        )
        .route("/personalities/current", get(handle_get_current_personality))
        .route(
            "/personalities/{id}",
            get(handle_get_personality)
                .put(handle_update_personality)
                .delete(handle_delete_personality),
        )
        .route("/personalities/{id}/switch", post(handle_switch_personality))
}

async fn handle_list_personalities(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<Vec<PersonalityResponse>>> {
    let personalities = state.personality_service.list(caller.user_id).await?;
    Ok(Json(
        personalities.iter().map(PersonalityResponse::from).collect(),
    ))
}

async fn handle_get_current_personality(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<PersonalityResponse>> {
    let personality = state
        .personality_service
        .current(caller.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No personality found".to_string()))?;
    Ok(Json(PersonalityResponse::from(&personality)))
}

async fn handle_get_personality(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<PersonalityResponse>> {
    let id = parse_object_id(&id, "personality")?;
    let personality = state.personality_service.get(caller.user_id, id).await?;
    Ok(Json(PersonalityResponse::from(&personality)))
}

async fn handle_create_personality(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(req): Json<PersonalityRequest>,
) -> Result<(StatusCode, Json<PersonalityResponse>)> {
    let personality = state.personality_service.create(caller.user_id, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(PersonalityResponse::from(&personality)),
    ))
}

async fn handle_update_personality(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<PersonalityRequest>,
) -> Result<Json<PersonalityResponse>> {
    let id = parse_object_id(&id, "personality")?;
    let personality = state
        .personality_service
        .update(caller.user_id, id, req)
        .await?;
    Ok(Json(PersonalityResponse::from(&personality)))
}

async fn handle_delete_personality(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let personality_id = parse_object_id(&id, "personality")?;
    state
        .personality_service
        .delete(caller.user_id, personality_id)
        .await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Personality deleted successfully"
    })))
}

async fn handle_switch_personality(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<PersonalityResponse>> {
    let id = parse_object_id(&id, "personality")?;
    let personality = state.personality_service.switch(caller.user_id, id).await?;
    Ok(Json(PersonalityResponse::from(&personality)))
}
