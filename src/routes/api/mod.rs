use axum::{Json, Router, routing::get};
use chrono::Utc;
use serde_json::{Value, json};

use crate::server::AppState;

mod auth;
mod drafts;
mod extract;
mod folders;
mod notes;
mod personalities;
mod upload;

use auth::create_auth_routes;
use drafts::create_draft_routes;
use extract::create_extract_routes;
use folders::create_folder_routes;
use notes::create_note_routes;
use personalities::create_personality_routes;

pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handle_health))
        .merge(create_auth_routes())
        .merge(create_note_routes())
        .merge(create_folder_routes())
        .merge(create_personality_routes())
        .merge(create_draft_routes())
        .merge(create_extract_routes())
}

async fn handle_health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now() }))
}
