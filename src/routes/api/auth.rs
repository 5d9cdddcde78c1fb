use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    auth::AuthUser,
    error::{AppError, Result},
    repositories::{
        AccountDeleteRequest, LoginRequest, PasswordChangeRequest, PreferencesUpdateRequest,
        ProfileUpdateRequest, RegisterRequest, UserResponse,
    },
    server::AppState,
    services::{
        auth_service::{AccountExport, AuthResponse, GoogleLoginRequest, LinkedInLoginRequest},
        social_service::{SocialPostRequest, SocialPostResponse},
    },
};

pub fn create_auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handle_register))
        .route("/auth/login", post(handle_login))
        .route("/auth/google", post(handle_google_login))
        .route("/auth/linkedin", post(handle_linkedin_login))
        .route("/auth/me", get(handle_get_current_user))
        .route("/auth/profile", put(handle_update_profile))
        .route("/auth/preferences", put(handle_update_preferences))
        .route("/auth/password", put(handle_change_password))
        .route("/auth/export", get(handle_export_data))
        .route("/auth/account", delete(handle_delete_account))
        .route("/auth/social/post", post(handle_social_post))
}

#[derive(Serialize)]
struct UserEnvelope {
    user: UserResponse,
}

async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let auth = state.auth_service.register(req).await?;
    Ok((StatusCode::CREATED, Json(auth)))
}

async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    Ok(Json(state.auth_service.login(req).await?))
}

async fn handle_google_login(
    State(state): State<AppState>,
    Json(req): Json<GoogleLoginRequest>,
) -> Result<Json<AuthResponse>> {
    Ok(Json(state.auth_service.google_login(req.credential).await?))
}

async fn handle_linkedin_login(
    State(state): State<AppState>,
    Json(req): Json<LinkedInLoginRequest>,
) -> Result<Json<AuthResponse>> {
    Ok(Json(state.auth_service.linkedin_login(req).await?))
}

async fn handle_get_current_user(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<UserEnvelope>> {
    let user = state.auth_service.current_user(caller.user_id).await?;
    Ok(Json(UserEnvelope {
        user: UserResponse::from(&user),
    }))
}

async fn handle_update_profile(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<Json<UserEnvelope>> {
    let user = state.auth_service.update_profile(caller.user_id, req).await?;
    Ok(Json(UserEnvelope {
        user: UserResponse::from(&user),
    }))
}

async fn handle_update_preferences(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(req): Json<PreferencesUpdateRequest>,
) -> Result<Json<UserEnvelope>> {
    let user = state
        .auth_service
        .update_preferences(caller.user_id, req)
        .await?;
    Ok(Json(UserEnvelope {
        user: UserResponse::from(&user),
    }))
}

async fn handle_change_password(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(req): Json<PasswordChangeRequest>,
) -> Result<Json<Value>> {
    state.auth_service.change_password(caller.user_id, req).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Password updated successfully"
    })))
}

async fn handle_export_data(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<AccountExport>> {
    Ok(Json(state.auth_service.export_data(caller.user_id).await?))
}

async fn handle_delete_account(
    State(state): State<AppState>,
    caller: AuthUser,
    body: Bytes,
) -> Result<Json<Value>> {
    // the body is optional for accounts without a password
    let req: AccountDeleteRequest = if body.is_empty() {
        AccountDeleteRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::ValidationError(format!("Invalid request body: {}", e)))?
    };
    state.auth_service.delete_account(caller.user_id, req).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Account deleted successfully"
    })))
}

async fn handle_social_post(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(req): Json<SocialPostRequest>,
) -> Result<Json<SocialPostResponse>> {
    Ok(Json(state.social_service.post(caller.user_id, req).await?))
}
