use anyhow::Context;
use axum::{
    Json, Router,
    extract::{ConnectInfo, DefaultBodyLimit, Request, State},
    http::{HeaderName, Method, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use jsonwebtoken::DecodingKey;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::create_decoding_key;
use crate::config::Config;
use crate::error::{AppError, ErrorResponse};
use crate::repositories::UserRepository;
use crate::routes::create_api_routes;
use crate::services::{
    AuthService, AuthSettings, Backends, BlobCollector, DraftService, EnhanceService,
    FolderService, IpRateLimiter, NoteService, PersonalityService, SocialService,
};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jwt_decoding_key: DecodingKey,
    pub users: Arc<dyn UserRepository>,
    pub auth_service: Arc<AuthService>,
    pub personality_service: Arc<PersonalityService>,
    pub folder_service: Arc<FolderService>,
    pub note_service: Arc<NoteService>,
    pub draft_service: Arc<DraftService>,
    pub social_service: Arc<SocialService>,
    pub blob_collector: Arc<BlobCollector>,
    pub rate_limiter: Arc<IpRateLimiter>,
}

impl AppState {
    pub fn new(config: Config, jwt_secret: String, backends: Backends) -> Self {
        let blob_collector = Arc::new(BlobCollector::new(
            backends.blobs.clone(),
            backends.outbox.clone(),
        ));
        let enhancer = Arc::new(EnhanceService::new(backends.completion.clone()));

        let auth_service = Arc::new(AuthService::new(
            &backends,
            blob_collector.clone(),
            AuthSettings {
                jwt_secret: jwt_secret.clone(),
                token_ttl_days: config.jwt.expiry_days,
                bcrypt_cost: config.security.bcrypt_cost,
            },
        ));
        let personality_service = Arc::new(PersonalityService::new(
            backends.personalities.clone(),
            backends.users.clone(),
        ));
        let folder_service = Arc::new(FolderService::new(
            backends.folders.clone(),
            backends.notes.clone(),
            backends.personalities.clone(),
            blob_collector.clone(),
        ));
        let note_service = Arc::new(NoteService::new(
            backends.notes.clone(),
            backends.folders.clone(),
            backends.personalities.clone(),
            backends.blobs.clone(),
            backends.outbox.clone(),
            blob_collector.clone(),
            enhancer,
            config.uploads.clone(),
        ));
        let draft_service = Arc::new(DraftService::new(
            backends.drafts.clone(),
            backends.notes.clone(),
            backends.personalities.clone(),
        ));
        let social_service = Arc::new(SocialService::new(
            backends.users.clone(),
            backends.linkedin.clone(),
        ));
        let rate_limiter = Arc::new(IpRateLimiter::new(&config.rate_limit));

        Self {
            config: Arc::new(config),
            jwt_decoding_key: create_decoding_key(&jwt_secret),
            users: backends.users,
            auth_service,
            personality_service,
            folder_service,
            note_service,
            draft_service,
            social_service,
            blob_collector,
            rate_limiter,
        }
    }
}

pub fn bind_addr(config: &Config) -> anyhow::Result<SocketAddr> {
    format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid server address {}:{}",
                config.server.host, config.server.port
            )
        })
}

/// Rejects callers over their budget. Requests without a peer address
/// (in-process tests) pass through.
async fn limit_by_ip(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(ConnectInfo(peer)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        if let Err(message) = state.rate_limiter.check_ip_limit(peer.ip()) {
            tracing::warn!(ip = %peer.ip(), "Rate limit exceeded");
            return AppError::TooManyRequests(message).into_response();
        }
    }
    next.run(req).await
}

async fn redact_server_errors(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    if !state.config.is_production() || !response.status().is_server_error() {
        return response;
    }
    let status = response.status();
    (
        status,
        Json(ErrorResponse {
            error: "Internal server error".to_string(),
        }),
    )
        .into_response()
}

pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let addr = bind_addr(&state.config)?;
    let allowed_origins = state.config.server.get_allowed_origins(&addr)?;

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true);

    let body_limit = state.config.uploads.body_limit();

    let app = Router::new()
        .nest("/api", create_api_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(state.clone(), limit_by_ip))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            redact_server_errors,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    Ok(app)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

pub async fn start_server(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    tracing::info!("Configuring routes...");
    let app = build_router(state)?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server is running on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}
