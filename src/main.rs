use std::sync::Arc;
use std::time::Duration;

use persona_notes::{
    auth::resolve_jwt_secret,
    config::{Config, StorageBackend},
    repositories::{MemoryBlobStore, MemoryStore, MongoStore},
    server::{self, AppState},
    services::{Backends, ExternalClients, blob_gc::SWEEP_INTERVAL},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    tracing::info!(env = ?config.server.env, "Starting persona-notes...");
    let addr = server::bind_addr(&config)?;
    let jwt_secret = resolve_jwt_secret(&config)?;
    let clients = ExternalClients::from_config(&config)?;

    let backends = match config.database.backend {
        StorageBackend::Mongodb => {
            let store = MongoStore::connect(&config.database).await?;
            store.ensure_indexes().await?;
            Backends::mongo(store, clients)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Backends::memory(
                Arc::new(MemoryStore::new()),
                Arc::new(MemoryBlobStore::new()),
                clients,
            )
        }
    };

    let state = AppState::new(config, jwt_secret, backends);
    let sweeper = state.blob_collector.clone().spawn_periodic(SWEEP_INTERVAL);

    let limiter = state.rate_limiter.clone();
    let window = Duration::from_secs(state.config.rate_limit.window_secs.max(1));
    let limiter_gc = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(window);
        loop {
            ticker.tick().await;
            limiter.retain_recent();
        }
    });

    let result = server::start_server(addr, state).await;
    sweeper.abort();
    limiter_gc.abort();
    result
}
