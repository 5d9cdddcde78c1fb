use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::repositories::{
    BlobOutbox, BlobStore, DraftRepository, FolderRepository, GridFsBlobStore, MemoryBlobStore,
    MemoryStore, MongoStore, NoteRepository, PersonalityRepository, UserRepository,
};

pub mod auth_service;
pub mod blob_gc;
pub mod draft_service;
pub mod enhance_service;
pub mod folder_service;
pub mod note_service;
pub mod oauth_service;
pub mod personality_service;
pub mod rate_limiter;
pub mod social_service;
pub mod text_extraction;

pub use auth_service::{AuthService, AuthSettings};
pub use blob_gc::BlobCollector;
pub use draft_service::DraftService;
pub use enhance_service::{CompletionClient, DeepSeekClient, EnhanceService};
pub use folder_service::FolderService;
pub use note_service::NoteService;
pub use oauth_service::{GoogleIdTokenVerifier, GoogleVerifier, LinkedInClient, LinkedInHttpClient};
pub use personality_service::PersonalityService;
pub use rate_limiter::IpRateLimiter;
pub use social_service::SocialService;

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Outbound integrations: the LLM and the two identity providers.
pub struct ExternalClients {
    pub completion: Arc<dyn CompletionClient>,
    pub google: Arc<dyn GoogleVerifier>,
    pub linkedin: Arc<dyn LinkedInClient>,
}

impl ExternalClients {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            completion: Arc::new(DeepSeekClient::new(http.clone(), &config.deepseek)),
            google: Arc::new(GoogleIdTokenVerifier::new(http.clone(), &config.google)),
            linkedin: Arc::new(LinkedInHttpClient::new(http, &config.linkedin)),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::new(http, config))
    }
}

/// Every storage and integration seam the services are built from.
pub struct Backends {
    pub users: Arc<dyn UserRepository>,
    pub personalities: Arc<dyn PersonalityRepository>,
    pub folders: Arc<dyn FolderRepository>,
    pub notes: Arc<dyn NoteRepository>,
    pub drafts: Arc<dyn DraftRepository>,
    pub outbox: Arc<dyn BlobOutbox>,
    pub blobs: Arc<dyn BlobStore>,
    pub completion: Arc<dyn CompletionClient>,
    pub google: Arc<dyn GoogleVerifier>,
    pub linkedin: Arc<dyn LinkedInClient>,
}

impl Backends {
    fn from_store<S>(store: Arc<S>, blobs: Arc<dyn BlobStore>, clients: ExternalClients) -> Self
    where
        S: UserRepository
            + PersonalityRepository
            + FolderRepository
            + NoteRepository
            + DraftRepository
            + BlobOutbox
            + 'static,
    {
        Self {
            users: store.clone(),
            personalities: store.clone(),
            folders: store.clone(),
            notes: store.clone(),
            drafts: store.clone(),
            outbox: store,
            blobs,
            completion: clients.completion,
            google: clients.google,
            linkedin: clients.linkedin,
        }
    }

    pub fn mongo(store: MongoStore, clients: ExternalClients) -> Self {
        let blobs = Arc::new(GridFsBlobStore::new(store.database()));
        Self::from_store(Arc::new(store), blobs, clients)
    }

    pub fn memory(store: Arc<MemoryStore>, blobs: Arc<MemoryBlobStore>, clients: ExternalClients) -> Self {
        Self::from_store(store, blobs, clients)
    }
}
