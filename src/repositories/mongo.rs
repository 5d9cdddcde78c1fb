use std::time::Duration;

use mongodb::{
    Client, ClientSession, Collection, Database, IndexModel,
    bson::{Bson, doc, oid::ObjectId},
    options::IndexOptions,
};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::repositories::{BlobDeletion, Draft, Folder, Note, Personality, User};

pub const USERS: &str = "users";
pub const PERSONALITIES: &str = "personalities";
pub const FOLDERS: &str = "folders";
pub const NOTES: &str = "notes";
pub const DRAFTS: &str = "drafts";
pub const BLOB_DELETIONS: &str = "blob_deletions";

/// MongoDB handle shared by every repository implementation.
///
/// Multi-document writes run in transactions, so the deployment must be a
/// replica set (a single-node one is enough).
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub fn new(client: Client, db_name: &str) -> Self {
        let db = client.database(db_name);
        Self { client, db }
    }

    /// Connect and ping, retrying with a fixed delay between attempts.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let attempts = config.connect_retries.max(1);
        let delay = Duration::from_secs(config.reconnect_delay_secs);
        let mut attempt = 1;

        loop {
            match Self::try_connect(config).await {
                Ok(store) => {
                    tracing::info!(db = %config.db_name, "Connected to MongoDB");
                    return Ok(store);
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        attempts,
                        error = %e,
                        "MongoDB connection failed, retrying in {:?}",
                        delay
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_connect(config: &DatabaseConfig) -> Result<Self> {
        let client = Client::with_uri_str(&config.connection_uri).await?;
        let store = Self::new(client, &config.db_name);
        store.db.run_command(doc! { "ping": 1 }).await?;
        Ok(store)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        let unique = || IndexOptions::builder().unique(true).build();
        let unique_sparse = || IndexOptions::builder().unique(true).sparse(true).build();

        self.users()
            .create_indexes(vec![
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique())
                    .build(),
                IndexModel::builder()
                    .keys(doc! { "username": 1 })
                    .options(unique())
                    .build(),
                IndexModel::builder()
                    .keys(doc! { "googleId": 1 })
                    .options(unique_sparse())
                    .build(),
                IndexModel::builder()
                    .keys(doc! { "linkedinId": 1 })
                    .options(unique_sparse())
                    .build(),
            ])
            .await?;

        self.personalities()
            .create_index(IndexModel::builder().keys(doc! { "userId": 1 }).build())
            .await?;
        self.folders()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "userId": 1, "personalityId": 1 })
                    .build(),
            )
            .await?;
        self.notes()
            .create_indexes(vec![
                IndexModel::builder()
                    .keys(doc! { "userId": 1, "updatedAt": -1 })
                    .build(),
                IndexModel::builder()
                    .keys(doc! { "userId": 1, "folderId": 1 })
                    .build(),
            ])
            .await?;
        self.drafts()
            .create_index(IndexModel::builder().keys(doc! { "userId": 1 }).build())
            .await?;
        self.blob_deletions()
            .create_index(IndexModel::builder().keys(doc! { "fileId": 1 }).build())
            .await?;

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    pub(crate) async fn start_transaction(&self) -> Result<ClientSession> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;
        Ok(session)
    }

    pub(crate) fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    pub(crate) fn personalities(&self) -> Collection<Personality> {
        self.db.collection(PERSONALITIES)
    }

    pub(crate) fn folders(&self) -> Collection<Folder> {
        self.db.collection(FOLDERS)
    }

    pub(crate) fn notes(&self) -> Collection<Note> {
        self.db.collection(NOTES)
    }

    pub(crate) fn drafts(&self) -> Collection<Draft> {
        self.db.collection(DRAFTS)
    }

    pub(crate) fn blob_deletions(&self) -> Collection<BlobDeletion> {
        self.db.collection(BLOB_DELETIONS)
    }

    /// Queue GridFS files for deletion inside the caller's transaction.
    pub(crate) async fn enqueue_blob_deletions(
        &self,
        file_ids: &[ObjectId],
        session: &mut ClientSession,
    ) -> Result<()> {
        if file_ids.is_empty() {
            return Ok(());
        }
        let rows: Vec<BlobDeletion> = file_ids.iter().copied().map(BlobDeletion::new).collect();
        self.blob_deletions()
            .insert_many(rows)
            .session(&mut *session)
            .await?;
        Ok(())
    }
}

/// Keeps the ObjectId values of a `distinct` result.
pub(crate) fn object_ids(values: Vec<Bson>) -> Vec<ObjectId> {
    values
        .into_iter()
        .filter_map(|v| match v {
            Bson::ObjectId(id) => Some(id),
            _ => None,
        })
        .collect()
}
