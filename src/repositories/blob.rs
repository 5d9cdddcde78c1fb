use async_trait::async_trait;
use futures::{
    TryStreamExt,
    io::{AsyncReadExt, AsyncWriteExt},
};
use mongodb::{
    Database,
    bson::{self, Bson, doc, oid::ObjectId},
    error::{ErrorKind, GridFsErrorKind},
    gridfs::GridFsBucket,
    options::GridFsBucketOptions,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::repositories::mongo::MongoStore;

pub const ATTACHMENT_BUCKET: &str = "attachments";

/// Outbox row: a GridFS file whose owner is gone but which still exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobDeletion {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub file_id: ObjectId,
    pub enqueued_at: bson::DateTime,
}

impl BlobDeletion {
    pub fn new(file_id: ObjectId) -> Self {
        Self {
            id: ObjectId::new(),
            file_id,
            enqueued_at: bson::DateTime::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlobMetadata {
    pub user_id: ObjectId,
    pub original_name: String,
    pub content_type: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, file_id: ObjectId, metadata: &BlobMetadata, bytes: &[u8]) -> Result<()>;
    async fn download(&self, file_id: ObjectId) -> Result<Option<Vec<u8>>>;
    /// Deleting a file that does not exist succeeds.
    async fn delete(&self, file_id: ObjectId) -> Result<()>;
}

#[async_trait]
pub trait BlobOutbox: Send + Sync {
    async fn enqueue(&self, file_ids: &[ObjectId]) -> Result<()>;
    /// Oldest rows first.
    async fn pending(&self, limit: i64) -> Result<Vec<BlobDeletion>>;
    async fn complete(&self, file_id: ObjectId) -> Result<()>;
}

pub struct GridFsBlobStore {
    bucket: GridFsBucket,
}

impl GridFsBlobStore {
    pub fn new(db: &Database) -> Self {
        let options = GridFsBucketOptions::builder()
            .bucket_name(ATTACHMENT_BUCKET.to_string())
            .build();
        Self {
            bucket: db.gridfs_bucket(options),
        }
    }
}

fn is_missing_file(e: &mongodb::error::Error) -> bool {
    matches!(
        e.kind.as_ref(),
        ErrorKind::GridFs(GridFsErrorKind::FileNotFound { .. })
    )
}

#[async_trait]
impl BlobStore for GridFsBlobStore {
    async fn upload(&self, file_id: ObjectId, metadata: &BlobMetadata, bytes: &[u8]) -> Result<()> {
        let mut stream = self
            .bucket
            .open_upload_stream(metadata.original_name.clone())
            .id(Bson::ObjectId(file_id))
            .metadata(doc! {
                "userId": metadata.user_id,
                "originalName": metadata.original_name.clone(),
                "contentType": metadata.content_type.clone(),
            })
            .await?;
        stream.write_all(bytes).await?;
        stream.close().await?;
        Ok(())
    }

    async fn download(&self, file_id: ObjectId) -> Result<Option<Vec<u8>>> {
        let mut stream = match self
            .bucket
            .open_download_stream(Bson::ObjectId(file_id))
            .await
        {
            Ok(stream) => stream,
            Err(e) if is_missing_file(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).await?;
        Ok(Some(bytes))
    }

    async fn delete(&self, file_id: ObjectId) -> Result<()> {
        match self.bucket.delete(Bson::ObjectId(file_id)).await {
            Ok(()) => Ok(()),
            Err(e) if is_missing_file(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BlobOutbox for MongoStore {
    async fn enqueue(&self, file_ids: &[ObjectId]) -> Result<()> {
        if file_ids.is_empty() {
            return Ok(());
        }
        let rows: Vec<BlobDeletion> = file_ids.iter().copied().map(BlobDeletion::new).collect();
        self.blob_deletions().insert_many(rows).await?;
        Ok(())
    }

    async fn pending(&self, limit: i64) -> Result<Vec<BlobDeletion>> {
        let cursor = self
            .blob_deletions()
            .find(doc! {})
            .sort(doc! { "enqueuedAt": 1 })
            .limit(limit)
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    async fn complete(&self, file_id: ObjectId) -> Result<()> {
        self.blob_deletions()
            .delete_many(doc! { "fileId": file_id })
            .await?;
        Ok(())
    }
}
