use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Category, DEFAULT_COLOR, to_utc};
use crate::repositories::mongo::{MongoStore, object_ids};

/// `folders` collection document. `note_count` and `size` are maintained by
/// the note writes, never by folder updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_color")]
    pub color: String,
    pub user_id: ObjectId,
    pub personality_id: ObjectId,
    #[serde(default)]
    pub note_count: i64,
    #[serde(default)]
    pub size: f64,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

impl Folder {
    pub fn new(user_id: ObjectId, personality_id: ObjectId, name: String) -> Self {
        let now = bson::DateTime::now();
        Self {
            id: ObjectId::new(),
            name,
            category: Category::default(),
            description: String::new(),
            color: default_color(),
            user_id,
            personality_id,
            note_count: 0,
            size: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderResponse {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub description: String,
    pub color: String,
    pub user_id: String,
    pub personality_id: String,
    pub note_count: i64,
    pub size: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Folder> for FolderResponse {
    fn from(f: &Folder) -> Self {
        Self {
            id: f.id.to_hex(),
            name: f.name.clone(),
            category: f.category,
            description: f.description.clone(),
            color: f.color.clone(),
            user_id: f.user_id.to_hex(),
            personality_id: f.personality_id.to_hex(),
            note_count: f.note_count,
            size: f.size,
            created_at: to_utc(f.created_at),
            updated_at: to_utc(f.updated_at),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct FolderCreateRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub personality_id: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct FolderUpdateRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

/// Result of a cascading folder delete.
#[derive(Debug, Clone)]
pub struct FolderDeletion {
    pub folder: Folder,
    pub deleted_notes: u64,
    pub file_ids: Vec<ObjectId>,
}

#[async_trait]
pub trait FolderRepository: Send + Sync {
    async fn list(&self, user_id: ObjectId, personality_id: Option<ObjectId>) -> Result<Vec<Folder>>;
    async fn find(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<Folder>>;
    async fn create(&self, folder: &Folder) -> Result<()>;
    /// Persists the editable fields only; counters are left alone.
    async fn update(&self, folder: &Folder) -> Result<()>;
    /// Deletes the folder with its notes and queues their attachment blobs.
    async fn delete_cascade(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<FolderDeletion>>;
}

#[async_trait]
impl FolderRepository for MongoStore {
    async fn list(&self, user_id: ObjectId, personality_id: Option<ObjectId>) -> Result<Vec<Folder>> {
        let mut filter = doc! { "userId": user_id };
        if let Some(personality_id) = personality_id {
            filter.insert("personalityId", personality_id);
        }
        let cursor = self
            .folders()
            .find(filter)
            .sort(doc! { "createdAt": -1 })
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    async fn find(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<Folder>> {
        Ok(self
            .folders()
            .find_one(doc! { "_id": id, "userId": user_id })
            .await?)
    }

    async fn create(&self, folder: &Folder) -> Result<()> {
        self.folders().insert_one(folder).await?;
        Ok(())
    }

    async fn update(&self, folder: &Folder) -> Result<()> {
        self.folders()
            .update_one(
                doc! { "_id": folder.id, "userId": folder.user_id },
                doc! {
                    "$set": {
                        "name": folder.name.clone(),
                        "category": folder.category.as_str(),
                        "description": folder.description.clone(),
                        "color": folder.color.clone(),
                        "updatedAt": folder.updated_at,
                    }
                },
            )
            .await?;
        Ok(())
    }

    async fn delete_cascade(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<FolderDeletion>> {
        let mut session = self.start_transaction().await?;

        let Some(folder) = self
            .folders()
            .find_one_and_delete(doc! { "_id": id, "userId": user_id })
            .session(&mut session)
            .await?
        else {
            return Ok(None);
        };

        let children = doc! { "userId": user_id, "folderId": id };
        let file_ids = object_ids(
            self.notes()
                .distinct("attachments.fileId", children.clone())
                .session(&mut session)
                .await?,
        );
        let deleted_notes = self
            .notes()
            .delete_many(children)
            .session(&mut session)
            .await?
            .deleted_count;
        self.enqueue_blob_deletions(&file_ids, &mut session).await?;

        session.commit_transaction().await?;
        Ok(Some(FolderDeletion {
            folder,
            deleted_notes,
            file_ids,
        }))
    }
}
