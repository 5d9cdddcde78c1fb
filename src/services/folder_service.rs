use std::sync::Arc;

use mongodb::bson::{self, oid::ObjectId};

use crate::error::{AppError, Result};
use crate::models::{Category, required_field};
use crate::repositories::{
    Folder, FolderCreateRequest, FolderDeletion, FolderRepository, FolderUpdateRequest, Note,
    NoteFilter, NoteRepository, PersonalityRepository,
};
use crate::services::blob_gc::BlobCollector;
use crate::services::personality_service::owned_personality;

pub struct FolderService {
    folders: Arc<dyn FolderRepository>,
    notes: Arc<dyn NoteRepository>,
    personalities: Arc<dyn PersonalityRepository>,
    collector: Arc<BlobCollector>,
}

impl FolderService {
    pub fn new(
        folders: Arc<dyn FolderRepository>,
        notes: Arc<dyn NoteRepository>,
        personalities: Arc<dyn PersonalityRepository>,
        collector: Arc<BlobCollector>,
    ) -> Self {
        Self {
            folders,
            notes,
            personalities,
            collector,
        }
    }

    pub async fn list(&self, user_id: ObjectId, personality_id: Option<ObjectId>) -> Result<Vec<Folder>> {
        self.folders.list(user_id, personality_id).await
    }

    pub async fn get(&self, user_id: ObjectId, id: ObjectId) -> Result<Folder> {
        self.folders
            .find(user_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Folder not found".to_string()))
    }

    pub async fn notes(&self, user_id: ObjectId, id: ObjectId) -> Result<Vec<Note>> {
        let folder = self.get(user_id, id).await?;
        let filter = NoteFilter {
            folder_id: Some(folder.id),
            ..NoteFilter::default()
        };
        self.notes.list(user_id, &filter).await
    }

    pub async fn create(&self, user_id: ObjectId, req: FolderCreateRequest) -> Result<Folder> {
        let name = required_field(req.name)
            .ok_or_else(|| AppError::ValidationError("Folder name is required".to_string()))?;
        let personality_id = required_field(req.personality_id)
            .ok_or_else(|| AppError::ValidationError("Personality is required".to_string()))?;
        let personality =
            owned_personality(self.personalities.as_ref(), user_id, &personality_id).await?;

        let mut folder = Folder::new(user_id, personality.id, name);
        if let Some(category) = required_field(req.category) {
            folder.category = category.parse::<Category>()?;
        }
        if let Some(description) = req.description {
            folder.description = description.trim().to_string();
        }
        if let Some(color) = required_field(req.color) {
            folder.color = color;
        }

        self.folders.create(&folder).await?;
        tracing::info!(%user_id, folder_id = %folder.id, "Folder created");
        Ok(folder)
    }

    pub async fn update(
        &self,
        user_id: ObjectId,
        id: ObjectId,
        req: FolderUpdateRequest,
    ) -> Result<Folder> {
        let mut folder = self.get(user_id, id).await?;

        if let Some(name) = req.name {
            folder.name = required_field(Some(name))
                .ok_or_else(|| AppError::ValidationError("Folder name cannot be empty".to_string()))?;
        }
        if let Some(category) = required_field(req.category) {
            folder.category = category.parse::<Category>()?;
        }
        if let Some(description) = req.description {
            folder.description = description.trim().to_string();
        }
        if let Some(color) = required_field(req.color) {
            folder.color = color;
        }
        folder.updated_at = bson::DateTime::now();

        self.folders.update(&folder).await?;
        tracing::debug!(%user_id, folder_id = %id, "Folder updated");
        Ok(folder)
    }

    /// Removes the folder with its notes, then deletes their attachments.
    pub async fn delete(&self, user_id: ObjectId, id: ObjectId) -> Result<FolderDeletion> {
        let deletion = self
            .folders
            .delete_cascade(user_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Folder not found".to_string()))?;

        tracing::info!(
            %user_id,
            folder_id = %id,
            deleted_notes = deletion.deleted_notes,
            "Folder deleted"
        );
        self.collector.sweep(&deletion.file_ids).await;
        Ok(deletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{MemoryBlobStore, MemoryStore, Personality};

    async fn setup() -> (FolderService, Arc<MemoryStore>, ObjectId, Personality) {
        let store = Arc::new(MemoryStore::new());
        let user_id = ObjectId::new();
        let personality = Personality::default_for(user_id);
        PersonalityRepository::create(store.as_ref(), &personality)
            .await
            .unwrap();
        let collector = Arc::new(BlobCollector::new(
            Arc::new(MemoryBlobStore::new()),
            store.clone(),
        ));
        let service = FolderService::new(store.clone(), store.clone(), store.clone(), collector);
        (service, store, user_id, personality)
    }

    fn create_request(name: &str, personality: &Personality) -> FolderCreateRequest {
        FolderCreateRequest {
            name: Some(name.to_string()),
            personality_id: Some(personality.id.to_hex()),
            ..FolderCreateRequest::default()
        }
    }

    #[tokio::test]
    async fn create_requires_name_and_owned_personality() {
        let (service, _, user_id, personality) = setup().await;

        let folder = service
            .create(user_id, create_request("Lectures", &personality))
            .await
            .unwrap();
        assert_eq!(folder.category, Category::Personal);
        assert_eq!(folder.note_count, 0);

        assert!(service
            .create(user_id, create_request("", &personality))
            .await
            .is_err());
        let foreign = service
            .create(ObjectId::new(), create_request("Mine", &personality))
            .await
            .unwrap_err();
        assert!(matches!(foreign, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn update_never_touches_counters() {
        let (service, _, user_id, personality) = setup().await;
        let folder = service
            .create(user_id, create_request("Lectures", &personality))
            .await
            .unwrap();

        let updated = service
            .update(
                user_id,
                folder.id,
                FolderUpdateRequest {
                    category: Some("academic".to_string()),
                    color: Some("#000000".to_string()),
                    ..FolderUpdateRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.category, Category::Academic);
        assert_eq!(updated.name, "Lectures");
        assert_eq!(updated.note_count, 0);
    }

    #[tokio::test]
    async fn missing_folder_is_not_found() {
        let (service, _, user_id, _) = setup().await;
        let err = service.delete(user_id, ObjectId::new()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
