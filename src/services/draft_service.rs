use std::sync::Arc;

use mongodb::bson::{self, oid::ObjectId};

use crate::error::{AppError, Result};
use crate::models::{Platform, parse_object_id, parse_optional_object_id, required_field};
use crate::repositories::{
    Draft, DraftCreateRequest, DraftFilter, DraftListQuery, DraftRepository, DraftType,
    DraftUpdateRequest, NoteRepository, PersonalityRepository,
};
use crate::services::personality_service::owned_personality;

pub struct DraftService {
    drafts: Arc<dyn DraftRepository>,
    notes: Arc<dyn NoteRepository>,
    personalities: Arc<dyn PersonalityRepository>,
}

impl DraftService {
    pub fn new(
        drafts: Arc<dyn DraftRepository>,
        notes: Arc<dyn NoteRepository>,
        personalities: Arc<dyn PersonalityRepository>,
    ) -> Self {
        Self {
            drafts,
            notes,
            personalities,
        }
    }

    pub async fn list(&self, user_id: ObjectId, query: DraftListQuery) -> Result<Vec<Draft>> {
        let filter = DraftFilter {
            personality_id: parse_optional_object_id(query.personality_id.as_deref(), "personality")?,
            draft_type: required_field(query.draft_type)
                .map(|t| t.parse::<DraftType>())
                .transpose()?,
            is_published: query.is_published,
        };
        self.drafts.list(user_id, &filter).await
    }

    pub async fn get(&self, user_id: ObjectId, id: ObjectId) -> Result<Draft> {
        self.drafts
            .find(user_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Draft not found".to_string()))
    }

    /// Every source note must be one of the caller's notes.
    async fn owned_notes(&self, user_id: ObjectId, raw_ids: &[String]) -> Result<Vec<ObjectId>> {
        let mut ids = Vec::with_capacity(raw_ids.len());
        for raw in raw_ids {
            let id = parse_object_id(raw, "note")?;
            if self.notes.find(user_id, id).await?.is_none() {
                return Err(AppError::ValidationError("Invalid source note".to_string()));
            }
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    pub async fn create(&self, user_id: ObjectId, req: DraftCreateRequest) -> Result<Draft> {
        let (Some(title), Some(content), Some(draft_type), Some(personality_id)) = (
            required_field(req.title),
            required_field(req.content),
            required_field(req.draft_type),
            required_field(req.personality_id),
        ) else {
            return Err(AppError::ValidationError(
                "Title, content, type and personality are required".to_string(),
            ));
        };
        let draft_type: DraftType = draft_type.parse()?;
        let personality =
            owned_personality(self.personalities.as_ref(), user_id, &personality_id).await?;

        let mut draft = Draft::new(user_id, personality.id, title, content, draft_type);
        draft.platform = required_field(req.platform)
            .map(|p| p.parse::<Platform>())
            .transpose()?;
        if let Some(source_notes) = req.source_notes {
            draft.source_notes = self.owned_notes(user_id, &source_notes).await?;
        }

        self.drafts.create(&draft).await?;
        tracing::info!(%user_id, draft_id = %draft.id, "Draft created");
        Ok(draft)
    }

    pub async fn update(&self, user_id: ObjectId, id: ObjectId, req: DraftUpdateRequest) -> Result<Draft> {
        let mut draft = self.get(user_id, id).await?;

        if let Some(title) = req.title {
            draft.title = required_field(Some(title))
                .ok_or_else(|| AppError::ValidationError("Title cannot be empty".to_string()))?;
        }
        if let Some(content) = req.content {
            draft.content = content;
        }
        if let Some(draft_type) = required_field(req.draft_type) {
            draft.draft_type = draft_type.parse()?;
        }
        if let Some(platform) = req.platform {
            draft.platform = required_field(platform)
                .map(|p| p.parse::<Platform>())
                .transpose()?;
        }
        if let Some(source_notes) = req.source_notes {
            draft.source_notes = self.owned_notes(user_id, &source_notes).await?;
        }
        draft.updated_at = bson::DateTime::now();

        self.drafts.update(&draft).await?;
        tracing::debug!(%user_id, draft_id = %id, "Draft updated");
        Ok(draft)
    }

    pub async fn delete(&self, user_id: ObjectId, id: ObjectId) -> Result<()> {
        if !self.drafts.delete(user_id, id).await? {
            return Err(AppError::NotFound("Draft not found".to_string()));
        }
        tracing::info!(%user_id, draft_id = %id, "Draft deleted");
        Ok(())
    }

    pub async fn publish(&self, user_id: ObjectId, id: ObjectId) -> Result<Draft> {
        let mut draft = self.get(user_id, id).await?;
        let now = bson::DateTime::now();
        draft.is_published = true;
        draft.published_at = Some(now);
        draft.updated_at = now;

        self.drafts.update(&draft).await?;
        tracing::info!(%user_id, draft_id = %id, "Draft published");
        Ok(draft)
    }
}
