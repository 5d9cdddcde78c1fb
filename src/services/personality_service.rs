use std::sync::Arc;

use mongodb::bson::{self, oid::ObjectId};

use crate::error::{AppError, Result};
use crate::models::{parse_object_id, required_field};
use crate::repositories::{Personality, PersonalityRepository, PersonalityRequest, UserRepository};

/// Resolves a personality id supplied with a write, which must belong to the caller.
pub async fn owned_personality(
    personalities: &dyn PersonalityRepository,
    user_id: ObjectId,
    raw_id: &str,
) -> Result<Personality> {
    let id = parse_object_id(raw_id, "personality")?;
    personalities
        .find(user_id, id)
        .await?
        .ok_or_else(|| AppError::ValidationError("Invalid personality".to_string()))
}

pub struct PersonalityService {
    personalities: Arc<dyn PersonalityRepository>,
    users: Arc<dyn UserRepository>,
}

impl PersonalityService {
    pub fn new(
        personalities: Arc<dyn PersonalityRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            personalities,
            users,
        }
    }

    pub async fn list(&self, user_id: ObjectId) -> Result<Vec<Personality>> {
        self.personalities.list(user_id).await
    }

    pub async fn get(&self, user_id: ObjectId, id: ObjectId) -> Result<Personality> {
        self.personalities
            .find(user_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Personality not found".to_string()))
    }

    /// The selected personality, else the default one, else the oldest.
    pub async fn current(&self, user_id: ObjectId) -> Result<Option<Personality>> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if let Some(id) = user.current_personality {
            if let Some(personality) = self.personalities.find(user_id, id).await? {
                return Ok(Some(personality));
            }
        }
        let all = self.personalities.list(user_id).await?;
        let fallback = all
            .iter()
            .find(|p| p.is_default)
            .or_else(|| all.first())
            .cloned();
        Ok(fallback)
    }

    async fn ensure_unique_name(&self, user_id: ObjectId, name: &str, except: Option<ObjectId>) -> Result<()> {
        match self.personalities.find_by_name(user_id, name).await? {
            Some(existing) if Some(existing.id) != except => Err(AppError::ValidationError(
                "A personality with this name already exists".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub async fn create(&self, user_id: ObjectId, req: PersonalityRequest) -> Result<Personality> {
        let name = required_field(req.name)
            .ok_or_else(|| AppError::ValidationError("Name is required".to_string()))?;
        self.ensure_unique_name(user_id, &name, None).await?;

        let mut personality = Personality::new(user_id, name);
        if let Some(icon) = required_field(req.icon) {
            personality.icon = icon;
        }
        if let Some(color) = required_field(req.color) {
            personality.color = color;
        }
        if let Some(description) = req.description {
            personality.description = description.trim().to_string();
        }

        self.personalities.create(&personality).await?;
        tracing::info!(%user_id, personality_id = %personality.id, "Personality created");
        Ok(personality)
    }

    pub async fn update(
        &self,
        user_id: ObjectId,
        id: ObjectId,
        req: PersonalityRequest,
    ) -> Result<Personality> {
        let mut personality = self.get(user_id, id).await?;

        if let Some(name) = req.name {
            let name = required_field(Some(name))
                .ok_or_else(|| AppError::ValidationError("Name cannot be empty".to_string()))?;
            self.ensure_unique_name(user_id, &name, Some(id)).await?;
            personality.name = name;
        }
        if let Some(icon) = required_field(req.icon) {
            personality.icon = icon;
        }
        if let Some(color) = required_field(req.color) {
            personality.color = color;
        }
        if let Some(description) = req.description {
            personality.description = description.trim().to_string();
        }
        personality.updated_at = bson::DateTime::now();

        self.personalities.update(&personality).await?;
        tracing::debug!(%user_id, personality_id = %id, "Personality updated");
        Ok(personality)
    }

    pub async fn delete(&self, user_id: ObjectId, id: ObjectId) -> Result<()> {
        if !self.personalities.delete(user_id, id).await? {
            return Err(AppError::NotFound("Personality not found".to_string()));
        }
        tracing::info!(%user_id, personality_id = %id, "Personality deleted");
        Ok(())
    }

    pub async fn switch(&self, user_id: ObjectId, id: ObjectId) -> Result<Personality> {
        let personality = self.get(user_id, id).await?;
        self.users.set_current_personality(user_id, Some(id)).await?;
        Ok(personality)
    }
}
