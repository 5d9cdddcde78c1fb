use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{DEFAULT_COLOR, to_utc};
use crate::repositories::mongo::MongoStore;

pub const DEFAULT_ICON: &str = "👤";
pub const DEFAULT_PERSONALITY_NAME: &str = "Default";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Personality {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub icon: String,
    pub color: String,
    #[serde(default)]
    pub description: String,
    pub user_id: ObjectId,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl Personality {
    pub fn new(user_id: ObjectId, name: String) -> Self {
        let now = bson::DateTime::now();
        Self {
            id: ObjectId::new(),
            name,
            icon: DEFAULT_ICON.to_string(),
            color: DEFAULT_COLOR.to_string(),
            description: String::new(),
            user_id,
            is_default: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// The personality every new account starts with.
    pub fn default_for(user_id: ObjectId) -> Self {
        Self {
            description: "Your default personality".to_string(),
            is_default: true,
            ..Self::new(user_id, DEFAULT_PERSONALITY_NAME.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalityResponse {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub color: String,
    pub description: String,
    pub user_id: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Personality> for PersonalityResponse {
    fn from(p: &Personality) -> Self {
        Self {
            id: p.id.to_hex(),
            name: p.name.clone(),
            icon: p.icon.clone(),
            color: p.color.clone(),
            description: p.description.clone(),
            user_id: p.user_id.to_hex(),
            is_default: p.is_default,
            created_at: to_utc(p.created_at),
            updated_at: to_utc(p.updated_at),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct PersonalityRequest {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
}

#[async_trait]
pub trait PersonalityRepository: Send + Sync {
    async fn list(&self, user_id: ObjectId) -> Result<Vec<Personality>>;
    async fn find(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<Personality>>;
    async fn find_by_name(&self, user_id: ObjectId, name: &str) -> Result<Option<Personality>>;
    async fn create(&self, personality: &Personality) -> Result<()>;
    async fn update(&self, personality: &Personality) -> Result<()>;
    /// Deletes the personality and clears it from the owner's current
    /// selection. Records referencing it are left untouched.
    async fn delete(&self, user_id: ObjectId, id: ObjectId) -> Result<bool>;
}

#[async_trait]
impl PersonalityRepository for MongoStore {
    async fn list(&self, user_id: ObjectId) -> Result<Vec<Personality>> {
        let cursor = self
            .personalities()
            .find(doc! { "userId": user_id })
            .sort(doc! { "createdAt": 1 })
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    async fn find(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<Personality>> {
        Ok(self
            .personalities()
            .find_one(doc! { "_id": id, "userId": user_id })
            .await?)
    }

    async fn find_by_name(&self, user_id: ObjectId, name: &str) -> Result<Option<Personality>> {
        Ok(self
            .personalities()
            .find_one(doc! { "userId": user_id, "name": name })
            .await?)
    }

    async fn create(&self, personality: &Personality) -> Result<()> {
        self.personalities().insert_one(personality).await?;
        Ok(())
    }

    async fn update(&self, personality: &Personality) -> Result<()> {
        self.personalities()
            .replace_one(
                doc! { "_id": personality.id, "userId": personality.user_id },
                personality,
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, user_id: ObjectId, id: ObjectId) -> Result<bool> {
        let mut session = self.start_transaction().await?;

        let deleted = self
            .personalities()
            .delete_one(doc! { "_id": id, "userId": user_id })
            .session(&mut session)
            .await?
            .deleted_count;
        if deleted == 0 {
            return Ok(false);
        }

        self.users()
            .update_one(
                doc! { "_id": user_id, "currentPersonality": id },
                doc! { "$unset": { "currentPersonality": "" } },
            )
            .session(&mut session)
            .await?;

        session.commit_transaction().await?;
        Ok(true)
    }
}
