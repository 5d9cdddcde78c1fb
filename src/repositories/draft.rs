use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, Document, doc, oid::ObjectId};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Platform, double_option, to_utc};
use crate::repositories::mongo::MongoStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftType {
    Social,
    Portfolio,
    Resume,
    Biodata,
}

impl DraftType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftType::Social => "social",
            DraftType::Portfolio => "portfolio",
            DraftType::Resume => "resume",
            DraftType::Biodata => "biodata",
        }
    }
}

impl std::str::FromStr for DraftType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "social" => Ok(DraftType::Social),
            "portfolio" => Ok(DraftType::Portfolio),
            "resume" => Ok(DraftType::Resume),
            "biodata" => Ok(DraftType::Biodata),
            _ => Err(AppError::ValidationError(format!("Invalid draft type: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub draft_type: DraftType,
    #[serde(default)]
    pub platform: Option<Platform>,
    pub user_id: ObjectId,
    pub personality_id: ObjectId,
    #[serde(default)]
    pub source_notes: Vec<ObjectId>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub published_at: Option<bson::DateTime>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl Draft {
    pub fn new(
        user_id: ObjectId,
        personality_id: ObjectId,
        title: String,
        content: String,
        draft_type: DraftType,
    ) -> Self {
        let now = bson::DateTime::now();
        Self {
            id: ObjectId::new(),
            title,
            content,
            draft_type,
            platform: None,
            user_id,
            personality_id,
            source_notes: Vec::new(),
            is_published: false,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftResponse {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub draft_type: DraftType,
    pub platform: Option<Platform>,
    pub user_id: String,
    pub personality_id: String,
    pub source_notes: Vec<String>,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Draft> for DraftResponse {
    fn from(d: &Draft) -> Self {
        Self {
            id: d.id.to_hex(),
            title: d.title.clone(),
            content: d.content.clone(),
            draft_type: d.draft_type,
            platform: d.platform,
            user_id: d.user_id.to_hex(),
            personality_id: d.personality_id.to_hex(),
            source_notes: d.source_notes.iter().map(|id| id.to_hex()).collect(),
            is_published: d.is_published,
            published_at: d.published_at.map(to_utc),
            created_at: to_utc(d.created_at),
            updated_at: to_utc(d.updated_at),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DraftCreateRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub draft_type: Option<String>,
    pub platform: Option<String>,
    pub personality_id: Option<String>,
    pub source_notes: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DraftUpdateRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub draft_type: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub platform: Option<Option<String>>,
    pub source_notes: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DraftListQuery {
    pub personality_id: Option<String>,
    #[serde(rename = "type")]
    pub draft_type: Option<String>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftFilter {
    pub personality_id: Option<ObjectId>,
    pub draft_type: Option<DraftType>,
    pub is_published: Option<bool>,
}

impl DraftFilter {
    pub fn to_document(&self, user_id: ObjectId) -> Document {
        let mut filter = doc! { "userId": user_id };
        if let Some(personality_id) = self.personality_id {
            filter.insert("personalityId", personality_id);
        }
        if let Some(draft_type) = self.draft_type {
            filter.insert("type", draft_type.as_str());
        }
        if let Some(is_published) = self.is_published {
            filter.insert("isPublished", is_published);
        }
        filter
    }

    pub fn matches(&self, draft: &Draft) -> bool {
        self.personality_id.is_none_or(|p| p == draft.personality_id)
            && self.draft_type.is_none_or(|t| t == draft.draft_type)
            && self.is_published.is_none_or(|p| p == draft.is_published)
    }
}

#[async_trait]
pub trait DraftRepository: Send + Sync {
    async fn list(&self, user_id: ObjectId, filter: &DraftFilter) -> Result<Vec<Draft>>;
    async fn find(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<Draft>>;
    async fn create(&self, draft: &Draft) -> Result<()>;
    async fn update(&self, draft: &Draft) -> Result<()>;
    async fn delete(&self, user_id: ObjectId, id: ObjectId) -> Result<bool>;
}

#[async_trait]
impl DraftRepository for MongoStore {
    async fn list(&self, user_id: ObjectId, filter: &DraftFilter) -> Result<Vec<Draft>> {
        let cursor = self
            .drafts()
            .find(filter.to_document(user_id))
            .sort(doc! { "updatedAt": -1 })
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    async fn find(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<Draft>> {
        Ok(self
            .drafts()
            .find_one(doc! { "_id": id, "userId": user_id })
            .await?)
    }

    async fn create(&self, draft: &Draft) -> Result<()> {
        self.drafts().insert_one(draft).await?;
        Ok(())
    }

    async fn update(&self, draft: &Draft) -> Result<()> {
        self.drafts()
            .replace_one(doc! { "_id": draft.id, "userId": draft.user_id }, draft)
            .await?;
        Ok(())
    }

    async fn delete(&self, user_id: ObjectId, id: ObjectId) -> Result<bool> {
        let result = self
            .drafts()
            .delete_one(doc! { "_id": id, "userId": user_id })
            .await?;
        Ok(result.deleted_count > 0)
    }
}
