use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    ClientSession,
    bson::{self, Document, doc, oid::ObjectId},
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Category, double_option, to_utc};
use crate::repositories::mongo::MongoStore;

/// File stored alongside a note. `file_id` points into the GridFS bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<ObjectId>,
}

/// AI-transformed copy of a note's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedVersion {
    pub platform: String,
    pub content: String,
    pub created_at: bson::DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub folder_id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub personality_id: ObjectId,
    #[serde(default)]
    pub is_voice_note: bool,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub enhanced_versions: Vec<EnhancedVersion>,
    #[serde(default)]
    pub size: f64,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

impl Note {
    pub fn attachment_file_ids(&self) -> Vec<ObjectId> {
        self.attachments.iter().filter_map(|a| a.file_id).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentResponse {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: i64,
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedVersionResponse {
    pub platform: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteResponse {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: Category,
    pub folder_id: Option<String>,
    pub user_id: String,
    pub personality_id: String,
    pub is_voice_note: bool,
    pub audio_url: Option<String>,
    pub attachments: Vec<AttachmentResponse>,
    pub tags: Vec<String>,
    pub enhanced_versions: Vec<EnhancedVersionResponse>,
    pub size: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Note> for NoteResponse {
    fn from(n: &Note) -> Self {
        Self {
            id: n.id.to_hex(),
            title: n.title.clone(),
            content: n.content.clone(),
            category: n.category,
            folder_id: n.folder_id.map(|id| id.to_hex()),
            user_id: n.user_id.to_hex(),
            personality_id: n.personality_id.to_hex(),
            is_voice_note: n.is_voice_note,
            audio_url: n.audio_url.clone(),
            attachments: n
                .attachments
                .iter()
                .map(|a| AttachmentResponse {
                    id: a.id.to_hex(),
                    name: a.name.clone(),
                    url: a.url.clone(),
                    content_type: a.content_type.clone(),
                    size: a.size,
                    file_id: a.file_id.map(|id| id.to_hex()),
                })
                .collect(),
            tags: n.tags.clone(),
            enhanced_versions: n
                .enhanced_versions
                .iter()
                .map(|v| EnhancedVersionResponse {
                    platform: v.platform.clone(),
                    content: v.content.clone(),
                    created_at: to_utc(v.created_at),
                })
                .collect(),
            size: n.size,
            created_at: to_utc(n.created_at),
            updated_at: to_utc(n.updated_at),
        }
    }
}

/// Query-string filters of the note listing.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NoteListQuery {
    pub folder_id: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub personality_id: Option<String>,
    pub tag: Option<String>,
}

/// JSON body of a note update. `folderId: null` detaches the note.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdateRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub folder_id: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub is_voice_note: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub audio_url: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteFilter {
    pub folder_id: Option<ObjectId>,
    pub category: Option<Category>,
    pub search: Option<String>,
    pub personality_id: Option<ObjectId>,
    pub tag: Option<String>,
}

impl NoteFilter {
    /// MongoDB query for the owner's notes. A search term becomes a
    /// case-insensitive match over title or content.
    pub fn to_document(&self, user_id: ObjectId) -> Document {
        let mut filter = doc! { "userId": user_id };
        if let Some(folder_id) = self.folder_id {
            filter.insert("folderId", folder_id);
        }
        if let Some(category) = self.category {
            filter.insert("category", category.as_str());
        }
        if let Some(personality_id) = self.personality_id {
            filter.insert("personalityId", personality_id);
        }
        if let Some(tag) = &self.tag {
            filter.insert("tags", tag.clone());
        }
        if let Some(search) = &self.search {
            let pattern = escape_regex(search);
            filter.insert(
                "$or",
                vec![
                    doc! { "title": { "$regex": pattern.clone(), "$options": "i" } },
                    doc! { "content": { "$regex": pattern, "$options": "i" } },
                ],
            );
        }
        filter
    }

    /// Same semantics as [`NoteFilter::to_document`], evaluated in process.
    pub fn matches(&self, note: &Note) -> bool {
        if self.folder_id.is_some() && note.folder_id != self.folder_id {
            return false;
        }
        if self.category.is_some_and(|c| c != note.category) {
            return false;
        }
        if self.personality_id.is_some_and(|p| p != note.personality_id) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !note.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !note.title.to_lowercase().contains(&needle)
                && !note.content.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

fn escape_regex(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Change to one folder's denormalised counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FolderCounterDelta {
    pub folder_id: ObjectId,
    pub notes: i64,
    pub size: f64,
}

/// Counter changes implied by a note moving from `previous` to `next`
/// (`None` on either side means created or deleted).
pub fn counter_deltas(previous: Option<&Note>, next: Option<&Note>) -> Vec<FolderCounterDelta> {
    let old = previous.and_then(|n| n.folder_id.map(|f| (f, n.size)));
    let new = next.and_then(|n| n.folder_id.map(|f| (f, n.size)));

    match (old, new) {
        (Some((old_folder, old_size)), Some((new_folder, new_size))) if old_folder == new_folder => {
            let size = new_size - old_size;
            if size == 0.0 {
                Vec::new()
            } else {
                vec![FolderCounterDelta {
                    folder_id: new_folder,
                    notes: 0,
                    size,
                }]
            }
        }
        (old, new) => {
            let mut deltas = Vec::new();
            if let Some((folder_id, size)) = old {
                deltas.push(FolderCounterDelta {
                    folder_id,
                    notes: -1,
                    size: -size,
                });
            }
            if let Some((folder_id, size)) = new {
                deltas.push(FolderCounterDelta {
                    folder_id,
                    notes: 1,
                    size,
                });
            }
            deltas
        }
    }
}

#[async_trait]
pub trait NoteRepository: Send + Sync {
    async fn list(&self, user_id: ObjectId, filter: &NoteFilter) -> Result<Vec<Note>>;
    async fn find(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<Note>>;
    /// Inserts the note and bumps its folder's counters atomically.
    async fn create(&self, note: &Note) -> Result<()>;
    /// Persists `next` and moves folder counters from whatever was stored
    /// before. Returns the replaced note, `None` when it no longer exists.
    async fn update(&self, next: &Note) -> Result<Option<Note>>;
    /// Deletes the note, decrements its folder and queues its blobs.
    async fn delete(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<Note>>;
    async fn push_enhanced_version(
        &self,
        user_id: ObjectId,
        id: ObjectId,
        version: &EnhancedVersion,
    ) -> Result<Option<Note>>;
    /// Pulls one attachment and queues its blob.
    async fn remove_attachment(
        &self,
        user_id: ObjectId,
        note_id: ObjectId,
        attachment_id: ObjectId,
    ) -> Result<Option<Attachment>>;
}

pub(crate) fn invalid_folder() -> AppError {
    AppError::ValidationError("Invalid folder".to_string())
}

impl MongoStore {
    /// A note entering a folder that is gone aborts the transaction.
    async fn apply_counter_deltas(
        &self,
        user_id: ObjectId,
        deltas: &[FolderCounterDelta],
        session: &mut ClientSession,
    ) -> Result<()> {
        for delta in deltas {
            let result = self
                .folders()
                .update_one(
                    doc! { "_id": delta.folder_id, "userId": user_id },
                    doc! {
                        "$inc": { "noteCount": delta.notes, "size": delta.size },
                        "$set": { "updatedAt": bson::DateTime::now() }
                    },
                )
                .session(&mut *session)
                .await?;
            if result.matched_count == 0 && delta.notes > 0 {
                session.abort_transaction().await?;
                return Err(invalid_folder());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl NoteRepository for MongoStore {
    async fn list(&self, user_id: ObjectId, filter: &NoteFilter) -> Result<Vec<Note>> {
        let cursor = self
            .notes()
            .find(filter.to_document(user_id))
            .sort(doc! { "updatedAt": -1 })
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    async fn find(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<Note>> {
        Ok(self
            .notes()
            .find_one(doc! { "_id": id, "userId": user_id })
            .await?)
    }

    async fn create(&self, note: &Note) -> Result<()> {
        let mut session = self.start_transaction().await?;
        self.notes().insert_one(note).session(&mut session).await?;
        self.apply_counter_deltas(note.user_id, &counter_deltas(None, Some(note)), &mut session)
            .await?;
        session.commit_transaction().await?;
        Ok(())
    }

    async fn update(&self, next: &Note) -> Result<Option<Note>> {
        let mut session = self.start_transaction().await?;
        let stored = self
            .notes()
            .find_one_and_update(
                doc! { "_id": next.id, "userId": next.user_id },
                doc! {
                    "$set": {
                        "title": next.title.clone(),
                        "content": next.content.clone(),
                        "category": next.category.as_str(),
                        "folderId": bson::to_bson(&next.folder_id)?,
                        "tags": bson::to_bson(&next.tags)?,
                        "isVoiceNote": next.is_voice_note,
                        "audioUrl": bson::to_bson(&next.audio_url)?,
                        "size": next.size,
                        "updatedAt": next.updated_at,
                    }
                },
            )
            .return_document(mongodb::options::ReturnDocument::Before)
            .session(&mut session)
            .await?;
        let Some(previous) = stored else {
            session.abort_transaction().await?;
            return Ok(None);
        };
        self.apply_counter_deltas(
            next.user_id,
            &counter_deltas(Some(&previous), Some(next)),
            &mut session,
        )
        .await?;
        session.commit_transaction().await?;
        Ok(Some(previous))
    }

    async fn delete(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<Note>> {
        let mut session = self.start_transaction().await?;
        let Some(note) = self
            .notes()
            .find_one_and_delete(doc! { "_id": id, "userId": user_id })
            .session(&mut session)
            .await?
        else {
            return Ok(None);
        };

        self.apply_counter_deltas(user_id, &counter_deltas(Some(&note), None), &mut session)
            .await?;
        self.enqueue_blob_deletions(&note.attachment_file_ids(), &mut session)
            .await?;
        session.commit_transaction().await?;
        Ok(Some(note))
    }

    async fn push_enhanced_version(
        &self,
        user_id: ObjectId,
        id: ObjectId,
        version: &EnhancedVersion,
    ) -> Result<Option<Note>> {
        Ok(self
            .notes()
            .find_one_and_update(
                doc! { "_id": id, "userId": user_id },
                doc! {
                    "$push": { "enhancedVersions": bson::to_bson(version)? },
                    "$set": { "updatedAt": bson::DateTime::now() }
                },
            )
            .return_document(mongodb::options::ReturnDocument::After)
            .await?)
    }

    async fn remove_attachment(
        &self,
        user_id: ObjectId,
        note_id: ObjectId,
        attachment_id: ObjectId,
    ) -> Result<Option<Attachment>> {
        let mut session = self.start_transaction().await?;
        let Some(note) = self
            .notes()
            .find_one(doc! { "_id": note_id, "userId": user_id, "attachments._id": attachment_id })
            .session(&mut session)
            .await?
        else {
            return Ok(None);
        };
        let Some(attachment) = note.attachments.into_iter().find(|a| a.id == attachment_id) else {
            return Ok(None);
        };

        self.notes()
            .update_one(
                doc! { "_id": note_id, "userId": user_id },
                doc! {
                    "$pull": { "attachments": { "_id": attachment_id } },
                    "$set": { "updatedAt": bson::DateTime::now() }
                },
            )
            .session(&mut session)
            .await?;
        if let Some(file_id) = attachment.file_id {
            self.enqueue_blob_deletions(&[file_id], &mut session).await?;
        }
        session.commit_transaction().await?;
        Ok(Some(attachment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_in(folder_id: Option<ObjectId>, content: &str) -> Note {
        let now = bson::DateTime::now();
        Note {
            id: ObjectId::new(),
            title: "Weekly plan".to_string(),
            content: content.to_string(),
            category: Category::Work,
            folder_id,
            user_id: ObjectId::new(),
            personality_id: ObjectId::new(),
            is_voice_note: false,
            audio_url: None,
            attachments: Vec::new(),
            tags: vec!["planning".to_string()],
            enhanced_versions: Vec::new(),
            size: crate::models::content_size(content),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn search_builds_case_insensitive_or_query() {
        let user_id = ObjectId::new();
        let filter = NoteFilter {
            search: Some("c++ (draft)".to_string()),
            ..NoteFilter::default()
        };
        let document = filter.to_document(user_id);

        assert_eq!(document.get_object_id("userId").unwrap(), user_id);
        let clauses = document.get_array("$or").unwrap();
        assert_eq!(clauses.len(), 2);
        let title = clauses[0].as_document().unwrap().get_document("title").unwrap();
        assert_eq!(title.get_str("$regex").unwrap(), r"c\+\+ \(draft\)");
        assert_eq!(title.get_str("$options").unwrap(), "i");
    }

    #[test]
    fn exact_filters_without_search() {
        let user_id = ObjectId::new();
        let folder_id = ObjectId::new();
        let filter = NoteFilter {
            folder_id: Some(folder_id),
            category: Some(Category::Academic),
            ..NoteFilter::default()
        };
        let document = filter.to_document(user_id);

        assert_eq!(document.get_object_id("folderId").unwrap(), folder_id);
        assert_eq!(document.get_str("category").unwrap(), "Academic");
        assert!(!document.contains_key("$or"));
    }

    #[test]
    fn in_process_matching_mirrors_query() {
        let note = note_in(None, "Ship the Release notes");
        let by_search = NoteFilter {
            search: Some("release".to_string()),
            ..NoteFilter::default()
        };
        let by_tag = NoteFilter {
            tag: Some("planning".to_string()),
            ..NoteFilter::default()
        };
        let by_folder = NoteFilter {
            folder_id: Some(ObjectId::new()),
            ..NoteFilter::default()
        };

        assert!(by_search.matches(&note));
        assert!(by_tag.matches(&note));
        assert!(!by_folder.matches(&note));
    }

    #[test]
    fn counters_follow_note_lifecycle() {
        let folder = ObjectId::new();
        let created = note_in(Some(folder), "X");

        assert_eq!(
            counter_deltas(None, Some(&created)),
            vec![FolderCounterDelta {
                folder_id: folder,
                notes: 1,
                size: 0.001
            }]
        );

        let mut grown = created.clone();
        grown.content = "XY".to_string();
        grown.size = crate::models::content_size(&grown.content);
        let deltas = counter_deltas(Some(&created), Some(&grown));
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].notes, 0);
        assert!((deltas[0].size - 0.001).abs() < 1e-12);

        assert_eq!(
            counter_deltas(Some(&grown), None),
            vec![FolderCounterDelta {
                folder_id: folder,
                notes: -1,
                size: -0.002
            }]
        );
    }

    #[test]
    fn moving_between_folders_transfers_counters() {
        let from = ObjectId::new();
        let to = ObjectId::new();
        let before = note_in(Some(from), "abc");
        let mut after = before.clone();
        after.folder_id = Some(to);

        let deltas = counter_deltas(Some(&before), Some(&after));
        assert_eq!(deltas.len(), 2);
        assert_eq!((deltas[0].folder_id, deltas[0].notes), (from, -1));
        assert_eq!((deltas[1].folder_id, deltas[1].notes), (to, 1));

        let mut detached = before.clone();
        detached.folder_id = None;
        assert_eq!(counter_deltas(Some(&before), Some(&detached)).len(), 1);
        assert!(counter_deltas(None, Some(&detached)).is_empty());
    }
}
