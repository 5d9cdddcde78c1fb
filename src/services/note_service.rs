use std::sync::Arc;

use mongodb::bson::{self, oid::ObjectId};

use crate::config::UploadConfig;
use crate::error::{AppError, Result};
use crate::models::{Category, content_size, parse_optional_object_id, required_field};
use crate::repositories::{
    Attachment, BlobMetadata, BlobOutbox, BlobStore, EnhancedVersion, FolderRepository, Note,
    NoteFilter, NoteListQuery, NoteRepository, NoteUpdateRequest, PersonalityRepository,
};
use crate::services::blob_gc::BlobCollector;
use crate::services::enhance_service::{EnhanceService, Enhancement};
use crate::services::personality_service::owned_personality;
use crate::services::text_extraction::{self, detect_kind};

pub const EXTRACTED_TEXT_MARKER: &str = "\n\n--- Extracted Text ---\n";

/// A file received with a multipart request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Fields of the multipart note-creation form.
#[derive(Debug, Clone, Default)]
pub struct NewNoteForm {
    pub title: Option<String>,
    pub content: Option<String>,
    pub personality_id: Option<String>,
    pub folder_id: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub is_voice_note: Option<String>,
    pub audio_url: Option<String>,
    pub files: Vec<UploadedFile>,
}

/// Accepts a JSON array (`["a","b"]`) or a comma separated list.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let items = serde_json::from_str::<Vec<String>>(raw)
        .unwrap_or_else(|_| raw.split(',').map(str::to_string).collect());
    clean_tags(items)
}

fn clean_tags(items: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in items {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "on" | "yes")
}

pub fn attachment_url(note_id: ObjectId, attachment_id: ObjectId) -> String {
    format!("/api/notes/{}/attachments/{}", note_id, attachment_id)
}

pub struct NoteService {
    notes: Arc<dyn NoteRepository>,
    folders: Arc<dyn FolderRepository>,
    personalities: Arc<dyn PersonalityRepository>,
    blobs: Arc<dyn BlobStore>,
    outbox: Arc<dyn BlobOutbox>,
    collector: Arc<BlobCollector>,
    enhancer: Arc<EnhanceService>,
    uploads: UploadConfig,
}

impl NoteService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        notes: Arc<dyn NoteRepository>,
        folders: Arc<dyn FolderRepository>,
        personalities: Arc<dyn PersonalityRepository>,
        blobs: Arc<dyn BlobStore>,
        outbox: Arc<dyn BlobOutbox>,
        collector: Arc<BlobCollector>,
        enhancer: Arc<EnhanceService>,
        uploads: UploadConfig,
    ) -> Self {
        Self {
            notes,
            folders,
            personalities,
            blobs,
            outbox,
            collector,
            enhancer,
            uploads,
        }
    }

    pub fn upload_limits(&self) -> &UploadConfig {
        &self.uploads
    }

    pub async fn list(&self, user_id: ObjectId, query: NoteListQuery) -> Result<Vec<Note>> {
        let filter = NoteFilter {
            folder_id: parse_optional_object_id(query.folder_id.as_deref(), "folder")?,
            category: required_field(query.category)
                .map(|c| c.parse::<Category>())
                .transpose()?,
            search: required_field(query.search),
            personality_id: parse_optional_object_id(query.personality_id.as_deref(), "personality")?,
            tag: required_field(query.tag),
        };
        self.notes.list(user_id, &filter).await
    }

    pub async fn get(&self, user_id: ObjectId, id: ObjectId) -> Result<Note> {
        self.notes
            .find(user_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Note not found".to_string()))
    }

    /// A folder referenced by a note write must exist and belong to the caller.
    async fn owned_folder(&self, user_id: ObjectId, raw: Option<&str>) -> Result<Option<ObjectId>> {
        let Some(folder_id) = parse_optional_object_id(raw, "folder")? else {
            return Ok(None);
        };
        match self.folders.find(user_id, folder_id).await? {
            Some(folder) => Ok(Some(folder.id)),
            None => Err(AppError::ValidationError("Invalid folder".to_string())),
        }
    }

    pub async fn create(&self, user_id: ObjectId, form: NewNoteForm) -> Result<Note> {
        let (Some(title), Some(mut content), Some(personality_id)) = (
            required_field(form.title),
            required_field(form.content),
            required_field(form.personality_id),
        ) else {
            return Err(AppError::ValidationError(
                "Title, content and personality are required".to_string(),
            ));
        };
        if form.files.len() > self.uploads.max_files {
            return Err(AppError::ValidationError(format!(
                "At most {} files can be attached",
                self.uploads.max_files
            )));
        }
        if let Some(file) = form
            .files
            .iter()
            .find(|f| f.bytes.len() > self.uploads.max_file_bytes)
        {
            return Err(AppError::PayloadTooLarge(format!(
                "{} exceeds the upload size limit",
                file.name
            )));
        }

        let personality =
            owned_personality(self.personalities.as_ref(), user_id, &personality_id).await?;
        let folder_id = self.owned_folder(user_id, form.folder_id.as_deref()).await?;
        let category = required_field(form.category)
            .map(|c| c.parse::<Category>())
            .transpose()?
            .unwrap_or_default();

        for file in &form.files {
            let Some(kind) = detect_kind(&file.content_type, &file.name) else {
                continue;
            };
            match text_extraction::extract_text(kind, file.bytes.clone()).await {
                Ok(text) if !text.is_empty() => {
                    content.push_str(EXTRACTED_TEXT_MARKER);
                    content.push_str(&text);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(file = %file.name, error = %e, "Skipping text extraction");
                }
            }
        }

        let note_id = ObjectId::new();
        let attachments = self.store_files(user_id, note_id, &form.files).await?;
        let now = bson::DateTime::now();
        let note = Note {
            id: note_id,
            title,
            size: content_size(&content),
            content,
            category,
            folder_id,
            user_id,
            personality_id: personality.id,
            is_voice_note: form.is_voice_note.as_deref().is_some_and(parse_flag),
            audio_url: required_field(form.audio_url),
            attachments,
            tags: form.tags.as_deref().map(parse_tags).unwrap_or_default(),
            enhanced_versions: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.notes.create(&note).await {
            self.discard_uploads(&note.attachment_file_ids()).await;
            return Err(e);
        }
        tracing::info!(
            %user_id,
            note_id = %note.id,
            attachments = note.attachments.len(),
            "Note created"
        );
        Ok(note)
    }

    async fn store_files(
        &self,
        user_id: ObjectId,
        note_id: ObjectId,
        files: &[UploadedFile],
    ) -> Result<Vec<Attachment>> {
        let mut attachments = Vec::with_capacity(files.len());
        for file in files {
            let file_id = ObjectId::new();
            let metadata = BlobMetadata {
                user_id,
                original_name: file.name.clone(),
                content_type: file.content_type.clone(),
            };
            if let Err(e) = self.blobs.upload(file_id, &metadata, &file.bytes).await {
                let stored: Vec<ObjectId> = attachments
                    .iter()
                    .filter_map(|a: &Attachment| a.file_id)
                    .chain(std::iter::once(file_id))
                    .collect();
                self.discard_uploads(&stored).await;
                return Err(e);
            }
            let attachment_id = ObjectId::new();
            attachments.push(Attachment {
                id: attachment_id,
                name: file.name.clone(),
                url: attachment_url(note_id, attachment_id),
                content_type: file.content_type.clone(),
                size: file.bytes.len() as i64,
                file_id: Some(file_id),
            });
        }
        Ok(attachments)
    }

    /// Removes blobs of a note that was never saved. Whatever cannot be
    /// deleted now goes to the outbox.
    async fn discard_uploads(&self, file_ids: &[ObjectId]) {
        for &file_id in file_ids {
            if let Err(e) = self.blobs.delete(file_id).await {
                tracing::warn!(%file_id, error = %e, "Queueing orphaned upload");
                if let Err(e) = self.outbox.enqueue(&[file_id]).await {
                    tracing::error!(%file_id, error = %e, "Failed to queue orphaned upload");
                }
            }
        }
    }

    pub async fn update(
        &self,
        user_id: ObjectId,
        id: ObjectId,
        req: NoteUpdateRequest,
    ) -> Result<Note> {
        let mut next = self.get(user_id, id).await?;

        if let Some(title) = req.title {
            next.title = required_field(Some(title))
                .ok_or_else(|| AppError::ValidationError("Title cannot be empty".to_string()))?;
        }
        if let Some(content) = req.content {
            next.content = required_field(Some(content))
                .ok_or_else(|| AppError::ValidationError("Content cannot be empty".to_string()))?;
        }
        if let Some(category) = required_field(req.category) {
            next.category = category.parse::<Category>()?;
        }
        if let Some(folder_id) = req.folder_id {
            next.folder_id = self.owned_folder(user_id, folder_id.as_deref()).await?;
        }
        if let Some(tags) = req.tags {
            next.tags = clean_tags(tags);
        }
        if let Some(is_voice_note) = req.is_voice_note {
            next.is_voice_note = is_voice_note;
        }
        if let Some(audio_url) = req.audio_url {
            next.audio_url = required_field(audio_url);
        }
        next.size = content_size(&next.content);
        next.updated_at = bson::DateTime::now();

        self.notes
            .update(&next)
            .await?
            .ok_or_else(|| AppError::NotFound("Note not found".to_string()))?;
        tracing::debug!(%user_id, note_id = %id, "Note updated");
        Ok(next)
    }

    pub async fn delete(&self, user_id: ObjectId, id: ObjectId) -> Result<Note> {
        let note = self
            .notes
            .delete(user_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Note not found".to_string()))?;
        tracing::info!(%user_id, note_id = %id, "Note deleted");
        self.collector.sweep(&note.attachment_file_ids()).await;
        Ok(note)
    }

    pub async fn download_attachment(
        &self,
        user_id: ObjectId,
        note_id: ObjectId,
        attachment_id: ObjectId,
    ) -> Result<(Attachment, Vec<u8>)> {
        let note = self.get(user_id, note_id).await?;
        let attachment = note
            .attachments
            .into_iter()
            .find(|a| a.id == attachment_id)
            .ok_or_else(|| AppError::NotFound("Attachment not found".to_string()))?;
        let file_id = attachment
            .file_id
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;
        let bytes = self
            .blobs
            .download(file_id)
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;
        Ok((attachment, bytes))
    }

    pub async fn delete_attachment(
        &self,
        user_id: ObjectId,
        note_id: ObjectId,
        attachment_id: ObjectId,
    ) -> Result<Note> {
        self.get(user_id, note_id).await?;
        let attachment = self
            .notes
            .remove_attachment(user_id, note_id, attachment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Attachment not found".to_string()))?;
        if let Some(file_id) = attachment.file_id {
            self.collector.sweep(&[file_id]).await;
        }
        self.get(user_id, note_id).await
    }

    /// Enhances the note's content and records the result on the note.
    pub async fn enhance_note(
        &self,
        user_id: ObjectId,
        id: ObjectId,
        enhancement: Enhancement,
    ) -> Result<(String, Note)> {
        let note = self.get(user_id, id).await?;
        let enhanced = self.enhancer.enhance(enhancement, &note.content).await?;
        let version = EnhancedVersion {
            platform: enhancement.label().to_string(),
            content: enhanced.clone(),
            created_at: bson::DateTime::now(),
        };
        let note = self
            .notes
            .push_enhanced_version(user_id, id, &version)
            .await?
            .ok_or_else(|| AppError::NotFound("Note not found".to_string()))?;
        Ok((enhanced, note))
    }

    pub async fn enhance_content(&self, enhancement: Enhancement, content: &str) -> Result<String> {
        self.enhancer.enhance(enhancement, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{Folder, MemoryBlobStore, MemoryStore, Personality};
    use crate::services::enhance_service::{CompletionClient, CompletionRequest};
    use async_trait::async_trait;

    struct EchoClient;

    #[async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            Ok(format!("enhanced ({})", request.max_tokens))
        }
    }

    struct Fixture {
        service: NoteService,
        store: Arc<MemoryStore>,
        blobs: Arc<MemoryBlobStore>,
        user_id: ObjectId,
        personality: Personality,
        folder: Folder,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let user_id = ObjectId::new();
        let personality = Personality::default_for(user_id);
        PersonalityRepository::create(store.as_ref(), &personality)
            .await
            .unwrap();
        let folder = Folder::new(user_id, personality.id, "Inbox".to_string());
        FolderRepository::create(store.as_ref(), &folder)
            .await
            .unwrap();

        let collector = Arc::new(BlobCollector::new(blobs.clone(), store.clone()));
        let service = NoteService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            blobs.clone(),
            store.clone(),
            collector,
            Arc::new(EnhanceService::new(Arc::new(EchoClient))),
            UploadConfig::default(),
        );
        Fixture {
            service,
            store,
            blobs,
            user_id,
            personality,
            folder,
        }
    }

    fn form(f: &Fixture, content: &str) -> NewNoteForm {
        NewNoteForm {
            title: Some("Plan".to_string()),
            content: Some(content.to_string()),
            personality_id: Some(f.personality.id.to_hex()),
            folder_id: Some(f.folder.id.to_hex()),
            ..NewNoteForm::default()
        }
    }

    async fn folder_counters(f: &Fixture) -> (i64, f64) {
        let folder = FolderRepository::find(f.store.as_ref(), f.user_id, f.folder.id)
            .await
            .unwrap()
            .unwrap();
        (folder.note_count, folder.size)
    }

    #[test]
    fn tags_accept_json_or_commas() {
        assert_eq!(parse_tags(r#"["a", "b", "a"]"#), vec!["a", "b"]);
        assert_eq!(parse_tags("x, y ,,z"), vec!["x", "y", "z"]);
        assert!(parse_tags("").is_empty());
    }

    #[tokio::test]
    async fn create_in_folder_bumps_counters() {
        let f = fixture().await;
        let note = f.service.create(f.user_id, form(&f, "Hello")).await.unwrap();

        assert_eq!(note.size, 0.005);
        assert_eq!(folder_counters(&f).await, (1, 0.005));
    }

    #[tokio::test]
    async fn create_requires_core_fields_and_owned_folder() {
        let f = fixture().await;
        let mut missing = form(&f, "x");
        missing.title = None;
        let err = f.service.create(f.user_id, missing).await.unwrap_err();
        assert!(
            matches!(err, AppError::ValidationError(ref m) if m == "Title, content and personality are required")
        );

        let mut stray = form(&f, "x");
        stray.folder_id = Some(ObjectId::new().to_hex());
        let err = f.service.create(f.user_id, stray).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(ref m) if m == "Invalid folder"));
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let f = fixture().await;
        let mut big = form(&f, "x");
        big.files.push(UploadedFile {
            name: "huge.bin".to_string(),
            content_type: "application/octet-stream".to_string(),
            bytes: vec![0; UploadConfig::default().max_file_bytes + 1],
        });
        let err = f.service.create(f.user_id, big).await.unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
    }

    #[tokio::test]
    async fn growing_content_grows_folder_size() {
        let f = fixture().await;
        let note = f.service.create(f.user_id, form(&f, "X")).await.unwrap();

        let updated = f
            .service
            .update(
                f.user_id,
                note.id,
                NoteUpdateRequest {
                    content: Some("XY".to_string()),
                    ..NoteUpdateRequest::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.size, 0.002);
        let (count, size) = folder_counters(&f).await;
        assert_eq!(count, 1);
        assert!((size - 0.002).abs() < 1e-9);
    }

    #[tokio::test]
    async fn updated_content_is_trimmed_and_required() {
        let f = fixture().await;
        let note = f.service.create(f.user_id, form(&f, "X")).await.unwrap();

        let updated = f
            .service
            .update(
                f.user_id,
                note.id,
                NoteUpdateRequest {
                    content: Some("  XY \n".to_string()),
                    ..NoteUpdateRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.content, "XY");
        assert_eq!(updated.size, 0.002);

        let err = f
            .service
            .update(
                f.user_id,
                note.id,
                NoteUpdateRequest {
                    content: Some("   ".to_string()),
                    ..NoteUpdateRequest::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(ref m) if m == "Content cannot be empty"));
        assert_eq!(folder_counters(&f).await, (1, 0.002));
    }

    #[tokio::test]
    async fn extracted_document_text_is_appended_before_sizing() {
        let f = fixture().await;
        let mut with_doc = form(&f, "Body");
        with_doc.files.push(UploadedFile {
            name: "report.docx".to_string(),
            content_type: text_extraction::DOCX_MIME.to_string(),
            bytes: text_extraction::tests::docx_with(
                "<w:p><w:r><w:t>Quarterly numbers</w:t></w:r></w:p>",
            ),
        });
        let note = f.service.create(f.user_id, with_doc).await.unwrap();

        let expected = format!("Body{}Quarterly numbers", EXTRACTED_TEXT_MARKER);
        assert_eq!(note.content, expected);
        assert_eq!(note.size, content_size(&expected));
        assert_eq!(note.attachments.len(), 1);
        assert_eq!(folder_counters(&f).await, (1, content_size(&expected)));
    }

    #[tokio::test]
    async fn unreadable_document_is_attached_without_text() {
        let f = fixture().await;
        let mut with_pdf = form(&f, "Body");
        with_pdf.files.push(UploadedFile {
            name: "broken.pdf".to_string(),
            content_type: text_extraction::PDF_MIME.to_string(),
            bytes: b"not a pdf".to_vec(),
        });
        let note = f.service.create(f.user_id, with_pdf).await.unwrap();

        assert_eq!(note.content, "Body");
        assert_eq!(note.size, content_size("Body"));
        assert_eq!(note.attachments.len(), 1);
        assert!(f.blobs.contains(note.attachments[0].file_id.unwrap()).await);
    }

    #[tokio::test]
    async fn detaching_moves_counters_out() {
        let f = fixture().await;
        let note = f.service.create(f.user_id, form(&f, "abc")).await.unwrap();

        let updated = f
            .service
            .update(
                f.user_id,
                note.id,
                NoteUpdateRequest {
                    folder_id: Some(None),
                    ..NoteUpdateRequest::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.folder_id, None);
        let (count, size) = folder_counters(&f).await;
        assert_eq!(count, 0);
        assert!(size.abs() < 1e-9);
    }

    #[tokio::test]
    async fn attachments_are_stored_and_swept_on_delete() {
        let f = fixture().await;
        let mut with_file = form(&f, "see attached");
        with_file.files.push(UploadedFile {
            name: "photo.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![1, 2, 3],
        });
        let note = f.service.create(f.user_id, with_file).await.unwrap();
        let attachment = note.attachments[0].clone();
        let file_id = attachment.file_id.unwrap();

        assert_eq!(note.content, "see attached");
        assert_eq!(attachment.url, attachment_url(note.id, attachment.id));
        assert!(f.blobs.contains(file_id).await);
        let stored = f.blobs.metadata(file_id).await.unwrap();
        assert_eq!(stored.user_id, f.user_id);
        assert_eq!(stored.original_name, "photo.png");
        assert_eq!(stored.content_type, "image/png");

        let (meta, bytes) = f
            .service
            .download_attachment(f.user_id, note.id, attachment.id)
            .await
            .unwrap();
        assert_eq!(meta.content_type, "image/png");
        assert_eq!(bytes, vec![1, 2, 3]);

        f.service.delete(f.user_id, note.id).await.unwrap();
        assert!(!f.blobs.contains(file_id).await);
        assert!(f.store.pending(10).await.unwrap().is_empty());
        assert_eq!(folder_counters(&f).await.0, 0);
    }

    #[tokio::test]
    async fn removing_an_attachment_deletes_its_blob() {
        let f = fixture().await;
        let mut with_file = form(&f, "x");
        with_file.files.push(UploadedFile {
            name: "a.txt".to_string(),
            content_type: "text/plain".to_string(),
            bytes: b"abc".to_vec(),
        });
        let note = f.service.create(f.user_id, with_file).await.unwrap();
        let attachment = note.attachments[0].clone();

        let after = f
            .service
            .delete_attachment(f.user_id, note.id, attachment.id)
            .await
            .unwrap();
        assert!(after.attachments.is_empty());
        assert!(!f.blobs.contains(attachment.file_id.unwrap()).await);

        let err = f
            .service
            .delete_attachment(f.user_id, note.id, attachment.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn enhancing_a_note_records_a_version() {
        let f = fixture().await;
        let note = f.service.create(f.user_id, form(&f, "draft")).await.unwrap();

        let (text, note) = f
            .service
            .enhance_note(f.user_id, note.id, Enhancement::Social(crate::models::Platform::Twitter))
            .await
            .unwrap();

        assert_eq!(text, "enhanced (150)");
        assert_eq!(note.enhanced_versions.len(), 1);
        assert_eq!(note.enhanced_versions[0].platform, "twitter");
    }

    #[tokio::test]
    async fn list_filters_by_search_and_rejects_bad_ids() {
        let f = fixture().await;
        f.service.create(f.user_id, form(&f, "Quarterly Review")).await.unwrap();
        f.service.create(f.user_id, form(&f, "Groceries")).await.unwrap();

        let found = f
            .service
            .list(
                f.user_id,
                NoteListQuery {
                    search: Some("review".to_string()),
                    ..NoteListQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let err = f
            .service
            .list(
                f.user_id,
                NoteListQuery {
                    folder_id: Some("nope".to_string()),
                    ..NoteListQuery::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
