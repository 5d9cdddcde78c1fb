use std::collections::HashMap;

use async_trait::async_trait;
use mongodb::bson::{self, oid::ObjectId};
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::repositories::note::{FolderCounterDelta, counter_deltas, invalid_folder};
use crate::repositories::{
    Attachment, BlobDeletion, BlobMetadata, BlobOutbox, BlobStore, Draft, DraftFilter,
    DraftRepository, EnhancedVersion, Folder, FolderDeletion, FolderRepository, IdentityLink, Note,
    NoteFilter, NoteRepository, Personality, PersonalityRepository, PreferencesUpdateRequest,
    ProfileChanges, User, UserRepository,
};

#[derive(Default)]
struct State {
    users: Vec<User>,
    personalities: Vec<Personality>,
    folders: Vec<Folder>,
    notes: Vec<Note>,
    drafts: Vec<Draft>,
    blob_deletions: Vec<BlobDeletion>,
}

impl State {
    fn conflicting_user(&self, user: &User) -> bool {
        self.users.iter().any(|u| {
            u.id != user.id
                && (u.email == user.email
                    || u.username == user.username
                    || (user.google_id.is_some() && u.google_id == user.google_id)
                    || (user.linkedin_id.is_some() && u.linkedin_id == user.linkedin_id))
        })
    }

    /// Fails without touching anything when a note would enter a folder
    /// the user does not have.
    fn check_counter_targets(&self, user_id: ObjectId, deltas: &[FolderCounterDelta]) -> Result<()> {
        let missing = deltas.iter().any(|delta| {
            delta.notes > 0
                && !self
                    .folders
                    .iter()
                    .any(|f| f.id == delta.folder_id && f.user_id == user_id)
        });
        if missing {
            return Err(invalid_folder());
        }
        Ok(())
    }

    fn apply_counter_deltas(&mut self, user_id: ObjectId, deltas: &[FolderCounterDelta]) {
        for delta in deltas {
            if let Some(folder) = self
                .folders
                .iter_mut()
                .find(|f| f.id == delta.folder_id && f.user_id == user_id)
            {
                folder.note_count += delta.notes;
                folder.size += delta.size;
                folder.updated_at = bson::DateTime::now();
            }
        }
    }

    fn enqueue(&mut self, file_ids: &[ObjectId]) {
        self.blob_deletions
            .extend(file_ids.iter().copied().map(BlobDeletion::new));
    }
}

/// In-process store implementing every repository trait. Each operation
/// holds the write lock for its whole duration, which gives multi-record
/// writes the same all-or-nothing behaviour as the MongoDB transactions.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Edits one account in place, keeping usernames, emails and provider
    /// ids unique.
    async fn modify_user(
        &self,
        user_id: ObjectId,
        change: impl FnOnce(&mut User) + Send,
    ) -> Result<Option<User>> {
        let mut state = self.state.write().await;
        let Some(index) = state.users.iter().position(|u| u.id == user_id) else {
            return Ok(None);
        };
        let mut user = state.users[index].clone();
        change(&mut user);
        user.updated_at = bson::DateTime::now();
        if state.conflicting_user(&user) {
            return Err(AppError::ValidationError(
                "Username or email already in use".to_string(),
            ));
        }
        state.users[index] = user.clone();
        Ok(Some(user))
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_id(&self, user_id: ObjectId) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .iter()
            .find(|u| u.google_id.as_deref() == Some(google_id))
            .cloned())
    }

    async fn find_by_linkedin_id(&self, linkedin_id: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .iter()
            .find(|u| u.linkedin_id.as_deref() == Some(linkedin_id))
            .cloned())
    }

    async fn create_with_personality(&self, user: &User, personality: &Personality) -> Result<()> {
        let mut state = self.state.write().await;
        if state.conflicting_user(user) {
            return Err(AppError::ValidationError("User already exists".to_string()));
        }
        state.users.push(user.clone());
        state.personalities.push(personality.clone());
        Ok(())
    }

    async fn update_profile(&self, user_id: ObjectId, changes: &ProfileChanges) -> Result<Option<User>> {
        self.modify_user(user_id, |user| {
            if let Some(username) = &changes.username {
                user.username = username.clone();
            }
            if let Some(email) = &changes.email {
                user.email = email.clone();
            }
            if let Some(avatar) = &changes.avatar {
                user.avatar = avatar.clone();
            }
        })
        .await
    }

    async fn update_preferences(
        &self,
        user_id: ObjectId,
        changes: &PreferencesUpdateRequest,
    ) -> Result<Option<User>> {
        self.modify_user(user_id, |user| user.preferences.apply(changes))
            .await
    }

    async fn set_password_hash(&self, user_id: ObjectId, hash: &str) -> Result<()> {
        self.modify_user(user_id, |user| user.password_hash = Some(hash.to_string()))
            .await?;
        Ok(())
    }

    async fn link_identity(&self, user_id: ObjectId, link: &IdentityLink) -> Result<Option<User>> {
        self.modify_user(user_id, |user| link.apply_to(user)).await
    }

    async fn record_login(&self, user_id: ObjectId) -> Result<Option<User>> {
        self.modify_user(user_id, |user| user.last_login = Some(bson::DateTime::now()))
            .await
    }

    async fn clear_linkedin_token(&self, user_id: ObjectId, token: &str) -> Result<()> {
        self.modify_user(user_id, |user| {
            if user.linkedin_access_token.as_deref() == Some(token) {
                user.linkedin_access_token = None;
            }
        })
        .await?;
        Ok(())
    }

    async fn set_current_personality(
        &self,
        user_id: ObjectId,
        personality_id: Option<ObjectId>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.iter_mut().find(|u| u.id == user_id) {
            user.current_personality = personality_id;
            user.updated_at = bson::DateTime::now();
        }
        Ok(())
    }

    async fn delete_cascade(&self, user_id: ObjectId) -> Result<Vec<ObjectId>> {
        let mut state = self.state.write().await;
        let mut file_ids: Vec<ObjectId> = state
            .notes
            .iter()
            .filter(|n| n.user_id == user_id)
            .flat_map(Note::attachment_file_ids)
            .collect();
        file_ids.sort();
        file_ids.dedup();

        state.notes.retain(|n| n.user_id != user_id);
        state.folders.retain(|f| f.user_id != user_id);
        state.drafts.retain(|d| d.user_id != user_id);
        state.personalities.retain(|p| p.user_id != user_id);
        state.enqueue(&file_ids);
        state.users.retain(|u| u.id != user_id);
        Ok(file_ids)
    }
}

#[async_trait]
impl PersonalityRepository for MemoryStore {
    async fn list(&self, user_id: ObjectId) -> Result<Vec<Personality>> {
        let state = self.state.read().await;
        let mut personalities: Vec<Personality> = state
            .personalities
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        personalities.sort_by_key(|p| p.created_at);
        Ok(personalities)
    }

    async fn find(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<Personality>> {
        let state = self.state.read().await;
        Ok(state
            .personalities
            .iter()
            .find(|p| p.id == id && p.user_id == user_id)
            .cloned())
    }

    async fn find_by_name(&self, user_id: ObjectId, name: &str) -> Result<Option<Personality>> {
        let state = self.state.read().await;
        Ok(state
            .personalities
            .iter()
            .find(|p| p.user_id == user_id && p.name == name)
            .cloned())
    }

    async fn create(&self, personality: &Personality) -> Result<()> {
        self.state.write().await.personalities.push(personality.clone());
        Ok(())
    }

    async fn update(&self, personality: &Personality) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .personalities
            .iter_mut()
            .find(|p| p.id == personality.id && p.user_id == personality.user_id)
        {
            *existing = personality.clone();
        }
        Ok(())
    }

    async fn delete(&self, user_id: ObjectId, id: ObjectId) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.personalities.len();
        state
            .personalities
            .retain(|p| !(p.id == id && p.user_id == user_id));
        if state.personalities.len() == before {
            return Ok(false);
        }
        if let Some(user) = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id && u.current_personality == Some(id))
        {
            user.current_personality = None;
        }
        Ok(true)
    }
}

#[async_trait]
impl FolderRepository for MemoryStore {
    async fn list(&self, user_id: ObjectId, personality_id: Option<ObjectId>) -> Result<Vec<Folder>> {
        let state = self.state.read().await;
        let mut folders: Vec<Folder> = state
            .folders
            .iter()
            .filter(|f| f.user_id == user_id)
            .filter(|f| personality_id.is_none_or(|p| p == f.personality_id))
            .cloned()
            .collect();
        folders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(folders)
    }

    async fn find(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<Folder>> {
        let state = self.state.read().await;
        Ok(state
            .folders
            .iter()
            .find(|f| f.id == id && f.user_id == user_id)
            .cloned())
    }

    async fn create(&self, folder: &Folder) -> Result<()> {
        self.state.write().await.folders.push(folder.clone());
        Ok(())
    }

    async fn update(&self, folder: &Folder) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .folders
            .iter_mut()
            .find(|f| f.id == folder.id && f.user_id == folder.user_id)
        {
            existing.name = folder.name.clone();
            existing.category = folder.category;
            existing.description = folder.description.clone();
            existing.color = folder.color.clone();
            existing.updated_at = folder.updated_at;
        }
        Ok(())
    }

    async fn delete_cascade(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<FolderDeletion>> {
        let mut state = self.state.write().await;
        let Some(index) = state
            .folders
            .iter()
            .position(|f| f.id == id && f.user_id == user_id)
        else {
            return Ok(None);
        };
        let folder = state.folders.remove(index);

        let (children, kept): (Vec<Note>, Vec<Note>) = std::mem::take(&mut state.notes)
            .into_iter()
            .partition(|n| n.user_id == user_id && n.folder_id == Some(id));
        state.notes = kept;

        let file_ids: Vec<ObjectId> = children.iter().flat_map(Note::attachment_file_ids).collect();
        state.enqueue(&file_ids);

        Ok(Some(FolderDeletion {
            folder,
            deleted_notes: children.len() as u64,
            file_ids,
        }))
    }
}

#[async_trait]
impl NoteRepository for MemoryStore {
    async fn list(&self, user_id: ObjectId, filter: &NoteFilter) -> Result<Vec<Note>> {
        let state = self.state.read().await;
        let mut notes: Vec<Note> = state
            .notes
            .iter()
            .filter(|n| n.user_id == user_id && filter.matches(n))
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(notes)
    }

    async fn find(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<Note>> {
        let state = self.state.read().await;
        Ok(state
            .notes
            .iter()
            .find(|n| n.id == id && n.user_id == user_id)
            .cloned())
    }

    async fn create(&self, note: &Note) -> Result<()> {
        let mut state = self.state.write().await;
        let deltas = counter_deltas(None, Some(note));
        state.check_counter_targets(note.user_id, &deltas)?;
        state.notes.push(note.clone());
        state.apply_counter_deltas(note.user_id, &deltas);
        Ok(())
    }

    async fn update(&self, next: &Note) -> Result<Option<Note>> {
        let mut state = self.state.write().await;
        let Some(index) = state
            .notes
            .iter()
            .position(|n| n.id == next.id && n.user_id == next.user_id)
        else {
            return Ok(None);
        };
        let previous = state.notes[index].clone();
        let deltas = counter_deltas(Some(&previous), Some(next));
        state.check_counter_targets(next.user_id, &deltas)?;

        let existing = &mut state.notes[index];
        existing.title = next.title.clone();
        existing.content = next.content.clone();
        existing.category = next.category;
        existing.folder_id = next.folder_id;
        existing.tags = next.tags.clone();
        existing.is_voice_note = next.is_voice_note;
        existing.audio_url = next.audio_url.clone();
        existing.size = next.size;
        existing.updated_at = next.updated_at;
        state.apply_counter_deltas(next.user_id, &deltas);
        Ok(Some(previous))
    }

    async fn delete(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<Note>> {
        let mut state = self.state.write().await;
        let Some(index) = state
            .notes
            .iter()
            .position(|n| n.id == id && n.user_id == user_id)
        else {
            return Ok(None);
        };
        let note = state.notes.remove(index);
        state.apply_counter_deltas(user_id, &counter_deltas(Some(&note), None));
        state.enqueue(&note.attachment_file_ids());
        Ok(Some(note))
    }

    async fn push_enhanced_version(
        &self,
        user_id: ObjectId,
        id: ObjectId,
        version: &EnhancedVersion,
    ) -> Result<Option<Note>> {
        let mut state = self.state.write().await;
        let Some(note) = state
            .notes
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
        else {
            return Ok(None);
        };
        note.enhanced_versions.push(version.clone());
        note.updated_at = bson::DateTime::now();
        Ok(Some(note.clone()))
    }

    async fn remove_attachment(
        &self,
        user_id: ObjectId,
        note_id: ObjectId,
        attachment_id: ObjectId,
    ) -> Result<Option<Attachment>> {
        let mut state = self.state.write().await;
        let Some(note) = state
            .notes
            .iter_mut()
            .find(|n| n.id == note_id && n.user_id == user_id)
        else {
            return Ok(None);
        };
        let Some(index) = note.attachments.iter().position(|a| a.id == attachment_id) else {
            return Ok(None);
        };
        let attachment = note.attachments.remove(index);
        note.updated_at = bson::DateTime::now();
        if let Some(file_id) = attachment.file_id {
            state.enqueue(&[file_id]);
        }
        Ok(Some(attachment))
    }
}

#[async_trait]
impl DraftRepository for MemoryStore {
    async fn list(&self, user_id: ObjectId, filter: &DraftFilter) -> Result<Vec<Draft>> {
        let state = self.state.read().await;
        let mut drafts: Vec<Draft> = state
            .drafts
            .iter()
            .filter(|d| d.user_id == user_id && filter.matches(d))
            .cloned()
            .collect();
        drafts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(drafts)
    }

    async fn find(&self, user_id: ObjectId, id: ObjectId) -> Result<Option<Draft>> {
        let state = self.state.read().await;
        Ok(state
            .drafts
            .iter()
            .find(|d| d.id == id && d.user_id == user_id)
            .cloned())
    }

    async fn create(&self, draft: &Draft) -> Result<()> {
        self.state.write().await.drafts.push(draft.clone());
        Ok(())
    }

    async fn update(&self, draft: &Draft) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .drafts
            .iter_mut()
            .find(|d| d.id == draft.id && d.user_id == draft.user_id)
        {
            *existing = draft.clone();
        }
        Ok(())
    }

    async fn delete(&self, user_id: ObjectId, id: ObjectId) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.drafts.len();
        state.drafts.retain(|d| !(d.id == id && d.user_id == user_id));
        Ok(state.drafts.len() < before)
    }
}

#[async_trait]
impl BlobOutbox for MemoryStore {
    async fn enqueue(&self, file_ids: &[ObjectId]) -> Result<()> {
        self.state.write().await.enqueue(file_ids);
        Ok(())
    }

    async fn pending(&self, limit: i64) -> Result<Vec<BlobDeletion>> {
        let state = self.state.read().await;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state.blob_deletions.iter().take(limit).cloned().collect())
    }

    async fn complete(&self, file_id: ObjectId) -> Result<()> {
        self.state
            .write()
            .await
            .blob_deletions
            .retain(|row| row.file_id != file_id);
        Ok(())
    }
}

/// Blob store kept in a map, used with [`MemoryStore`].
#[derive(Default)]
pub struct MemoryBlobStore {
    files: RwLock<HashMap<ObjectId, (BlobMetadata, Vec<u8>)>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, file_id: ObjectId) -> bool {
        self.files.read().await.contains_key(&file_id)
    }

    pub async fn metadata(&self, file_id: ObjectId) -> Option<BlobMetadata> {
        self.files.read().await.get(&file_id).map(|(m, _)| m.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, file_id: ObjectId, metadata: &BlobMetadata, bytes: &[u8]) -> Result<()> {
        self.files
            .write()
            .await
            .insert(file_id, (metadata.clone(), bytes.to_vec()));
        Ok(())
    }

    async fn download(&self, file_id: ObjectId) -> Result<Option<Vec<u8>>> {
        Ok(self.files.read().await.get(&file_id).map(|(_, b)| b.clone()))
    }

    async fn delete(&self, file_id: ObjectId) -> Result<()> {
        self.files.write().await.remove(&file_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content_size;

    fn note(user_id: ObjectId, folder_id: Option<ObjectId>, content: &str) -> Note {
        let now = bson::DateTime::now();
        Note {
            id: ObjectId::new(),
            title: "Title".to_string(),
            content: content.to_string(),
            category: Default::default(),
            folder_id,
            user_id,
            personality_id: ObjectId::new(),
            is_voice_note: false,
            audio_url: None,
            attachments: Vec::new(),
            tags: Vec::new(),
            enhanced_versions: Vec::new(),
            size: content_size(content),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_email() {
        let store = MemoryStore::new();
        let first = User::new("ada".to_string(), "ada@example.com".to_string());
        let second = User::new("ada2".to_string(), "ada@example.com".to_string());

        store
            .create_with_personality(&first, &Personality::default_for(first.id))
            .await
            .unwrap();
        let err = store
            .create_with_personality(&second, &Personality::default_for(second.id))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ValidationError(ref m) if m == "User already exists"));
    }

    #[tokio::test]
    async fn folder_cascade_only_takes_its_notes() {
        let store = MemoryStore::new();
        let user_id = ObjectId::new();
        let doomed = Folder::new(user_id, ObjectId::new(), "Doomed".to_string());
        let kept = Folder::new(user_id, ObjectId::new(), "Kept".to_string());
        FolderRepository::create(&store, &doomed).await.unwrap();
        FolderRepository::create(&store, &kept).await.unwrap();

        let mut with_file = note(user_id, Some(doomed.id), "a");
        let file_id = ObjectId::new();
        with_file.attachments.push(Attachment {
            id: ObjectId::new(),
            name: "a.pdf".to_string(),
            url: String::new(),
            content_type: "application/pdf".to_string(),
            size: 3,
            file_id: Some(file_id),
        });
        NoteRepository::create(&store, &with_file).await.unwrap();
        NoteRepository::create(&store, &note(user_id, Some(doomed.id), "b"))
            .await
            .unwrap();
        NoteRepository::create(&store, &note(user_id, Some(kept.id), "c"))
            .await
            .unwrap();
        NoteRepository::create(&store, &note(user_id, None, "d"))
            .await
            .unwrap();

        let deletion = FolderRepository::delete_cascade(&store, user_id, doomed.id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(deletion.deleted_notes, 2);
        assert_eq!(deletion.file_ids, vec![file_id]);
        let remaining = NoteRepository::list(&store, user_id, &NoteFilter::default())
            .await
            .unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|n| n.folder_id != Some(doomed.id)));
        let queued = store.pending(10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].file_id, file_id);
    }

    async fn note_count(store: &MemoryStore, folder: &Folder) -> i64 {
        FolderRepository::find(store, folder.user_id, folder.id)
            .await
            .unwrap()
            .unwrap()
            .note_count
    }

    #[tokio::test]
    async fn counters_follow_the_stored_note_not_the_callers_copy() {
        let store = MemoryStore::new();
        let user_id = ObjectId::new();
        let [a, b, c] =
            ["A", "B", "C"].map(|name| Folder::new(user_id, ObjectId::new(), name.to_string()));
        for folder in [&a, &b, &c] {
            FolderRepository::create(&store, folder).await.unwrap();
        }
        let snapshot = note(user_id, Some(a.id), "abc");
        NoteRepository::create(&store, &snapshot).await.unwrap();

        let mut to_b = snapshot.clone();
        to_b.folder_id = Some(b.id);
        let mut to_c = snapshot.clone();
        to_c.folder_id = Some(c.id);

        let replaced = NoteRepository::update(&store, &to_b).await.unwrap().unwrap();
        assert_eq!(replaced.folder_id, Some(a.id));
        let replaced = NoteRepository::update(&store, &to_c).await.unwrap().unwrap();
        assert_eq!(replaced.folder_id, Some(b.id));

        assert_eq!(note_count(&store, &a).await, 0);
        assert_eq!(note_count(&store, &b).await, 0);
        assert_eq!(note_count(&store, &c).await, 1);

        NoteRepository::delete(&store, user_id, snapshot.id).await.unwrap();
        assert!(NoteRepository::update(&store, &to_b).await.unwrap().is_none());
        assert_eq!(note_count(&store, &b).await, 0);
        assert_eq!(note_count(&store, &c).await, 0);
    }

    #[tokio::test]
    async fn notes_cannot_enter_a_removed_folder() {
        let store = MemoryStore::new();
        let user_id = ObjectId::new();
        let gone = Folder::new(user_id, ObjectId::new(), "Gone".to_string());
        let kept = Folder::new(user_id, ObjectId::new(), "Kept".to_string());
        FolderRepository::create(&store, &gone).await.unwrap();
        FolderRepository::create(&store, &kept).await.unwrap();
        FolderRepository::delete_cascade(&store, user_id, gone.id)
            .await
            .unwrap();

        let err = NoteRepository::create(&store, &note(user_id, Some(gone.id), "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(ref m) if m == "Invalid folder"));
        assert!(NoteRepository::list(&store, user_id, &NoteFilter::default())
            .await
            .unwrap()
            .is_empty());

        let resting = note(user_id, Some(kept.id), "y");
        NoteRepository::create(&store, &resting).await.unwrap();
        let mut moved = resting.clone();
        moved.folder_id = Some(gone.id);
        let err = NoteRepository::update(&store, &moved).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let stored = NoteRepository::find(&store, user_id, resting.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.folder_id, Some(kept.id));
        assert_eq!(note_count(&store, &kept).await, 1);
    }

    #[tokio::test]
    async fn deleting_current_personality_clears_selection() {
        let store = MemoryStore::new();
        let mut user = User::new("ada".to_string(), "ada@example.com".to_string());
        let personality = Personality::default_for(user.id);
        user.current_personality = Some(personality.id);
        store
            .create_with_personality(&user, &personality)
            .await
            .unwrap();

        assert!(PersonalityRepository::delete(&store, user.id, personality.id)
            .await
            .unwrap());
        let reloaded = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.current_personality, None);
    }
}
