use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{self, Document, doc, oid::ObjectId};
use mongodb::options::ReturnDocument;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result, is_duplicate_key};
use crate::models::to_utc;
use crate::repositories::mongo::{MongoStore, object_ids};
use crate::repositories::Personality;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_true")]
    pub notifications: bool,
    #[serde(default = "default_true")]
    pub auto_save: bool,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            language: default_language(),
            notifications: true,
            auto_save: true,
        }
    }
}

/// `users` collection document.
///
/// OAuth ids are omitted rather than stored as null so the sparse unique
/// indexes only see accounts that actually linked a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_personality: Option<ObjectId>,
    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<bson::DateTime>,
}

impl User {
    pub fn new(username: String, email: String) -> Self {
        let now = bson::DateTime::now();
        Self {
            id: ObjectId::new(),
            username,
            email,
            password_hash: None,
            google_id: None,
            linkedin_id: None,
            linkedin_access_token: None,
            avatar: None,
            preferences: Preferences::default(),
            current_personality: None,
            created_at: now,
            updated_at: now,
            last_login: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub preferences: Preferences,
    pub current_personality: Option<String>,
    pub has_password: bool,
    pub google_linked: bool,
    pub linkedin_linked: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_hex(),
            username: user.username.clone(),
            email: user.email.clone(),
            avatar: user.avatar.clone(),
            preferences: user.preferences.clone(),
            current_personality: user.current_personality.map(|id| id.to_hex()),
            has_password: user.password_hash.is_some(),
            google_linked: user.google_id.is_some(),
            linkedin_linked: user.linkedin_id.is_some(),
            created_at: to_utc(user.created_at),
            last_login: user.last_login.map(to_utc),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdateRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdateRequest {
    pub theme: Option<Theme>,
    pub language: Option<String>,
    pub notifications: Option<bool>,
    pub auto_save: Option<bool>,
}

impl Preferences {
    pub fn apply(&mut self, changes: &PreferencesUpdateRequest) {
        if let Some(theme) = changes.theme {
            self.theme = theme;
        }
        if let Some(language) = &changes.language {
            self.language = language.clone();
        }
        if let Some(notifications) = changes.notifications {
            self.notifications = notifications;
        }
        if let Some(auto_save) = changes.auto_save {
            self.auto_save = auto_save;
        }
    }
}

/// Profile fields to overwrite. `avatar: Some(None)` removes the avatar.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<Option<String>>,
}

/// Provider data recorded when an external login resolves to an account.
#[derive(Debug, Clone, Default)]
pub struct IdentityLink {
    pub google_id: Option<String>,
    pub linkedin_id: Option<String>,
    pub linkedin_access_token: Option<String>,
    /// Only fills an account without an avatar.
    pub avatar: Option<String>,
}

impl IdentityLink {
    pub fn apply_to(&self, user: &mut User) {
        if let Some(google_id) = &self.google_id {
            user.google_id = Some(google_id.clone());
        }
        if let Some(linkedin_id) = &self.linkedin_id {
            user.linkedin_id = Some(linkedin_id.clone());
        }
        if let Some(token) = &self.linkedin_access_token {
            user.linkedin_access_token = Some(token.clone());
        }
        if user.avatar.is_none() {
            user.avatar = self.avatar.clone();
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct AccountDeleteRequest {
    pub password: Option<String>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, user_id: ObjectId) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>>;
    async fn find_by_linkedin_id(&self, linkedin_id: &str) -> Result<Option<User>>;
    /// Inserts the user together with its first personality.
    async fn create_with_personality(&self, user: &User, personality: &Personality) -> Result<()>;
    async fn update_profile(&self, user_id: ObjectId, changes: &ProfileChanges) -> Result<Option<User>>;
    async fn update_preferences(
        &self,
        user_id: ObjectId,
        changes: &PreferencesUpdateRequest,
    ) -> Result<Option<User>>;
    async fn set_password_hash(&self, user_id: ObjectId, hash: &str) -> Result<()>;
    async fn link_identity(&self, user_id: ObjectId, link: &IdentityLink) -> Result<Option<User>>;
    /// Stamps `lastLogin` and returns the stored account.
    async fn record_login(&self, user_id: ObjectId) -> Result<Option<User>>;
    /// Forgets the LinkedIn token unless it was replaced after `token` was read.
    async fn clear_linkedin_token(&self, user_id: ObjectId, token: &str) -> Result<()>;
    async fn set_current_personality(
        &self,
        user_id: ObjectId,
        personality_id: Option<ObjectId>,
    ) -> Result<()>;
    /// Removes the user and everything it owns. Returns the GridFS files
    /// queued for deletion.
    async fn delete_cascade(&self, user_id: ObjectId) -> Result<Vec<ObjectId>>;
}

fn already_in_use() -> AppError {
    AppError::ValidationError("Username or email already in use".to_string())
}

impl MongoStore {
    async fn update_user(&self, user_id: ObjectId, update: Document) -> Result<Option<User>> {
        match self
            .users()
            .find_one_and_update(doc! { "_id": user_id }, update)
            .return_document(ReturnDocument::After)
            .await
        {
            Ok(user) => Ok(user),
            Err(e) if is_duplicate_key(&e) => Err(already_in_use()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl UserRepository for MongoStore {
    async fn find_by_id(&self, user_id: ObjectId) -> Result<Option<User>> {
        Ok(self.users().find_one(doc! { "_id": user_id }).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.users().find_one(doc! { "email": email }).await?)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.users().find_one(doc! { "username": username }).await?)
    }

    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>> {
        Ok(self.users().find_one(doc! { "googleId": google_id }).await?)
    }

    async fn find_by_linkedin_id(&self, linkedin_id: &str) -> Result<Option<User>> {
        Ok(self.users().find_one(doc! { "linkedinId": linkedin_id }).await?)
    }

    async fn create_with_personality(&self, user: &User, personality: &Personality) -> Result<()> {
        let mut session = self.start_transaction().await?;

        if let Err(e) = self.users().insert_one(user).session(&mut session).await {
            if is_duplicate_key(&e) {
                return Err(AppError::ValidationError("User already exists".to_string()));
            }
            return Err(e.into());
        }
        self.personalities()
            .insert_one(personality)
            .session(&mut session)
            .await?;

        session.commit_transaction().await?;
        Ok(())
    }

    async fn update_profile(&self, user_id: ObjectId, changes: &ProfileChanges) -> Result<Option<User>> {
        let mut set = doc! { "updatedAt": bson::DateTime::now() };
        let mut update = Document::new();
        if let Some(username) = &changes.username {
            set.insert("username", username.clone());
        }
        if let Some(email) = &changes.email {
            set.insert("email", email.clone());
        }
        match &changes.avatar {
            Some(Some(avatar)) => {
                set.insert("avatar", avatar.clone());
            }
            Some(None) => {
                update.insert("$unset", doc! { "avatar": "" });
            }
            None => {}
        }
        update.insert("$set", set);
        self.update_user(user_id, update).await
    }

    async fn update_preferences(
        &self,
        user_id: ObjectId,
        changes: &PreferencesUpdateRequest,
    ) -> Result<Option<User>> {
        let mut set = doc! { "updatedAt": bson::DateTime::now() };
        if let Some(theme) = changes.theme {
            set.insert("preferences.theme", bson::to_bson(&theme)?);
        }
        if let Some(language) = &changes.language {
            set.insert("preferences.language", language.clone());
        }
        if let Some(notifications) = changes.notifications {
            set.insert("preferences.notifications", notifications);
        }
        if let Some(auto_save) = changes.auto_save {
            set.insert("preferences.autoSave", auto_save);
        }
        self.update_user(user_id, doc! { "$set": set }).await
    }

    async fn set_password_hash(&self, user_id: ObjectId, hash: &str) -> Result<()> {
        self.users()
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "passwordHash": hash, "updatedAt": bson::DateTime::now() } },
            )
            .await?;
        Ok(())
    }

    async fn link_identity(&self, user_id: ObjectId, link: &IdentityLink) -> Result<Option<User>> {
        if let Some(avatar) = &link.avatar {
            self.users()
                .update_one(
                    doc! { "_id": user_id, "avatar": null },
                    doc! { "$set": { "avatar": avatar.clone() } },
                )
                .await?;
        }

        let mut set = doc! { "updatedAt": bson::DateTime::now() };
        if let Some(google_id) = &link.google_id {
            set.insert("googleId", google_id.clone());
        }
        if let Some(linkedin_id) = &link.linkedin_id {
            set.insert("linkedinId", linkedin_id.clone());
        }
        if let Some(token) = &link.linkedin_access_token {
            set.insert("linkedinAccessToken", token.clone());
        }
        self.update_user(user_id, doc! { "$set": set }).await
    }

    async fn record_login(&self, user_id: ObjectId) -> Result<Option<User>> {
        let now = bson::DateTime::now();
        self.update_user(
            user_id,
            doc! { "$set": { "lastLogin": now, "updatedAt": now } },
        )
        .await
    }

    async fn clear_linkedin_token(&self, user_id: ObjectId, token: &str) -> Result<()> {
        self.users()
            .update_one(
                doc! { "_id": user_id, "linkedinAccessToken": token },
                doc! {
                    "$unset": { "linkedinAccessToken": "" },
                    "$set": { "updatedAt": bson::DateTime::now() }
                },
            )
            .await?;
        Ok(())
    }

    async fn set_current_personality(
        &self,
        user_id: ObjectId,
        personality_id: Option<ObjectId>,
    ) -> Result<()> {
        let update = match personality_id {
            Some(id) => doc! {
                "$set": { "currentPersonality": id, "updatedAt": bson::DateTime::now() }
            },
            None => doc! {
                "$unset": { "currentPersonality": "" },
                "$set": { "updatedAt": bson::DateTime::now() }
            },
        };
        self.users()
            .update_one(doc! { "_id": user_id }, update)
            .await?;
        Ok(())
    }

    async fn delete_cascade(&self, user_id: ObjectId) -> Result<Vec<ObjectId>> {
        let mut session = self.start_transaction().await?;
        let owned = doc! { "userId": user_id };

        let file_ids = object_ids(
            self.notes()
                .distinct("attachments.fileId", owned.clone())
                .session(&mut session)
                .await?,
        );

        self.notes()
            .delete_many(owned.clone())
            .session(&mut session)
            .await?;
        self.folders()
            .delete_many(owned.clone())
            .session(&mut session)
            .await?;
        self.drafts()
            .delete_many(owned.clone())
            .session(&mut session)
            .await?;
        self.personalities()
            .delete_many(owned)
            .session(&mut session)
            .await?;
        self.enqueue_blob_deletions(&file_ids, &mut session).await?;
        self.users()
            .delete_one(doc! { "_id": user_id })
            .session(&mut session)
            .await?;

        session.commit_transaction().await?;
        Ok(file_ids)
    }
}
