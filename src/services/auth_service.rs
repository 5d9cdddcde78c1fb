use std::sync::Arc;

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::auth::{
    TIMING_GUARD_PASSWORD, hash_password, issue_session_token, normalize_email, username_stem,
    validate_email_format, validate_password_format, validate_username_format, verify_password,
};
use crate::error::{AppError, Result};
use crate::models::required_field;
use crate::repositories::{
    AccountDeleteRequest, DraftFilter, DraftRepository, DraftResponse, FolderRepository,
    FolderResponse, IdentityLink, LoginRequest, NoteFilter, NoteRepository, NoteResponse,
    PasswordChangeRequest, Personality, PersonalityRepository, PersonalityResponse,
    PreferencesUpdateRequest, ProfileChanges, ProfileUpdateRequest, RegisterRequest, User,
    UserRepository, UserResponse,
};
use crate::services::Backends;
use crate::services::blob_gc::BlobCollector;
use crate::services::oauth_service::{GoogleVerifier, LinkedInClient};

#[derive(Serialize, Debug)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Deserialize, Debug, Default)]
pub struct GoogleLoginRequest {
    pub credential: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct LinkedInLoginRequest {
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
}

/// Everything an account owns, as returned by the data export.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AccountExport {
    pub exported_at: DateTime<Utc>,
    pub user: UserResponse,
    pub personalities: Vec<PersonalityResponse>,
    pub folders: Vec<FolderResponse>,
    pub notes: Vec<NoteResponse>,
    pub drafts: Vec<DraftResponse>,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub bcrypt_cost: u32,
}

/// Identity handed over by an OAuth provider.
struct ExternalIdentity {
    email: String,
    email_verified: bool,
    display_name: Option<String>,
}

fn invalid_credentials() -> AppError {
    AppError::AuthenticationError("Invalid credentials".to_string())
}

fn user_not_found() -> AppError {
    AppError::NotFound("User not found".to_string())
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    personalities: Arc<dyn PersonalityRepository>,
    folders: Arc<dyn FolderRepository>,
    notes: Arc<dyn NoteRepository>,
    drafts: Arc<dyn DraftRepository>,
    google: Arc<dyn GoogleVerifier>,
    linkedin: Arc<dyn LinkedInClient>,
    collector: Arc<BlobCollector>,
    settings: AuthSettings,
    timing_guard: OnceCell<String>,
}

impl AuthService {
    pub fn new(backends: &Backends, collector: Arc<BlobCollector>, settings: AuthSettings) -> Self {
        Self {
            users: backends.users.clone(),
            personalities: backends.personalities.clone(),
            folders: backends.folders.clone(),
            notes: backends.notes.clone(),
            drafts: backends.drafts.clone(),
            google: backends.google.clone(),
            linkedin: backends.linkedin.clone(),
            collector,
            settings,
            timing_guard: OnceCell::new(),
        }
    }

    fn session_for(&self, user: &User) -> Result<AuthResponse> {
        let token = issue_session_token(
            &user.id.to_hex(),
            &self.settings.jwt_secret,
            self.settings.token_ttl_days,
        )?;
        Ok(AuthResponse {
            token,
            user: UserResponse::from(user),
        })
    }

    async fn find_user(&self, user_id: ObjectId) -> Result<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(user_not_found)
    }

    /// Verifies against the stored hash, or against a throwaway hash when the
    /// account has none, so both paths cost one bcrypt verification.
    async fn check_password(&self, password: String, hash: Option<String>) -> Result<bool> {
        let has_hash = hash.is_some();
        let hash = match hash {
            Some(hash) => hash,
            None => self
                .timing_guard
                .get_or_try_init(|| {
                    hash_password(TIMING_GUARD_PASSWORD.to_string(), self.settings.bcrypt_cost)
                })
                .await?
                .clone(),
        };
        let matches = verify_password(password, hash).await?;
        Ok(has_hash && matches)
    }

    /// Inserts a fresh account along with its default personality.
    async fn create_account(&self, mut user: User) -> Result<User> {
        let personality = Personality::default_for(user.id);
        user.current_personality = Some(personality.id);
        self.users.create_with_personality(&user, &personality).await?;
        tracing::info!(user_id = %user.id, "Account created");
        Ok(user)
    }

    async fn unique_username(&self, raw: &str) -> Result<String> {
        let stem = username_stem(raw);
        if self.users.find_by_username(&stem).await?.is_none() {
            return Ok(stem);
        }
        for _ in 0..10 {
            let candidate = format!("{}{:04}", stem, rand::random::<u16>() % 10_000);
            if self.users.find_by_username(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        let hex = ObjectId::new().to_hex();
        Ok(format!("{}{}", stem, &hex[hex.len() - 4..]))
    }

    async fn touch_login(&self, user_id: ObjectId) -> Result<User> {
        self.users
            .record_login(user_id)
            .await?
            .ok_or_else(user_not_found)
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse> {
        let (Some(username), Some(email), Some(password)) = (
            required_field(req.username),
            required_field(req.email),
            req.password.filter(|p| !p.is_empty()),
        ) else {
            return Err(AppError::ValidationError(
                "Username, email and password are required".to_string(),
            ));
        };
        let email = normalize_email(&email);
        validate_username_format(&username)?;
        validate_email_format(&email)?;
        validate_password_format(&password)?;

        if self.users.find_by_email(&email).await?.is_some()
            || self.users.find_by_username(&username).await?.is_some()
        {
            return Err(AppError::ValidationError("User already exists".to_string()));
        }

        let mut user = User::new(username, email);
        user.password_hash = Some(hash_password(password, self.settings.bcrypt_cost).await?);
        let user = self.create_account(user).await?;
        self.session_for(&user)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse> {
        let (Some(email), Some(password)) = (required_field(req.email), req.password) else {
            return Err(AppError::ValidationError(
                "Email and password are required".to_string(),
            ));
        };

        let user = self.users.find_by_email(&normalize_email(&email)).await?;
        let hash = user.as_ref().and_then(|u| u.password_hash.clone());
        if !self.check_password(password, hash).await? {
            return Err(invalid_credentials());
        }
        let user = user.ok_or_else(invalid_credentials)?;

        let user = self.touch_login(user.id).await?;
        tracing::info!(user_id = %user.id, "User logged in");
        self.session_for(&user)
    }

    /// Finds the account for an external identity: by provider id, then by
    /// verified email (linking it), else a new account. Records the login.
    async fn sign_in_external(
        &self,
        existing: Option<User>,
        identity: ExternalIdentity,
        link: IdentityLink,
    ) -> Result<User> {
        let account = match existing {
            Some(user) => user,
            None => match self.users.find_by_email(&identity.email).await? {
                Some(user) if identity.email_verified => {
                    tracing::info!(user_id = %user.id, "Linked external login to account");
                    user
                }
                Some(user) => {
                    tracing::warn!(user_id = %user.id, "Refusing to link unverified email");
                    return Err(AppError::ValidationError(
                        "Email address is not verified with this provider".to_string(),
                    ));
                }
                None => {
                    let stem_source = identity
                        .display_name
                        .clone()
                        .or_else(|| identity.email.split('@').next().map(str::to_string))
                        .unwrap_or_default();
                    let username = self.unique_username(&stem_source).await?;
                    let mut user = User::new(username, identity.email.clone());
                    link.apply_to(&mut user);
                    let user = self.create_account(user).await?;
                    return self.touch_login(user.id).await;
                }
            },
        };

        self.users
            .link_identity(account.id, &link)
            .await?
            .ok_or_else(user_not_found)?;
        self.touch_login(account.id).await
    }

    pub async fn google_login(&self, credential: Option<String>) -> Result<AuthResponse> {
        let credential = required_field(credential)
            .ok_or_else(|| AppError::ValidationError("Google credential is required".to_string()))?;
        let profile = self.google.verify(&credential).await?;

        let existing = self.users.find_by_google_id(&profile.sub).await?;
        let identity = ExternalIdentity {
            email: normalize_email(&profile.email),
            email_verified: profile.email_verified,
            display_name: profile.name.clone(),
        };
        let link = IdentityLink {
            google_id: Some(profile.sub.clone()),
            avatar: profile.picture.clone(),
            ..IdentityLink::default()
        };
        let user = self.sign_in_external(existing, identity, link).await?;
        self.session_for(&user)
    }

    pub async fn linkedin_login(&self, req: LinkedInLoginRequest) -> Result<AuthResponse> {
        let code = required_field(req.code)
            .ok_or_else(|| AppError::ValidationError("Authorization code is required".to_string()))?;
        let access_token = self
            .linkedin
            .exchange_code(&code, req.redirect_uri.as_deref())
            .await?;
        let profile = self.linkedin.profile(&access_token).await?;
        let email = profile
            .email
            .as_deref()
            .map(normalize_email)
            .ok_or_else(|| {
                AppError::ValidationError("LinkedIn account has no email address".to_string())
            })?;

        let existing = self.users.find_by_linkedin_id(&profile.sub).await?;
        let identity = ExternalIdentity {
            email,
            email_verified: profile.email_verified,
            display_name: profile.name.clone(),
        };
        let link = IdentityLink {
            linkedin_id: Some(profile.sub.clone()),
            linkedin_access_token: Some(access_token),
            avatar: profile.picture.clone(),
            ..IdentityLink::default()
        };
        let user = self.sign_in_external(existing, identity, link).await?;
        self.session_for(&user)
    }

    pub async fn current_user(&self, user_id: ObjectId) -> Result<User> {
        self.find_user(user_id).await
    }

    pub async fn update_profile(&self, user_id: ObjectId, req: ProfileUpdateRequest) -> Result<User> {
        let mut changes = ProfileChanges::default();

        if let Some(username) = required_field(req.username) {
            validate_username_format(&username)?;
            if let Some(other) = self.users.find_by_username(&username).await? {
                if other.id != user_id {
                    return Err(AppError::ValidationError("Username already taken".to_string()));
                }
            }
            changes.username = Some(username);
        }
        if let Some(email) = required_field(req.email) {
            let email = normalize_email(&email);
            validate_email_format(&email)?;
            if let Some(other) = self.users.find_by_email(&email).await? {
                if other.id != user_id {
                    return Err(AppError::ValidationError("Email already in use".to_string()));
                }
            }
            changes.email = Some(email);
        }
        if let Some(avatar) = req.avatar {
            changes.avatar = Some(required_field(Some(avatar)));
        }

        let user = self
            .users
            .update_profile(user_id, &changes)
            .await?
            .ok_or_else(user_not_found)?;
        tracing::debug!(%user_id, "Profile updated");
        Ok(user)
    }

    pub async fn update_preferences(
        &self,
        user_id: ObjectId,
        req: PreferencesUpdateRequest,
    ) -> Result<User> {
        let changes = PreferencesUpdateRequest {
            language: required_field(req.language),
            ..req
        };
        self.users
            .update_preferences(user_id, &changes)
            .await?
            .ok_or_else(user_not_found)
    }

    /// Accounts created through OAuth may set a first password without a
    /// current one.
    pub async fn change_password(&self, user_id: ObjectId, req: PasswordChangeRequest) -> Result<()> {
        let new_password = req
            .new_password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::ValidationError("New password is required".to_string()))?;
        validate_password_format(&new_password)?;

        let user = self.find_user(user_id).await?;
        if let Some(hash) = user.password_hash {
            let current = req.current_password.ok_or_else(|| {
                AppError::ValidationError("Current password is required".to_string())
            })?;
            if !self.check_password(current, Some(hash)).await? {
                return Err(AppError::AuthenticationError(
                    "Current password is incorrect".to_string(),
                ));
            }
        }

        let hash = hash_password(new_password, self.settings.bcrypt_cost).await?;
        self.users.set_password_hash(user_id, &hash).await?;
        tracing::info!(%user_id, "Password changed");
        Ok(())
    }

    pub async fn export_data(&self, user_id: ObjectId) -> Result<AccountExport> {
        let user = self.find_user(user_id).await?;
        let personalities = self.personalities.list(user_id).await?;
        let folders = self.folders.list(user_id, None).await?;
        let notes = self.notes.list(user_id, &NoteFilter::default()).await?;
        let drafts = self.drafts.list(user_id, &DraftFilter::default()).await?;

        Ok(AccountExport {
            exported_at: Utc::now(),
            user: UserResponse::from(&user),
            personalities: personalities.iter().map(PersonalityResponse::from).collect(),
            folders: folders.iter().map(FolderResponse::from).collect(),
            notes: notes.iter().map(NoteResponse::from).collect(),
            drafts: drafts.iter().map(DraftResponse::from).collect(),
        })
    }

    pub async fn delete_account(&self, user_id: ObjectId, req: AccountDeleteRequest) -> Result<()> {
        let user = self.find_user(user_id).await?;
        if let Some(hash) = user.password_hash {
            let password = req
                .password
                .ok_or_else(|| AppError::ValidationError("Password is required".to_string()))?;
            if !self.check_password(password, Some(hash)).await? {
                return Err(AppError::AuthenticationError("Incorrect password".to_string()));
            }
        }

        let file_ids = self.users.delete_cascade(user_id).await?;
        tracing::info!(%user_id, files = file_ids.len(), "Account deleted");
        self.collector.sweep(&file_ids).await;
        Ok(())
    }
}
