use std::sync::Arc;

use mongodb::bson::oid::ObjectId;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Platform, required_field};
use crate::repositories::UserRepository;
use crate::services::oauth_service::{LinkedInClient, ShareOutcome};

pub const TWITTER_INTENT_URL: &str = "https://twitter.com/intent/tweet";
pub const INSTAGRAM_URL: &str = "https://www.instagram.com/";
pub const LINKEDIN_COMPOSE_URL: &str = "https://www.linkedin.com/feed/";

#[derive(Deserialize, Debug, Default)]
pub struct SocialPostRequest {
    pub platform: Option<String>,
    pub content: Option<String>,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SocialPostResponse {
    pub posted: bool,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl SocialPostResponse {
    fn share(platform: Platform, share_url: String) -> Self {
        Self {
            posted: false,
            platform,
            share_url: Some(share_url),
            post_id: None,
            content: None,
        }
    }
}

fn url_with_params(base: &str, params: &[(&str, &str)]) -> Result<String> {
    Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|e| AppError::Internal(format!("Failed to build share URL: {}", e)))
}

pub fn twitter_intent_url(text: &str) -> Result<String> {
    url_with_params(TWITTER_INTENT_URL, &[("text", text)])
}

pub fn linkedin_compose_url(text: &str) -> Result<String> {
    url_with_params(
        LINKEDIN_COMPOSE_URL,
        &[("shareActive", "true"), ("text", text)],
    )
}

/// Publishes to LinkedIn when possible, otherwise hands back a share link.
pub struct SocialService {
    users: Arc<dyn UserRepository>,
    linkedin: Arc<dyn LinkedInClient>,
}

impl SocialService {
    pub fn new(users: Arc<dyn UserRepository>, linkedin: Arc<dyn LinkedInClient>) -> Self {
        Self { users, linkedin }
    }

    pub async fn post(&self, user_id: ObjectId, req: SocialPostRequest) -> Result<SocialPostResponse> {
        let (Some(platform), Some(content)) =
            (required_field(req.platform), required_field(req.content))
        else {
            return Err(AppError::ValidationError(
                "Platform and content are required".to_string(),
            ));
        };
        let platform: Platform = platform.parse()?;

        match platform {
            Platform::Twitter => Ok(SocialPostResponse::share(
                platform,
                twitter_intent_url(&content)?,
            )),
            Platform::Instagram => Ok(SocialPostResponse {
                content: Some(content),
                ..SocialPostResponse::share(platform, INSTAGRAM_URL.to_string())
            }),
            Platform::Linkedin => self.post_linkedin(user_id, content).await,
            other => Err(AppError::ValidationError(format!(
                "Posting to {} is not supported",
                other.as_str()
            ))),
        }
    }

    async fn post_linkedin(&self, user_id: ObjectId, content: String) -> Result<SocialPostResponse> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if let (Some(token), Some(member_id)) = (&user.linkedin_access_token, &user.linkedin_id) {
            match self.linkedin.share(token, member_id, &content).await? {
                ShareOutcome::Posted { post_id } => {
                    tracing::info!(%user_id, %post_id, "Shared post on LinkedIn");
                    return Ok(SocialPostResponse {
                        posted: true,
                        platform: Platform::Linkedin,
                        share_url: None,
                        post_id: Some(post_id),
                        content: None,
                    });
                }
                ShareOutcome::TokenRejected => {
                    tracing::info!(%user_id, "LinkedIn token rejected, falling back to compose URL");
                    self.users.clear_linkedin_token(user_id, token).await?;
                }
            }
        }

        Ok(SocialPostResponse::share(
            Platform::Linkedin,
            linkedin_compose_url(&content)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{IdentityLink, MemoryStore, Personality, User};
    use crate::services::oauth_service::LinkedInProfile;
    use async_trait::async_trait;

    struct StubLinkedIn {
        outcome: ShareOutcome,
    }

    #[async_trait]
    impl LinkedInClient for StubLinkedIn {
        async fn exchange_code(&self, _code: &str, _redirect_uri: Option<&str>) -> Result<String> {
            unreachable!()
        }
        async fn profile(&self, _access_token: &str) -> Result<LinkedInProfile> {
            unreachable!()
        }
        async fn share(&self, _token: &str, _member: &str, _text: &str) -> Result<ShareOutcome> {
            Ok(self.outcome.clone())
        }
    }

    /// Changes the account while the share request is in flight, then
    /// rejects the token.
    struct RacingLinkedIn {
        store: Arc<MemoryStore>,
        user_id: ObjectId,
        relink: bool,
    }

    #[async_trait]
    impl LinkedInClient for RacingLinkedIn {
        async fn exchange_code(&self, _code: &str, _redirect_uri: Option<&str>) -> Result<String> {
            unreachable!()
        }
        async fn profile(&self, _access_token: &str) -> Result<LinkedInProfile> {
            unreachable!()
        }
        async fn share(&self, _token: &str, _member: &str, _text: &str) -> Result<ShareOutcome> {
            self.store.set_password_hash(self.user_id, "NEW-HASH").await?;
            if self.relink {
                let link = IdentityLink {
                    linkedin_access_token: Some("fresh-token".to_string()),
                    ..IdentityLink::default()
                };
                self.store.link_identity(self.user_id, &link).await?;
            }
            Ok(ShareOutcome::TokenRejected)
        }
    }

    async fn linked_user(store: &MemoryStore) -> User {
        let mut user = User::new("ada".to_string(), "ada@example.com".to_string());
        user.linkedin_id = Some("li-123".to_string());
        user.linkedin_access_token = Some("token".to_string());
        store
            .create_with_personality(&user, &Personality::default_for(user.id))
            .await
            .unwrap();
        user
    }

    fn request(platform: &str, content: &str) -> SocialPostRequest {
        SocialPostRequest {
            platform: Some(platform.to_string()),
            content: Some(content.to_string()),
        }
    }

    #[test]
    fn share_urls_encode_text() {
        assert_eq!(
            twitter_intent_url("hi & bye").unwrap(),
            "https://twitter.com/intent/tweet?text=hi+%26+bye"
        );
        assert_eq!(
            linkedin_compose_url("hello").unwrap(),
            "https://www.linkedin.com/feed/?shareActive=true&text=hello"
        );
    }

    #[tokio::test]
    async fn twitter_and_instagram_return_share_links() {
        let store = Arc::new(MemoryStore::new());
        let service = SocialService::new(
            store,
            Arc::new(StubLinkedIn {
                outcome: ShareOutcome::TokenRejected,
            }),
        );

        let tweet = service.post(ObjectId::new(), request("twitter", "hi")).await.unwrap();
        assert!(!tweet.posted);
        assert_eq!(tweet.share_url.as_deref(), Some("https://twitter.com/intent/tweet?text=hi"));

        let insta = service.post(ObjectId::new(), request("instagram", "pic")).await.unwrap();
        assert_eq!(insta.share_url.as_deref(), Some(INSTAGRAM_URL));
        assert_eq!(insta.content.as_deref(), Some("pic"));

        assert!(service.post(ObjectId::new(), request("resume", "x")).await.is_err());
    }

    #[tokio::test]
    async fn linkedin_posts_with_stored_token() {
        let store = Arc::new(MemoryStore::new());
        let user = linked_user(&store).await;
        let service = SocialService::new(
            store,
            Arc::new(StubLinkedIn {
                outcome: ShareOutcome::Posted {
                    post_id: "urn:li:share:1".to_string(),
                },
            }),
        );

        let result = service.post(user.id, request("linkedin", "news")).await.unwrap();
        assert!(result.posted);
        assert_eq!(result.post_id.as_deref(), Some("urn:li:share:1"));
    }

    #[tokio::test]
    async fn rejected_linkedin_token_falls_back_and_is_forgotten() {
        let store = Arc::new(MemoryStore::new());
        let user = linked_user(&store).await;
        let service = SocialService::new(
            store.clone(),
            Arc::new(StubLinkedIn {
                outcome: ShareOutcome::TokenRejected,
            }),
        );

        let result = service.post(user.id, request("linkedin", "news")).await.unwrap();
        assert!(!result.posted);
        assert!(result.share_url.unwrap().contains("shareActive=true"));

        let reloaded = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(reloaded.linkedin_access_token.is_none());
    }

    #[tokio::test]
    async fn token_fallback_keeps_concurrent_account_changes() {
        let store = Arc::new(MemoryStore::new());
        let user = linked_user(&store).await;
        let service = SocialService::new(
            store.clone(),
            Arc::new(RacingLinkedIn {
                store: store.clone(),
                user_id: user.id,
                relink: false,
            }),
        );

        let result = service.post(user.id, request("linkedin", "news")).await.unwrap();
        assert!(!result.posted);

        let reloaded = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.password_hash.as_deref(), Some("NEW-HASH"));
        assert!(reloaded.linkedin_access_token.is_none());
        assert_eq!(reloaded.linkedin_id.as_deref(), Some("li-123"));
    }

    #[tokio::test]
    async fn token_fallback_keeps_a_newer_token() {
        let store = Arc::new(MemoryStore::new());
        let user = linked_user(&store).await;
        let service = SocialService::new(
            store.clone(),
            Arc::new(RacingLinkedIn {
                store: store.clone(),
                user_id: user.id,
                relink: true,
            }),
        );

        service.post(user.id, request("linkedin", "news")).await.unwrap();

        let reloaded = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.linkedin_access_token.as_deref(), Some("fresh-token"));
        assert_eq!(reloaded.password_hash.as_deref(), Some("NEW-HASH"));
    }
}
