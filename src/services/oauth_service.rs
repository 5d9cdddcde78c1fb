use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header, jwk::JwkSet};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;

use crate::config::{GoogleConfig, LinkedInConfig};
use crate::error::{AppError, Result};

pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];
const JWKS_TTL: Duration = Duration::from_secs(60 * 60);

pub const LINKEDIN_TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
pub const LINKEDIN_USERINFO_URL: &str = "https://api.linkedin.com/v2/userinfo";
pub const LINKEDIN_UGC_URL: &str = "https://api.linkedin.com/v2/ugcPosts";

/// Identity asserted by a verified Google ID token.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

#[async_trait]
pub trait GoogleVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<GoogleProfile>;
}

/// Verifies Google ID tokens against Google's published signing keys.
pub struct GoogleIdTokenVerifier {
    http: Client,
    client_id: Option<String>,
    jwks: RwLock<Option<(Instant, JwkSet)>>,
}

impl GoogleIdTokenVerifier {
    pub fn new(http: Client, config: &GoogleConfig) -> Self {
        Self {
            http,
            client_id: config.client_id.clone(),
            jwks: RwLock::new(None),
        }
    }

    async fn signing_keys(&self) -> Result<JwkSet> {
        if let Some((fetched, keys)) = self.jwks.read().await.as_ref() {
            if fetched.elapsed() < JWKS_TTL {
                return Ok(keys.clone());
            }
        }

        let keys: JwkSet = self
            .http
            .get(GOOGLE_JWKS_URL)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::ExternalServiceError(format!("Failed to fetch Google keys: {}", e)))?
            .json()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Failed to parse Google keys: {}", e)))?;

        *self.jwks.write().await = Some((Instant::now(), keys.clone()));
        Ok(keys)
    }
}

fn google_failed() -> AppError {
    AppError::AuthenticationError("Google authentication failed".to_string())
}

#[async_trait]
impl GoogleVerifier for GoogleIdTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<GoogleProfile> {
        let client_id = self
            .client_id
            .as_deref()
            .ok_or_else(|| AppError::ConfigError("Google sign-in is not configured".to_string()))?;

        let header = decode_header(credential).map_err(|_| google_failed())?;
        let kid = header.kid.ok_or_else(google_failed)?;
        let keys = self.signing_keys().await?;
        let jwk = keys.find(&kid).ok_or_else(google_failed)?;
        let key = DecodingKey::from_jwk(jwk).map_err(|_| google_failed())?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[client_id]);
        validation.set_issuer(&GOOGLE_ISSUERS);

        let profile = decode::<GoogleProfile>(credential, &key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Google ID token rejected");
                google_failed()
            })?
            .claims;
        if !profile.email_verified {
            return Err(google_failed());
        }
        Ok(profile)
    }
}

/// OpenID userinfo of a LinkedIn member.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkedInProfile {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    Posted { post_id: String },
    /// LinkedIn answered 401; the stored token is stale.
    TokenRejected,
}

#[async_trait]
pub trait LinkedInClient: Send + Sync {
    /// Trades an authorization code for an access token.
    async fn exchange_code(&self, code: &str, redirect_uri: Option<&str>) -> Result<String>;
    async fn profile(&self, access_token: &str) -> Result<LinkedInProfile>;
    async fn share(&self, access_token: &str, member_id: &str, text: &str) -> Result<ShareOutcome>;
}

pub struct LinkedInHttpClient {
    http: Client,
    config: LinkedInConfig,
}

impl LinkedInHttpClient {
    pub fn new(http: Client, config: &LinkedInConfig) -> Self {
        Self {
            http,
            config: config.clone(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[async_trait]
impl LinkedInClient for LinkedInHttpClient {
    async fn exchange_code(&self, code: &str, redirect_uri: Option<&str>) -> Result<String> {
        let (Some(client_id), Some(client_secret)) =
            (&self.config.client_id, &self.config.client_secret)
        else {
            return Err(AppError::ConfigError(
                "LinkedIn sign-in is not configured".to_string(),
            ));
        };
        let redirect_uri = redirect_uri
            .or(self.config.redirect_uri.as_deref())
            .ok_or_else(|| AppError::ValidationError("Redirect URI is required".to_string()))?;

        let response = self
            .http
            .post(LINKEDIN_TOKEN_URL)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::debug!(%status, body = %error_text, "LinkedIn code exchange rejected");
            return Err(AppError::AuthenticationError(
                "LinkedIn authentication failed".to_string(),
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Failed to parse response: {}", e)))?;
        Ok(token.access_token)
    }

    async fn profile(&self, access_token: &str) -> Result<LinkedInProfile> {
        let response = self
            .http
            .get(LINKEDIN_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::AuthenticationError(
                "LinkedIn authentication failed".to_string(),
            ));
        }
        response
            .json()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Failed to parse response: {}", e)))
    }

    async fn share(&self, access_token: &str, member_id: &str, text: &str) -> Result<ShareOutcome> {
        let response = self
            .http
            .post(LINKEDIN_UGC_URL)
            .bearer_auth(access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&json!({
                "author": format!("urn:li:person:{}", member_id),
                "lifecycleState": "PUBLISHED",
                "specificContent": {
                    "com.linkedin.ugc.ShareContent": {
                        "shareCommentary": { "text": text },
                        "shareMediaCategory": "NONE"
                    }
                },
                "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" }
            }))
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(ShareOutcome::TokenRejected);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalServiceError(format!(
                "LinkedIn API error: status={}, body={}",
                status, error_text
            )));
        }

        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let post_id = match header_id {
            Some(id) => id,
            None => {
                let body: serde_json::Value = response.json().await.unwrap_or_default();
                body["id"].as_str().unwrap_or_default().to_string()
            }
        };
        Ok(ShareOutcome::Posted { post_id })
    }
}
