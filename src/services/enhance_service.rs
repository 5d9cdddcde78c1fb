use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;

use crate::config::DeepSeekConfig;
use crate::error::{AppError, Result};
use crate::models::Platform;

pub const TEMPERATURE: f32 = 0.7;

/// What an enhancement request asks the model to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enhancement {
    /// Fix spelling, grammar and layout without adding content.
    Format,
    /// Rewrite for a social network (linkedin, twitter, instagram).
    Social(Platform),
    /// Generate a portfolio, resume or biodata document from the notes.
    Document(Platform),
}

impl Enhancement {
    /// Accepts `enhanceType` = `format | social | portfolio | resume |
    /// biodata` (with `platform` for social), or a platform name directly.
    pub fn from_request(enhance_type: &str, platform: Option<&str>) -> Result<Self> {
        match enhance_type.trim().to_lowercase().as_str() {
            "format" => Ok(Enhancement::Format),
            "social" => {
                let platform: Platform = platform
                    .filter(|p| !p.trim().is_empty())
                    .ok_or_else(|| {
                        AppError::ValidationError(
                            "Platform is required for social enhancement".to_string(),
                        )
                    })?
                    .parse()?;
                if !platform.is_social() {
                    return Err(AppError::ValidationError(format!(
                        "{} is not a social platform",
                        platform.as_str()
                    )));
                }
                Ok(Enhancement::Social(platform))
            }
            other => {
                let platform: Platform = other.parse().map_err(|_| {
                    AppError::ValidationError(format!("Invalid enhancement type: {}", enhance_type))
                })?;
                Ok(if platform.is_social() {
                    Enhancement::Social(platform)
                } else {
                    Enhancement::Document(platform)
                })
            }
        }
    }

    /// Name recorded on the stored enhanced version.
    pub fn label(&self) -> &'static str {
        match self {
            Enhancement::Format => "format",
            Enhancement::Social(p) | Enhancement::Document(p) => p.as_str(),
        }
    }

    pub fn max_tokens(&self) -> u32 {
        match self {
            Enhancement::Format => 2000,
            Enhancement::Social(Platform::Twitter) => 150,
            Enhancement::Social(Platform::Instagram) => 500,
            Enhancement::Social(_) => 800,
            Enhancement::Document(_) => 1500,
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            Enhancement::Format => {
                "You are a meticulous copy editor. Correct spelling, grammar and punctuation \
                 and tidy the formatting of the user's note. Do not add new sentences, ideas \
                 or facts, and do not remove information. Keep the author's wording and \
                 language. Return only the corrected note."
            }
            Enhancement::Social(Platform::Twitter) => {
                "You write posts for Twitter/X. Turn the user's note into a single post of at \
                 most 280 characters with a clear hook and at most two relevant hashtags. \
                 Return only the post."
            }
            Enhancement::Social(Platform::Instagram) => {
                "You write Instagram captions. Turn the user's note into an engaging caption \
                 with short paragraphs, a few fitting emojis and a block of relevant hashtags \
                 at the end. Return only the caption."
            }
            Enhancement::Social(_) => {
                "You write LinkedIn posts. Turn the user's note into a professional post with \
                 a strong opening line, short readable paragraphs, a takeaway for the reader \
                 and three to five relevant hashtags. Return only the post."
            }
            Enhancement::Document(Platform::Resume) => {
                "You are a resume writer. Using only the information in the user's notes, \
                 write a concise resume with sections for summary, experience, education and \
                 skills. Omit sections the notes give no information for. Return plain text."
            }
            Enhancement::Document(Platform::Biodata) => {
                "You prepare biodata documents. Using only the information in the user's \
                 notes, write a structured biodata with personal details, education, \
                 occupation, family and interests as labelled fields. Leave out fields the \
                 notes do not cover. Return plain text."
            }
            Enhancement::Document(_) => {
                "You write personal portfolio pages. Using only the information in the user's \
                 notes, write a portfolio with an introduction, highlighted projects with \
                 outcomes, and skills. Return plain text with clear headings."
            }
        }
    }

    fn user_prompt(&self, content: &str) -> String {
        match self {
            Enhancement::Format => format!("Correct this note:\n\n{}", content),
            Enhancement::Social(p) => {
                format!("Write a {} post from this note:\n\n{}", p.as_str(), content)
            }
            Enhancement::Document(p) => {
                format!("Create a {} from these notes:\n\n{}", p.as_str(), content)
            }
        }
    }

    /// One system and one user message.
    pub fn messages(&self, content: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage {
                role: "system",
                content: self.system_prompt().to_string(),
            },
            ChatMessage {
                role: "user",
                content: self.user_prompt(content),
            },
        ]
    }

    pub fn request(&self, content: &str) -> CompletionRequest {
        CompletionRequest {
            messages: self.messages(content),
            max_tokens: self.max_tokens(),
            temperature: TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Chat-completion backend.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// OpenAI-style `chat/completions` endpoint of DeepSeek.
pub struct DeepSeekClient {
    http: Client,
    api_key: Option<String>,
    api_url: String,
    model: String,
}

impl DeepSeekClient {
    pub fn new(http: Client, config: &DeepSeekConfig) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl CompletionClient for DeepSeekClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::ConfigError("AI enhancement is not configured".to_string()))?;

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.model,
                "messages": request.messages,
                "max_tokens": request.max_tokens,
                "temperature": request.temperature,
            }))
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalServiceError(format!(
                "DeepSeek API error: status={}, body={}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("Failed to parse response: {}", e)))?;

        response_json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                AppError::ExternalServiceError("DeepSeek response had no content".to_string())
            })
    }
}

/// Runs enhancements against the configured completion backend.
pub struct EnhanceService {
    client: Arc<dyn CompletionClient>,
}

impl EnhanceService {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub async fn enhance(&self, enhancement: Enhancement, content: &str) -> Result<String> {
        if content.trim().is_empty() {
            return Err(AppError::ValidationError("Content is required".to_string()));
        }
        tracing::debug!(kind = enhancement.label(), "Requesting enhancement");
        self.client.complete(&enhancement.request(content)).await
    }
}
