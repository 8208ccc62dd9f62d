//! Content generation: hashtags and an image URL for a piece of post text.
//!
//! The meme service is an external HTTP collaborator. It takes
//! `{"tweet": <text>}` and answers `{"hashtags": [...], "url": "..."}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedContent {
    pub hashtags: Vec<String>,
    pub image_url: String,
}

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("content service request failed: {0}")]
    Transport(String),
    #[error("content service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed content service response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, text: &str) -> Result<GeneratedContent, GenerationError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    tweet: &'a str,
}

/// Both fields are optional on the wire so a missing one is reported, not a parse panic
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    hashtags: Option<Vec<String>>,
    url: Option<String>,
}

impl GenerateResponse {
    fn into_content(self) -> Result<GeneratedContent, GenerationError> {
        let hashtags = self
            .hashtags
            .ok_or_else(|| GenerationError::Malformed("missing `hashtags`".to_string()))?;
        let image_url = self
            .url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| GenerationError::Malformed("missing `url`".to_string()))?;

        Ok(GeneratedContent { hashtags, image_url })
    }
}

/// HTTP client for the meme generation endpoint
pub struct MemeApiGenerator {
    client: reqwest::Client,
    endpoint: String,
}

impl MemeApiGenerator {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ContentGenerator for MemeApiGenerator {
    async fn generate(&self, text: &str) -> Result<GeneratedContent, GenerationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&GenerateRequest { tweet: text })
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: if body.len() > 200 {
                    format!("{}...", body.chars().take(200).collect::<String>())
                } else {
                    body
                },
            });
        }

        parse_response(&body)
    }
}

fn parse_response(body: &str) -> Result<GeneratedContent, GenerationError> {
    let data: GenerateResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed(e.to_string()))?;
    data.into_content()
}
