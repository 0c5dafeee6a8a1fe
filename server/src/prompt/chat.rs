use axum::async_trait;
use derive_more::derive::Display;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{server_config::ModelConfig, HttpClient};

#[derive(Debug, Display)]
pub enum ModelError {
    #[display("model request timed out")]
    Timeout,
    #[display("model http {status}: {message}")]
    Http { status: u16, message: String },
    #[display("model api error: {_0}")]
    Api(String),
    #[display("model transport error: {_0}")]
    Transport(String),
    #[display("model returned no choices")]
    EmptyResponse,
}

impl std::error::Error for ModelError {}

impl From<reqwest::Error> for ModelError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ModelError::Timeout
        } else {
            ModelError::Transport(error.to_string())
        }
    }
}

/// A text-generation backend asked for JSON-only output.
/// Returns the raw completion text; callers parse and validate it.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete_json(&self, system: &str, prompt: &str) -> Result<String, ModelError>;
}

/// OpenAI-compatible chat completions client.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http_client: HttpClient,
    config: ModelConfig,
}

impl ChatClient {
    pub fn new(http_client: HttpClient, config: ModelConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }
}

#[async_trait]
impl TextModel for ChatClient {
    async fn complete_json(&self, system: &str, prompt: &str) -> Result<String, ModelError> {
        let resp = self
            .http_client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.timeout())
            .json(&json!(
              {
                "model": &self.config.id,
                "temperature": self.config.temperature,
                "max_tokens": self.config.max_tokens,
                "messages": [
                  { "role": "system", "content": system },
                  { "role": "user", "content": prompt }
                ],
                "response_format": { "type": "json_object" }
              }
            ))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.json::<serde_json::Value>().await?;

        let parsed = match serde_json::from_value::<ChatApiResponseOrError>(body.clone()) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(ModelError::Http {
                    status: status.as_u16(),
                    message: body.to_string(),
                })
            }
            Err(e) => return Err(ModelError::Api(format!("could not parse chat response: {e}"))),
        };

        let parsed = match parsed {
            ChatApiResponseOrError::Error(error) => {
                if status == StatusCode::TOO_MANY_REQUESTS {
                    tracing::warn!("Model rate limited: {}", error.error.message);
                }
                return Err(ModelError::Http {
                    status: status.as_u16(),
                    message: error.error.message,
                });
            }
            ChatApiResponseOrError::Response(parsed) => parsed,
        };

        if let Some(usage) = &parsed.usage {
            tracing::debug!("Model token usage: {}", usage.total_tokens);
        }

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(ModelError::EmptyResponse)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: i32,
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: Option<PromptUsage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiErrorDetail {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiError {
    pub error: ChatApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatApiResponseOrError {
    Response(ChatApiResponse),
    Error(ChatApiError),
}
