use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::ChatError;
use super::session::{ChatTurn, Role};

/// A hosted generative model that continues a conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, turns: &[ChatTurn]) -> Result<String, ChatError>;
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    config: ModelConfig,
}

impl GeminiClient {
    pub fn new(config: ModelConfig) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn generate(&self, turns: &[ChatTurn]) -> Result<String, ChatError> {
        debug!(model = %self.config.model, turns = turns.len(), "requesting completion");

        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&request_body(turns))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response.json().await?;
        reply_text(&value)
    }
}

fn request_body(turns: &[ChatTurn]) -> Value {
    let contents: Vec<Value> = turns
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Model => "model",
            };
            json!({ "role": role, "parts": [{ "text": turn.text }] })
        })
        .collect();
    json!({ "contents": contents })
}

fn reply_text(response: &Value) -> Result<String, ChatError> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or(ChatError::EmptyReply)?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    if text.trim().is_empty() {
        Err(ChatError::EmptyReply)
    } else {
        Ok(text)
    }
}
