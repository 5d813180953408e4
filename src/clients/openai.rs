use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::{check_status, ClientError, LlmAssessor};
use crate::config::OpenAiConfig;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            api_key: config.api_key.clone(),
        })
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    fn request_body(&self, prompt: &str) -> Value {
        let messages = [Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        }];
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

/// Extract `choices[0].message.content`; blank content is an error.
pub fn extract_content(json: &Value) -> Result<String, ClientError> {
    json["choices"]
        .get(0)
        .and_then(|c| c["message"]["content"].as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ClientError::Decode("no message content in LLM response".into()))
}

#[async_trait]
impl LlmAssessor for OpenAiClient {
    async fn generate_response(&self, prompt: &str) -> Result<String, ClientError> {
        let mut req = self.client.post(self.endpoint()).json(&self.request_body(prompt));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = check_status("openai", req.send().await?).await?;
        let json: Value = resp.json().await?;
        extract_content(&json)
    }
}
