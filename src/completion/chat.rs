// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible chat completions client (Groq by default).

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::CompletionService;
use crate::errors::{BotError, BotResult};

pub const DEFAULT_API_BASE: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_CHAT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_API_KEY_ENV: &str = "GROQ_API_KEY";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Connection settings for [`ChatCompletionClient`].
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub api_base: String,
    pub model: String,
    /// The credential; `None` when the environment variable was unset.
    pub api_key: Option<String>,
    /// Name of the variable the credential was read from, for messages.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            api_key: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

pub struct ChatCompletionClient {
    settings: ChatSettings,
    endpoint: String,
    client: Client,
}

impl ChatCompletionClient {
    pub fn new(settings: ChatSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .context("failed to build chat completions HTTP client")?;
        let endpoint = format!("{}/chat/completions", settings.api_base.trim_end_matches('/'));
        Ok(Self {
            settings,
            endpoint,
            client,
        })
    }

    fn headers(&self) -> BotResult<HeaderMap> {
        let key = self.settings.api_key.as_deref().unwrap_or_default().trim();
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|_| {
                BotError::CompletionServiceUnavailable(format!(
                    "{} contains invalid characters",
                    self.settings.api_key_env
                ))
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

impl CompletionService for ChatCompletionClient {
    fn name(&self) -> &str {
        "chat"
    }

    fn complete(&self, prompt: &str) -> BotResult<String> {
        let body = ChatRequest {
            model: &self.settings.model,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .map_err(|e| BotError::CompletionServiceUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(BotError::CompletionServiceError(format!(
                "{} returned {}: {}",
                self.endpoint,
                status,
                text.trim()
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .map_err(|e| BotError::CompletionServiceError(format!("malformed response: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| BotError::CompletionServiceError("response has no choices".to_string()))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base() {
        let client = ChatCompletionClient::new(ChatSettings {
            api_base: "http://localhost:8080/v1/".to_string(),
            ..ChatSettings::default()
        })
        .unwrap();
        assert_eq!(client.endpoint, "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: DEFAULT_CHAT_MODEL,
            temperature: 0.0,
            max_tokens: None,
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], DEFAULT_CHAT_MODEL);
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_unreachable_endpoint_is_unavailable() {
        let client = ChatCompletionClient::new(ChatSettings {
            api_base: "http://127.0.0.1:9".to_string(),
            api_key: Some("k".to_string()),
            timeout_secs: 2,
            ..ChatSettings::default()
        })
        .unwrap();
        assert!(matches!(
            client.complete("hi"),
            Err(BotError::CompletionServiceUnavailable(_))
        ));
    }
}
