//! Model Provider Abstraction
//!
//! Unified interface over LLM backends (OpenAI-compatible APIs including Ollama,
//! Anthropic Messages, Gemini). Clients are thin: they translate a message list into the
//! provider's request shape and map failures onto the shared error taxonomy so the retry
//! controller can classify them.

use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub mod anthropic;
pub mod gemini;
pub mod http;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAIClient;

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Completion options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Completion response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
}

/// Model provider client trait
#[async_trait]
pub trait ModelProviderClient: Send + Sync {
    /// Generate a completion from a list of messages
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        options: CompletionOptions,
    ) -> Result<CompletionResponse, ApiError>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

pub type SharedProviderClient = Arc<dyn ModelProviderClient>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    OpenAI,
    Anthropic,
    Gemini,
    Ollama,
}

impl ProviderType {
    /// Environment variable consulted when no api_key is configured.
    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAI => Some("OPENAI_API_KEY"),
            ProviderType::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderType::Gemini => Some("GEMINI_API_KEY"),
            ProviderType::Ollama => None,
        }
    }

    pub fn requires_api_key(self) -> bool {
        self.api_key_env().is_some()
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderType::OpenAI => "openai",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Gemini => "gemini",
            ProviderType::Ollama => "ollama",
        };
        f.write_str(name)
    }
}

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub default_options: CompletionOptions,
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("Endpoint must be an http(s) URL: {}", endpoint));
            }
        }
        if let Some(temperature) = self.default_options.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(format!("Temperature must be between 0.0 and 2.0, got {}", temperature));
            }
        }
        Ok(())
    }

    /// Build a client, overriding the configured model when `model` is given.
    pub fn build_client(&self, model: Option<&str>) -> Result<SharedProviderClient, ApiError> {
        let model = model.unwrap_or(&self.model).to_string();
        let api_key = || {
            self.api_key.clone().ok_or_else(|| {
                ApiError::ConfigError(format!(
                    "Provider type '{}' requires an api_key (or {})",
                    self.provider_type,
                    self.provider_type.api_key_env().unwrap_or("an api key")
                ))
            })
        };
        let client: SharedProviderClient = match self.provider_type {
            ProviderType::OpenAI => Arc::new(OpenAIClient::new(
                "openai",
                model,
                Some(api_key()?),
                self.endpoint.clone(),
            )?),
            ProviderType::Ollama => Arc::new(OpenAIClient::new(
                "ollama",
                model,
                self.api_key.clone(),
                Some(
                    self.endpoint
                        .clone()
                        .unwrap_or_else(|| openai::OLLAMA_BASE_URL.to_string()),
                ),
            )?),
            ProviderType::Anthropic => Arc::new(AnthropicClient::new(
                model,
                api_key()?,
                self.endpoint.clone(),
            )?),
            ProviderType::Gemini => {
                Arc::new(GeminiClient::new(model, api_key()?, self.endpoint.clone())?)
            }
        };
        Ok(client)
    }
}

/// Split a leading system message from the conversation, for APIs that take it separately.
pub(crate) fn split_system(messages: Vec<ChatMessage>) -> (Option<String>, Vec<ChatMessage>) {
    let mut system = Vec::new();
    let mut rest = Vec::new();
    for message in messages {
        if message.role == MessageRole::System {
            system.push(message.content);
        } else {
            rest.push(message);
        }
    }
    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, rest)
}
