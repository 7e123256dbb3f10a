//! AI provider abstractions.
//!
//! The scorer talks to a model only through [`LlmProvider`]. The OpenAI
//! chat-completions implementation is behind the `openai` feature; tests use
//! scripted providers.
//!
//! ## Security
//!
//! Providers hold their keys as [`ApiCredential`](crate::secrets::ApiCredential)
//! and expose them only when setting request headers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::secrets::CredentialError;

mod factory;

#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderRegistry};

#[cfg(feature = "openai")]
pub use openai::{OpenAiProvider, OpenAiProviderFactory, OPENAI_API_KEY_ENV};

/// Errors from AI providers.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether the same request may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::HttpError(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_) => true,
            ProviderError::ApiError { status, .. } => *status >= 500,
            ProviderError::ParseError(_)
            | ProviderError::AuthError
            | ProviderError::NotConfigured(_) => false,
        }
    }

    /// Wait requested by the API, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<CredentialError> for ProviderError {
    fn from(err: CredentialError) -> Self {
        ProviderError::NotConfigured(err.to_string())
    }
}

/// Configuration for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            max_tokens: 500,
            temperature: 0.3,
            timeout: Duration::from_secs(60),
        }
    }
}

/// A chat message for completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user", or "assistant"
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Response from a completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,

    /// Model that served the request
    pub model: String,

    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Provider abstraction so the scoring backend can be swapped.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Check if provider is usable.
    async fn health_check(&self) -> bool;

    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Estimate tokens for a prompt.
    fn estimate_tokens(&self, text: &str) -> u32 {
        // ~4 chars per token
        (text.len() / 4) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_creation() {
        let system = ChatMessage::system("You are a geopolitical risk analyst.");
        assert_eq!(system.role, "system");

        let user = ChatMessage::user("Assess Germany.");
        assert_eq!(user.role, "user");

        let assistant = ChatMessage::assistant("{\"score\": 3}");
        assert_eq!(assistant.role, "assistant");
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 50,
        };
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_completion_defaults() {
        let config = CompletionConfig::default();
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.temperature, 0.3);
        assert_eq!(config.max_tokens, 500);
    }

    #[test]
    fn test_transient_errors() {
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ProviderError::RateLimited { retry_after: None }.is_transient());
        assert!(ProviderError::ApiError {
            status: 503,
            message: "overloaded".to_string()
        }
        .is_transient());
        assert!(!ProviderError::ApiError {
            status: 400,
            message: "bad request".to_string()
        }
        .is_transient());
        assert!(!ProviderError::AuthError.is_transient());
    }

    #[test]
    fn test_credential_error_converts() {
        let err: ProviderError = CredentialError::NotLoaded("openai_api_key".to_string()).into();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
