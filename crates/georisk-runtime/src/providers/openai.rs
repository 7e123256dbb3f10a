//! OpenAI chat-completions provider.

use super::{
    factory::ProviderFactory, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider,
    ProviderError, TokenUsage,
};
use crate::secrets::{ApiCredential, CredentialSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable name for the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI provider.
pub struct OpenAiProvider {
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(credential: ApiCredential) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        Ok(Self {
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        })
    }

    /// Create from a raw key.
    pub fn with_key(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(ApiCredential::new(
            api_key,
            CredentialSource::Programmatic,
            "OpenAI API key",
        ))
    }

    /// Create from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_env(OPENAI_API_KEY_ENV, "OpenAI API key")?;
        Self::new(credential)
    }

    /// Create from JSON configuration, falling back to `OPENAI_API_KEY`.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            OPENAI_API_KEY_ENV,
            "OpenAI API key",
        )?;

        let provider = Self::new(credential)?;
        Ok(match config["base_url"].as_str() {
            Some(url) => provider.with_base_url(url),
            None => provider,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl ChatResponse {
    fn into_completion(self) -> Result<CompletionResponse, ProviderError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("response has no choices".to_string()))?;

        let usage = self
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            usage,
            model: self.model,
            stop_reason: choice.finish_reason,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatRequest {
            model: &config.model,
            messages: &messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::AuthError);
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let message = match response.json::<ApiErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        body.into_completion()
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Factory for OpenAI providers.
///
/// ```json
/// {
///   "api_key": "sk-...",                     // optional, falls back to OPENAI_API_KEY
///   "base_url": "https://api.openai.com/v1"  // optional
/// }
/// ```
pub struct OpenAiProviderFactory;

impl ProviderFactory for OpenAiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.validate_config(config)?;
        Ok(Arc::new(OpenAiProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", OPENAI_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "OpenAI API key required: set 'api_key' in config or {} env",
                OPENAI_API_KEY_ENV
            )));
        }

        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({
            "model": "gpt-4",
            "temperature": 0.3,
            "max_tokens": 500
        })
    }

    fn description(&self) -> &'static str {
        "OpenAI chat completions"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let request = ChatRequest {
            model: "gpt-4",
            messages: &messages,
            temperature: 0.3,
            max_tokens: 500,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 500);
    }

    #[test]
    fn test_response_parsing() {
        let body: ChatResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-4-0613",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "{\"score\": 4}" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150 }
        }))
        .unwrap();

        let completion = body.into_completion().unwrap();
        assert_eq!(completion.content, "{\"score\": 4}");
        assert_eq!(completion.usage.total(), 150);
        assert_eq!(completion.model, "gpt-4-0613");
        assert_eq!(completion.stop_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_empty_choices_is_parse_error() {
        let body: ChatResponse =
            serde_json::from_value(serde_json::json!({ "model": "gpt-4", "choices": [] }))
                .unwrap();
        assert!(matches!(
            body.into_completion(),
            Err(ProviderError::ParseError(_))
        ));
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret = "sk-openai-super-secret";
        let provider = OpenAiProvider::with_key(secret).unwrap();

        let debug = format!("{:?}", provider);
        assert!(!debug.contains(secret), "API key was exposed in Debug output!");
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_health_check_requires_key() {
        assert!(OpenAiProvider::with_key("sk-1").unwrap().health_check().await);
        assert!(!OpenAiProvider::with_key("").unwrap().health_check().await);
    }

    #[test]
    fn test_from_config() {
        let config = serde_json::json!({
            "api_key": "config-key",
            "base_url": "https://proxy.example.com/v1/"
        });
        let provider = OpenAiProvider::from_config(&config).unwrap();
        assert_eq!(provider.base_url, "https://proxy.example.com/v1");
        assert_eq!(provider.credential.source(), CredentialSource::Config);
    }

    #[test]
    fn test_factory_validation() {
        let factory = OpenAiProviderFactory;
        assert_eq!(factory.provider_type(), "openai");
        assert_eq!(factory.default_config()["model"], "gpt-4");

        let bad_url = serde_json::json!({ "api_key": "k", "base_url": "ftp://x" });
        assert!(factory.validate_config(&bad_url).is_err());

        let ok = serde_json::json!({ "api_key": "k" });
        assert!(factory.create(&ok).is_ok());
    }
}
