//! Provider factories and the registry that selects one by name.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let provider = registry.create("openai", &serde_json::json!({ "base_url": url }))?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{LlmProvider, ProviderError};

/// Creates providers of one type from JSON configuration.
pub trait ProviderFactory: Send + Sync {
    /// Unique identifier for this provider type (e.g., "openai").
    fn provider_type(&self) -> &'static str;

    /// Create a provider instance from provider-specific configuration.
    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Validate configuration without creating a provider.
    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError>;

    /// Defaults for optional fields.
    fn default_config(&self) -> JsonValue {
        serde_json::json!({})
    }

    fn description(&self) -> &'static str {
        "AI provider"
    }
}

/// Registry of available provider factories.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any factory of the same type.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
    }

    pub fn create(
        &self,
        provider_type: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.factory(provider_type)?.create(config)
    }

    pub fn validate(&self, provider_type: &str, config: &JsonValue) -> Result<(), ProviderError> {
        self.factory(provider_type)?.validate_config(config)
    }

    fn factory(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(provider_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider type: '{}'. Available: {:?}",
                provider_type,
                self.available_types()
            ))
        })
    }

    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_provider(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    pub fn default_config(&self, provider_type: &str) -> Option<JsonValue> {
        self.factories
            .get(provider_type)
            .map(|f| f.default_config())
    }

    /// A registry with all built-in providers registered.
    #[cfg(feature = "openai")]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::OpenAiProviderFactory));
        registry
    }

    /// A registry with all built-in providers registered.
    #[cfg(not(feature = "openai"))]
    pub fn with_defaults() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatMessage, CompletionConfig, CompletionResponse, TokenUsage};
    use async_trait::async_trait;

    struct EchoProvider {
        name: String,
    }

    #[async_trait]
    impl LlmProvider for EchoProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                content: messages.last().map(|m| m.content.clone()).unwrap_or_default(),
                usage: TokenUsage::default(),
                model: config.model.clone(),
                stop_reason: Some("stop".to_string()),
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    struct EchoProviderFactory;

    impl ProviderFactory for EchoProviderFactory {
        fn provider_type(&self) -> &'static str {
            "echo"
        }

        fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
            self.validate_config(config)?;
            let name = config["name"].as_str().unwrap_or("echo").to_string();
            Ok(Arc::new(EchoProvider { name }))
        }

        fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
            if config.get("name").is_some_and(|n| !n.is_string()) {
                return Err(ProviderError::NotConfigured(
                    "name must be a string".to_string(),
                ));
            }
            Ok(())
        }
    }

    #[test]
    fn test_registry_register_and_create() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(EchoProviderFactory));

        assert!(registry.has_provider("echo"));
        assert!(!registry.has_provider("unknown"));

        let provider = registry
            .create("echo", &serde_json::json!({ "name": "analyst" }))
            .unwrap();
        assert_eq!(provider.name(), "analyst");
    }

    #[tokio::test]
    async fn test_created_provider_completes() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(EchoProviderFactory));

        let provider = registry.create("echo", &serde_json::json!({})).unwrap();
        let response = provider
            .complete(vec![ChatMessage::user("ping")], &CompletionConfig::default())
            .await
            .unwrap();
        assert_eq!(response.content, "ping");
        assert_eq!(response.model, "gpt-4");
    }

    #[test]
    fn test_registry_unknown_provider() {
        let registry = ProviderRegistry::new();

        match registry.create("unknown", &serde_json::json!({})) {
            Err(ProviderError::NotConfigured(msg)) => {
                assert!(msg.contains("Unknown provider type"));
            }
            _ => panic!("Expected NotConfigured error"),
        }
    }

    #[test]
    fn test_registry_validate() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(EchoProviderFactory));

        assert!(registry.validate("echo", &serde_json::json!({})).is_ok());
        assert!(registry
            .validate("echo", &serde_json::json!({ "name": 3 }))
            .is_err());
        assert!(registry.validate("unknown", &serde_json::json!({})).is_err());
        assert_eq!(registry.available_types(), vec!["echo"]);
    }
}
