//! Runtime configuration.
//!
//! Every field has a default, so an empty document is a valid config.
//! Durations are written in human form (`"30s"`, `"1500ms"`, `"1h"`).
//!
//! ```yaml
//! max_in_flight: 8
//! sources:
//!   timeout: 15s
//!   rate_limits:
//!     serpapi: { capacity: 1, refill_every: 2s }
//! scorer:
//!   model: gpt-4o
//!   retry: { max_retries: 3 }
//! budget:
//!   global_max_tokens: 250000
//! ```

use georisk_core::{EvidenceLimits, DEFAULT_DESCRIPTION_CHARS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::resilience::{BudgetConfig, CircuitBreakerConfig, RateLimitConfig, RetryPolicy};
use crate::scorer::ScorerConfig;

/// Errors from loading runtime configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of pairs in flight at once
    pub max_in_flight: usize,

    /// Bounds applied to evidence bundles
    pub evidence: EvidenceLimits,

    /// Source adapter settings
    pub sources: SourceSettings,

    /// Scoring settings
    pub scorer: ScorerConfig,

    /// Per-source circuit breaker
    pub circuit_breaker: CircuitBreakerConfig,

    /// AI token budget
    pub budget: BudgetConfig,

    /// Source result cache
    pub cache: CacheConfig,

    /// Cap on the report description column
    pub description_chars: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            evidence: EvidenceLimits::default(),
            sources: SourceSettings::default(),
            scorer: ScorerConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            budget: BudgetConfig::default(),
            cache: CacheConfig::default(),
            description_chars: DEFAULT_DESCRIPTION_CHARS,
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a YAML config.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Reject values that would stall or degenerate a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        if self.evidence.max_items_per_source == 0 {
            return Err(ConfigError::Invalid(
                "evidence.max_items_per_source must be at least 1".to_string(),
            ));
        }
        if self.scorer.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "scorer.max_tokens must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.scorer.temperature) {
            return Err(ConfigError::Invalid(format!(
                "scorer.temperature {} is outside 0.0-2.0",
                self.scorer.temperature
            )));
        }

        let limits = std::iter::once(("default", &self.sources.rate_limit)).chain(
            self.sources
                .rate_limits
                .iter()
                .map(|(id, limit)| (id.as_str(), limit)),
        );
        for (id, limit) in limits {
            if limit.capacity == 0 {
                return Err(ConfigError::Invalid(format!(
                    "rate limit capacity for '{}' must be at least 1",
                    id
                )));
            }
        }

        Ok(())
    }
}

/// Settings shared by all source adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Results requested from search providers
    pub max_results: usize,

    /// HTTP timeout per request
    #[serde(with = "duration_str")]
    pub timeout: Duration,

    /// Retry policy for transient failures
    pub retry: RetryPolicy,

    /// Rate limit applied to sources without an override
    pub rate_limit: RateLimitConfig,

    /// Per-source rate limit overrides, keyed by source id
    pub rate_limits: BTreeMap<String, RateLimitConfig>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            max_results: 5,
            timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            rate_limits: BTreeMap::new(),
        }
    }
}

impl SourceSettings {
    /// Rate limit for a source, falling back to the shared default.
    pub fn rate_limit_for(&self, source_id: &str) -> RateLimitConfig {
        self.rate_limits
            .get(source_id)
            .copied()
            .unwrap_or(self.rate_limit)
    }
}

/// Serde adapter for human-readable durations.
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RuntimeConfig::from_yaml("").unwrap();
        assert_eq!(config.max_in_flight, 4);
        assert_eq!(config.scorer.model, "gpt-4");
        assert_eq!(config.scorer.max_tokens, 500);
        assert_eq!(config.evidence.max_items_per_source, 3);
        assert_eq!(config.description_chars, 500);
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
max_in_flight: 8
sources:
  timeout: 1500ms
  rate_limits:
    serpapi: { capacity: 1, refill_every: 2s }
scorer:
  retry:
    max_retries: 3
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.max_in_flight, 8);
        assert_eq!(config.sources.timeout, Duration::from_millis(1500));
        assert_eq!(config.scorer.retry.max_retries, 3);
        assert_eq!(config.scorer.temperature, 0.3);

        let serpapi = config.sources.rate_limit_for("serpapi");
        assert_eq!(serpapi.capacity, 1);
        assert_eq!(serpapi.refill_every, Duration::from_secs(2));
        assert_eq!(
            config.sources.rate_limit_for("tavily"),
            config.sources.rate_limit
        );
    }

    #[test]
    fn test_zero_in_flight_rejected() {
        let result = RuntimeConfig::from_yaml("max_in_flight: 0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let yaml = r#"
sources:
  rate_limits:
    tavily: { capacity: 0, refill_every: 1s }
"#;
        let err = RuntimeConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("tavily"));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let yaml = "sources:\n  timeout: soon\n";
        assert!(matches!(
            RuntimeConfig::from_yaml(yaml),
            Err(ConfigError::YamlError(_))
        ));
    }

    #[test]
    fn test_roundtrip_keeps_human_durations() {
        let yaml = serde_yaml::to_string(&RuntimeConfig::default()).unwrap();
        assert!(yaml.contains("timeout: 20s"));
        let parsed = RuntimeConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.sources.timeout, Duration::from_secs(20));
    }
}
