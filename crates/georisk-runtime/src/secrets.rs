//! Secure credential handling for the scoring provider and data sources.
//!
//! Credentials are wrapped in [`SecretString`] as soon as they are read, so
//! they cannot show up in `Debug`/`Display` output or tracing fields.
//!
//! ## Usage
//!
//! ```ignore
//! let mut creds = CredentialBuilder::new()
//!     .require("openai_api_key", "OPENAI_API_KEY", "OpenAI API key")
//!     .require("tavily_api_key", "TAVILY_API_KEY", "Tavily API key")
//!     .optional("alpha_vantage_api_key", "ALPHA_VANTAGE_API_KEY", "Alpha Vantage API key")
//!     .build(&config)?;
//!
//! let openai = creds.take("openai_api_key")?;
//! request.bearer_auth(openai.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors from credential loading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("{name} required: set '{config_key}' in config or {env_var} environment variable")]
    Missing {
        name: String,
        config_key: String,
        env_var: String,
    },

    #[error("Missing required credentials: {}", .0.join(", "))]
    MissingMany(Vec<String>),

    #[error("Credential '{0}' not loaded")]
    NotLoaded(String),
}

impl CredentialError {
    /// Environment variables that would satisfy this error.
    pub fn env_vars(&self) -> Vec<&str> {
        match self {
            CredentialError::Missing { env_var, .. } => vec![env_var.as_str()],
            CredentialError::MissingMany(vars) => vars.iter().map(|v| v.as_str()).collect(),
            CredentialError::NotLoaded(_) => Vec::new(),
        }
    }
}

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Config,
    Environment,
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// Read a non-empty environment variable.
fn env_value(env_var: &str) -> Option<String> {
    std::env::var(env_var).ok().filter(|v| !v.trim().is_empty())
}

/// Read a non-empty string from a JSON config object.
fn config_value<'a>(config: &'a JsonValue, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
}

/// A securely stored API credential.
///
/// `Debug` and `Display` show `[REDACTED]`; the value is only reachable
/// through [`ApiCredential::expose`].
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    pub fn from_env(env_var: &str, name: &'static str) -> Result<Self, CredentialError> {
        env_value(env_var)
            .map(|v| Self::new(v, CredentialSource::Environment, name))
            .ok_or_else(|| CredentialError::Missing {
                name: name.to_string(),
                config_key: String::new(),
                env_var: env_var.to_string(),
            })
    }

    /// Load from `config[config_key]`, falling back to `env_var`.
    ///
    /// Empty values count as unset.
    pub fn from_config_or_env(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, CredentialError> {
        if let Some(value) = config_value(config, config_key) {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        if let Some(value) = env_value(env_var) {
            return Ok(Self::new(value, CredentialSource::Environment, name));
        }

        Err(CredentialError::Missing {
            name: name.to_string(),
            config_key: config_key.to_string(),
            env_var: env_var.to_string(),
        })
    }

    /// Whether a credential could be loaded, without loading it.
    pub fn is_available(config: &JsonValue, config_key: &str, env_var: &str) -> bool {
        config_value(config, config_key).is_some() || env_value(env_var).is_some()
    }

    /// Expose the value at the point of use. Never store the result.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

struct CredentialSpec {
    config_key: &'static str,
    env_var: &'static str,
    name: &'static str,
}

/// Loads several credentials at once.
///
/// Every missing required credential is reported in a single error, so a
/// user can fix their environment in one pass.
#[derive(Default)]
pub struct CredentialBuilder {
    required: Vec<CredentialSpec>,
    optional: Vec<CredentialSpec>,
}

impl CredentialBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(
        mut self,
        config_key: &'static str,
        env_var: &'static str,
        name: &'static str,
    ) -> Self {
        self.required.push(CredentialSpec {
            config_key,
            env_var,
            name,
        });
        self
    }

    pub fn optional(
        mut self,
        config_key: &'static str,
        env_var: &'static str,
        name: &'static str,
    ) -> Self {
        self.optional.push(CredentialSpec {
            config_key,
            env_var,
            name,
        });
        self
    }

    pub fn build(self, config: &JsonValue) -> Result<CredentialSet, CredentialError> {
        let mut credentials = BTreeMap::new();
        let mut missing = Vec::new();

        for spec in self.required {
            match ApiCredential::from_config_or_env(config, spec.config_key, spec.env_var, spec.name)
            {
                Ok(cred) => {
                    credentials.insert(spec.config_key, cred);
                }
                Err(_) => missing.push(spec.env_var.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(CredentialError::MissingMany(missing));
        }

        for spec in self.optional {
            if let Ok(cred) =
                ApiCredential::from_config_or_env(config, spec.config_key, spec.env_var, spec.name)
            {
                credentials.insert(spec.config_key, cred);
            }
        }

        Ok(CredentialSet { credentials })
    }
}

/// A set of loaded credentials.
pub struct CredentialSet {
    credentials: BTreeMap<&'static str, ApiCredential>,
}

impl CredentialSet {
    pub fn get(&self, key: &str) -> Result<&ApiCredential, CredentialError> {
        self.credentials
            .get(key)
            .ok_or_else(|| CredentialError::NotLoaded(key.to_string()))
    }

    /// Move a credential out of the set.
    pub fn take(&mut self, key: &str) -> Result<ApiCredential, CredentialError> {
        self.credentials
            .remove(key)
            .ok_or_else(|| CredentialError::NotLoaded(key.to_string()))
    }

    pub fn take_optional(&mut self, key: &str) -> Option<ApiCredential> {
        self.credentials.remove(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.credentials.contains_key(key)
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("keys", &self.credentials.keys().collect::<Vec<_>>())
            .finish()
    }
}
