//! # georisk-runtime
//!
//! The async half of georisk: gathers evidence for every
//! (category, country) pair of a [`georisk_core::RiskMatrix`], scores each
//! pair with an AI provider and assembles the report.
//!
//! ## Pipeline
//!
//! - [`sources`]: adapters for web search, news, market data and FX rates,
//!   each wrapped in a [`sources::GuardedSource`] (cache, circuit breaker,
//!   rate limiter, retry)
//! - [`aggregator`]: fans a pair out to its sources and builds a bounded
//!   evidence bundle
//! - [`scorer`]: prompts the provider and validates the 0-10 score, with
//!   bounded re-prompts
//! - [`orchestrator`]: runs all pairs with a global in-flight cap and
//!   run-level cancellation
//!
//! ## Example
//!
//! ```rust,ignore
//! use georisk_core::RiskMatrix;
//! use georisk_runtime::{Orchestrator, ProviderRegistry, RuntimeConfig};
//!
//! let provider = ProviderRegistry::with_defaults()
//!     .create("openai", &serde_json::json!({}))?;
//!
//! let orchestrator = Orchestrator::builder()
//!     .matrix(RiskMatrix::builtin()?)
//!     .provider(provider)
//!     .sources(adapters)
//!     .config(RuntimeConfig::default())
//!     .build()?;
//!
//! let outcome = orchestrator.run().await;
//! println!("{:?}", outcome.report.summary());
//! ```

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod scorer;
pub mod secrets;
pub mod sources;

pub use aggregator::{AggregationError, EvidenceAggregator};
pub use cache::{CacheConfig, SourceCache};
pub use config::{ConfigError, RuntimeConfig, SourceSettings};
pub use orchestrator::{
    CancelHandle, Orchestrator, OrchestratorBuilder, OrchestratorError, PairState, RunOutcome,
};
pub use providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderRegistry, TokenUsage,
};
pub use resilience::{BudgetConfig, BudgetTracker, LlmUsage, RetryPolicy};
pub use scorer::{RiskScorer, ScorerConfig, ScoringError};
pub use secrets::{ApiCredential, CredentialBuilder, CredentialError, CredentialSet};
pub use sources::{guard_all, GuardedSource, QuerySpec, SourceAdapter, SourceError};
