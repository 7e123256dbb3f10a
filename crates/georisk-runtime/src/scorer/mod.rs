//! AI risk scoring.
//!
//! [`RiskScorer`] turns an evidence bundle into a [`RiskAssessment`]. Every
//! response passes through [`parse::parse_response`]; an invalid response
//! is re-prompted with the rejection reason, transient provider failures
//! are retried after any `Retry-After` the provider sent, and both share one
//! bounded [`RetryPolicy`]. The scorer never fails: exhausted retries become
//! a `scoring_failed` assessment.

use backon::Retryable;
use georisk_core::{
    Country, EvidenceBundle, FailureKind, PairKey, RiskAssessment, RiskCategory,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::duration_str;
use crate::prompts::{build_scoring_prompt, SYSTEM_PROMPT};
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};
use crate::resilience::{BudgetTracker, RetryAfter, RetryPolicy};

pub mod parse;

pub use parse::{parse_response, ParsedScore};

/// Errors from a single scoring attempt.
#[derive(Error, Debug, Clone)]
pub enum ScoringError {
    #[error("Invalid scoring response: {0}")]
    Invalid(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Token budget exhausted for category '{0}'")]
    BudgetExceeded(String),

    #[error("Scoring call timed out after {0:?}")]
    Timeout(Duration),
}

impl ScoringError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScoringError::Invalid(_) | ScoringError::Timeout(_) => true,
            ScoringError::Provider(e) => e.is_transient(),
            ScoringError::BudgetExceeded(_) => false,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ScoringError::Invalid(_) => FailureKind::ScoringInvalid,
            ScoringError::BudgetExceeded(_) => FailureKind::BudgetExceeded,
            ScoringError::Provider(_) | ScoringError::Timeout(_) => FailureKind::ScoringUnavailable,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ScoringError::Provider(e) => e.retry_after(),
            _ => None,
        }
    }
}

/// Scoring call settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,

    /// Limit on a single call, enforced around the provider
    #[serde(with = "duration_str")]
    pub timeout: Duration,

    /// Re-prompts and transient-failure retries
    pub retry: RetryPolicy,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        let completion = CompletionConfig::default();
        Self {
            model: completion.model,
            temperature: completion.temperature,
            max_tokens: completion.max_tokens,
            timeout: completion.timeout,
            retry: RetryPolicy::default(),
        }
    }
}

impl ScorerConfig {
    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
        }
    }
}

/// Scores pairs through an [`LlmProvider`].
pub struct RiskScorer {
    provider: Arc<dyn LlmProvider>,
    config: ScorerConfig,
    budget: Arc<BudgetTracker>,
}

impl RiskScorer {
    pub fn new(provider: Arc<dyn LlmProvider>, config: ScorerConfig, budget: Arc<BudgetTracker>) -> Self {
        Self {
            provider,
            config,
            budget,
        }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    pub fn budget(&self) -> &Arc<BudgetTracker> {
        &self.budget
    }

    /// Score one pair.
    ///
    /// The result is `partial_evidence` whenever the bundle is empty or any
    /// source failed, even if the model returned a valid score.
    pub async fn score(
        &self,
        category: &RiskCategory,
        country: &Country,
        bundle: &EvidenceBundle,
    ) -> RiskAssessment {
        let key = PairKey::new(&category.id, &country.id);
        let attempts = AtomicU32::new(0);
        let rejection: Mutex<Option<String>> = Mutex::new(None);
        let retry_after = RetryAfter::new();

        let (attempts_ref, rejection_ref, gate) = (&attempts, &rejection, &retry_after);
        let result = (move || async move {
            gate.wait().await;
            attempts_ref.fetch_add(1, Ordering::SeqCst);
            let reason = rejection_ref.lock().clone();
            self.attempt(category, country, bundle, reason.as_deref()).await
        })
        .retry(self.config.retry.backoff())
        .when(|e: &ScoringError| {
            e.is_retryable() && self.config.retry.allows_wait(e.retry_after())
        })
        .notify(|e: &ScoringError, dur| {
            retry_after.record(e.retry_after());
            tracing::warn!(
                category = %category.id,
                country = %country.id,
                error = %e,
                retry_in = ?dur,
                "Scoring attempt failed, retrying"
            );
            if let ScoringError::Invalid(reason) = e {
                *rejection.lock() = Some(reason.clone());
            }
        })
        .await;

        let attempts = attempts.load(Ordering::SeqCst);
        let assessment = match result {
            Ok(parsed) => {
                let incomplete = bundle.is_empty() || bundle.has_failures();
                if incomplete {
                    let description = format!("{} {}", partial_note(bundle), parsed.explanation);
                    RiskAssessment::partial(key, parsed.score, description)
                } else {
                    RiskAssessment::ok(key, parsed.score, parsed.explanation)
                }
                .with_key_indicators(parsed.key_indicators)
            }
            Err(e) => {
                tracing::warn!(
                    category = %category.id,
                    country = %country.id,
                    attempts,
                    error = %e,
                    "Scoring failed"
                );
                RiskAssessment::failed(
                    key,
                    e.failure_kind(),
                    format!("Scoring failed after {} attempt(s): {}", attempts, e),
                )
            }
        };

        assessment
            .with_evidence_count(bundle.len())
            .with_attempts(attempts)
    }

    async fn attempt(
        &self,
        category: &RiskCategory,
        country: &Country,
        bundle: &EvidenceBundle,
        rejection: Option<&str>,
    ) -> Result<ParsedScore, ScoringError> {
        let prompt = build_scoring_prompt(category, country, bundle, rejection);

        let estimated = self.provider.estimate_tokens(SYSTEM_PROMPT)
            + self.provider.estimate_tokens(&prompt)
            + self.config.max_tokens;
        // released on any early return, including timeout and cancellation
        let reservation = self
            .budget
            .try_reserve(&category.id, estimated)
            .ok_or_else(|| ScoringError::BudgetExceeded(category.id.clone()))?;

        let messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];
        let completion = self.config.completion_config();

        let response = tokio::time::timeout(
            self.config.timeout,
            self.provider.complete(messages, &completion),
        )
        .await
        .map_err(|_| ScoringError::Timeout(self.config.timeout))??;

        reservation.commit(&response.usage, &response.model);

        tracing::debug!(
            category = %category.id,
            country = %country.id,
            provider = self.provider.name(),
            tokens = response.usage.total(),
            "Scoring response received"
        );

        parse_response(&response.content).map_err(ScoringError::Invalid)
    }
}

fn partial_note(bundle: &EvidenceBundle) -> String {
    let failed: Vec<&str> = bundle.failed_sources().collect();
    if failed.is_empty() {
        "[Partial evidence: no evidence retrieved]".to_string()
    } else {
        format!("[Partial evidence: {} unavailable]", failed.join(", "))
    }
}

impl std::fmt::Debug for RiskScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskScorer")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish()
    }
}
