//! Pipeline orchestrator.
//!
//! Drives every (category, country) pair of the matrix through
//! `pending -> gathering_evidence -> scoring -> done`:
//! - at most `max_in_flight` pairs run at once, each as its own task
//! - a pair that fails, panics or is cancelled still ends `done`, with a
//!   `scoring_failed` assessment that says why
//! - assessments stream into the [`ReportAssembler`] as they complete and
//!   the report is emitted in canonical order once every task has finished
//!
//! Cancellation is run-level: pairs not yet started are never started,
//! in-flight pairs are abandoned at their next suspension point, and both
//! are reported as cancelled.

use futures::FutureExt;
use georisk_core::{
    AssessmentStatus, FailureKind, PairKey, Report, ReportAssembler, RiskAssessment, RiskMatrix,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::aggregator::EvidenceAggregator;
use crate::config::{ConfigError, RuntimeConfig};
use crate::providers::LlmProvider;
use crate::resilience::{BudgetTracker, LlmUsage};
use crate::scorer::RiskScorer;
use crate::sources::{guard_all, SourceAdapter};

/// Errors from building or pre-flighting an orchestrator. A run itself never
/// fails.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("No AI provider configured")]
    ProviderNotConfigured,

    #[error("No risk matrix configured")]
    MatrixNotConfigured,

    #[error("AI provider '{0}' failed its health check")]
    ProviderUnhealthy(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Where a pair is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "status", rename_all = "snake_case")]
pub enum PairState {
    Pending,
    GatheringEvidence,
    Scoring,
    Done(AssessmentStatus),
}

impl PairState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PairState::Done(_))
    }
}

/// Run-level cancellation signal. Cloning shares the signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Cancel the run. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Resolves once cancellation is signalled.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
    if closed {
        // sender gone: cancellation can no longer happen
        std::future::pending::<()>().await;
    }
}

/// Result of a run.
#[derive(Debug)]
pub struct RunOutcome {
    /// Complete report, one row per pair
    pub report: Report,

    /// AI usage during the run
    pub usage: LlmUsage,

    /// Final state per pair, in canonical order
    pub states: Vec<(PairKey, PairState)>,

    /// Whether cancellation was requested
    pub cancelled: bool,
}

/// Everything a pair task needs.
#[derive(Clone)]
struct PairContext {
    matrix: Arc<RiskMatrix>,
    aggregator: Arc<EvidenceAggregator>,
    scorer: Arc<RiskScorer>,
    states: Arc<RwLock<BTreeMap<PairKey, PairState>>>,
    completed: Arc<AtomicUsize>,
    total: usize,
}

impl PairContext {
    fn set_state(&self, key: &PairKey, state: PairState) {
        if let Some(current) = self.states.write().get_mut(key) {
            *current = state;
        }
    }

    async fn process(self, key: PairKey, mut cancel: watch::Receiver<bool>) -> RiskAssessment {
        let work = AssertUnwindSafe(self.assess(&key)).catch_unwind();

        let assessment = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => {
                tracing::debug!(category = %key.category, country = %key.country, "Pair cancelled");
                RiskAssessment::cancelled(key.clone())
            }
            outcome = work => match outcome {
                Ok(assessment) => assessment,
                Err(panic) => {
                    tracing::error!(
                        category = %key.category,
                        country = %key.country,
                        panic = panic_message(panic.as_ref()),
                        "Pair processing panicked"
                    );
                    RiskAssessment::failed(
                        key.clone(),
                        FailureKind::Internal,
                        "Unexpected internal error while assessing this pair",
                    )
                }
            },
        };

        self.finish(&key, &assessment);
        assessment
    }

    async fn assess(&self, key: &PairKey) -> RiskAssessment {
        self.set_state(key, PairState::GatheringEvidence);

        let bundle = match self.aggregator.gather_pair(&self.matrix, key).await {
            Ok(bundle) => bundle,
            Err(e) => {
                tracing::warn!(category = %key.category, country = %key.country, error = %e, "Aggregation failed");
                return RiskAssessment::failed(key.clone(), FailureKind::AggregationFailed, e.to_string());
            }
        };

        let Some((category, country)) = self
            .matrix
            .category(&key.category)
            .and_then(|category| category.country(&key.country).map(|country| (category, country)))
        else {
            return RiskAssessment::failed(
                key.clone(),
                FailureKind::AggregationFailed,
                format!("Pair {} is not part of the matrix", key),
            );
        };

        self.set_state(key, PairState::Scoring);
        self.scorer.score(category, country, &bundle).await
    }

    fn finish(&self, key: &PairKey, assessment: &RiskAssessment) {
        self.set_state(key, PairState::Done(assessment.status()));
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::info!(
            category = %key.category,
            country = %key.country,
            status = %assessment.status(),
            score = %assessment.score(),
            completed,
            total = self.total,
            "Pair assessed"
        );
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Runs the full matrix through evidence gathering and scoring.
pub struct Orchestrator {
    matrix: Arc<RiskMatrix>,
    aggregator: Arc<EvidenceAggregator>,
    scorer: Arc<RiskScorer>,
    budget: Arc<BudgetTracker>,
    config: RuntimeConfig,
    cancel: CancelHandle,
    states: Arc<RwLock<BTreeMap<PairKey, PairState>>>,
    completed: Arc<AtomicUsize>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn matrix(&self) -> &RiskMatrix {
        &self.matrix
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Handle for cancelling a run from another task. A cancelled
    /// orchestrator stays cancelled.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Snapshot of per-pair states, for progress reporting.
    pub fn pair_states(&self) -> BTreeMap<PairKey, PairState> {
        self.states.read().clone()
    }

    /// Pairs that reached `done` in the current run.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Check that the AI provider is usable before any pair starts.
    pub async fn preflight(&self) -> Result<(), OrchestratorError> {
        let provider = self.scorer.provider();
        if !provider.health_check().await {
            return Err(OrchestratorError::ProviderUnhealthy(provider.name().to_string()));
        }
        tracing::debug!(provider = provider.name(), "Provider health check passed");
        Ok(())
    }

    /// Assess every pair and assemble the report.
    ///
    /// Always yields a complete report: one row per pair, in canonical order.
    pub async fn run(&self) -> RunOutcome {
        let keys = self.matrix.pair_keys();
        let total = keys.len();

        *self.states.write() = keys
            .iter()
            .map(|key| (key.clone(), PairState::Pending))
            .collect();
        self.completed.store(0, Ordering::SeqCst);

        let context = PairContext {
            matrix: Arc::clone(&self.matrix),
            aggregator: Arc::clone(&self.aggregator),
            scorer: Arc::clone(&self.scorer),
            states: Arc::clone(&self.states),
            completed: Arc::clone(&self.completed),
            total,
        };

        tracing::info!(
            categories = self.matrix.categories().len(),
            pairs = total,
            sources = self.aggregator.sources().len(),
            max_in_flight = self.config.max_in_flight,
            "Starting assessment run"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight));
        let mut cancel = self.cancel.subscribe();
        let mut tasks = JoinSet::new();

        for key in keys {
            let permit = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let context = context.clone();
            let pair_cancel = self.cancel.subscribe();
            tasks.spawn(async move {
                let _permit = permit;
                context.process(key, pair_cancel).await
            });
        }

        let mut assembler =
            ReportAssembler::new(&self.matrix).with_description_chars(self.config.description_chars);

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(assessment) => {
                    if let Err(e) = assembler.accept(assessment) {
                        tracing::error!(error = %e, "Discarding assessment");
                    }
                }
                Err(e) => tracing::error!(error = %e, "Pair task did not complete"),
            }
        }

        let was_cancelled = self.cancel.is_cancelled();
        let report = assembler.finish_with(|key| {
            let assessment = if was_cancelled {
                RiskAssessment::cancelled(key.clone())
            } else {
                RiskAssessment::failed(
                    key.clone(),
                    FailureKind::Internal,
                    "Pair did not complete",
                )
            };
            context.finish(key, &assessment);
            assessment
        });

        let summary = report.summary();
        tracing::info!(
            total = summary.total,
            ok = summary.ok,
            partial_evidence = summary.partial_evidence,
            scoring_failed = summary.scoring_failed,
            cancelled = was_cancelled,
            "Assessment run complete"
        );

        let states = {
            let states = self.states.read();
            self.matrix
                .pair_keys()
                .into_iter()
                .map(|key| {
                    let state = states.get(&key).copied().unwrap_or(PairState::Pending);
                    (key, state)
                })
                .collect()
        };

        RunOutcome {
            report,
            usage: self.budget.usage(),
            states,
            cancelled: was_cancelled,
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("pairs", &self.matrix.pair_count())
            .field("aggregator", &self.aggregator)
            .field("scorer", &self.scorer)
            .field("max_in_flight", &self.config.max_in_flight)
            .finish()
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    matrix: Option<RiskMatrix>,
    provider: Option<Arc<dyn LlmProvider>>,
    sources: Vec<Arc<dyn SourceAdapter>>,
    config: RuntimeConfig,
    guard_sources: bool,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self {
            matrix: None,
            provider: None,
            sources: Vec::new(),
            config: RuntimeConfig::default(),
            guard_sources: true,
        }
    }
}

impl OrchestratorBuilder {
    pub fn matrix(mut self, matrix: RiskMatrix) -> Self {
        self.matrix = Some(matrix);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Register a source. Evidence is ordered by registration order.
    pub fn source(mut self, source: Arc<dyn SourceAdapter>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn sources(mut self, sources: impl IntoIterator<Item = Arc<dyn SourceAdapter>>) -> Self {
        self.sources.extend(sources);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether to wrap sources with rate limiting, retry, circuit breaking
    /// and caching (default `true`).
    pub fn guard_sources(mut self, guard: bool) -> Self {
        self.guard_sources = guard;
        self
    }

    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        self.config.validate()?;
        let matrix = self.matrix.ok_or(OrchestratorError::MatrixNotConfigured)?;
        let provider = self.provider.ok_or(OrchestratorError::ProviderNotConfigured)?;

        if self.sources.is_empty() {
            tracing::warn!("No sources registered, every pair will be scored without evidence");
        }

        let sources = if self.guard_sources {
            guard_all(self.sources, &self.config)
        } else {
            self.sources
        };

        let budget = Arc::new(BudgetTracker::from_config(&self.config.budget));
        let scorer = RiskScorer::new(provider, self.config.scorer.clone(), Arc::clone(&budget));
        let aggregator = EvidenceAggregator::new(sources, self.config.evidence);

        Ok(Orchestrator {
            matrix: Arc::new(matrix),
            aggregator: Arc::new(aggregator),
            scorer: Arc::new(scorer),
            budget,
            config: self.config,
            cancel: CancelHandle::new(),
            states: Arc::new(RwLock::new(BTreeMap::new())),
            completed: Arc::new(AtomicUsize::new(0)),
        })
    }
}
