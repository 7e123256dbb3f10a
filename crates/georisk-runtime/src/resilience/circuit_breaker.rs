//! Circuit breaker keyed by source id.
//!
//! When a provider fails repeatedly, its circuit opens and further fetches
//! fail fast as unavailable until the recovery timeout elapses. A half-open
//! circuit admits one trial call at a time.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::duration_str;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Time before a recovery probe is allowed
    #[serde(with = "duration_str")]
    pub recovery_timeout: Duration,

    /// Successes in half-open state needed to close the circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Calls fail fast
    Open { opened_at: Instant },

    /// Probing whether the provider recovered. `trial_started` is set while
    /// a trial call is out.
    HalfOpen {
        successes: u32,
        trial_started: Option<Instant>,
    },
}

/// Independent circuits, one per source.
pub struct CircuitBreaker {
    states: RwLock<HashMap<String, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Whether calls to `source` should fail fast.
    ///
    /// Once the recovery timeout has passed, the first caller is let through
    /// as the trial and the rest keep failing fast until it reports back. A
    /// trial that never reports is replaced after another recovery timeout.
    pub fn is_open(&self, source: &str) -> bool {
        let mut states = self.states.write();
        let Some(state) = states.get_mut(source) else {
            return false;
        };

        match state {
            CircuitState::Closed { .. } => false,
            CircuitState::Open { opened_at } => {
                if opened_at.elapsed() < self.config.recovery_timeout {
                    return true;
                }
                *state = CircuitState::HalfOpen {
                    successes: 0,
                    trial_started: Some(Instant::now()),
                };
                tracing::info!(source = %source, "Circuit half-open, admitting a trial call");
                false
            }
            CircuitState::HalfOpen { trial_started, .. } => match trial_started {
                Some(started) if started.elapsed() < self.config.recovery_timeout => true,
                _ => {
                    *trial_started = Some(Instant::now());
                    false
                }
            },
        }
    }

    pub fn record_success(&self, source: &str) {
        let mut states = self.states.write();
        match states.get(source).cloned() {
            Some(CircuitState::HalfOpen { successes, .. }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(source.to_string(), CircuitState::Closed { failures: 0 });
                    tracing::info!(source = %source, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        source.to_string(),
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                            trial_started: None,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { failures }) if failures > 0 => {
                states.insert(source.to_string(), CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    pub fn record_failure(&self, source: &str) {
        let mut states = self.states.write();
        let current = states
            .get(source)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 });

        match current {
            CircuitState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    states.insert(
                        source.to_string(),
                        CircuitState::Open {
                            opened_at: Instant::now(),
                        },
                    );
                    tracing::warn!(
                        source = %source,
                        failures,
                        "Circuit opened after repeated failures"
                    );
                } else {
                    states.insert(source.to_string(), CircuitState::Closed { failures });
                }
            }
            CircuitState::HalfOpen { .. } => {
                states.insert(
                    source.to_string(),
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(source = %source, "Circuit reopened after failed recovery probe");
            }
            CircuitState::Open { .. } => {}
        }
    }

    pub fn state(&self, source: &str) -> CircuitState {
        self.states
            .read()
            .get(source)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Reset all circuits to closed.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
