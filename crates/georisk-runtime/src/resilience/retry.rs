//! Retry policy for source fetches and scoring calls.

use backon::ExponentialBuilder;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::duration_str;

/// Bounded exponential backoff.
///
/// `max_retries` counts retries, not calls: a policy with `max_retries: 2`
/// makes at most three attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,

    /// Delay before the first retry
    #[serde(with = "duration_str")]
    pub min_delay: Duration,

    /// Upper bound on any single delay
    #[serde(with = "duration_str")]
    pub max_delay: Duration,

    /// Growth factor between delays
    pub factor: f32,

    /// Randomize delays to avoid synchronized retries
    pub jitter: bool,

    /// Longest `Retry-After` worth waiting for. A longer request ends the
    /// retries.
    #[serde(with = "duration_str")]
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            factor: 2.0,
            jitter: true,
            max_retry_after: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Upper bound on attempts, including the first.
    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Whether a failure that asked for `retry_after` may be retried.
    pub fn allows_wait(&self, retry_after: Option<Duration>) -> bool {
        retry_after.map_or(true, |wait| wait <= self.max_retry_after)
    }

    /// Backoff builder for `backon`.
    pub fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .with_max_times(self.max_retries);

        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

/// Carries a provider's `Retry-After` from a failed attempt to the next one.
///
/// backon sleeps its own backoff first; [`wait`](Self::wait) then covers
/// whatever is left of the requested delay.
#[derive(Debug, Default)]
pub struct RetryAfter {
    not_before: Mutex<Option<Instant>>,
}

impl RetryAfter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a requested delay, counted from now.
    pub fn record(&self, delay: Option<Duration>) {
        if let Some(delay) = delay {
            *self.not_before.lock() = Some(Instant::now() + delay);
        }
    }

    /// Sleep out the last recorded delay, then forget it.
    pub async fn wait(&self) {
        let deadline = self.not_before.lock().take();
        if let Some(deadline) = deadline {
            tokio::time::sleep_until(deadline).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backon::Retryable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_bounded() {
        let policy = RetryPolicy {
            max_retries: 3,
            ..Default::default()
        };
        let calls = AtomicUsize::new(0);
        let calls_ref = &calls;

        let result: Result<(), &str> = (move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            Err("always fails")
        })
        .retry(policy.backoff())
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), policy.max_attempts());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_policy() {
        let calls = AtomicUsize::new(0);
        let calls_ref = &calls;

        let _: Result<(), &str> = (move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            Err("fails")
        })
        .retry(RetryPolicy::none().backoff())
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_waits_once() {
        let gate = RetryAfter::new();
        let start = Instant::now();

        gate.record(Some(Duration::from_secs(2)));
        gate.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(2));

        let second = Instant::now();
        gate.wait().await;
        assert_eq!(second.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_long_retry_after_is_not_allowed() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_wait(None));
        assert!(policy.allows_wait(Some(Duration::from_secs(30))));
        assert!(!policy.allows_wait(Some(Duration::from_secs(3600))));
    }

    #[test]
    fn test_policy_from_yaml() {
        let policy: RetryPolicy =
            serde_yaml::from_str("max_retries: 5\nmin_delay: 100ms\njitter: false").unwrap();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.min_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert!(!policy.jitter);
        assert_eq!(policy.max_retry_after, Duration::from_secs(60));
    }
}
