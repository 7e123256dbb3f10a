//! Resilience wrapper for source adapters.
//!
//! A [`GuardedSource`] layers, outermost first: the result cache, the
//! per-source circuit breaker, and retry with backoff around a rate-limited
//! call to the wrapped adapter. Each retry attempt takes its own rate-limit
//! token, and a `Retry-After` from the provider delays the next attempt.

use async_trait::async_trait;
use backon::Retryable;
use georisk_core::{Evidence, SourceKind};
use std::sync::Arc;

use super::{QuerySpec, SourceAdapter, SourceError};
use crate::cache::{SourceCache, SourceCacheKey};
use crate::config::RuntimeConfig;
use crate::resilience::{CircuitBreaker, RateLimitConfig, RateLimiter, RetryAfter, RetryPolicy};

/// A source adapter wrapped with caching, circuit breaking, rate limiting
/// and retries.
pub struct GuardedSource {
    inner: Arc<dyn SourceAdapter>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    cache: Option<SourceCache>,
}

impl GuardedSource {
    pub fn new(inner: Arc<dyn SourceAdapter>, rate_limit: RateLimitConfig, retry: RetryPolicy) -> Self {
        Self {
            inner,
            limiter: RateLimiter::new(rate_limit),
            retry,
            breaker: Arc::new(CircuitBreaker::new(Default::default())),
            cache: None,
        }
    }

    /// Share a breaker between sources. Circuits stay keyed per source id.
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_cache(mut self, cache: SourceCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn inner(&self) -> &Arc<dyn SourceAdapter> {
        &self.inner
    }
}

impl std::fmt::Debug for GuardedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedSource")
            .field("source", &self.inner.id())
            .field("limiter", &self.limiter)
            .field("retry", &self.retry)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

#[async_trait]
impl SourceAdapter for GuardedSource {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn kind(&self) -> SourceKind {
        self.inner.kind()
    }

    fn lookup_key(&self, query: &QuerySpec) -> String {
        self.inner.lookup_key(query)
    }

    async fn fetch(&self, query: &QuerySpec) -> Result<Vec<Evidence>, SourceError> {
        let id = self.inner.id();
        let cache_key = SourceCacheKey::new(id, self.inner.lookup_key(query));

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&cache_key).await {
                tracing::debug!(source = id, query = %query.query, "Source cache hit");
                return Ok(hit);
            }
        }

        if self.breaker.is_open(id) {
            tracing::debug!(source = id, "Circuit open, skipping fetch");
            return Err(SourceError::CircuitOpen);
        }

        let inner = &self.inner;
        let limiter = &self.limiter;
        let retry_after = RetryAfter::new();
        let gate = &retry_after;
        let result = (move || async move {
            gate.wait().await;
            limiter.acquire().await;
            inner.fetch(query).await
        })
        .retry(self.retry.backoff())
        .when(|e: &SourceError| e.is_transient() && self.retry.allows_wait(e.retry_after()))
        .notify(|e: &SourceError, dur| {
            retry_after.record(e.retry_after());
            tracing::warn!(
                source = id,
                error = %e,
                retry_in = ?dur,
                retry_after = ?e.retry_after(),
                "Source fetch failed, retrying"
            );
        })
        .await;

        match result {
            Ok(evidence) => {
                self.breaker.record_success(id);
                if let Some(cache) = &self.cache {
                    cache.insert(cache_key, evidence.clone()).await;
                }
                Ok(evidence)
            }
            Err(e) => {
                self.breaker.record_failure(id);
                Err(e)
            }
        }
    }
}

/// Wrap every adapter with the guards configured in `config`.
///
/// All returned sources share one circuit breaker and, when enabled, one
/// result cache.
pub fn guard_all(
    adapters: Vec<Arc<dyn SourceAdapter>>,
    config: &RuntimeConfig,
) -> Vec<Arc<dyn SourceAdapter>> {
    let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
    let cache = SourceCache::from_config(&config.cache);

    adapters
        .into_iter()
        .map(|inner| {
            let rate_limit = config.sources.rate_limit_for(inner.id());
            let mut guarded = GuardedSource::new(inner, rate_limit, config.sources.retry.clone())
                .with_circuit_breaker(Arc::clone(&breaker));
            if let Some(cache) = &cache {
                guarded = guarded.with_cache(cache.clone());
            }
            Arc::new(guarded) as Arc<dyn SourceAdapter>
        })
        .collect()
}
