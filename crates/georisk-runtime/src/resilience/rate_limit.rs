//! Per-source token bucket.
//!
//! Each source owns its own limiter, so a throttled provider never delays
//! calls to another one. A bucket of capacity 1 degenerates to a fixed delay
//! between calls.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::duration_str;

/// Token bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Burst size
    pub capacity: u32,

    /// Time to regain one token; zero disables limiting
    #[serde(with = "duration_str")]
    pub refill_every: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 2,
            refill_every: Duration::from_millis(500),
        }
    }
}

struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = elapsed.as_nanos() / config.refill_every.as_nanos().max(1);
        if earned == 0 {
            return;
        }

        let missing = config.capacity.saturating_sub(self.tokens);
        if earned >= missing as u128 {
            self.tokens = config.capacity;
            self.last_refill = now;
        } else {
            self.tokens += earned as u32;
            self.last_refill += config.refill_every * earned as u32;
        }
    }
}

/// Async token-bucket rate limiter.
///
/// Waiters queue on the bucket lock, so permits are handed out in arrival
/// order.
pub struct RateLimiter {
    config: RateLimitConfig,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            config: RateLimitConfig {
                capacity,
                ..config
            },
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// A limiter that never waits.
    pub fn unlimited() -> Self {
        Self::new(RateLimitConfig {
            capacity: 1,
            refill_every: Duration::ZERO,
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait until a call is permitted, then consume one token.
    pub async fn acquire(&self) {
        if self.config.refill_every.is_zero() {
            return;
        }

        let mut bucket = self.bucket.lock().await;
        loop {
            let now = Instant::now();
            bucket.refill(&self.config, now);
            if bucket.tokens > 0 {
                bucket.tokens -= 1;
                return;
            }

            let next = bucket.last_refill + self.config.refill_every;
            tokio::time::sleep_until(next).await;
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_wait() {
        let limiter = RateLimiter::new(RateLimitConfig {
            capacity: 2,
            refill_every: Duration::from_secs(1),
        });
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_one_is_fixed_delay() {
        let limiter = RateLimiter::new(RateLimitConfig {
            capacity: 1,
            refill_every: Duration::from_millis(250),
        });
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_do_not_exceed_capacity() {
        let limiter = RateLimiter::new(RateLimitConfig {
            capacity: 2,
            refill_every: Duration::from_secs(1),
        });
        tokio::time::sleep(Duration::from_secs(60)).await;

        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        let start = std::time::Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
