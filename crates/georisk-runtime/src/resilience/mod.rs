//! Resilience patterns for the pipeline.
//!
//! - Circuit breaker per source
//! - Token bucket rate limiting per source
//! - Retry with exponential backoff
//! - Token budget for scoring calls

mod budget;
mod circuit_breaker;
mod rate_limit;
mod retry;

pub use budget::{BudgetConfig, BudgetReservation, BudgetTracker, LlmUsage, TokenBudget};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retry::{RetryAfter, RetryPolicy};
