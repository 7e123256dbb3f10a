//! Token budget management for scoring calls.
//!
//! Enforces a global ceiling for the run and optional per-category ceilings.
//! A call reserves its estimated tokens before it is sent; the reservation
//! is settled to the reported usage when the call returns and released if it
//! never does.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::providers::TokenUsage;

/// Budget settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Maximum tokens across the whole run
    pub global_max_tokens: u32,

    /// Maximum tokens per category id
    pub per_category_max_tokens: BTreeMap<String, u32>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            global_max_tokens: 1_000_000,
            per_category_max_tokens: BTreeMap::new(),
        }
    }
}

/// Token budget for one scope.
pub struct TokenBudget {
    pub max_tokens: u32,
    used: AtomicU32,
}

impl TokenBudget {
    pub fn new(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            used: AtomicU32::new(0),
        }
    }

    pub fn can_afford(&self, tokens: u32) -> bool {
        self.remaining() >= tokens
    }

    pub fn record(&self, tokens: u32) {
        self.used.fetch_add(tokens, Ordering::SeqCst);
    }

    /// Claim `tokens` if they fit under the ceiling. Check and claim are a
    /// single atomic step.
    pub fn try_reserve(&self, tokens: u32) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                used.checked_add(tokens).filter(|total| *total <= self.max_tokens)
            })
            .is_ok()
    }

    /// Return previously claimed tokens.
    pub fn release(&self, tokens: u32) {
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                Some(used.saturating_sub(tokens))
            });
    }

    pub fn remaining(&self) -> u32 {
        self.max_tokens.saturating_sub(self.used.load(Ordering::SeqCst))
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.used.store(0, Ordering::SeqCst);
    }
}

/// Accumulated AI usage for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub total_tokens: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,

    /// Number of completion calls made
    pub llm_calls: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl LlmUsage {
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total();
        self.llm_calls += 1;
        self.estimated_cost += Self::estimate_cost(usage, model);
    }

    fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
        // USD per million tokens (input, output)
        let (input_rate, output_rate) = match model {
            m if m.contains("gpt-4o-mini") => (0.15, 0.6),
            m if m.contains("gpt-4o") => (2.5, 10.0),
            m if m.contains("gpt-4-turbo") => (10.0, 30.0),
            m if m.contains("gpt-4") => (30.0, 60.0),
            m if m.contains("gpt-3.5") => (0.5, 1.5),
            _ => (30.0, 60.0),
        };

        let input_cost = (usage.prompt_tokens as f64 / 1_000_000.0) * input_rate;
        let output_cost = (usage.completion_tokens as f64 / 1_000_000.0) * output_rate;
        input_cost + output_cost
    }
}

/// Tokens held against the budgets for one in-flight call.
///
/// Dropping a reservation without [`commit`](Self::commit) releases it.
#[must_use = "a reservation is released as soon as it is dropped"]
pub struct BudgetReservation<'a> {
    tracker: &'a BudgetTracker,
    category: String,
    tokens: u32,
    committed: bool,
}

impl BudgetReservation<'_> {
    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    /// Replace the reserved estimate with the usage the provider reported.
    pub fn commit(mut self, usage: &TokenUsage, model: &str) {
        self.committed = true;
        self.tracker.settle(&self.category, self.tokens, usage.total());
        self.tracker.usage.write().add(usage, model);
    }
}

impl Drop for BudgetReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.tracker.release(&self.category, self.tokens);
        }
    }
}

/// Budget tracker for a run.
pub struct BudgetTracker {
    category_budgets: HashMap<String, TokenBudget>,
    global_budget: TokenBudget,
    usage: RwLock<LlmUsage>,
}

impl BudgetTracker {
    /// A tracker with only a global ceiling.
    pub fn new(global_max: u32) -> Self {
        Self::with_category_budgets(global_max, BTreeMap::new())
    }

    pub fn with_category_budgets(global_max: u32, budgets: BTreeMap<String, u32>) -> Self {
        let category_budgets = budgets
            .into_iter()
            .map(|(category, max)| (category, TokenBudget::new(max)))
            .collect();

        Self {
            category_budgets,
            global_budget: TokenBudget::new(global_max),
            usage: RwLock::new(LlmUsage::default()),
        }
    }

    pub fn from_config(config: &BudgetConfig) -> Self {
        Self::with_category_budgets(
            config.global_max_tokens,
            config.per_category_max_tokens.clone(),
        )
    }

    /// Whether a call for `category` estimated at `estimated_tokens` fits.
    pub fn can_afford(&self, category: &str, estimated_tokens: u32) -> bool {
        let category_ok = self
            .category_budgets
            .get(category)
            .map(|b| b.can_afford(estimated_tokens))
            .unwrap_or(true);

        category_ok && self.global_budget.can_afford(estimated_tokens)
    }

    /// Reserve `estimated_tokens` for a call in `category`, or `None` if the
    /// category or global ceiling would be exceeded.
    pub fn try_reserve(
        &self,
        category: &str,
        estimated_tokens: u32,
    ) -> Option<BudgetReservation<'_>> {
        let category_budget = self.category_budgets.get(category);
        if let Some(budget) = category_budget {
            if !budget.try_reserve(estimated_tokens) {
                return None;
            }
        }

        if !self.global_budget.try_reserve(estimated_tokens) {
            if let Some(budget) = category_budget {
                budget.release(estimated_tokens);
            }
            return None;
        }

        Some(BudgetReservation {
            tracker: self,
            category: category.to_string(),
            tokens: estimated_tokens,
            committed: false,
        })
    }

    fn settle(&self, category: &str, reserved: u32, actual: u32) {
        let settle_one = |budget: &TokenBudget| {
            if actual >= reserved {
                budget.record(actual - reserved);
            } else {
                budget.release(reserved - actual);
            }
        };

        if let Some(budget) = self.category_budgets.get(category) {
            settle_one(budget);
        }
        settle_one(&self.global_budget);
    }

    fn release(&self, category: &str, tokens: u32) {
        if let Some(budget) = self.category_budgets.get(category) {
            budget.release(tokens);
        }
        self.global_budget.release(tokens);
    }

    pub fn record_usage(&self, category: &str, usage: &TokenUsage, model: &str) {
        let total = usage.total();

        if let Some(budget) = self.category_budgets.get(category) {
            budget.record(total);
        }
        self.global_budget.record(total);
        self.usage.write().add(usage, model);
    }

    pub fn usage(&self) -> LlmUsage {
        self.usage.read().clone()
    }

    pub fn remaining_global(&self) -> u32 {
        self.global_budget.remaining()
    }

    /// Remaining tokens for a category with its own ceiling.
    pub fn remaining_category(&self, category: &str) -> Option<u32> {
        self.category_budgets.get(category).map(|b| b.remaining())
    }

    pub fn reset(&self) {
        for budget in self.category_budgets.values() {
            budget.reset();
        }
        self.global_budget.reset();
        *self.usage.write() = LlmUsage::default();
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::from_config(&BudgetConfig::default())
    }
}
