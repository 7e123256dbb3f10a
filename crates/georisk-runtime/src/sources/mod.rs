//! External data sources.
//!
//! Every provider sits behind [`SourceAdapter`]. Adapters return an empty
//! list for "no results" and a [`SourceError`] only when the provider could
//! not be used at all; the aggregator records such a failure against that
//! one source and carries on with the others.
//!
//! HTTP-backed adapters are feature-gated: `web-search` enables Tavily and
//! SerpAPI, `market-data` enables Yahoo Finance and Alpha Vantage.

use async_trait::async_trait;
use georisk_core::{Country, Evidence, RiskCategory, SourceKind};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::secrets::CredentialError;

mod guarded;

#[cfg(any(feature = "web-search", feature = "market-data"))]
mod http;

#[cfg(feature = "web-search")]
mod serpapi;
#[cfg(feature = "web-search")]
mod tavily;

#[cfg(feature = "market-data")]
mod alpha_vantage;
#[cfg(feature = "market-data")]
mod yahoo;

pub use guarded::{guard_all, GuardedSource};

#[cfg(feature = "web-search")]
pub use serpapi::{SerpApiNewsAdapter, SERPAPI_API_KEY_ENV};
#[cfg(feature = "web-search")]
pub use tavily::{TavilyAdapter, TAVILY_API_KEY_ENV, TRUSTED_DOMAINS};

#[cfg(feature = "market-data")]
pub use alpha_vantage::{AlphaVantageFxAdapter, ALPHA_VANTAGE_API_KEY_ENV};
#[cfg(feature = "market-data")]
pub use yahoo::{MarketSummary, YahooMarketAdapter};

/// Why a source could not be used.
///
/// To the pipeline every variant means "this source is unavailable for this
/// pair"; the distinction only drives retries and logging.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Authentication failed")]
    Auth,

    #[error("Rate limited by provider, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Source not configured: {0}")]
    NotConfigured(String),

    #[error("Circuit open, skipping source")]
    CircuitOpen,
}

impl SourceError {
    /// Whether the same request may succeed if retried shortly.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::RateLimited { .. } | SourceError::Unavailable(_) | SourceError::Timeout(_)
        )
    }

    /// Wait requested by the provider, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<CredentialError> for SourceError {
    fn from(err: CredentialError) -> Self {
        SourceError::NotConfigured(err.to_string())
    }
}

/// One lookup for one (category, country) pair.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub category_id: String,

    /// Category display name
    pub category_name: String,

    pub country: Arc<Country>,

    /// Search string rendered from the category's query template
    pub query: String,
}

impl QuerySpec {
    pub fn new(category: &RiskCategory, country: &Arc<Country>) -> Self {
        Self {
            category_id: category.id.clone(),
            category_name: category.name.clone(),
            country: Arc::clone(country),
            query: category.query_for(country),
        }
    }
}

/// Uniform capability over one external provider.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier, used for logs, circuit breaking and failure flags.
    fn id(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Retrieve evidence for a query. "No results" is `Ok(vec![])`.
    async fn fetch(&self, query: &QuerySpec) -> Result<Vec<Evidence>, SourceError>;

    /// What the adapter actually looks up for `query`; equal keys must yield
    /// equal results. Market sources key on symbol or currency rather than
    /// on the search text.
    fn lookup_key(&self, query: &QuerySpec) -> String {
        query.query.clone()
    }
}
