//! Shared identifiers used across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of external provider a source adapter wraps.
///
/// Categories restrict which kinds apply to them; market-flavored kinds are
/// typically reserved for economic categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// General web search
    WebSearch,
    /// News search
    News,
    /// Equity index / market data
    MarketData,
    /// Currency exchange rates
    FxRate,
}

impl SourceKind {
    /// All source kinds in declaration order.
    pub const ALL: [SourceKind; 4] = [
        SourceKind::WebSearch,
        SourceKind::News,
        SourceKind::MarketData,
        SourceKind::FxRate,
    ];

    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::WebSearch => "web_search",
            SourceKind::News => "news",
            SourceKind::MarketData => "market_data",
            SourceKind::FxRate => "fx_rate",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (category, country) unit of work.
///
/// Ordering is lexical and only used for map keys; canonical report order
/// comes from the matrix declaration, not from this `Ord`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub category: String,
    pub country: String,
}

impl PairKey {
    pub fn new(category: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            country: country.into(),
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.country)
    }
}
