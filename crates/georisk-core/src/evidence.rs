//! Evidence gathered from external sources.
//!
//! Every assessment is backed by an [`EvidenceBundle`]: the normalized
//! snippets retrieved for one (category, country) pair plus a record of which
//! sources failed. A bundle always exists, even when every source failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

/// A single normalized snippet of external information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    /// Identifier of the source adapter that produced this item
    pub source: String,

    /// Retrieved text
    pub text: String,

    /// When the item was retrieved
    pub retrieved_at: DateTime<Utc>,

    /// Link back to the original document, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Structured numeric indicators (e.g., "volatility_pct" for market data)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, f64>,
}

impl Evidence {
    /// Create evidence retrieved now.
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
            retrieved_at: Utc::now(),
            url: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn retrieved_at(mut self, at: DateTime<Utc>) -> Self {
        self.retrieved_at = at;
        self
    }
}

/// Bounds applied while building a bundle, to keep scoring prompts small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceLimits {
    /// Maximum characters kept from a single snippet
    pub max_snippet_chars: usize,

    /// Maximum characters across all snippets in a bundle
    pub max_bundle_chars: usize,

    /// Maximum items kept from any one source
    pub max_items_per_source: usize,
}

impl Default for EvidenceLimits {
    fn default() -> Self {
        Self {
            max_snippet_chars: 1000,
            max_bundle_chars: 6000,
            max_items_per_source: 3,
        }
    }
}

/// Trim and collapse all whitespace runs to a single space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` to at most `max_chars` characters (not bytes).
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// Ordered evidence for one (category, country) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceBundle {
    pub category: String,
    pub country: String,

    /// Evidence in source order, then retrieval order
    pub evidence: Vec<Evidence>,

    /// Sources that were queried, in query order
    pub queried: Vec<String>,

    /// Failure reason per failed source
    pub failures: BTreeMap<String, String>,
}

impl EvidenceBundle {
    /// An empty bundle with no sources queried.
    pub fn empty(category: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            country: country.into(),
            evidence: Vec::new(),
            queried: Vec::new(),
            failures: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.evidence.is_empty()
    }

    pub fn len(&self) -> usize {
        self.evidence.len()
    }

    /// Whether any queried source failed.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Whether sources were queried and every one of them failed.
    pub fn all_sources_failed(&self) -> bool {
        !self.queried.is_empty() && self.failures.len() == self.queried.len()
    }

    pub fn failed_sources(&self) -> impl Iterator<Item = &str> {
        self.failures.keys().map(|s| s.as_str())
    }

    /// Total characters of evidence text.
    pub fn total_chars(&self) -> usize {
        self.evidence.iter().map(|e| e.text.chars().count()).sum()
    }

    /// Render the evidence as a numbered list for a scoring prompt.
    pub fn render(&self) -> String {
        if self.evidence.is_empty() {
            return "No evidence could be retrieved from any source.".to_string();
        }

        let mut out = String::new();
        for (i, item) in self.evidence.iter().enumerate() {
            let _ = write!(out, "[{}] ({}) {}", i + 1, item.source, item.text);
            if !item.fields.is_empty() {
                let fields = item
                    .fields
                    .iter()
                    .map(|(k, v)| format!("{}={:.4}", k, v))
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = write!(out, " [{}]", fields);
            }
            out.push('\n');
        }
        out
    }
}

/// Incrementally builds a bounded, normalized [`EvidenceBundle`].
///
/// Source results must be fed in a stable order for the bundle to be
/// reproducible; later sources are the first to be cut when the bundle
/// character budget runs out.
pub struct BundleBuilder {
    bundle: EvidenceBundle,
    limits: EvidenceLimits,
    used_chars: usize,
    seen: HashSet<String>,
}

impl BundleBuilder {
    pub fn new(category: impl Into<String>, country: impl Into<String>, limits: EvidenceLimits) -> Self {
        Self {
            bundle: EvidenceBundle::empty(category, country),
            limits,
            used_chars: 0,
            seen: HashSet::new(),
        }
    }

    /// Record a failed source.
    pub fn add_failure(&mut self, source: impl Into<String>, reason: impl Into<String>) {
        let source = source.into();
        self.bundle.queried.push(source.clone());
        self.bundle.failures.insert(source, reason.into());
    }

    /// Add the items returned by a successful source.
    ///
    /// Items are normalized, empty and duplicate texts dropped, then capped by
    /// the per-snippet, per-source and per-bundle limits.
    pub fn add_success(&mut self, source: impl Into<String>, items: Vec<Evidence>) {
        let source = source.into();
        self.bundle.queried.push(source.clone());

        let mut kept = 0;
        for mut item in items {
            if kept >= self.limits.max_items_per_source {
                break;
            }

            let remaining = self.limits.max_bundle_chars.saturating_sub(self.used_chars);
            if remaining == 0 {
                break;
            }

            let normalized = normalize_text(&item.text);
            if normalized.is_empty() || !self.seen.insert(normalized.clone()) {
                continue;
            }

            let text = truncate_chars(&normalized, self.limits.max_snippet_chars.min(remaining));
            if text.is_empty() {
                continue;
            }

            self.used_chars += text.chars().count();
            item.text = text;
            item.source = source.clone();
            self.bundle.evidence.push(item);
            kept += 1;
        }
    }

    pub fn build(self) -> EvidenceBundle {
        self.bundle
    }
}
