//! Evidence aggregation across source adapters.
//!
//! For one (category, country) pair the aggregator queries every adapter the
//! category uses, concurrently, and folds the results into a bounded
//! [`EvidenceBundle`]. A failing adapter is recorded in the bundle and never
//! aborts the others; a bundle is produced even when every adapter failed.

use futures::future::join_all;
use georisk_core::{BundleBuilder, EvidenceBundle, EvidenceLimits, PairKey, RiskCategory, RiskMatrix};
use std::sync::Arc;
use thiserror::Error;

use crate::sources::{QuerySpec, SourceAdapter};

/// The requested pair does not exist in the matrix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Country '{country}' is not listed for category '{category}'")]
    CountryNotInCategory { category: String, country: String },
}

/// Fans a pair out to its applicable sources.
pub struct EvidenceAggregator {
    sources: Vec<Arc<dyn SourceAdapter>>,
    limits: EvidenceLimits,
}

impl EvidenceAggregator {
    /// Sources are queried, and their evidence ordered, in the given order.
    pub fn new(sources: Vec<Arc<dyn SourceAdapter>>, limits: EvidenceLimits) -> Self {
        Self { sources, limits }
    }

    pub fn sources(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.sources
    }

    pub fn limits(&self) -> &EvidenceLimits {
        &self.limits
    }

    /// Sources whose kind the category uses.
    pub fn applicable<'a>(
        &'a self,
        category: &'a RiskCategory,
    ) -> impl Iterator<Item = &'a Arc<dyn SourceAdapter>> + 'a {
        self.sources
            .iter()
            .filter(move |source| category.uses_source(source.kind()))
    }

    /// Gather evidence for a pair addressed by key.
    pub async fn gather_pair(
        &self,
        matrix: &RiskMatrix,
        key: &PairKey,
    ) -> Result<EvidenceBundle, AggregationError> {
        let category = matrix
            .category(&key.category)
            .ok_or_else(|| AggregationError::UnknownCategory(key.category.clone()))?;
        self.gather(category, &key.country).await
    }

    /// Gather evidence for one of `category`'s countries.
    pub async fn gather(
        &self,
        category: &RiskCategory,
        country_id: &str,
    ) -> Result<EvidenceBundle, AggregationError> {
        let country =
            category
                .country(country_id)
                .ok_or_else(|| AggregationError::CountryNotInCategory {
                    category: category.id.clone(),
                    country: country_id.to_string(),
                })?;

        let query = QuerySpec::new(category, country);
        let applicable: Vec<_> = self.applicable(category).collect();

        tracing::debug!(
            category = %category.id,
            country = %country.id,
            sources = applicable.len(),
            "Gathering evidence"
        );

        let results = join_all(applicable.iter().map(|source| {
            let query = &query;
            async move { (source.id(), source.fetch(query).await) }
        }))
        .await;

        let mut builder = BundleBuilder::new(&category.id, &country.id, self.limits);
        for (source_id, result) in results {
            match result {
                Ok(items) => builder.add_success(source_id, items),
                Err(e) => {
                    tracing::warn!(
                        category = %category.id,
                        country = %country.id,
                        source = source_id,
                        error = %e,
                        "Source unavailable"
                    );
                    builder.add_failure(source_id, e.to_string());
                }
            }
        }

        let bundle = builder.build();
        if bundle.all_sources_failed() {
            tracing::warn!(
                category = %category.id,
                country = %country.id,
                "Every source failed, scoring without evidence"
            );
        }
        Ok(bundle)
    }
}

impl std::fmt::Debug for EvidenceAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvidenceAggregator")
            .field(
                "sources",
                &self.sources.iter().map(|s| s.id()).collect::<Vec<_>>(),
            )
            .field("limits", &self.limits)
            .finish()
    }
}
