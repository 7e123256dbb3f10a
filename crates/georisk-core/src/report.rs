//! Report assembly.
//!
//! Assessments arrive in completion order; the [`ReportAssembler`] buffers
//! them and, once the run is finished, emits exactly one row per matrix pair
//! in canonical order with dense 1-based serial numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::assessment::{AssessmentStatus, RiskAssessment, Score};
use crate::evidence::truncate_chars;
use crate::matrix::RiskMatrix;
use crate::types::PairKey;

/// Default cap on the description column.
pub const DEFAULT_DESCRIPTION_CHARS: usize = 500;

/// Errors raised while assembling a report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("Assessment for {0} is not part of the matrix")]
    UnknownPair(PairKey),

    #[error("Duplicate assessment for {0}")]
    DuplicatePair(PairKey),

    #[error("Report incomplete: {} pair(s) without an assessment", .0.len())]
    Incomplete(Vec<PairKey>),
}

/// One row of the final report.
///
/// Field names map to the exported column headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    #[serde(rename = "Serial Number")]
    pub serial_number: usize,

    #[serde(rename = "Country")]
    pub country: String,

    #[serde(rename = "Risk Score (0-10)")]
    pub score: Score,

    #[serde(rename = "Category")]
    pub category: String,

    #[serde(rename = "Description")]
    pub description: String,
}

/// Row counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    pub ok: usize,
    pub partial_evidence: usize,
    pub scoring_failed: usize,
}

impl ReportSummary {
    /// Rows that carry a score.
    pub fn scored(&self) -> usize {
        self.total - self.scoring_failed
    }
}

/// The finished report: one row per pair, in canonical order.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,

    /// Category ids covered by this report, in declared order
    pub category_ids: Vec<String>,

    rows: Vec<ReportRow>,

    /// Assessments parallel to `rows`
    #[serde(skip)]
    assessments: Vec<RiskAssessment>,
}

impl Report {
    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn assessments(&self) -> &[RiskAssessment] {
        &self.assessments
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows paired with the assessment each was built from.
    pub fn iter(&self) -> impl Iterator<Item = (&ReportRow, &RiskAssessment)> {
        self.rows.iter().zip(self.assessments.iter())
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            total: self.assessments.len(),
            ..Default::default()
        };
        for assessment in &self.assessments {
            match assessment.status() {
                AssessmentStatus::Ok => summary.ok += 1,
                AssessmentStatus::PartialEvidence => summary.partial_evidence += 1,
                AssessmentStatus::ScoringFailed => summary.scoring_failed += 1,
            }
        }
        summary
    }
}

/// Display names for one expected pair.
#[derive(Debug, Clone)]
struct Slot {
    key: PairKey,
    category_name: String,
    country_name: String,
}

/// Collects assessments in any order and emits a canonical report.
pub struct ReportAssembler {
    slots: Vec<Slot>,
    index: HashMap<PairKey, usize>,
    received: HashMap<PairKey, RiskAssessment>,
    category_ids: Vec<String>,
    description_chars: usize,
}

impl ReportAssembler {
    /// An assembler expecting every pair of `matrix`.
    pub fn new(matrix: &RiskMatrix) -> Self {
        let slots: Vec<Slot> = matrix
            .pairs()
            .map(|(category, country)| Slot {
                key: PairKey::new(&category.id, &country.id),
                category_name: category.name.clone(),
                country_name: country.name.clone(),
            })
            .collect();

        let index = slots
            .iter()
            .enumerate()
            .map(|(i, slot)| (slot.key.clone(), i))
            .collect();

        Self {
            slots,
            index,
            received: HashMap::new(),
            category_ids: matrix.category_ids().iter().map(|s| s.to_string()).collect(),
            description_chars: DEFAULT_DESCRIPTION_CHARS,
        }
    }

    /// Override the description column cap.
    pub fn with_description_chars(mut self, max_chars: usize) -> Self {
        self.description_chars = max_chars;
        self
    }

    /// Buffer an assessment. Each pair is accepted exactly once.
    pub fn accept(&mut self, assessment: RiskAssessment) -> Result<(), AssemblyError> {
        let key = assessment.key();
        if !self.index.contains_key(&key) {
            return Err(AssemblyError::UnknownPair(key));
        }
        if self.received.contains_key(&key) {
            return Err(AssemblyError::DuplicatePair(key));
        }
        self.received.insert(key, assessment);
        Ok(())
    }

    pub fn expected(&self) -> usize {
        self.slots.len()
    }

    pub fn received(&self) -> usize {
        self.received.len()
    }

    pub fn is_complete(&self) -> bool {
        self.received.len() == self.slots.len()
    }

    /// Pairs still without an assessment, in canonical order.
    pub fn missing(&self) -> Vec<PairKey> {
        self.slots
            .iter()
            .filter(|slot| !self.received.contains_key(&slot.key))
            .map(|slot| slot.key.clone())
            .collect()
    }

    /// Emit the report, failing if any pair is missing.
    pub fn finish(self) -> Result<Report, AssemblyError> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(AssemblyError::Incomplete(missing));
        }
        Ok(self.finish_with(|key| RiskAssessment::cancelled(key.clone())))
    }

    /// Emit the report, filling any missing pair with `fill`.
    pub fn finish_with<F>(mut self, fill: F) -> Report
    where
        F: Fn(&PairKey) -> RiskAssessment,
    {
        let mut rows = Vec::with_capacity(self.slots.len());
        let mut assessments = Vec::with_capacity(self.slots.len());

        for (i, slot) in self.slots.iter().enumerate() {
            let assessment = self
                .received
                .remove(&slot.key)
                .unwrap_or_else(|| {
                    tracing::debug!(pair = %slot.key, "Filling missing assessment");
                    fill(&slot.key)
                });

            rows.push(ReportRow {
                serial_number: i + 1,
                country: slot.country_name.clone(),
                score: assessment.score(),
                category: slot.category_name.clone(),
                description: truncate_chars(assessment.description(), self.description_chars),
            });
            assessments.push(assessment);
        }

        Report {
            generated_at: Utc::now(),
            category_ids: self.category_ids,
            rows,
            assessments,
        }
    }
}
