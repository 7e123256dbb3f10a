//! # georisk-core
//!
//! Data model for geopolitical risk assessment runs.
//!
//! This crate owns everything that does not touch the network:
//! - the risk matrix (categories x countries) and its schema
//! - evidence bundles and their size limits
//! - assessments with their score/status invariants
//! - canonical report assembly
//!
//! ## Example
//!
//! ```rust,ignore
//! use georisk_core::{ReportAssembler, RiskMatrix};
//!
//! let matrix = RiskMatrix::from_file("matrix.yaml")?;
//! let mut assembler = ReportAssembler::new(&matrix);
//! // ... accept one RiskAssessment per pair, in any order ...
//! let report = assembler.finish()?;
//! for row in report.rows() {
//!     println!("{} {} {}", row.serial_number, row.country, row.score);
//! }
//! ```

pub mod assessment;
pub mod evidence;
pub mod matrix;
pub mod report;
pub mod types;

pub use assessment::{
    AssessmentStatus, FailureKind, RiskAssessment, RiskScore, Score, ScoreOutOfRange,
    UNSCORED_LABEL,
};
pub use evidence::{normalize_text, truncate_chars, BundleBuilder, Evidence, EvidenceBundle, EvidenceLimits};
pub use matrix::{
    validate_matrix_schema, Country, MatrixError, QueryTemplate, RiskCategory, RiskMatrix,
    DEFAULT_QUERY_TEMPLATE,
};
pub use report::{
    AssemblyError, Report, ReportAssembler, ReportRow, ReportSummary, DEFAULT_DESCRIPTION_CHARS,
};
pub use types::{PairKey, SourceKind};
