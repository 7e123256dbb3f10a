//! Risk assessments and their status invariants.
//!
//! - `Ok` always carries a score in `0..=10`
//! - `ScoringFailed` always carries the unscored sentinel
//! - `PartialEvidence` carries a valid score obtained from incomplete evidence

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::types::PairKey;

/// Text used for the unscored sentinel in reports.
pub const UNSCORED_LABEL: &str = "N/A";

/// Score outside `0..=10`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Risk score {0} is outside 0-10")]
pub struct ScoreOutOfRange(pub i64);

/// An integer risk score in `0..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RiskScore(u8);

impl RiskScore {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 10;

    pub fn new(value: i64) -> Result<Self, ScoreOutOfRange> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ScoreOutOfRange(value))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for RiskScore {
    type Error = ScoreOutOfRange;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for RiskScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A risk score or the explicit "unscored" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Value(RiskScore),
    Unscored,
}

impl Score {
    pub fn is_scored(&self) -> bool {
        matches!(self, Score::Value(_))
    }

    pub fn value(&self) -> Option<u8> {
        match self {
            Score::Value(s) => Some(s.value()),
            Score::Unscored => None,
        }
    }
}

impl From<Option<RiskScore>> for Score {
    fn from(score: Option<RiskScore>) -> Self {
        score.map(Score::Value).unwrap_or(Score::Unscored)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Value(s) => write!(f, "{}", s),
            Score::Unscored => f.write_str(UNSCORED_LABEL),
        }
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Score::Value(s) => serializer.serialize_u8(s.value()),
            Score::Unscored => serializer.serialize_str(UNSCORED_LABEL),
        }
    }
}

struct ScoreVisitor;

impl<'de> Visitor<'de> for ScoreVisitor {
    type Value = Score;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an integer 0-10 or \"{}\"", UNSCORED_LABEL)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Score, E> {
        RiskScore::new(v).map(Score::Value).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Score, E> {
        let v = i64::try_from(v).map_err(E::custom)?;
        self.visit_i64(v)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Score, E> {
        if v.fract() != 0.0 {
            return Err(E::custom(format!("score {} is not an integer", v)));
        }
        self.visit_i64(v as i64)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Score, E> {
        let v = v.trim();
        if v.eq_ignore_ascii_case(UNSCORED_LABEL) || v.is_empty() {
            return Ok(Score::Unscored);
        }
        let n: i64 = v.parse().map_err(E::custom)?;
        self.visit_i64(n)
    }

    fn visit_none<E: de::Error>(self) -> Result<Score, E> {
        Ok(Score::Unscored)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Score, E> {
        Ok(Score::Unscored)
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ScoreVisitor)
    }
}

/// Final status of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    /// Scored with evidence from every applicable source
    Ok,
    /// Scored (or attempted) with incomplete or absent evidence
    PartialEvidence,
    /// No valid score could be obtained
    ScoringFailed,
}

impl fmt::Display for AssessmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssessmentStatus::Ok => "ok",
            AssessmentStatus::PartialEvidence => "partial_evidence",
            AssessmentStatus::ScoringFailed => "scoring_failed",
        };
        f.write_str(s)
    }
}

/// Why a pair ended without a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The model kept returning unparsable or out-of-range output
    ScoringInvalid,
    /// The model could not be reached
    ScoringUnavailable,
    /// The AI token budget was exhausted
    BudgetExceeded,
    /// The pair itself was malformed
    AggregationFailed,
    /// The run was cancelled before the pair finished
    Cancelled,
    /// Unexpected failure while processing the pair
    Internal,
}

/// The outcome for one (category, country) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    category: String,
    country: String,
    score: Score,
    description: String,
    status: AssessmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    key_indicators: Vec<String>,
    evidence_count: usize,
    attempts: u32,
}

impl RiskAssessment {
    /// A fully evidenced, validly scored pair.
    pub fn ok(key: PairKey, score: RiskScore, description: impl Into<String>) -> Self {
        Self::build(key, Score::Value(score), description, AssessmentStatus::Ok, None)
    }

    /// A pair scored with incomplete or absent evidence.
    pub fn partial(key: PairKey, score: RiskScore, description: impl Into<String>) -> Self {
        Self::build(
            key,
            Score::Value(score),
            description,
            AssessmentStatus::PartialEvidence,
            None,
        )
    }

    /// A pair without a score.
    pub fn failed(key: PairKey, kind: FailureKind, description: impl Into<String>) -> Self {
        Self::build(
            key,
            Score::Unscored,
            description,
            AssessmentStatus::ScoringFailed,
            Some(kind),
        )
    }

    /// A pair cut short by run cancellation.
    pub fn cancelled(key: PairKey) -> Self {
        Self::failed(
            key,
            FailureKind::Cancelled,
            "Assessment cancelled before completion",
        )
    }

    fn build(
        key: PairKey,
        score: Score,
        description: impl Into<String>,
        status: AssessmentStatus,
        failure: Option<FailureKind>,
    ) -> Self {
        Self {
            category: key.category,
            country: key.country,
            score,
            description: description.into(),
            status,
            failure,
            key_indicators: Vec::new(),
            evidence_count: 0,
            attempts: 0,
        }
    }

    pub fn with_key_indicators(mut self, indicators: Vec<String>) -> Self {
        self.key_indicators = indicators;
        self
    }

    pub fn with_evidence_count(mut self, count: usize) -> Self {
        self.evidence_count = count;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(&self.category, &self.country)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> AssessmentStatus {
        self.status
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    pub fn key_indicators(&self) -> &[String] {
        &self.key_indicators
    }

    pub fn evidence_count(&self) -> usize {
        self.evidence_count
    }

    /// Number of scoring calls made for this pair.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> PairKey {
        PairKey::new("A", "X")
    }

    #[test]
    fn test_risk_score_range() {
        assert_eq!(RiskScore::new(0).unwrap().value(), 0);
        assert_eq!(RiskScore::new(10).unwrap().value(), 10);
        assert_eq!(RiskScore::new(11), Err(ScoreOutOfRange(11)));
        assert!(RiskScore::try_from(-1).is_err());
    }

    #[test]
    fn test_status_invariants() {
        let ok = RiskAssessment::ok(key(), RiskScore::new(3).unwrap(), "stable");
        assert_eq!(ok.status(), AssessmentStatus::Ok);
        assert_eq!(ok.score().value(), Some(3));
        assert!(ok.failure().is_none());

        let failed = RiskAssessment::failed(key(), FailureKind::ScoringInvalid, "bad output");
        assert_eq!(failed.status(), AssessmentStatus::ScoringFailed);
        assert_eq!(failed.score(), Score::Unscored);

        let partial = RiskAssessment::partial(key(), RiskScore::new(6).unwrap(), "thin");
        assert_eq!(partial.status(), AssessmentStatus::PartialEvidence);
        assert!(partial.score().is_scored());
    }

    #[test]
    fn test_cancelled_assessment() {
        let cancelled = RiskAssessment::cancelled(key());
        assert_eq!(cancelled.failure(), Some(FailureKind::Cancelled));
        assert_eq!(cancelled.score(), Score::Unscored);
        assert!(cancelled.description().contains("cancelled"));
    }

    #[test]
    fn test_score_serialization() {
        let scored = Score::Value(RiskScore::new(7).unwrap());
        assert_eq!(serde_json::to_string(&scored).unwrap(), "7");
        assert_eq!(serde_json::to_string(&Score::Unscored).unwrap(), "\"N/A\"");
        assert_eq!(Score::Unscored.to_string(), "N/A");
    }

    #[test]
    fn test_score_deserialization() {
        let s: Score = serde_json::from_str("4").unwrap();
        assert_eq!(s.value(), Some(4));

        let s: Score = serde_json::from_str("\"N/A\"").unwrap();
        assert_eq!(s, Score::Unscored);

        let s: Score = serde_json::from_str("\"9\"").unwrap();
        assert_eq!(s.value(), Some(9));

        assert!(serde_json::from_str::<Score>("12").is_err());
        assert!(serde_json::from_str::<Score>("4.5").is_err());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&AssessmentStatus::PartialEvidence).unwrap();
        assert_eq!(json, "\"partial_evidence\"");
    }
}
