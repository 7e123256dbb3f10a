//! Strict parsing of scoring responses.
//!
//! A response is accepted when it contains a JSON object with an integral
//! `score` in 0-10, either bare, inside a code fence, or embedded in prose.
//! Without any JSON object, a textual `score: N` or `N/10` pattern is
//! accepted and the whole text becomes the explanation. Anything else is
//! rejected with a reason suitable for a re-prompt.

use georisk_core::{normalize_text, RiskScore};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as JsonValue;

lazy_static! {
    static ref SCORE_PATTERN: Regex =
        Regex::new(r"(?i)\bscore\b\s*(?:is|of)?\s*[:=]?\s*(-?\d+(?:\.\d+)?)(?:\s*/\s*10)?")
            .expect("static regex is valid");
    static ref OUT_OF_TEN_PATTERN: Regex =
        Regex::new(r"(-?\d+(?:\.\d+)?)\s*/\s*10\b").expect("static regex is valid");
}

const MISSING_EXPLANATION: &str = "No explanation provided";

/// A validated scoring response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedScore {
    pub score: RiskScore,
    pub explanation: String,
    pub key_indicators: Vec<String>,
}

/// Parse and validate a model response. The error is the rejection reason.
pub fn parse_response(text: &str) -> Result<ParsedScore, String> {
    if let Some(object) = extract_json_object(text) {
        return parse_object(&object);
    }

    parse_text(text)
}

/// Find the first JSON object in `text`: the whole text, a fenced block, or
/// the span from the first `{` to the last `}`.
fn extract_json_object(text: &str) -> Option<serde_json::Map<String, JsonValue>> {
    let trimmed = text.trim();

    let mut candidates = vec![trimmed];
    if let Some(fenced) = fenced_block(trimmed) {
        candidates.push(fenced);
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            candidates.push(&trimmed[start..=end]);
        }
    }

    candidates
        .into_iter()
        .find_map(|candidate| match serde_json::from_str::<JsonValue>(candidate) {
            Ok(JsonValue::Object(map)) => Some(map),
            _ => None,
        })
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")? + 3;
    let rest = &text[start..];
    // skip an info string such as "json"
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &rest[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn parse_object(object: &serde_json::Map<String, JsonValue>) -> Result<ParsedScore, String> {
    let raw = object
        .get("score")
        .ok_or_else(|| "response JSON has no \"score\" field".to_string())?;
    let score = score_from_json(raw)?;

    let explanation = ["explanation", "reasoning", "description", "rationale"]
        .iter()
        .find_map(|key| object.get(*key).and_then(JsonValue::as_str))
        .map(normalize_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| MISSING_EXPLANATION.to_string());

    let key_indicators = object
        .get("key_indicators")
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(JsonValue::as_str)
                .map(normalize_text)
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(ParsedScore {
        score,
        explanation,
        key_indicators,
    })
}

fn score_from_json(value: &JsonValue) -> Result<RiskScore, String> {
    match value {
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => validate(i),
            None => n
                .as_f64()
                .map(score_from_float)
                .unwrap_or_else(|| Err(format!("score {} is not a number", n))),
        },
        JsonValue::String(s) => score_from_str(s.trim().trim_end_matches("/10").trim()),
        other => Err(format!("score {} is not a number", other)),
    }
}

fn score_from_str(s: &str) -> Result<RiskScore, String> {
    if let Ok(i) = s.parse::<i64>() {
        return validate(i);
    }
    match s.parse::<f64>() {
        Ok(f) => score_from_float(f),
        Err(_) => Err(format!("score \"{}\" is not a number", s)),
    }
}

fn score_from_float(f: f64) -> Result<RiskScore, String> {
    if !f.is_finite() || f.fract() != 0.0 {
        return Err(format!("score {} is not a whole number", f));
    }
    validate(f as i64)
}

fn validate(value: i64) -> Result<RiskScore, String> {
    RiskScore::new(value).map_err(|e| e.to_string())
}

fn parse_text(text: &str) -> Result<ParsedScore, String> {
    let captured = SCORE_PATTERN
        .captures(text)
        .or_else(|| OUT_OF_TEN_PATTERN.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| "no score found in response".to_string())?;

    let explanation = normalize_text(text);
    Ok(ParsedScore {
        score: score_from_str(captured)?,
        explanation: if explanation.is_empty() {
            MISSING_EXPLANATION.to_string()
        } else {
            explanation
        },
        key_indicators: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bare_json() {
        let parsed = parse_response(
            r#"{"score": 7, "explanation": "Escalating  tariffs.", "key_indicators": ["steel duties", 3, ""]}"#,
        )
        .unwrap();
        assert_eq!(parsed.score.value(), 7);
        assert_eq!(parsed.explanation, "Escalating tariffs.");
        assert_eq!(parsed.key_indicators, vec!["steel duties"]);
    }

    #[test]
    fn test_fenced_json() {
        let text = "Here is my assessment:\n```json\n{\"score\": 3, \"explanation\": \"Stable.\"}\n```\nThanks.";
        let parsed = parse_response(text).unwrap();
        assert_eq!(parsed.score.value(), 3);
        assert_eq!(parsed.explanation, "Stable.");
    }

    #[test]
    fn test_embedded_json() {
        let text = "Assessment follows {\"score\": \"5\", \"reasoning\": \"Mixed signals.\"} end";
        let parsed = parse_response(text).unwrap();
        assert_eq!(parsed.score.value(), 5);
        assert_eq!(parsed.explanation, "Mixed signals.");
    }

    #[test]
    fn test_missing_explanation_defaults() {
        let parsed = parse_response(r#"{"score": 0}"#).unwrap();
        assert_eq!(parsed.explanation, MISSING_EXPLANATION);
        assert!(parsed.key_indicators.is_empty());
    }

    #[test]
    fn test_integral_float_accepted() {
        assert_eq!(parse_response(r#"{"score": 6.0}"#).unwrap().score.value(), 6);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = parse_response(r#"{"score": 12, "explanation": "x"}"#).unwrap_err();
        assert!(err.contains("12"), "{}", err);
        assert!(parse_response(r#"{"score": -1}"#).is_err());
    }

    #[test]
    fn test_fractional_rejected() {
        let err = parse_response(r#"{"score": 6.5}"#).unwrap_err();
        assert!(err.contains("whole number"), "{}", err);
    }

    #[test]
    fn test_json_without_score_rejected() {
        let err = parse_response(r#"{"explanation": "no number"}"#).unwrap_err();
        assert!(err.contains("\"score\""));
    }

    #[test]
    fn test_text_fallback() {
        let parsed = parse_response("Risk Score: 8/10. Conflict is intensifying.").unwrap();
        assert_eq!(parsed.score.value(), 8);
        assert_eq!(parsed.explanation, "Risk Score: 8/10. Conflict is intensifying.");

        let parsed = parse_response("I would rate this 4/10 overall.").unwrap();
        assert_eq!(parsed.score.value(), 4);
    }

    #[test]
    fn test_text_fallback_validates() {
        assert!(parse_response("score: 11").is_err());
        assert!(parse_response("score: 7.5").is_err());
    }

    #[test]
    fn test_unparseable() {
        let err = parse_response("I cannot assess this.").unwrap_err();
        assert_eq!(err, "no score found in response");
        assert!(parse_response("").is_err());
    }

    proptest! {
        #[test]
        fn prop_valid_scores_accepted(score in 0i64..=10) {
            let parsed = parse_response(&format!("{{\"score\": {}, \"explanation\": \"e\"}}", score)).unwrap();
            prop_assert_eq!(parsed.score.value() as i64, score);
        }

        #[test]
        fn prop_out_of_range_rejected(score in prop_oneof![-1000i64..0, 11i64..1000]) {
            let text = format!("{{\"score\": {}}}", score);
            prop_assert!(parse_response(&text).is_err());
        }
    }
}
