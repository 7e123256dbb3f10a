//! Prompts for the risk scorer.
//!
//! The system prompt is fixed; the user prompt carries the category, the
//! country, the evidence bundle and, on a re-prompt, why the previous answer
//! was rejected.

use georisk_core::{Country, EvidenceBundle, RiskCategory};

/// System role for every scoring call.
pub const SYSTEM_PROMPT: &str =
    "You are a geopolitical risk analyst. Analyze the given information and provide a risk assessment.";

/// Response contract appended to every scoring prompt.
pub const RESPONSE_FORMAT: &str = r#"
Please provide:
1. A risk score from 0-10 where 0 is no risk and 10 is extreme risk
2. A brief explanation of the risk factors
3. Key indicators or events contributing to the risk

Format your response as a JSON object with the following structure:
{
    "score": <integer 0-10>,
    "explanation": "brief explanation",
    "key_indicators": ["indicator1", "indicator2"]
}

The score must be a whole number between 0 and 10 inclusive.
Respond with the JSON object only.
"#;

/// Used in place of evidence when no source returned anything.
pub const NO_EVIDENCE_NOTE: &str = "No current evidence could be retrieved for this assessment. \
Base the score on your general knowledge of the country and risk category, \
and state in the explanation that no current evidence was available.";

/// Build the user prompt for one pair.
///
/// `rejection` is the reason the previous response was rejected, if this is
/// a re-prompt.
pub fn build_scoring_prompt(
    category: &RiskCategory,
    country: &Country,
    bundle: &EvidenceBundle,
    rejection: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Analyze the {} risk for {} based on the following information.\n\n",
        category.name, country.name
    );

    if let Some(description) = &category.description {
        prompt.push_str(&format!("Risk category: {}\n\n", description));
    }

    if bundle.is_empty() {
        prompt.push_str(NO_EVIDENCE_NOTE);
        prompt.push('\n');
    } else {
        prompt.push_str("Evidence:\n");
        prompt.push_str(&bundle.render());
        prompt.push('\n');
    }

    let failed: Vec<&str> = bundle.failed_sources().collect();
    if !failed.is_empty() {
        prompt.push_str(&format!(
            "\nNote: these sources were unavailable and are not reflected above: {}\n",
            failed.join(", ")
        ));
    }

    prompt.push_str(RESPONSE_FORMAT);

    if let Some(reason) = rejection {
        prompt.push_str(&format!(
            "\nYour previous response was rejected: {}. \
             Reply again with a valid JSON object and an integer score from 0 to 10.\n",
            reason
        ));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use georisk_core::{BundleBuilder, Evidence, EvidenceLimits, RiskMatrix};

    fn matrix() -> RiskMatrix {
        RiskMatrix::from_yaml(
            r#"
countries:
  - { id: DE, name: Germany }
categories:
  - id: trade
    name: Trade War
    description: Tariff escalation between major economies.
    countries: [DE]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_prompt_includes_context_and_evidence() {
        let matrix = matrix();
        let category = matrix.category("trade").unwrap();
        let country = category.country("DE").unwrap();

        let mut builder = BundleBuilder::new("trade", "DE", EvidenceLimits::default());
        builder.add_success("tavily", vec![Evidence::new("tavily", "New tariffs on steel")]);
        builder.add_failure("serpapi", "Authentication failed");
        let bundle = builder.build();

        let prompt = build_scoring_prompt(category, country, &bundle, None);
        assert!(prompt.starts_with("Analyze the Trade War risk for Germany"));
        assert!(prompt.contains("Tariff escalation between major economies."));
        assert!(prompt.contains("New tariffs on steel"));
        assert!(prompt.contains("unavailable and are not reflected above: serpapi"));
        assert!(prompt.contains("\"key_indicators\""));
        assert!(!prompt.contains("previous response was rejected"));
    }

    #[test]
    fn test_empty_bundle_prompt() {
        let matrix = matrix();
        let category = matrix.category("trade").unwrap();
        let country = category.country("DE").unwrap();
        let bundle = EvidenceBundle::empty("trade", "DE");

        let prompt = build_scoring_prompt(category, country, &bundle, None);
        assert!(prompt.contains(NO_EVIDENCE_NOTE));
        assert!(!prompt.contains("Evidence:\n"));
    }

    #[test]
    fn test_reprompt_carries_rejection() {
        let matrix = matrix();
        let category = matrix.category("trade").unwrap();
        let country = category.country("DE").unwrap();
        let bundle = EvidenceBundle::empty("trade", "DE");

        let prompt = build_scoring_prompt(category, country, &bundle, Some("score 12 is outside 0-10"));
        assert!(prompt.contains("Your previous response was rejected: score 12 is outside 0-10."));
    }

    #[test]
    fn test_system_prompt_role() {
        assert!(SYSTEM_PROMPT.contains("geopolitical risk analyst"));
    }
}
