//! Tavily web search, restricted to major financial and news outlets.

use async_trait::async_trait;
use georisk_core::{Evidence, SourceKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::http::{build_client, send_json};
use super::{QuerySpec, SourceAdapter, SourceError};
use crate::config::SourceSettings;
use crate::secrets::ApiCredential;

/// Environment variable name for the Tavily API key.
pub const TAVILY_API_KEY_ENV: &str = "TAVILY_API_KEY";

/// Domains searched by default.
pub const TRUSTED_DOMAINS: [&str; 5] = [
    "reuters.com",
    "bloomberg.com",
    "ft.com",
    "wsj.com",
    "economist.com",
];

const DEFAULT_ENDPOINT: &str = "https://api.tavily.com/search";

pub struct TavilyAdapter {
    credential: ApiCredential,
    client: reqwest::Client,
    endpoint: String,
    max_results: usize,
    timeout: Duration,
}

impl TavilyAdapter {
    pub fn new(credential: ApiCredential, settings: &SourceSettings) -> Result<Self, SourceError> {
        Ok(Self {
            credential,
            client: build_client(settings.timeout)?,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_results: settings.max_results,
            timeout: settings.timeout,
        })
    }

    pub fn from_env(settings: &SourceSettings) -> Result<Self, SourceError> {
        let credential = ApiCredential::from_env(TAVILY_API_KEY_ENV, "Tavily API key")?;
        Self::new(credential, settings)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl std::fmt::Debug for TavilyAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TavilyAdapter")
            .field("credential", &self.credential)
            .field("endpoint", &self.endpoint)
            .field("max_results", &self.max_results)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'static str,
    include_answer: bool,
    include_raw_content: bool,
    max_results: usize,
    include_domains: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: Option<f64>,
}

impl SearchResponse {
    fn into_evidence(self, source_id: &str) -> Vec<Evidence> {
        self.results
            .into_iter()
            .filter(|r| !r.content.trim().is_empty())
            .map(|r| {
                let text = if r.title.trim().is_empty() {
                    r.content
                } else {
                    format!("{}: {}", r.title.trim(), r.content)
                };
                let mut evidence = Evidence::new(source_id, text);
                if let Some(url) = r.url {
                    evidence = evidence.with_url(url);
                }
                if let Some(score) = r.score {
                    evidence = evidence.with_field("relevance", score);
                }
                evidence
            })
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for TavilyAdapter {
    fn id(&self) -> &str {
        "tavily"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::WebSearch
    }

    async fn fetch(&self, query: &QuerySpec) -> Result<Vec<Evidence>, SourceError> {
        let body = SearchRequest {
            api_key: self.credential.expose(),
            query: &query.query,
            search_depth: "advanced",
            include_answer: true,
            include_raw_content: false,
            max_results: self.max_results,
            include_domains: &TRUSTED_DOMAINS,
        };

        let response: SearchResponse =
            send_json(self.client.post(&self.endpoint).json(&body), self.timeout).await?;

        let evidence = response.into_evidence(self.id());
        tracing::debug!(
            source = self.id(),
            query = %query.query,
            results = evidence.len(),
            "Web search complete"
        );
        Ok(evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::CredentialSource;

    #[test]
    fn test_request_shape() {
        let body = SearchRequest {
            api_key: "k",
            query: "Trade War Germany latest news analysis",
            search_depth: "advanced",
            include_answer: true,
            include_raw_content: false,
            max_results: 5,
            include_domains: &TRUSTED_DOMAINS,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["search_depth"], "advanced");
        assert_eq!(json["include_domains"][0], "reuters.com");
        assert_eq!(json["max_results"], 5);
    }

    #[test]
    fn test_results_become_evidence() {
        let response: SearchResponse = serde_json::from_value(serde_json::json!({
            "answer": "ignored",
            "results": [
                { "title": "Tariffs rise", "url": "https://reuters.com/a", "content": "New duties announced.", "score": 0.91 },
                { "title": "Empty", "url": "https://ft.com/b", "content": "   " },
                { "url": "https://wsj.com/c", "content": "Untitled body." }
            ]
        }))
        .unwrap();

        let evidence = response.into_evidence("tavily");
        assert_eq!(evidence.len(), 2);
        assert_eq!(evidence[0].text, "Tariffs rise: New duties announced.");
        assert_eq!(evidence[0].url.as_deref(), Some("https://reuters.com/a"));
        assert_eq!(evidence[0].fields.get("relevance"), Some(&0.91));
        assert_eq!(evidence[1].text, "Untitled body.");
        assert_eq!(evidence[1].source, "tavily");
    }

    #[test]
    fn test_missing_results_is_empty() {
        let response: SearchResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(response.into_evidence("tavily").is_empty());
    }

    #[test]
    fn test_key_not_in_debug_output() {
        let credential = ApiCredential::new("tvly-secret", CredentialSource::Programmatic, "Tavily API key");
        let adapter = TavilyAdapter::new(credential, &SourceSettings::default()).unwrap();
        assert!(!format!("{:?}", adapter).contains("tvly-secret"));
    }
}
