//! Google News results through SerpAPI.

use async_trait::async_trait;
use georisk_core::{Evidence, SourceKind};
use serde::Deserialize;
use std::time::Duration;

use super::http::{build_client, send_json};
use super::{QuerySpec, SourceAdapter, SourceError};
use crate::config::SourceSettings;
use crate::secrets::ApiCredential;

/// Environment variable name for the SerpAPI key.
pub const SERPAPI_API_KEY_ENV: &str = "SERPAPI_API_KEY";

const DEFAULT_ENDPOINT: &str = "https://serpapi.com/search";

// SerpAPI reports "no results" through the error field.
const NO_RESULTS_MARKER: &str = "hasn't returned any results";

pub struct SerpApiNewsAdapter {
    credential: ApiCredential,
    client: reqwest::Client,
    endpoint: String,
    max_results: usize,
    timeout: Duration,
}

impl SerpApiNewsAdapter {
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
        let credential = ApiCredential::from_env(SERPAPI_API_KEY_ENV, "SerpAPI key")?;
        Self::new(credential, settings)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl std::fmt::Debug for SerpApiNewsAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerpApiNewsAdapter")
            .field("credential", &self.credential)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    news_results: Vec<NewsResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    source: Option<NewsOutlet>,
    #[serde(default)]
    date: Option<String>,
}

/// Outlet appears either as a bare name or as `{ "name": ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NewsOutlet {
    Name(String),
    Detailed { name: String },
}

impl NewsOutlet {
    fn name(&self) -> &str {
        match self {
            NewsOutlet::Name(name) | NewsOutlet::Detailed { name } => name,
        }
    }
}

impl NewsResponse {
    fn into_evidence(self, source_id: &str) -> Result<Vec<Evidence>, SourceError> {
        if let Some(error) = self.error {
            if self.news_results.is_empty() {
                if error.contains(NO_RESULTS_MARKER) {
                    return Ok(Vec::new());
                }
                return Err(SourceError::Rejected(error));
            }
        }

        Ok(self
            .news_results
            .into_iter()
            .filter(|r| !r.title.trim().is_empty())
            .map(|r| {
                let mut header = r.title.trim().to_string();
                let attribution: Vec<&str> = [r.source.as_ref().map(NewsOutlet::name), r.date.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect();
                if !attribution.is_empty() {
                    header = format!("{} ({})", header, attribution.join(", "));
                }

                let text = match r.snippet.as_deref().map(str::trim) {
                    Some(snippet) if !snippet.is_empty() => format!("{}: {}", header, snippet),
                    _ => header,
                };

                let evidence = Evidence::new(source_id, text);
                match r.link {
                    Some(link) => evidence.with_url(link),
                    None => evidence,
                }
            })
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for SerpApiNewsAdapter {
    fn id(&self) -> &str {
        "serpapi"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::News
    }

    async fn fetch(&self, query: &QuerySpec) -> Result<Vec<Evidence>, SourceError> {
        let num = self.max_results.to_string();
        let request = self.client.get(&self.endpoint).query(&[
            ("q", query.query.as_str()),
            ("tbm", "nws"),
            ("num", num.as_str()),
            ("api_key", self.credential.expose()),
        ]);

        let response: NewsResponse = send_json(request, self.timeout).await?;
        let evidence = response.into_evidence(self.id())?;
        tracing::debug!(
            source = self.id(),
            query = %query.query,
            results = evidence.len(),
            "News search complete"
        );
        Ok(evidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_news_results_become_evidence() {
        let response: NewsResponse = serde_json::from_value(serde_json::json!({
            "news_results": [
                {
                    "title": "Sanctions widen",
                    "snippet": "EU adds new entities.",
                    "link": "https://example.com/1",
                    "source": "Reuters",
                    "date": "2 days ago"
                },
                {
                    "title": "Bond yields climb",
                    "source": { "name": "Financial Times" }
                },
                { "title": "  ", "snippet": "no title" }
            ]
        }))
        .unwrap();

        let evidence = response.into_evidence("serpapi").unwrap();
        assert_eq!(evidence.len(), 2);
        assert_eq!(
            evidence[0].text,
            "Sanctions widen (Reuters, 2 days ago): EU adds new entities."
        );
        assert_eq!(evidence[0].url.as_deref(), Some("https://example.com/1"));
        assert_eq!(evidence[1].text, "Bond yields climb (Financial Times)");
    }

    #[test]
    fn test_no_results_error_is_empty() {
        let response: NewsResponse = serde_json::from_value(serde_json::json!({
            "error": "Google hasn't returned any results for this query."
        }))
        .unwrap();
        assert!(response.into_evidence("serpapi").unwrap().is_empty());
    }

    #[test]
    fn test_other_error_is_rejected() {
        let response: NewsResponse =
            serde_json::from_value(serde_json::json!({ "error": "Invalid API key." })).unwrap();
        assert!(matches!(
            response.into_evidence("serpapi"),
            Err(SourceError::Rejected(_))
        ));
    }
}
