//! Exchange rate of the country's currency against USD, from Alpha Vantage.

use async_trait::async_trait;
use georisk_core::{Evidence, SourceKind};
use serde::Deserialize;
use std::time::Duration;

use super::http::{build_client, send_json};
use super::{QuerySpec, SourceAdapter, SourceError};
use crate::config::SourceSettings;
use crate::secrets::ApiCredential;

/// Environment variable name for the Alpha Vantage API key.
pub const ALPHA_VANTAGE_API_KEY_ENV: &str = "ALPHA_VANTAGE_API_KEY";

const DEFAULT_ENDPOINT: &str = "https://www.alphavantage.co/query";
const QUOTE_CURRENCY: &str = "USD";

pub struct AlphaVantageFxAdapter {
    credential: ApiCredential,
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl AlphaVantageFxAdapter {
    pub fn new(credential: ApiCredential, settings: &SourceSettings) -> Result<Self, SourceError> {
        Ok(Self {
            credential,
            client: build_client(settings.timeout)?,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: settings.timeout,
        })
    }

    pub fn from_env(settings: &SourceSettings) -> Result<Self, SourceError> {
        let credential = ApiCredential::from_env(ALPHA_VANTAGE_API_KEY_ENV, "Alpha Vantage API key")?;
        Self::new(credential, settings)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Currency to look up for a query, if the pair is meaningful.
    fn base_currency(query: &QuerySpec) -> Option<&str> {
        query
            .country
            .currency
            .as_deref()
            .filter(|c| !c.eq_ignore_ascii_case(QUOTE_CURRENCY))
    }
}

impl std::fmt::Debug for AlphaVantageFxAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlphaVantageFxAdapter")
            .field("credential", &self.credential)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct FxResponse {
    #[serde(rename = "Realtime Currency Exchange Rate", default)]
    rate: Option<FxRate>,
    #[serde(rename = "Note", default)]
    note: Option<String>,
    #[serde(rename = "Information", default)]
    information: Option<String>,
    #[serde(rename = "Error Message", default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FxRate {
    #[serde(rename = "1. From_Currency Code")]
    from: String,
    #[serde(rename = "3. To_Currency Code")]
    to: String,
    #[serde(rename = "5. Exchange Rate")]
    rate: String,
    #[serde(rename = "6. Last Refreshed", default)]
    last_refreshed: Option<String>,
}

impl FxResponse {
    fn into_evidence(self, source_id: &str) -> Result<Vec<Evidence>, SourceError> {
        if let Some(rate) = self.rate {
            let value: f64 = rate.rate.trim().parse().map_err(|_| {
                SourceError::InvalidResponse(format!("exchange rate '{}' is not a number", rate.rate))
            })?;

            let mut text = format!("{}/{} exchange rate {:.4}", rate.from, rate.to, value);
            if let Some(refreshed) = rate.last_refreshed {
                text.push_str(&format!(" (last refreshed {})", refreshed));
            }
            return Ok(vec![Evidence::new(source_id, text).with_field("exchange_rate", value)]);
        }

        // Free-tier throttling is reported in-band with HTTP 200.
        if let Some(message) = self.note.or(self.information) {
            return Err(SourceError::QuotaExhausted(message));
        }
        if let Some(message) = self.error {
            return Err(SourceError::Rejected(message));
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl SourceAdapter for AlphaVantageFxAdapter {
    fn id(&self) -> &str {
        "alpha_vantage"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::FxRate
    }

    fn lookup_key(&self, query: &QuerySpec) -> String {
        Self::base_currency(query).unwrap_or_default().to_string()
    }

    async fn fetch(&self, query: &QuerySpec) -> Result<Vec<Evidence>, SourceError> {
        let Some(currency) = Self::base_currency(query) else {
            return Ok(Vec::new());
        };

        let request = self.client.get(&self.endpoint).query(&[
            ("function", "CURRENCY_EXCHANGE_RATE"),
            ("from_currency", currency),
            ("to_currency", QUOTE_CURRENCY),
            ("apikey", self.credential.expose()),
        ]);

        let response: FxResponse = send_json(request, self.timeout).await?;
        response.into_evidence(self.id())
    }
}
