//! Benchmark index statistics from the Yahoo Finance chart API.
//!
//! Looks up the country's `market_symbol` over the last month of daily bars
//! and reports the latest close, daily-return volatility and mean volume.
//! Countries without a symbol yield no evidence.

use async_trait::async_trait;
use georisk_core::{Evidence, SourceKind};
use serde::Deserialize;
use std::time::Duration;

use super::http::{build_client, send_json_or_missing};
use super::{QuerySpec, SourceAdapter, SourceError};
use crate::config::SourceSettings;

const DEFAULT_ENDPOINT: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// One month of market behaviour for a benchmark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketSummary {
    pub latest_close: f64,

    /// Sample standard deviation of daily returns, in percent
    pub volatility_pct: f64,

    pub mean_volume: Option<f64>,
}

impl MarketSummary {
    /// Summarize daily bars. Missing values are skipped; at least two closes
    /// are needed.
    pub fn from_series(closes: &[Option<f64>], volumes: &[Option<f64>]) -> Option<Self> {
        let closes: Vec<f64> = closes.iter().flatten().copied().filter(|c| c.is_finite()).collect();
        if closes.len() < 2 {
            return None;
        }

        let returns: Vec<f64> = closes
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| (w[1] - w[0]) / w[0])
            .collect();
        let volatility_pct = sample_std(&returns).unwrap_or(0.0) * 100.0;

        let volumes: Vec<f64> = volumes.iter().flatten().copied().filter(|v| v.is_finite()).collect();
        let mean_volume = (!volumes.is_empty()).then(|| volumes.iter().sum::<f64>() / volumes.len() as f64);

        Some(Self {
            latest_close: *closes.last()?,
            volatility_pct,
            mean_volume,
        })
    }

    fn describe(&self, country: &str, symbol: &str) -> String {
        let mut text = format!(
            "{} benchmark index {}: latest close {:.2}, 1-month daily volatility {:.2}%",
            country, symbol, self.latest_close, self.volatility_pct
        );
        if let Some(volume) = self.mean_volume {
            text.push_str(&format!(", average daily volume {:.0}", volume));
        }
        text
    }

    fn into_evidence(self, source_id: &str, country: &str, symbol: &str) -> Evidence {
        let mut evidence = Evidence::new(source_id, self.describe(country, symbol))
            .with_field("latest_close", self.latest_close)
            .with_field("volatility_pct", self.volatility_pct);
        if let Some(volume) = self.mean_volume {
            evidence = evidence.with_field("mean_volume", volume);
        }
        evidence
    }
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

impl ChartEnvelope {
    fn summary(&self) -> Option<MarketSummary> {
        let quote = self.chart.result.as_ref()?.first()?.indicators.quote.first()?;
        MarketSummary::from_series(&quote.close, &quote.volume)
    }
}

pub struct YahooMarketAdapter {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl YahooMarketAdapter {
    pub fn new(settings: &SourceSettings) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(settings.timeout)?,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: settings.timeout,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }
}

impl std::fmt::Debug for YahooMarketAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooMarketAdapter")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl SourceAdapter for YahooMarketAdapter {
    fn id(&self) -> &str {
        "yahoo"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::MarketData
    }

    fn lookup_key(&self, query: &QuerySpec) -> String {
        query.country.market_symbol.clone().unwrap_or_default()
    }

    async fn fetch(&self, query: &QuerySpec) -> Result<Vec<Evidence>, SourceError> {
        let Some(symbol) = query.country.market_symbol.as_deref() else {
            return Ok(Vec::new());
        };

        let request = self
            .client
            .get(format!("{}/{}", self.endpoint, symbol))
            .query(&[("range", "1mo"), ("interval", "1d")]);

        let Some(chart) = send_json_or_missing::<ChartEnvelope>(request, self.timeout).await? else {
            tracing::debug!(source = self.id(), symbol, "No market data for symbol");
            return Ok(Vec::new());
        };

        Ok(chart
            .summary()
            .map(|summary| summary.into_evidence(self.id(), &query.country.name, symbol))
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_from_series() {
        let summary = MarketSummary::from_series(
            &[Some(100.0), None, Some(110.0), Some(99.0)],
            &[Some(1000.0), Some(3000.0), None, None],
        )
        .unwrap();

        assert_eq!(summary.latest_close, 99.0);
        // returns +10% and -10%
        assert!((summary.volatility_pct - 14.1421).abs() < 1e-3);
        assert_eq!(summary.mean_volume, Some(2000.0));
    }

    #[test]
    fn test_summary_needs_two_closes() {
        assert!(MarketSummary::from_series(&[Some(100.0), None], &[]).is_none());
        assert!(MarketSummary::from_series(&[], &[]).is_none());
    }

    #[test]
    fn test_chart_response_parsing() {
        let chart: ChartEnvelope = serde_json::from_value(serde_json::json!({
            "chart": {
                "result": [{
                    "meta": { "symbol": "^GDAXI", "currency": "EUR" },
                    "timestamp": [1, 2, 3],
                    "indicators": {
                        "quote": [{
                            "close": [18000.0, 18180.0, null],
                            "volume": [null, 50000000, 70000000]
                        }]
                    }
                }],
                "error": null
            }
        }))
        .unwrap();

        let summary = chart.summary().unwrap();
        assert_eq!(summary.latest_close, 18180.0);
        assert_eq!(summary.mean_volume, Some(60_000_000.0));

        let evidence = summary.into_evidence("yahoo", "Germany", "^GDAXI");
        assert!(evidence.text.starts_with("Germany benchmark index ^GDAXI: latest close 18180.00"));
        assert_eq!(evidence.fields.get("latest_close"), Some(&18180.0));
        assert!(evidence.fields.contains_key("volatility_pct"));
    }

    #[test]
    fn test_empty_chart_has_no_summary() {
        let chart: ChartEnvelope = serde_json::from_value(serde_json::json!({
            "chart": { "result": null, "error": { "code": "Not Found" } }
        }))
        .unwrap();
        assert!(chart.summary().is_none());
    }

    #[tokio::test]
    async fn test_country_without_symbol_yields_nothing() {
        let adapter = YahooMarketAdapter::new(&SourceSettings::default()).unwrap();
        let country = std::sync::Arc::new(georisk_core::Country::new("XK", "Kosovo"));
        let query = QuerySpec {
            category_id: "eu".to_string(),
            category_name: "European Fragmentation".to_string(),
            country,
            query: "European Fragmentation Kosovo".to_string(),
        };

        assert!(adapter.fetch(&query).await.unwrap().is_empty());
        assert_eq!(adapter.lookup_key(&query), "");
    }
}
