//! Financial Modeling Prep API client.
//!
//! Blocking client used as the remote price feed. One request per call,
//! no retries; a request that exceeds the configured timeout surfaces as
//! [`FeedError::Timeout`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use reqwest::blocking::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::feed::{FeedError, PriceFeed};
use super::types::PriceBar;
use crate::config::FeedConfig;

/// Constituents listed by default by the `companies` command.
pub const TOP_CONSTITUENTS: usize = 20;

/// Daily bar as published by `historical-price-full`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDailyBar {
    pub date: String,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl RawDailyBar {
    /// Convert to a PriceBar. Returns `None` for unparseable dates or prices.
    pub fn to_bar(&self) -> Option<PriceBar> {
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").ok()?;
        let close = Decimal::try_from(self.close).ok()?;
        let price = |p: Option<f64>| p.and_then(|p| Decimal::try_from(p).ok()).unwrap_or(close);

        Some(PriceBar {
            date,
            open: price(self.open),
            high: price(self.high),
            low: price(self.low),
            close,
            volume: self.volume.unwrap_or(0.0) as i64,
        })
    }
}

/// `historical-price-full` response. Unknown symbols come back as `{}`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoricalResponse {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub historical: Vec<RawDailyBar>,
}

/// S&P 500 constituent entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constituent {
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub sub_sector: Option<String>,
    #[serde(default)]
    pub headquarter: Option<String>,
}

/// Company profile summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub symbol: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub mkt_cap: Option<f64>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub exchange_short_name: Option<String>,
    #[serde(default)]
    pub ceo: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl CompanyProfile {
    pub fn market_cap(&self) -> Option<Decimal> {
        self.mkt_cap.and_then(|cap| Decimal::try_from(cap).ok())
    }
}

/// FMP API client.
pub struct FmpClient {
    client: Client,
    provider: String,
    base_url: String,
    api_key: String,
    min_interval: Duration,
    last_request: Mutex<Instant>,
    request_count: AtomicU64,
}

impl FmpClient {
    /// Create a client from the feed configuration.
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| FeedError::MissingApiKey(config.provider.clone()))?;

        let client = Client::builder().timeout(config.timeout()).build()?;
        let min_interval = config.min_request_interval();
        // Lets the first request go out immediately when the clock allows it.
        let primed = Instant::now()
            .checked_sub(min_interval)
            .unwrap_or_else(Instant::now);

        Ok(Self {
            client,
            provider: config.provider.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            min_interval,
            last_request: Mutex::new(primed),
            request_count: AtomicU64::new(0),
        })
    }

    /// Spaced-out request helper.
    fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, FeedError> {
        {
            let mut last = self
                .last_request
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
            *last = Instant::now();
        }

        let url = format!("{}/{}", self.base_url, endpoint);
        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("apikey", &self.api_key));

        let response = self
            .client
            .get(&url)
            .query(&all_params)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    FeedError::Timeout(endpoint.to_string())
                } else {
                    FeedError::Http(e)
                }
            })?;

        self.request_count.fetch_add(1, Ordering::Relaxed);

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FeedError::RateLimitExceeded);
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(FeedError::Api(format!("{}: {}", status, text)));
        }

        response
            .json()
            .map_err(|e| FeedError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    /// Get request count for monitoring.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Daily history for a symbol from `start` onwards, oldest first.
    pub fn historical_prices(
        &self,
        symbol: &str,
        start: NaiveDate,
    ) -> Result<Vec<PriceBar>, FeedError> {
        let from = start.format("%Y-%m-%d").to_string();
        let endpoint = format!("v3/historical-price-full/{}", symbol);
        let response: HistoricalResponse = self.request(&endpoint, &[("from", &from)])?;

        let mut bars: Vec<PriceBar> = response
            .historical
            .iter()
            .filter_map(RawDailyBar::to_bar)
            .collect();
        bars.sort_by_key(|bar| bar.date);
        Ok(bars)
    }

    /// Current S&P 500 constituents.
    pub fn sp500_constituents(&self) -> Result<Vec<Constituent>, FeedError> {
        self.request("v3/sp500_constituent", &[])
    }

    /// First `n` constituents in the order the API lists them.
    pub fn top_constituents(&self, n: usize) -> Result<Vec<Constituent>, FeedError> {
        let mut constituents = self.sp500_constituents()?;
        constituents.truncate(n);
        Ok(constituents)
    }

    /// Profile for a single company.
    pub fn company_profile(&self, symbol: &str) -> Result<CompanyProfile, FeedError> {
        let endpoint = format!("v3/profile/{}", symbol);
        let profiles: Vec<CompanyProfile> = self.request(&endpoint, &[])?;
        profiles.into_iter().next().ok_or_else(|| FeedError::NoData {
            symbol: symbol.to_string(),
            start: NaiveDate::MIN,
        })
    }
}

impl PriceFeed for FmpClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn fetch_daily(&self, symbol: &str, start: NaiveDate) -> Result<Vec<PriceBar>, FeedError> {
        self.historical_prices(symbol, start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_missing_api_key() {
        let config = FeedConfig::default();
        assert!(matches!(
            FmpClient::new(&config),
            Err(FeedError::MissingApiKey(_))
        ));
    }

    #[test]
    fn test_huge_request_interval_does_not_panic() {
        let config = FeedConfig {
            api_key: Some("demo".to_string()),
            min_request_interval_ms: u64::MAX,
            ..FeedConfig::default()
        };
        let client = FmpClient::new(&config).unwrap();
        assert_eq!(client.request_count(), 0);
        assert_eq!(client.provider(), "fmp");
    }

    #[test]
    fn test_historical_response_parsing() {
        let body = r#"{
            "symbol": "AAPL",
            "historical": [
                {"date": "2024-01-03", "open": 184.22, "high": 185.88, "low": 183.43, "close": 184.25, "volume": 58414460.0},
                {"date": "2024-01-02", "close": 185.5},
                {"date": "not-a-date", "close": 1.0}
            ]
        }"#;
        let response: HistoricalResponse = serde_json::from_str(body).unwrap();
        let bars: Vec<_> = response.historical.iter().filter_map(RawDailyBar::to_bar).collect();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, dec!(184.25));
        assert_eq!(bars[0].volume, 58_414_460);
        assert_eq!(bars[1].open, dec!(185.5));
    }

    #[test]
    fn test_unknown_symbol_response_is_empty() {
        let response: HistoricalResponse = serde_json::from_str("{}").unwrap();
        assert!(response.symbol.is_none());
        assert!(response.historical.is_empty());
    }

    #[test]
    fn test_constituent_parsing() {
        let body = r#"[
            {"symbol": "AAPL", "name": "Apple Inc.", "sector": "Information Technology", "subSector": "Technology Hardware, Storage & Peripherals", "headquarter": "Cupertino, California", "cik": "0000320193"},
            {"symbol": "XOM", "name": "Exxon Mobil Corporation"}
        ]"#;
        let constituents: Vec<Constituent> = serde_json::from_str(body).unwrap();
        assert_eq!(constituents.len(), 2);
        assert_eq!(constituents[0].sub_sector.as_deref(), Some("Technology Hardware, Storage & Peripherals"));
        assert_eq!(constituents[0].headquarter.as_deref(), Some("Cupertino, California"));
        assert_eq!(constituents[1].name, "Exxon Mobil Corporation");
        assert!(constituents[1].sector.is_none());
    }

    #[test]
    fn test_profile_parsing() {
        let body = r#"[{"symbol": "META", "companyName": "Meta Platforms, Inc.", "mktCap": 1250000000000, "sector": "Communication Services"}]"#;
        let profiles: Vec<CompanyProfile> = serde_json::from_str(body).unwrap();
        assert_eq!(profiles[0].company_name.as_deref(), Some("Meta Platforms, Inc."));
        assert_eq!(profiles[0].market_cap(), Some(dec!(1250000000000)));
    }
}
