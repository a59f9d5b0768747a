//! Price feed collaborator.
//!
//! A feed returns daily bars for one symbol from a start date onwards.
//! Every failure mode collapses into [`FeedError`]; callers that aggregate
//! many symbols treat any of them as "data unavailable" for that symbol.

use std::collections::HashMap;

use chrono::NaiveDate;
use polars::prelude::PolarsError;
use thiserror::Error;

use super::types::{PriceBar, PriceSeries};

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("No API key configured for provider {0}")]
    MissingApiKey(String),

    #[error("No data available for {symbol} since {start}")]
    NoData { symbol: String, start: NaiveDate },

    #[error("Malformed data for {symbol}: {reason}")]
    Malformed { symbol: String, reason: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of daily price history.
///
/// One call per symbol, no retries. Implementations own their timeouts.
pub trait PriceFeed: Send + Sync {
    /// Provider name, e.g. `"fmp"` or `"csv"`.
    fn provider(&self) -> &str;

    /// Daily bars for `symbol` on or after `start`, in any order.
    fn fetch_daily(&self, symbol: &str, start: NaiveDate) -> Result<Vec<PriceBar>, FeedError>;

    /// Fetch and validate a close series.
    ///
    /// Empty responses become [`FeedError::NoData`]. Non-positive or
    /// non-finite closes become [`FeedError::Malformed`].
    fn fetch_series(&self, symbol: &str, start: NaiveDate) -> Result<PriceSeries, FeedError> {
        let bars: Vec<PriceBar> = self
            .fetch_daily(symbol, start)?
            .into_iter()
            .filter(|bar| bar.date >= start)
            .collect();

        if bars.is_empty() {
            return Err(FeedError::NoData {
                symbol: symbol.to_string(),
                start,
            });
        }

        if let Some(bad) = bars
            .iter()
            .find(|bar| bar.close_f64().map_or(true, |close| close <= 0.0))
        {
            return Err(FeedError::Malformed {
                symbol: symbol.to_string(),
                reason: format!("invalid close {} on {}", bad.close, bad.date),
            });
        }

        Ok(PriceSeries::from_bars(symbol, &bars))
    }
}

/// Feed backed by bars already held in memory.
///
/// Used to replay cached histories so repeated runs see identical input.
#[derive(Debug, Clone, Default)]
pub struct MemoryPriceFeed {
    bars: HashMap<String, Vec<PriceBar>>,
}

impl MemoryPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, bars: Vec<PriceBar>) {
        self.bars.insert(symbol.into(), bars);
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>, bars: Vec<PriceBar>) -> Self {
        self.insert(symbol, bars);
        self
    }
}

impl PriceFeed for MemoryPriceFeed {
    fn provider(&self) -> &str {
        "memory"
    }

    fn fetch_daily(&self, symbol: &str, start: NaiveDate) -> Result<Vec<PriceBar>, FeedError> {
        self.bars
            .get(symbol)
            .cloned()
            .ok_or_else(|| FeedError::NoData {
                symbol: symbol.to_string(),
                start,
            })
    }
}
