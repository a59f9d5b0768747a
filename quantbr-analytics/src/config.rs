//! Application configuration.
//!
//! Built once at process start from defaults, an optional TOML file and
//! environment overrides, then passed by reference to whatever needs it.
//! Nothing here is global.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::metrics::{DEFAULT_BENCHMARK, DEFAULT_COMPARISON_INDICES, DEFAULT_LOOKBACK_YEARS};

/// Financial Modeling Prep API base URL.
pub const DEFAULT_FMP_BASE_URL: &str = "https://financialmodelingprep.com/api";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Credentials and transport settings for the remote price feed.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Provider name reported by the feed.
    pub provider: String,

    /// API base URL, without a trailing slash.
    pub base_url: String,

    /// API key. Usually supplied through `FMP_API_KEY`.
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Minimum spacing between requests in milliseconds.
    pub min_request_interval_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            provider: "fmp".to_string(),
            base_url: DEFAULT_FMP_BASE_URL.to_string(),
            api_key: None,
            timeout_secs: 30,
            min_request_interval_ms: 250,
        }
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }
}

// Keeps the key out of logs.
impl fmt::Debug for FeedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("min_request_interval_ms", &self.min_request_interval_ms)
            .finish()
    }
}

/// Locations of the static datasets and build artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetPaths {
    /// Directory of cached `<SYMBOL>.csv` price files.
    pub price_dir: PathBuf,
    pub ticker_to_name: PathBuf,
    pub ticker_to_sector: PathBuf,
    pub market_data: PathBuf,
    pub acquisitions: PathBuf,
    pub state_gdp: PathBuf,
    /// Intermediate acquisitions table with resolved tickers and sectors.
    pub resolved_acquisitions: PathBuf,
    pub company_graph: PathBuf,
    pub return_matrix: PathBuf,
}

impl Default for DatasetPaths {
    fn default() -> Self {
        Self {
            price_dir: PathBuf::from("datasets/prices"),
            ticker_to_name: PathBuf::from("datasets/ticker_to_name.csv"),
            ticker_to_sector: PathBuf::from("datasets/ticker_to_sector.csv"),
            market_data: PathBuf::from("datasets/us_market_data.csv"),
            acquisitions: PathBuf::from("datasets/Acquisitions.csv"),
            state_gdp: PathBuf::from("datasets/combined_summary_2000_2023.csv"),
            resolved_acquisitions: PathBuf::from("datasets/mna_with_symbols.csv"),
            company_graph: PathBuf::from("graph_objs/company_graph.json"),
            return_matrix: PathBuf::from("graph_objs/monthly_returns.json"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feed: FeedConfig,

    /// Years of history behind the monthly return matrix.
    pub lookback_years: u32,

    /// Watch list for the monthly return heatmap.
    pub symbols: Vec<String>,

    /// Index every comparison is made against.
    pub benchmark: String,

    /// Indices compared with the benchmark.
    pub comparison_indices: Vec<String>,

    pub paths: DatasetPaths,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            lookback_years: DEFAULT_LOOKBACK_YEARS,
            symbols: [
                "AAPL", "MSFT", "NVDA", "GOOGL", "AMZN", "META", "BRK-B", "JPM", "V", "XOM",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            benchmark: DEFAULT_BENCHMARK.to_string(),
            comparison_indices: DEFAULT_COMPARISON_INDICES.iter().map(|s| s.to_string()).collect(),
            paths: DatasetPaths::default(),
        }
    }
}

impl AppConfig {
    /// Parse a TOML config file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Defaults or `path`, then `.env` and process environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        match env_file_loaded(dotenvy::dotenv().map(|_| ())) {
            Ok(true) => debug!("Loaded .env"),
            Ok(false) => {}
            Err(e) => warn!("Ignoring unreadable .env file: {}", e),
        }

        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a key lookup.
    ///
    /// Recognised keys: `FMP_API_KEY`, `QUANTBR_PROVIDER`, `QUANTBR_DATA_DIR`,
    /// `QUANTBR_LOOKBACK_YEARS`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("FMP_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.feed.api_key = Some(key);
        }
        if let Some(provider) = lookup("QUANTBR_PROVIDER") {
            self.feed.provider = provider;
        }
        if let Some(dir) = lookup("QUANTBR_DATA_DIR") {
            self.paths.price_dir = PathBuf::from(dir);
        }
        if let Some(years) = lookup("QUANTBR_LOOKBACK_YEARS") {
            self.lookback_years = years
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "QUANTBR_LOOKBACK_YEARS".to_string(),
                    value: years.clone(),
                })?;
        }
        Ok(())
    }
}

/// `Ok(false)` when there is no `.env` file; any other failure is an error.
fn env_file_loaded(result: Result<(), dotenvy::Error>) -> Result<bool, dotenvy::Error> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
