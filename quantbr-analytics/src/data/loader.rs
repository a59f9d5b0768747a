//! CSV price loader.
//!
//! Reads cached daily histories from `<data_dir>/<SYMBOL>.csv`, one file per
//! symbol, with the schema written by the downloaders:
//! - date (YYYY-MM-DD or a polars date column)
//! - close
//! - open, high, low, volume (optional; missing prices fall back to close)

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use rust_decimal::Decimal;

use super::feed::{FeedError, PriceFeed};
use super::types::PriceBar;

/// Columns every price file must carry.
pub const REQUIRED_COLUMNS: &[&str] = &["date", "close"];

/// Header of files written by [`write_bars`], in [`PriceBar`] field order.
const BAR_HEADER: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

/// Price feed over a directory of per-symbol CSV files.
#[derive(Debug, Clone)]
pub struct CsvPriceFeed {
    data_dir: PathBuf,
}

impl CsvPriceFeed {
    /// Create a feed pointing at a price directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Path of a symbol's price file.
    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", symbol))
    }

    /// List symbols with a price file.
    pub fn available_symbols(&self) -> Result<Vec<String>, FeedError> {
        if !self.data_dir.exists() {
            return Ok(vec![]);
        }

        let mut symbols = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if let Some(symbol) = name.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    /// Load a symbol's raw file as a LazyFrame.
    pub fn load_lazy(&self, symbol: &str) -> Result<LazyFrame, FeedError> {
        let path = self.csv_path(symbol);
        if !path.exists() {
            return Err(FeedError::FileNotFound(path.display().to_string()));
        }
        let lf = LazyCsvReader::new(&path).with_has_header(true).finish()?;
        Ok(lf)
    }

    /// Load a symbol's raw file as a DataFrame.
    pub fn load_dataframe(&self, symbol: &str) -> Result<DataFrame, FeedError> {
        Ok(self.load_lazy(symbol)?.collect()?)
    }

    /// Load bars for a symbol on or after `start`, sorted by date.
    pub fn load_bars(&self, symbol: &str, start: NaiveDate) -> Result<Vec<PriceBar>, FeedError> {
        let df = self.load_dataframe(symbol)?;
        let mut bars = dataframe_to_bars(&df, symbol)?;
        bars.retain(|bar| bar.date >= start);
        bars.sort_by_key(|bar| bar.date);
        Ok(bars)
    }
}

impl PriceFeed for CsvPriceFeed {
    fn provider(&self) -> &str {
        "csv"
    }

    fn fetch_daily(&self, symbol: &str, start: NaiveDate) -> Result<Vec<PriceBar>, FeedError> {
        self.load_bars(symbol, start)
    }
}

/// Convert days since Unix epoch to NaiveDate.
fn date_from_days(days: i32) -> NaiveDate {
    NaiveDate::from_num_days_from_ce_opt(days + 719163).unwrap_or_default()
}

/// Parse the date column, handling both string and date dtypes.
fn parse_dates(df: &DataFrame, symbol: &str) -> Result<Vec<Option<NaiveDate>>, FeedError> {
    let dates_col = df.column("date")?;

    if let Ok(str_col) = dates_col.str() {
        Ok(str_col
            .into_iter()
            .map(|s| s.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()))
            .collect())
    } else if let Ok(date_col) = dates_col.date() {
        Ok(date_col.into_iter().map(|d| d.map(date_from_days)).collect())
    } else {
        Err(FeedError::Malformed {
            symbol: symbol.to_string(),
            reason: "date column has unexpected type".to_string(),
        })
    }
}

/// Read an optional price column as floats.
fn optional_prices(df: &DataFrame, name: &str) -> Option<Vec<Option<f64>>> {
    let column = df.column(name).ok()?.cast(&DataType::Float64).ok()?;
    let values = column.f64().ok()?;
    Some(values.into_iter().collect())
}

/// Convert a price DataFrame into bars.
///
/// Rows with an unparseable date or a missing close are malformed input.
fn dataframe_to_bars(df: &DataFrame, symbol: &str) -> Result<Vec<PriceBar>, FeedError> {
    for column in REQUIRED_COLUMNS {
        if df.column(column).is_err() {
            return Err(FeedError::Malformed {
                symbol: symbol.to_string(),
                reason: format!("missing column '{}'", column),
            });
        }
    }

    let dates = parse_dates(df, symbol)?;
    let closes = optional_prices(df, "close").ok_or_else(|| FeedError::Malformed {
        symbol: symbol.to_string(),
        reason: "close column is not numeric".to_string(),
    })?;
    let opens = optional_prices(df, "open");
    let highs = optional_prices(df, "high");
    let lows = optional_prices(df, "low");
    let volumes: Option<Vec<Option<i64>>> = df
        .column("volume")
        .ok()
        .and_then(|c| c.cast(&DataType::Int64).ok())
        .and_then(|c| c.i64().ok().map(|v| v.into_iter().collect()));

    let to_decimal = |p: f64| Decimal::from_f64_retain(p).unwrap_or_default();
    let mut bars = Vec::with_capacity(df.height());

    for idx in 0..df.height() {
        let date = dates[idx].ok_or_else(|| FeedError::Malformed {
            symbol: symbol.to_string(),
            reason: format!("unparseable date in row {}", idx),
        })?;
        let close = closes[idx].ok_or_else(|| FeedError::Malformed {
            symbol: symbol.to_string(),
            reason: format!("missing close on {}", date),
        })?;

        let field = |col: &Option<Vec<Option<f64>>>| {
            col.as_ref().and_then(|v| v[idx]).unwrap_or(close)
        };

        bars.push(PriceBar {
            date,
            open: to_decimal(field(&opens)),
            high: to_decimal(field(&highs)),
            low: to_decimal(field(&lows)),
            close: to_decimal(close),
            volume: volumes.as_ref().and_then(|v| v[idx]).unwrap_or(0),
        });
    }

    Ok(bars)
}

/// Write bars in the format [`CsvPriceFeed`] reads back.
///
/// The header is written even when `bars` is empty.
pub fn write_bars(path: &Path, bars: &[PriceBar]) -> Result<(), FeedError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    wtr.write_record(BAR_HEADER)?;
    for bar in bars {
        wtr.serialize(bar)?;
    }
    wtr.flush()?;
    Ok(())
}
