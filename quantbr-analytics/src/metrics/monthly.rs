//! Monthly return matrix.
//!
//! Each symbol's daily closes are resampled to month-end (last observed
//! close in the month), turned into percent returns, then aligned by month
//! into one symbols × months matrix.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::Write;
use std::path::Path;

use chrono::{Datelike, Months, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::data::{FeedError, PriceFeed, PriceSeries};

/// Default history window for the heatmap.
pub const DEFAULT_LOOKBACK_YEARS: u32 = 10;

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Symbol left out of a result, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedSymbol {
    pub symbol: String,
    pub reason: String,
}

impl DroppedSymbol {
    pub fn from_error(symbol: &str, err: &FeedError) -> Self {
        Self {
            symbol: symbol.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Percent returns aligned by month-end date.
///
/// Rows are strictly increasing months, columns are symbols in request
/// order. A cell is `None` when that symbol has no return for the month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnMatrix {
    symbols: Vec<String>,
    months: Vec<NaiveDate>,
    /// Row-major, `months.len()` rows of `symbols.len()` cells.
    cells: Vec<Vec<Option<f64>>>,
    dropped: Vec<DroppedSymbol>,
}

/// Dense matrix transposed for grid renderers: one row per symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    pub symbols: Vec<String>,
    pub months: Vec<NaiveDate>,
    pub values: Vec<Vec<f64>>,
}

impl ReturnMatrix {
    /// Align per-symbol return columns by month.
    pub fn from_columns(
        columns: Vec<(String, Vec<(NaiveDate, Option<f64>)>)>,
        dropped: Vec<DroppedSymbol>,
    ) -> Self {
        let months: BTreeSet<NaiveDate> = columns
            .iter()
            .flat_map(|(_, col)| col.iter().map(|(month, _)| *month))
            .collect();

        let lookups: Vec<BTreeMap<NaiveDate, Option<f64>>> = columns
            .iter()
            .map(|(_, col)| col.iter().copied().collect())
            .collect();

        let cells = months
            .iter()
            .map(|month| {
                lookups
                    .iter()
                    .map(|lookup| lookup.get(month).copied().flatten())
                    .collect()
            })
            .collect();

        Self {
            symbols: columns.into_iter().map(|(symbol, _)| symbol).collect(),
            months: months.into_iter().collect(),
            cells,
            dropped,
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn months(&self) -> &[NaiveDate] {
        &self.months
    }

    /// Symbols that could not be fetched.
    pub fn dropped(&self) -> &[DroppedSymbol] {
        &self.dropped
    }

    pub fn row(&self, idx: usize) -> Option<&[Option<f64>]> {
        self.cells.get(idx).map(|row| row.as_slice())
    }

    pub fn get(&self, month: NaiveDate, symbol: &str) -> Option<f64> {
        let row = self.months.binary_search(&month).ok()?;
        let col = self.symbols.iter().position(|s| s == symbol)?;
        self.cells[row][col]
    }

    /// True when there is nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() || self.months.is_empty()
    }

    /// Drop every month with a missing cell.
    ///
    /// Lossy: symbols with shorter histories truncate the whole matrix.
    pub fn dense(&self) -> Self {
        let (months, cells) = self
            .months
            .iter()
            .zip(&self.cells)
            .filter(|(_, row)| row.iter().all(Option::is_some))
            .map(|(month, row)| (*month, row.clone()))
            .unzip();

        Self {
            symbols: self.symbols.clone(),
            months,
            cells,
            dropped: self.dropped.clone(),
        }
    }

    /// Dense matrix transposed to symbols × months.
    pub fn heatmap(&self) -> Heatmap {
        let dense = self.dense();
        let values = (0..dense.symbols.len())
            .map(|col| {
                dense
                    .cells
                    .iter()
                    .map(|row| row[col].unwrap_or_default())
                    .collect()
            })
            .collect();

        Heatmap {
            symbols: dense.symbols,
            months: dense.months,
            values,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), MatrixError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MatrixError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write `date,<symbol>...` rows; missing cells are empty.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), MatrixError> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = vec!["date".to_string()];
        header.extend(self.symbols.iter().cloned());
        wtr.write_record(&header)?;

        for (month, row) in self.months.iter().zip(&self.cells) {
            let mut record = vec![month.to_string()];
            record.extend(row.iter().map(|cell| cell.map(|v| v.to_string()).unwrap_or_default()));
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        Ok(())
    }
}

/// Last calendar day of `date`'s month.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

/// Month-end of the calendar month before `date`'s month.
fn previous_month_end(date: NaiveDate) -> Option<NaiveDate> {
    date.with_day(1).and_then(|first| first.pred_opt())
}

/// Start of the lookback window: `today` minus whole calendar years.
pub fn lookback_start(today: NaiveDate, years: u32) -> NaiveDate {
    today
        .checked_sub_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN)
}

/// Last observed close of each calendar month, keyed by month-end.
pub fn resample_month_end(series: &PriceSeries) -> Vec<(NaiveDate, f64)> {
    let mut monthly: Vec<(NaiveDate, f64)> = Vec::new();

    for &(date, close) in series.points() {
        let key = month_end(date);
        match monthly.last_mut() {
            Some(last) if last.0 == key => last.1 = close,
            _ => monthly.push((key, close)),
        }
    }

    monthly
}

/// Percent change between consecutive calendar months.
///
/// The first month has no prior month and is `None`, as is any month whose
/// preceding calendar month has no observation. A gap is not bridged: unlike
/// a padded pct_change, the month after a gap is not measured against the
/// last price before it.
pub fn monthly_percent_returns(monthly: &[(NaiveDate, f64)]) -> Vec<(NaiveDate, Option<f64>)> {
    let mut returns = Vec::with_capacity(monthly.len());
    let mut prev: Option<(NaiveDate, f64)> = None;

    for &(month, price) in monthly {
        let value = prev.and_then(|(prev_month, prev_price)| {
            (previous_month_end(month) == Some(prev_month) && prev_price != 0.0)
                .then(|| (price - prev_price) / prev_price * 100.0)
        });
        returns.push((month, value));
        prev = Some((month, price));
    }

    returns
}

/// Monthly percent returns for each symbol, aligned by month.
///
/// Symbols whose history is unavailable are dropped and recorded on the
/// matrix; the batch itself never fails. Fetches run in parallel but the
/// column order always follows `symbols` (duplicates are fetched once).
pub fn compute_monthly_returns<F, S>(
    feed: &F,
    symbols: &[S],
    lookback_years: u32,
    today: NaiveDate,
) -> ReturnMatrix
where
    F: PriceFeed + ?Sized,
    S: AsRef<str> + Sync,
{
    let start = lookback_start(today, lookback_years);

    let mut seen = HashSet::new();
    let unique: Vec<&str> = symbols
        .iter()
        .map(|s| s.as_ref())
        .filter(|s| seen.insert(*s))
        .collect();

    let fetched: Vec<(&str, Result<PriceSeries, FeedError>)> = unique
        .par_iter()
        .map(|symbol| (*symbol, feed.fetch_series(symbol, start)))
        .collect();

    let mut columns = Vec::with_capacity(fetched.len());
    let mut dropped = Vec::new();

    for (symbol, result) in fetched {
        match result {
            Ok(series) => {
                let monthly = resample_month_end(&series);
                columns.push((symbol.to_string(), monthly_percent_returns(&monthly)));
            }
            Err(e) => {
                warn!("Dropping {} from monthly returns: {}", symbol, e);
                dropped.push(DroppedSymbol::from_error(symbol, &e));
            }
        }
    }

    let matrix = ReturnMatrix::from_columns(columns, dropped);
    info!(
        "Computed monthly returns for {}/{} symbols over {} months from {} ({})",
        matrix.symbols().len(),
        unique.len(),
        matrix.months().len(),
        start,
        feed.provider()
    );
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{write_bars, CsvPriceFeed, MemoryPriceFeed, PriceBar};
    use approx::assert_relative_eq;
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bars(points: &[(NaiveDate, i64)]) -> Vec<PriceBar> {
        points
            .iter()
            .map(|(d, close)| PriceBar::close_only(*d, Decimal::from(*close)))
            .collect()
    }

    fn fixture_feed() -> MemoryPriceFeed {
        MemoryPriceFeed::new()
            .with_symbol(
                "AAA",
                bars(&[
                    (date(2024, 1, 2), 90),
                    (date(2024, 1, 31), 100),
                    (date(2024, 2, 15), 105),
                    (date(2024, 2, 29), 110),
                    (date(2024, 3, 28), 99),
                ]),
            )
            .with_symbol(
                "BBB",
                bars(&[
                    (date(2024, 2, 1), 50),
                    (date(2024, 3, 1), 55),
                    (date(2024, 3, 29), 60),
                ]),
            )
    }

    #[test]
    fn test_month_end() {
        assert_eq!(month_end(date(2024, 2, 10)), date(2024, 2, 29));
        assert_eq!(month_end(date(2023, 12, 1)), date(2023, 12, 31));
        assert_eq!(month_end(date(2023, 4, 30)), date(2023, 4, 30));
    }

    #[test]
    fn test_lookback_start_clamps_leap_day() {
        assert_eq!(lookback_start(date(2024, 2, 29), 10), date(2014, 2, 28));
        assert_eq!(lookback_start(date(2026, 10, 18), 1), date(2025, 10, 18));
    }

    #[test]
    fn test_resample_takes_last_close() {
        let series = PriceSeries::new(
            "AAA",
            vec![
                (date(2024, 1, 2), 1.0),
                (date(2024, 1, 30), 3.0),
                (date(2024, 1, 15), 2.0),
                (date(2024, 2, 1), 4.0),
            ],
        );
        let monthly = resample_month_end(&series);
        assert_eq!(monthly, vec![(date(2024, 1, 31), 3.0), (date(2024, 2, 29), 4.0)]);
    }

    #[test]
    fn test_first_month_is_missing() {
        let monthly = vec![(date(2024, 1, 31), 100.0), (date(2024, 2, 29), 110.0)];
        let returns = monthly_percent_returns(&monthly);
        assert_eq!(returns[0], (date(2024, 1, 31), None));
        assert_relative_eq!(returns[1].1.unwrap(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gap_month_is_missing() {
        let monthly = vec![(date(2024, 1, 31), 100.0), (date(2024, 3, 31), 120.0)];
        let returns = monthly_percent_returns(&monthly);
        assert_eq!(returns[1], (date(2024, 3, 31), None));
    }

    #[test]
    fn test_return_resumes_after_gap() {
        let monthly = vec![
            (date(2024, 1, 31), 100.0),
            (date(2024, 3, 31), 120.0),
            (date(2024, 4, 30), 132.0),
        ];
        let returns = monthly_percent_returns(&monthly);
        assert_eq!(returns.len(), 3);
        assert_eq!(returns[0].1, None);
        assert_eq!(returns[1].1, None);
        assert_relative_eq!(returns[2].1.unwrap(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_matrix_alignment() {
        let feed = fixture_feed();
        let matrix = compute_monthly_returns(&feed, &["AAA", "BBB"], 10, date(2024, 4, 15));

        assert_eq!(matrix.symbols(), &["AAA".to_string(), "BBB".to_string()]);
        assert_eq!(
            matrix.months(),
            &[date(2024, 1, 31), date(2024, 2, 29), date(2024, 3, 31)]
        );
        assert!(matrix.months().windows(2).all(|w| w[0] < w[1]));

        assert_eq!(matrix.get(date(2024, 1, 31), "AAA"), None);
        assert_relative_eq!(matrix.get(date(2024, 2, 29), "AAA").unwrap(), 10.0, epsilon = 1e-12);
        assert_relative_eq!(matrix.get(date(2024, 3, 31), "AAA").unwrap(), -10.0, epsilon = 1e-12);

        // BBB starts a month later; its first month is missing too.
        assert_eq!(matrix.get(date(2024, 1, 31), "BBB"), None);
        assert_eq!(matrix.get(date(2024, 2, 29), "BBB"), None);
        assert_relative_eq!(matrix.get(date(2024, 3, 31), "BBB").unwrap(), 20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_dense_drops_incomplete_rows() {
        let feed = fixture_feed();
        let matrix = compute_monthly_returns(&feed, &["AAA", "BBB"], 10, date(2024, 4, 15));
        let dense = matrix.dense();

        assert_eq!(dense.months(), &[date(2024, 3, 31)]);
        assert!(dense.row(0).unwrap().iter().all(Option::is_some));

        let heatmap = matrix.heatmap();
        assert_eq!(heatmap.symbols.len(), 2);
        assert_eq!(heatmap.values[1].len(), 1);
        assert_relative_eq!(heatmap.values[1][0], 20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unavailable_symbol_is_dropped() {
        let feed = fixture_feed();
        let matrix = compute_monthly_returns(&feed, &["AAA", "MISSING", "BBB"], 10, date(2024, 4, 15));

        assert_eq!(matrix.symbols(), &["AAA".to_string(), "BBB".to_string()]);
        assert_eq!(matrix.dropped().len(), 1);
        assert_eq!(matrix.dropped()[0].symbol, "MISSING");
    }

    #[test]
    fn test_columns_subset_in_request_order() {
        let feed = fixture_feed();
        let matrix = compute_monthly_returns(&feed, &["BBB", "AAA", "BBB"], 10, date(2024, 4, 15));
        assert_eq!(matrix.symbols(), &["BBB".to_string(), "AAA".to_string()]);
    }

    #[test]
    fn test_all_symbols_unavailable_is_empty() {
        let feed = MemoryPriceFeed::new();
        let matrix = compute_monthly_returns(&feed, &["X", "Y"], 10, date(2024, 4, 15));
        assert!(matrix.is_empty());
        assert_eq!(matrix.dropped().len(), 2);
    }

    #[test]
    fn test_lookback_window_excludes_old_history() {
        let feed = fixture_feed();
        let matrix = compute_monthly_returns(&feed, &["AAA"], 0, date(2024, 4, 1));
        assert!(matrix.is_empty());
        assert_eq!(matrix.dropped().len(), 1);

        let matrix = compute_monthly_returns(&feed, &["AAA"], 1, date(2025, 2, 10));
        assert_eq!(matrix.months(), &[date(2024, 2, 29), date(2024, 3, 31)]);
    }

    #[test]
    fn test_identical_inputs_identical_output() {
        let feed = fixture_feed();
        let first = compute_monthly_returns(&feed, &["AAA", "BBB"], 10, date(2024, 4, 15));
        let second = compute_monthly_returns(&feed, &["AAA", "BBB"], 10, date(2024, 4, 15));
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_csv_feed_matches_memory_feed() {
        let memory = fixture_feed();
        let dir = tempfile::tempdir().unwrap();
        for symbol in ["AAA", "BBB"] {
            let bars = memory.fetch_daily(symbol, NaiveDate::MIN).unwrap();
            write_bars(&dir.path().join(format!("{}.csv", symbol)), &bars).unwrap();
        }
        let csv = CsvPriceFeed::new(dir.path());

        let today = date(2024, 4, 15);
        assert_eq!(
            compute_monthly_returns(&csv, &["AAA", "BBB"], 10, today),
            compute_monthly_returns(&memory, &["AAA", "BBB"], 10, today)
        );
    }

    #[test]
    fn test_save_load_and_csv() {
        let feed = fixture_feed();
        let matrix = compute_monthly_returns(&feed, &["AAA", "BBB"], 10, date(2024, 4, 15));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache/returns.json");
        matrix.save(&path).unwrap();
        assert_eq!(ReturnMatrix::load(&path).unwrap(), matrix);

        let mut out = Vec::new();
        matrix.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "date,AAA,BBB");
        assert_eq!(lines[1], "2024-01-31,,");
        assert_eq!(lines.len(), 4);
    }
}
