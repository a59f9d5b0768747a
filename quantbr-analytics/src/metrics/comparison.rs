//! Pairwise comparison metrics.
//!
//! Two close series are aligned on their common dates, then:
//! - Rolling correlation of the aligned closes
//! - Price ratio a / b
//! - Rolling volatility (sample std dev) of each
//! - Cumulative return of each, starting at 1.0

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{info, warn};

use super::monthly::DroppedSymbol;
use crate::data::{FeedError, PriceFeed, PriceSeries};

/// Observations per rolling window.
pub const ROLLING_WINDOW: usize = 50;

/// Default comparison set: IBOVESPA against the main US indices.
pub const DEFAULT_BENCHMARK: &str = "^BVSP";
pub const DEFAULT_COMPARISON_INDICES: &[&str] = &["^GSPC", "^IXIC", "^DJI"];

/// Human-readable index name, falling back to the symbol itself.
pub fn index_display_name(symbol: &str) -> &str {
    match symbol {
        "^BVSP" => "IBOVESPA",
        "^GSPC" => "S&P 500",
        "^IXIC" => "NASDAQ",
        "^DJI" => "Dow Jones",
        other => other,
    }
}

/// Aligned comparison of series `a` against series `b`.
///
/// Every vector has one entry per date in `dates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseMetrics {
    pub symbol_a: String,
    pub symbol_b: String,
    pub dates: Vec<NaiveDate>,
    pub rolling_correlation: Vec<Option<f64>>,
    pub price_ratio: Vec<Option<f64>>,
    pub rolling_volatility_a: Vec<Option<f64>>,
    pub rolling_volatility_b: Vec<Option<f64>>,
    pub cumulative_return_a: Vec<Option<f64>>,
    pub cumulative_return_b: Vec<Option<f64>>,
}

fn last_value(values: &[Option<f64>]) -> Option<f64> {
    values.iter().rev().find_map(|v| *v)
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_else(|| "n/a".to_string())
}

impl PairwiseMetrics {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn latest_correlation(&self) -> Option<f64> {
        last_value(&self.rolling_correlation)
    }

    /// Format metrics as a summary string.
    pub fn summary(&self) -> String {
        format!(
            "{} vs {}\n\
             ====================\n\
             \n\
             Observations: {} ({} to {})\n\
             \n\
             Rolling Correlation ({}d): {}\n\
             Price Ratio: {}\n\
             \n\
             Volatility {}: {}\n\
             Volatility {}: {}\n\
             \n\
             Cumulative Return {}: {}\n\
             Cumulative Return {}: {}",
            index_display_name(&self.symbol_a),
            index_display_name(&self.symbol_b),
            self.len(),
            fmt_date(self.dates.first()),
            fmt_date(self.dates.last()),
            ROLLING_WINDOW,
            fmt_opt(self.latest_correlation(), 3),
            fmt_opt(last_value(&self.price_ratio), 4),
            self.symbol_a,
            fmt_opt(last_value(&self.rolling_volatility_a), 2),
            self.symbol_b,
            fmt_opt(last_value(&self.rolling_volatility_b), 2),
            self.symbol_a,
            fmt_opt(last_value(&self.cumulative_return_a), 4),
            self.symbol_b,
            fmt_opt(last_value(&self.cumulative_return_b), 4),
        )
    }
}

fn fmt_date(date: Option<&NaiveDate>) -> String {
    date.map(ToString::to_string).unwrap_or_else(|| "-".to_string())
}

/// Dates present in both series with the matching closes.
pub fn align(a: &PriceSeries, b: &PriceSeries) -> (Vec<NaiveDate>, Vec<f64>, Vec<f64>) {
    let (pa, pb) = (a.points(), b.points());
    let (mut i, mut j) = (0, 0);
    let mut dates = Vec::new();
    let mut closes_a = Vec::new();
    let mut closes_b = Vec::new();

    while i < pa.len() && j < pb.len() {
        match pa[i].0.cmp(&pb[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dates.push(pa[i].0);
                closes_a.push(pa[i].1);
                closes_b.push(pb[j].1);
                i += 1;
                j += 1;
            }
        }
    }

    (dates, closes_a, closes_b)
}

/// Sample standard deviation over a trailing window.
///
/// The first `window - 1` entries are `None`.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|end| {
            if window < 2 || end + 1 < window {
                return None;
            }
            let std = values[end + 1 - window..=end].iter().std_dev();
            std.is_finite().then_some(std)
        })
        .collect()
}

/// Pearson correlation over a trailing window, clamped to [-1, 1].
///
/// `None` for incomplete windows and for windows where either side is flat.
pub fn rolling_correlation(a: &[f64], b: &[f64], window: usize) -> Vec<Option<f64>> {
    let len = a.len().min(b.len());
    (0..len)
        .map(|end| {
            if window < 2 || end + 1 < window {
                return None;
            }
            let wa = &a[end + 1 - window..=end];
            let wb = &b[end + 1 - window..=end];

            let std_a = wa.iter().std_dev();
            let std_b = wb.iter().std_dev();
            if !(std_a > 0.0 && std_b > 0.0) {
                return None;
            }

            let corr = wa.iter().covariance(wb.iter()) / (std_a * std_b);
            corr.is_finite().then(|| corr.clamp(-1.0, 1.0))
        })
        .collect()
}

/// Element-wise `a / b`; zero or non-finite results are `None`.
pub fn price_ratio(a: &[f64], b: &[f64]) -> Vec<Option<f64>> {
    a.iter()
        .zip(b)
        .map(|(&num, &den)| {
            if den == 0.0 || !den.is_finite() {
                return None;
            }
            let ratio = num / den;
            ratio.is_finite().then_some(ratio)
        })
        .collect()
}

/// Compounded growth of 1.0 across daily percent changes.
///
/// A step off a zero close is `None` and leaves the running product as is.
pub fn cumulative_returns(closes: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(closes.len());
    let mut running = 1.0;

    for (idx, &close) in closes.iter().enumerate() {
        if idx == 0 {
            out.push(Some(running));
            continue;
        }
        let prev = closes[idx - 1];
        if prev == 0.0 {
            out.push(None);
            continue;
        }
        running *= 1.0 + (close - prev) / prev;
        out.push(Some(running));
    }

    out
}

/// Compare two close series on their shared dates.
///
/// Fewer than [`ROLLING_WINDOW`] shared dates leaves every rolling output
/// empty rather than failing.
pub fn compute_pairwise_metrics(a: &PriceSeries, b: &PriceSeries) -> PairwiseMetrics {
    let (dates, closes_a, closes_b) = align(a, b);

    PairwiseMetrics {
        symbol_a: a.symbol.clone(),
        symbol_b: b.symbol.clone(),
        rolling_correlation: rolling_correlation(&closes_a, &closes_b, ROLLING_WINDOW),
        price_ratio: price_ratio(&closes_a, &closes_b),
        rolling_volatility_a: rolling_std(&closes_a, ROLLING_WINDOW),
        rolling_volatility_b: rolling_std(&closes_b, ROLLING_WINDOW),
        cumulative_return_a: cumulative_returns(&closes_a),
        cumulative_return_b: cumulative_returns(&closes_b),
        dates,
    }
}

/// Benchmark compared against each other index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub benchmark: String,
    pub start: NaiveDate,
    pub pairs: Vec<PairwiseMetrics>,
    pub dropped: Vec<DroppedSymbol>,
}

/// Fetch the benchmark once and compare it with every index in `others`.
///
/// A benchmark that cannot be fetched fails the call. Unavailable comparison
/// indices are dropped with a diagnostic.
pub fn compare_against_benchmark<F, S>(
    feed: &F,
    benchmark: &str,
    others: &[S],
    start: NaiveDate,
) -> Result<BenchmarkComparison, FeedError>
where
    F: PriceFeed + ?Sized,
    S: AsRef<str> + Sync,
{
    let base = feed.fetch_series(benchmark, start)?;

    let results: Vec<(&str, Result<PriceSeries, FeedError>)> = others
        .par_iter()
        .map(|symbol| (symbol.as_ref(), feed.fetch_series(symbol.as_ref(), start)))
        .collect();

    let mut pairs = Vec::with_capacity(results.len());
    let mut dropped = Vec::new();

    for (symbol, result) in results {
        match result {
            Ok(series) => pairs.push(compute_pairwise_metrics(&base, &series)),
            Err(e) => {
                warn!("Skipping {} in comparison against {}: {}", symbol, benchmark, e);
                dropped.push(DroppedSymbol::from_error(symbol, &e));
            }
        }
    }

    info!(
        "Compared {} against {}/{} indices since {}",
        benchmark,
        pairs.len(),
        others.len(),
        start
    );

    Ok(BenchmarkComparison {
        benchmark: benchmark.to_string(),
        start,
        pairs,
        dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MemoryPriceFeed, PriceBar};
    use approx::assert_relative_eq;
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn series(symbol: &str, closes: &[f64]) -> PriceSeries {
        let start = date(2024, 1, 1);
        PriceSeries::new(
            symbol,
            closes
                .iter()
                .enumerate()
                .map(|(i, c)| (start + chrono::Duration::days(i as i64), *c))
                .collect(),
        )
    }

    fn wave(n: usize, phase: f64) -> Vec<f64> {
        (0..n).map(|i| 100.0 + 10.0 * ((i as f64) / 5.0 + phase).sin() + i as f64 * 0.1).collect()
    }

    #[test]
    fn test_alignment_uses_common_dates() {
        let a = PriceSeries::new("A", vec![(date(2024, 1, 1), 1.0), (date(2024, 1, 2), 2.0), (date(2024, 1, 4), 4.0)]);
        let b = PriceSeries::new("B", vec![(date(2024, 1, 2), 20.0), (date(2024, 1, 3), 30.0), (date(2024, 1, 4), 40.0)]);

        let metrics = compute_pairwise_metrics(&a, &b);
        assert_eq!(metrics.dates, vec![date(2024, 1, 2), date(2024, 1, 4)]);
        assert_eq!(metrics.price_ratio, vec![Some(0.1), Some(0.1)]);
        assert_eq!(metrics.cumulative_return_a, vec![Some(1.0), Some(2.0)]);
    }

    #[test]
    fn test_rolling_window_warmup() {
        let a = series("A", &wave(120, 0.0));
        let b = series("B", &wave(120, 1.3));
        let metrics = compute_pairwise_metrics(&a, &b);

        assert_eq!(metrics.len(), 120);
        for idx in 0..ROLLING_WINDOW - 1 {
            assert!(metrics.rolling_correlation[idx].is_none());
            assert!(metrics.rolling_volatility_a[idx].is_none());
            assert!(metrics.rolling_volatility_b[idx].is_none());
        }
        for idx in ROLLING_WINDOW - 1..120 {
            let corr = metrics.rolling_correlation[idx].unwrap();
            assert!((-1.0..=1.0).contains(&corr));
            assert!(metrics.rolling_volatility_a[idx].unwrap() > 0.0);
        }
    }

    #[test]
    fn test_short_history_all_none() {
        let a = series("A", &wave(30, 0.0));
        let b = series("B", &wave(30, 0.5));
        let metrics = compute_pairwise_metrics(&a, &b);
        assert!(metrics.rolling_correlation.iter().all(Option::is_none));
        assert!(metrics.rolling_volatility_a.iter().all(Option::is_none));
        assert_eq!(metrics.cumulative_return_a.len(), 30);
    }

    #[test]
    fn test_identical_series_correlate_perfectly() {
        let closes = wave(60, 0.0);
        let doubled: Vec<f64> = closes.iter().map(|c| c * 2.0).collect();
        let corr = rolling_correlation(&closes, &doubled, ROLLING_WINDOW);
        assert_relative_eq!(corr[59].unwrap(), 1.0, epsilon = 1e-9);

        let inverted: Vec<f64> = closes.iter().map(|c| 500.0 - c).collect();
        let corr = rolling_correlation(&closes, &inverted, ROLLING_WINDOW);
        assert_relative_eq!(corr[59].unwrap(), -1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_flat_window_has_no_correlation() {
        let flat = vec![10.0; 60];
        let moving = wave(60, 0.0);
        let corr = rolling_correlation(&flat, &moving, ROLLING_WINDOW);
        assert!(corr.iter().all(Option::is_none));
    }

    #[test]
    fn test_rolling_std_is_sample_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let std = rolling_std(&values, 8);
        // Population std is 2.0; sample std is sqrt(32 / 7).
        assert_relative_eq!(std[7].unwrap(), (32.0_f64 / 7.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_price_ratio_zero_denominator() {
        let ratio = price_ratio(&[1.0, 2.0, 3.0], &[2.0, 0.0, f64::NAN]);
        assert_eq!(ratio, vec![Some(0.5), None, None]);
    }

    #[test]
    fn test_cumulative_return_starts_at_one() {
        let cum = cumulative_returns(&[100.0, 110.0, 99.0]);
        assert_eq!(cum[0], Some(1.0));
        assert_relative_eq!(cum[1].unwrap(), 1.1, epsilon = 1e-12);
        assert_relative_eq!(cum[2].unwrap(), 0.99, epsilon = 1e-12);
    }

    #[test]
    fn test_cumulative_return_zero_close() {
        let cum = cumulative_returns(&[100.0, 0.0, 50.0, 55.0]);
        assert_eq!(cum[0], Some(1.0));
        assert_eq!(cum[1], Some(0.0));
        assert_eq!(cum[2], None);
        assert_relative_eq!(cum[3].unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_deterministic() {
        let a = series("A", &wave(80, 0.0));
        let b = series("B", &wave(80, 2.0));
        assert_eq!(compute_pairwise_metrics(&a, &b), compute_pairwise_metrics(&a, &b));
    }

    #[test]
    fn test_compare_against_benchmark_drops_missing() {
        let bars = |closes: Vec<f64>| -> Vec<PriceBar> {
            closes
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    PriceBar::close_only(
                        date(2024, 1, 1) + chrono::Duration::days(i as i64),
                        Decimal::try_from(*c).unwrap(),
                    )
                })
                .collect()
        };
        let feed = MemoryPriceFeed::new()
            .with_symbol("^BVSP", bars(wave(60, 0.0)))
            .with_symbol("^GSPC", bars(wave(60, 0.7)));

        let comparison =
            compare_against_benchmark(&feed, "^BVSP", &["^GSPC", "^IXIC"], date(2024, 1, 1)).unwrap();
        assert_eq!(comparison.pairs.len(), 1);
        assert_eq!(comparison.pairs[0].symbol_b, "^GSPC");
        assert_eq!(comparison.dropped[0].symbol, "^IXIC");
        assert!(comparison.pairs[0].summary().contains("IBOVESPA vs S&P 500"));

        let err = compare_against_benchmark(&feed, "^MISSING", &["^GSPC"], date(2024, 1, 1));
        assert!(err.is_err());
    }
}
