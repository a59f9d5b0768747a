//! Core price data types.
//!
//! Bars keep monetary fields as `Decimal`, matching what the providers
//! publish. Series used by the statistics code carry `f64` closes.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Daily OHLCV bar as returned by a price feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

impl PriceBar {
    /// Bar where every price field is the close. Useful when a source only
    /// publishes closing prices.
    pub fn close_only(date: NaiveDate, close: Decimal) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0,
        }
    }

    /// Close as a float, `None` if it cannot be represented.
    pub fn close_f64(&self) -> Option<f64> {
        f64::try_from(self.close).ok().filter(|c| c.is_finite())
    }
}

/// Ordered `(date, close)` history for one symbol.
///
/// Dates are strictly increasing. When the input holds the same date more
/// than once, the last occurrence wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    points: Vec<(NaiveDate, f64)>,
}

impl PriceSeries {
    /// Build a series from unordered points.
    pub fn new(symbol: impl Into<String>, mut points: Vec<(NaiveDate, f64)>) -> Self {
        // Stable sort keeps input order among equal dates.
        points.sort_by_key(|(date, _)| *date);
        points.dedup_by(|later, kept| {
            if later.0 == kept.0 {
                kept.1 = later.1;
                true
            } else {
                false
            }
        });

        Self {
            symbol: symbol.into(),
            points,
        }
    }

    /// Build a series from feed bars, skipping closes that do not fit in an `f64`.
    pub fn from_bars(symbol: impl Into<String>, bars: &[PriceBar]) -> Self {
        let points = bars
            .iter()
            .filter_map(|bar| bar.close_f64().map(|close| (bar.date, close)))
            .collect();
        Self::new(symbol, points)
    }

    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|(date, _)| *date)
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(_, close)| *close)
    }

    /// Close on an exact date.
    pub fn close_on(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |(d, _)| *d)
            .ok()
            .map(|idx| self.points[idx].1)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|(date, _)| *date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|(date, _)| *date)
    }
}
