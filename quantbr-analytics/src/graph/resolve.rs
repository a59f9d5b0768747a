//! Acquirer name resolution.
//!
//! Each acquirer name is matched against the ticker→name table as a
//! case-insensitive whole word. Every matching ticker yields its own
//! [`ResolvedAcquisition`], so one deal can fan out to several tickers.

use std::collections::{HashMap, HashSet};
use std::io::Write;

use rayon::prelude::*;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, info};

use crate::data::{AcquisitionRecord, TableError, TickerName, TickerSector};

/// Sector used when the ticker has none.
pub const UNKNOWN_SECTOR: &str = "Unknown";

/// Acquisition whose acquirer was matched to a listed ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAcquisition {
    pub record: AcquisitionRecord,
    pub ticker: String,
    /// Never empty. Ticker sector first, then the record's own sector, then
    /// [`UNKNOWN_SECTOR`].
    pub sector: String,
}

impl ResolvedAcquisition {
    pub fn acquirer(&self) -> &str {
        &self.record.acquirer
    }

    pub fn target(&self) -> &str {
        &self.record.target
    }
}

/// Whole-word, case-insensitive matcher for one acquirer name.
fn name_matcher(acquirer: &str) -> Option<Regex> {
    if acquirer.trim().is_empty() {
        return None;
    }
    let pattern = format!(r"\b{}\b", regex::escape(acquirer));
    RegexBuilder::new(&pattern).case_insensitive(true).build().ok()
}

/// Tickers whose company name contains `acquirer` as a whole word.
///
/// Results keep name-table order. Blank acquirers and blank names never match.
pub fn match_tickers<'a>(acquirer: &str, names: &'a [TickerName]) -> Vec<&'a str> {
    let Some(re) = name_matcher(acquirer) else {
        return Vec::new();
    };

    names
        .iter()
        .filter(|row| {
            row.name
                .as_deref()
                .is_some_and(|name| !name.trim().is_empty() && re.is_match(name))
        })
        .map(|row| row.symbol.as_str())
        .collect()
}

/// Ticker → sector, first row wins. Blank sectors count as missing.
fn sector_lookup(sectors: &[TickerSector]) -> HashMap<&str, &str> {
    let mut lookup = HashMap::with_capacity(sectors.len());
    for row in sectors {
        lookup.entry(row.symbol.as_str()).or_insert_with(|| {
            row.sector
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(UNKNOWN_SECTOR)
        });
    }
    lookup
}

fn sector_for<'a>(ticker: &str, record: &'a AcquisitionRecord, sector_of: &HashMap<&str, &'a str>) -> &'a str {
    sector_of
        .get(ticker)
        .copied()
        .filter(|s| *s != UNKNOWN_SECTOR)
        .or_else(|| {
            record
                .raw_sector_guess
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or(UNKNOWN_SECTOR)
}

/// Resolve every acquirer to zero or more tickers.
///
/// Output follows input record order, then name-table order within a record.
/// Records whose acquirer matches nothing are dropped.
pub fn resolve_acquisitions(
    records: &[AcquisitionRecord],
    names: &[TickerName],
    sectors: &[TickerSector],
) -> Vec<ResolvedAcquisition> {
    let mut seen = HashSet::new();
    let acquirers: Vec<&str> = records
        .iter()
        .map(|r| r.acquirer.as_str())
        .filter(|a| seen.insert(*a))
        .collect();

    let matches: HashMap<&str, Vec<&str>> = acquirers
        .par_iter()
        .map(|acquirer| (*acquirer, match_tickers(acquirer, names)))
        .collect();

    let sector_of = sector_lookup(sectors);
    let mut resolved = Vec::with_capacity(records.len());
    let mut unmatched = 0usize;

    for record in records {
        let tickers = matches
            .get(record.acquirer.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();

        if tickers.is_empty() {
            debug!("No ticker match for acquirer '{}'", record.acquirer);
            unmatched += 1;
            continue;
        }

        for ticker in tickers {
            resolved.push(ResolvedAcquisition {
                record: record.clone(),
                ticker: ticker.to_string(),
                sector: sector_for(ticker, record, &sector_of).to_string(),
            });
        }
    }

    info!(
        "Resolved {} acquisitions into {} rows ({} without a ticker match)",
        records.len(),
        resolved.len(),
        unmatched
    );
    resolved
}

/// Flat row of the resolved acquisitions table.
#[derive(Debug, Serialize)]
struct ResolvedRow<'a> {
    #[serde(rename = "Child")]
    child: &'a str,
    #[serde(rename = "Parent")]
    parent: &'a str,
    #[serde(rename = "Year Acquired")]
    year: Option<i32>,
    #[serde(rename = "Deal Date")]
    deal_date: Option<&'a str>,
    symbol: &'a str,
    #[serde(rename = "Industry")]
    industry: &'a str,
}

/// Write resolved rows as CSV.
pub fn write_resolved<W: Write>(writer: W, resolved: &[ResolvedAcquisition]) -> Result<(), TableError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in resolved {
        wtr.serialize(ResolvedRow {
            child: &row.record.target,
            parent: &row.record.acquirer,
            year: row.record.year,
            deal_date: row.record.deal_date.as_deref(),
            symbol: &row.ticker,
            industry: &row.sector,
        })?;
    }
    wtr.flush()?;
    Ok(())
}
