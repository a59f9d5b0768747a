//! Static reference tables.
//!
//! Each table is read into an explicit record type. A table without one of
//! its required columns is a structural error; nothing downstream can guess
//! a substitute.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Table {table} is missing required column '{column}'")]
    MissingColumn { table: String, column: String },
}

/// Row of `ticker_to_name.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerName {
    pub symbol: String,
    /// Company name. Blank names never match anything.
    #[serde(default)]
    pub name: Option<String>,
}

/// Row of `ticker_to_sector.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSector {
    pub symbol: String,
    /// Sector; blank means unknown.
    #[serde(default)]
    pub sector: Option<String>,
}

/// Row of `us_market_data.csv`. Other columns are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCapRow {
    pub symbol: String,
    /// Blank or non-numeric cells are absent; acquirers then get a zero cap.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub market_cap: Option<f64>,
}

impl MarketCapRow {
    pub fn market_cap_decimal(&self) -> Option<Decimal> {
        self.market_cap.and_then(Decimal::from_f64_retain)
    }
}

/// One announced acquisition.
///
/// Accepts the raw feed headers and the short ones used in the intermediate
/// tables (`Child`, `Parent`, `Year Acquired`, `Deal Date`, `Industry`).
/// Optional cells that do not parse are treated as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionRecord {
    #[serde(rename = "Acquiring Company", alias = "Parent")]
    pub acquirer: String,

    #[serde(rename = "Acquired Company", alias = "Child")]
    pub target: String,

    #[serde(
        rename = "Year of acquisition announcement",
        alias = "Year Acquired",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    pub year: Option<i32>,

    #[serde(rename = "Deal announced on", alias = "Deal Date", default)]
    pub deal_date: Option<String>,

    /// Sector already attached to the deal, e.g. the `Industry` column of a
    /// previously resolved table. Used when the ticker has no sector.
    #[serde(rename = "Sector", alias = "Industry", default)]
    pub raw_sector_guess: Option<String>,
}

impl AcquisitionRecord {
    pub fn new(acquirer: impl Into<String>, target: impl Into<String>, year: Option<i32>) -> Self {
        Self {
            acquirer: acquirer.into(),
            target: target.into(),
            year,
            deal_date: None,
            raw_sector_guess: None,
        }
    }

    pub fn with_deal_date(mut self, deal_date: impl Into<String>) -> Self {
        self.deal_date = Some(deal_date.into());
        self
    }

    pub fn with_sector_guess(mut self, sector: impl Into<String>) -> Self {
        self.raw_sector_guess = Some(sector.into());
        self
    }
}

/// Required columns as (canonical name, accepted aliases).
type RequiredColumns<'a> = &'a [(&'a str, &'a [&'a str])];

const TICKER_NAME_COLUMNS: RequiredColumns = &[("symbol", &[]), ("name", &[])];
const TICKER_SECTOR_COLUMNS: RequiredColumns = &[("symbol", &[]), ("sector", &[])];
const MARKET_CAP_COLUMNS: RequiredColumns = &[("symbol", &[]), ("market_cap", &[])];
const ACQUISITION_COLUMNS: RequiredColumns = &[
    ("Acquiring Company", &["Parent"]),
    ("Acquired Company", &["Child"]),
];

fn verify_required_columns(
    table: &str,
    headers: &csv::StringRecord,
    required: RequiredColumns,
) -> Result<(), TableError> {
    let present: HashSet<&str> = headers.iter().collect();

    for (column, aliases) in required {
        let found = present.contains(column) || aliases.iter().any(|a| present.contains(a));
        if !found {
            return Err(TableError::MissingColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

fn read_table<T, R>(table: &str, reader: R, required: RequiredColumns) -> Result<Vec<T>, TableError>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    verify_required_columns(table, &headers, required)?;

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        rows.push(result?);
    }
    Ok(rows)
}

fn read_table_file<T: DeserializeOwned>(
    table: &str,
    path: &Path,
    required: RequiredColumns,
) -> Result<Vec<T>, TableError> {
    let file = std::fs::File::open(path)?;
    read_table(table, file, required)
}

pub fn load_ticker_names(path: impl AsRef<Path>) -> Result<Vec<TickerName>, TableError> {
    read_table_file("ticker_to_name", path.as_ref(), TICKER_NAME_COLUMNS)
}

pub fn read_ticker_names<R: Read>(reader: R) -> Result<Vec<TickerName>, TableError> {
    read_table("ticker_to_name", reader, TICKER_NAME_COLUMNS)
}

pub fn load_ticker_sectors(path: impl AsRef<Path>) -> Result<Vec<TickerSector>, TableError> {
    read_table_file("ticker_to_sector", path.as_ref(), TICKER_SECTOR_COLUMNS)
}

pub fn read_ticker_sectors<R: Read>(reader: R) -> Result<Vec<TickerSector>, TableError> {
    read_table("ticker_to_sector", reader, TICKER_SECTOR_COLUMNS)
}

pub fn load_market_caps(path: impl AsRef<Path>) -> Result<Vec<MarketCapRow>, TableError> {
    read_table_file("us_market_data", path.as_ref(), MARKET_CAP_COLUMNS)
}

pub fn read_market_caps<R: Read>(reader: R) -> Result<Vec<MarketCapRow>, TableError> {
    read_table("us_market_data", reader, MARKET_CAP_COLUMNS)
}

pub fn load_acquisitions(path: impl AsRef<Path>) -> Result<Vec<AcquisitionRecord>, TableError> {
    read_table_file("acquisitions", path.as_ref(), ACQUISITION_COLUMNS)
}

pub fn read_acquisitions<R: Read>(reader: R) -> Result<Vec<AcquisitionRecord>, TableError> {
    read_table("acquisitions", reader, ACQUISITION_COLUMNS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_acquisitions_raw_headers() {
        let csv = "\
Acquired Company,Acquiring Company,Year of acquisition announcement,Deal announced on
Instagram,Facebook,2012,4/9/2012
WhatsApp,Facebook,2014,
";
        let rows = read_acquisitions(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].acquirer, "Facebook");
        assert_eq!(rows[0].target, "Instagram");
        assert_eq!(rows[0].year, Some(2012));
        assert_eq!(rows[0].deal_date.as_deref(), Some("4/9/2012"));
        assert_eq!(rows[1].deal_date, None);
        assert_eq!(rows[1].raw_sector_guess, None);
    }

    #[test]
    fn test_read_acquisitions_short_headers() {
        let csv = "Child,Parent,Year Acquired\nInstagram,Facebook,2012\n";
        let rows = read_acquisitions(csv.as_bytes()).unwrap();
        assert_eq!(rows[0], AcquisitionRecord::new("Facebook", "Instagram", Some(2012)));
    }

    #[test]
    fn test_float_year_keeps_row() {
        let csv = "\
Child,Parent,Year Acquired,Deal Date,symbol,Industry
Instagram,Facebook,2012.0,4/9/2012,FB,Technology
WhatsApp,Facebook,2014,,FB,Technology
";
        let rows = read_acquisitions(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].year, None);
        assert_eq!(rows[0].deal_date.as_deref(), Some("4/9/2012"));
        assert_eq!(rows[0].raw_sector_guess.as_deref(), Some("Technology"));
        assert_eq!(rows[1].year, Some(2014));
    }

    #[test]
    fn test_unparseable_market_cap_is_absent() {
        let rows = read_market_caps("symbol,market_cap\nAAPL,N/A\nFB,100\n".as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].market_cap, None);
        assert_eq!(rows[0].market_cap_decimal(), None);
        assert_eq!(rows[1].market_cap, Some(100.0));
    }

    #[test]
    fn test_missing_required_column_is_fatal() {
        let csv = "Acquired Company,Year of acquisition announcement\nInstagram,2012\n";
        let err = read_acquisitions(csv.as_bytes()).unwrap_err();
        match err {
            TableError::MissingColumn { table, column } => {
                assert_eq!(table, "acquisitions");
                assert_eq!(column, "Acquiring Company");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blank_sector_is_none() {
        let csv = "symbol,sector\nFB,Technology\nXYZ,\n";
        let rows = read_ticker_sectors(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].sector.as_deref(), Some("Technology"));
        assert_eq!(rows[1].sector, None);
    }

    #[test]
    fn test_market_caps_ignore_extra_columns() {
        let csv = "symbol,name,market_cap,country\nAAPL,Apple Inc.,3400000000000,United States\n";
        let rows = read_market_caps(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].symbol, "AAPL");
        assert_eq!(rows[0].market_cap, Some(3.4e12));
    }

    #[test]
    fn test_names_table_requires_name() {
        let err = read_ticker_names("symbol,company\nFB,Meta\n".as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::MissingColumn { .. }));
    }
}
