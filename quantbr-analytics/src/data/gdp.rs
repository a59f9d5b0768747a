//! State GDP table.
//!
//! The source file is wide: GeoFIPS, State, GeoName and Unit columns, then
//! one column per year. Loading melts it into one row per (state, year).

use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};

use super::reference::TableError;

const ID_COLUMNS: &[&str] = &["GeoFIPS", "State", "GeoName", "Unit"];

/// GDP for one state in one year. `gdp` is `None` for blank cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateGdp {
    pub geo_fips: String,
    pub state: String,
    pub geo_name: String,
    pub unit: String,
    pub year: i32,
    pub gdp: Option<f64>,
}

/// One year's rows plus the colour-scale bounds taken over every year.
///
/// The bounds are `None` when no cell in the table holds a value.
#[derive(Debug, Clone, PartialEq)]
pub struct GdpSnapshot<'a> {
    pub year: i32,
    pub rows: Vec<&'a StateGdp>,
    pub min_gdp: Option<f64>,
    pub max_gdp: Option<f64>,
}

pub fn load_state_gdp(path: impl AsRef<Path>) -> Result<Vec<StateGdp>, TableError> {
    let file = std::fs::File::open(path.as_ref())?;
    read_state_gdp(file)
}

/// Melt the wide table into long rows, ordered by year, then file order.
pub fn read_state_gdp<R: Read>(reader: R) -> Result<Vec<StateGdp>, TableError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let mut id_idx = [0usize; 4];
    for (slot, column) in id_idx.iter_mut().zip(ID_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h == *column)
            .ok_or_else(|| TableError::MissingColumn {
                table: "state_gdp".to_string(),
                column: column.to_string(),
            })?;
    }

    let year_columns: Vec<(usize, i32)> = headers
        .iter()
        .enumerate()
        .filter_map(|(idx, h)| {
            (h.len() == 4)
                .then(|| h.parse::<i32>().ok())
                .flatten()
                .map(|year| (idx, year))
        })
        .collect();

    let mut records = Vec::new();
    for result in rdr.records() {
        records.push(result?);
    }

    let field = |record: &csv::StringRecord, idx: usize| record.get(idx).unwrap_or("").to_string();

    let mut rows = Vec::with_capacity(records.len() * year_columns.len());
    for &(col, year) in &year_columns {
        for record in &records {
            rows.push(StateGdp {
                geo_fips: field(record, id_idx[0]),
                state: field(record, id_idx[1]),
                geo_name: field(record, id_idx[2]),
                unit: field(record, id_idx[3]),
                year,
                gdp: record.get(col).and_then(|v| v.replace(',', "").parse().ok()),
            });
        }
    }

    Ok(rows)
}

/// Rows for `year`, or `None` when the table has no data for it.
pub fn gdp_for_year(rows: &[StateGdp], year: i32) -> Option<GdpSnapshot<'_>> {
    let (min_gdp, max_gdp) = rows.iter().filter_map(|r| r.gdp).fold(
        (None, None),
        |(lo, hi): (Option<f64>, Option<f64>), v| {
            (
                Some(lo.map_or(v, |lo| lo.min(v))),
                Some(hi.map_or(v, |hi| hi.max(v))),
            )
        },
    );

    let selected: Vec<&StateGdp> = rows.iter().filter(|r| r.year == year).collect();
    if selected.is_empty() {
        return None;
    }

    Some(GdpSnapshot {
        year,
        rows: selected,
        min_gdp,
        max_gdp,
    })
}
