//! Sampling density statistics.
//!
//! Counts are of distinct *sources* (files, casts, stations), never of
//! individual records: a cast that reports forty depths in one month counts
//! once for that month.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Datelike;
use serde::Serialize;

use crate::model::MeasurementRecord;

/// Distinct sources per year.
pub fn counts_by_year<'a, I>(records: I) -> BTreeMap<i32, BTreeSet<String>>
where
    I: IntoIterator<Item = &'a MeasurementRecord>,
{
    let mut years: BTreeMap<i32, BTreeSet<String>> = BTreeMap::new();
    for record in records {
        years
            .entry(record.timestamp().year())
            .or_default()
            .insert(record.source().to_string());
    }
    years
}

/// Distinct-source count per month of `year`. Months without data are absent.
pub fn counts_by_month<'a, I>(year: i32, records: I) -> BTreeMap<u32, usize>
where
    I: IntoIterator<Item = &'a MeasurementRecord>,
{
    let mut months: BTreeMap<u32, BTreeSet<&'a str>> = BTreeMap::new();
    for record in records {
        let time = record.timestamp();
        if time.year() == year {
            months.entry(time.month()).or_default().insert(record.source());
        }
    }
    months.into_iter().map(|(m, s)| (m, s.len())).collect()
}

// ---------------------------------------------------------------------------
// Monthly coverage grid
// ---------------------------------------------------------------------------

/// Rows are months (January first), columns are consecutive years.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageGrid {
    pub years: Vec<i32>,
    /// `cells[month - 1][year - first_year]`
    pub cells: Vec<Vec<usize>>,
    /// Largest cell value, for colour scaling. Zero for an empty grid.
    pub peak: usize,
}

impl CoverageGrid {
    pub fn cell(&self, month: u32, year: i32) -> usize {
        let Some(&first) = self.years.first() else {
            return 0;
        };
        if !(1..=12).contains(&month) || year < first {
            return 0;
        }
        self.cells
            .get(month as usize - 1)
            .and_then(|row| row.get((year - first) as usize))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }
}

/// One column per year from first to last sampled, each filled from
/// [`counts_by_month`].
pub fn coverage_grid<'a, I>(records: I) -> CoverageGrid
where
    I: IntoIterator<Item = &'a MeasurementRecord>,
{
    let records: Vec<&MeasurementRecord> = records.into_iter().collect();
    let first = records.iter().map(|r| r.timestamp().year()).min();
    let last = records.iter().map(|r| r.timestamp().year()).max();
    let years: Vec<i32> = match (first, last) {
        (Some(first), Some(last)) => (first..=last).collect(),
        _ => Vec::new(),
    };

    let mut cells = vec![vec![0usize; years.len()]; 12];
    for (column, &year) in years.iter().enumerate() {
        for (month, count) in counts_by_month(year, records.iter().copied()) {
            cells[month as usize - 1][column] = count;
        }
    }
    let peak = cells.iter().flatten().copied().max().unwrap_or(0);

    CoverageGrid { years, cells, peak }
}

// ---------------------------------------------------------------------------
// Station histogram
// ---------------------------------------------------------------------------

/// Sources per year over a contiguous year range, for a sampling-history bar
/// chart. Years without data are present with a zero count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationHistogram {
    pub bins: Vec<(i32, usize)>,
    pub total: usize,
}

pub fn station_histogram(stations: &BTreeMap<i32, BTreeSet<String>>) -> StationHistogram {
    let (Some(first), Some(last)) = (stations.keys().next(), stations.keys().next_back()) else {
        return StationHistogram {
            bins: Vec::new(),
            total: 0,
        };
    };
    let bins: Vec<(i32, usize)> = (*first..=*last)
        .map(|year| (year, stations.get(&year).map_or(0, BTreeSet::len)))
        .collect();
    let total = bins.iter().map(|(_, n)| n).sum();
    StationHistogram { bins, total }
}
