//! Annual and decadal aggregation, and anomalies.
//!
//! Everything here is a pure function of an already-filtered point series.
//! Buckets with no points are simply absent from the output: an empty input
//! produces an empty map, never a division by zero.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::model::{Point, Season};

// ---------------------------------------------------------------------------
// Running totals
// ---------------------------------------------------------------------------

/// `(sum, count)` per bucket key.
pub type Totals<K> = BTreeMap<K, (f64, usize)>;

/// Adds `value` to the bucket `key`. NaN is ignored.
pub fn update_totals<K: Ord>(totals: &mut Totals<K>, key: K, value: f64) {
    if value.is_nan() {
        return;
    }
    let entry = totals.entry(key).or_insert((0.0, 0));
    entry.0 += value;
    entry.1 += 1;
}

/// `sum / count` for every non-empty bucket.
pub fn averages<K: Ord + Copy>(totals: &Totals<K>) -> BTreeMap<K, f64> {
    totals
        .iter()
        .filter(|(_, (_, n))| *n > 0)
        .map(|(k, (sum, n))| (*k, sum / *n as f64))
        .collect()
}

/// Arithmetic mean, `None` for an empty input.
pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

pub fn yearly_totals(points: &[Point]) -> Totals<i32> {
    let mut totals = Totals::new();
    for p in points {
        update_totals(&mut totals, p.year(), p.value);
    }
    totals
}

// ---------------------------------------------------------------------------
// Annual strategies
// ---------------------------------------------------------------------------

/// Turns per-year totals (plus the raw points they came from) into one value
/// per year. Passed by callers that want to choose between plain averages
/// and anomalies without duplicating the grouping code.
pub type AveragingFn = fn(&Totals<i32>, &[Point]) -> BTreeMap<i32, f64>;

pub fn annual_averaging(totals: &Totals<i32>, _points: &[Point]) -> BTreeMap<i32, f64> {
    averages(totals)
}

/// Per-year average minus the mean of *all* raw points.
///
/// The reference is deliberately the mean of the raw observations, not the
/// mean of the annual averages, so years with more samples pull the
/// reference towards themselves.
pub fn anomaly_averaging(totals: &Totals<i32>, points: &[Point]) -> BTreeMap<i32, f64> {
    let Some(reference) = mean(points.iter().map(|p| p.value)) else {
        return BTreeMap::new();
    };
    averages(totals)
        .into_iter()
        .map(|(year, avg)| (year, avg - reference))
        .collect()
}

pub fn yearly_series(points: &[Point], averaging: AveragingFn) -> BTreeMap<i32, f64> {
    averaging(&yearly_totals(points), points)
}

pub fn annual_average(points: &[Point]) -> BTreeMap<i32, f64> {
    yearly_series(points, annual_averaging)
}

pub fn anomalies(points: &[Point]) -> BTreeMap<i32, f64> {
    yearly_series(points, anomaly_averaging)
}

// ---------------------------------------------------------------------------
// Decades
// ---------------------------------------------------------------------------

/// Two-stage decade statistics: both `value` and `year` are averages of the
/// decade's annual figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecadeAverage {
    /// `year div 10`, e.g. 201 for the 2010s.
    pub decade: i32,
    /// Mean of the years that had data.
    pub year: f64,
    /// `year` placed on the calendar, for time axes.
    pub date: Option<NaiveDate>,
    pub value: f64,
}

pub fn decadal_average(points: &[Point]) -> Vec<DecadeAverage> {
    let mut values: Totals<i32> = Totals::new();
    let mut years: Totals<i32> = Totals::new();
    for (year, avg) in annual_average(points) {
        let decade = year.div_euclid(10);
        update_totals(&mut values, decade, avg);
        update_totals(&mut years, decade, year as f64);
    }
    let years = averages(&years);
    averages(&values)
        .into_iter()
        .map(|(decade, value)| {
            let year = years[&decade];
            DecadeAverage {
                decade,
                year,
                date: date_from_fractional_year(year),
                value,
            }
        })
        .collect()
}

/// `2014.5` → 2014-07-02: the fractional part is a share of that year's days.
pub fn date_from_fractional_year(year: f64) -> Option<NaiveDate> {
    if !year.is_finite() {
        return None;
    }
    let whole = year.floor();
    let start = NaiveDate::from_ymd_opt(whole as i32, 1, 1)?;
    let next = NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)?;
    let days = (next - start).num_days() as f64;
    let offset = ((year - whole) * days).floor() as i64;
    start.checked_add_signed(Duration::days(offset))
}

// ---------------------------------------------------------------------------
// Seasonal adjustment
// ---------------------------------------------------------------------------

/// Subtracts each point's calendar-month mean (taken across all years).
pub fn remove_monthly_climatology(points: &[Point]) -> Vec<Point> {
    let mut totals: Totals<u32> = Totals::new();
    for p in points {
        update_totals(&mut totals, p.month(), p.value);
    }
    let climatology = averages(&totals);
    points
        .iter()
        .filter_map(|p| {
            climatology
                .get(&p.month())
                .map(|m| Point::new(p.time, p.value - m))
        })
        .collect()
}

/// Subtracts the mean of the first season containing each point's month.
/// Points whose month is in no season are dropped.
pub fn remove_seasonal_means(points: &[Point], seasons: &[Season]) -> Vec<Point> {
    let season_of = |p: &Point| seasons.iter().position(|s| s.contains_month(p.month()));

    let mut totals: Totals<usize> = Totals::new();
    for p in points {
        if let Some(idx) = season_of(p) {
            update_totals(&mut totals, idx, p.value);
        }
    }
    let means = averages(&totals);
    points
        .iter()
        .filter_map(|p| {
            let idx = season_of(p)?;
            means.get(&idx).map(|m| Point::new(p.time, p.value - m))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
