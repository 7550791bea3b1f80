//! Month-based x axes for multi-year series.
//!
//! Two layouts are supported:
//!
//! - **collapsed**: `x = month` (1–12). Years are folded on top of each other.
//! - **expanded**: `x = (year - first_year) * 12 + month`. One slot per
//!   calendar month across the whole span, evenly spaced whether or not a
//!   month was sampled.
//!
//! Both layouts come with an axis of first-of-month dates, one per slot, so
//! the renderer can label ticks and evaluate fitted curves on a regular grid.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::model::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    Collapsed,
    Expanded,
}

/// One evenly spaced position on the month axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisSlot {
    pub index: f64,
    pub date: NaiveDate,
}

/// A series re-expressed against a month axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonalIndex {
    pub mode: IndexMode,
    /// `(index, value)` pairs in time order.
    pub points: Vec<(f64, f64)>,
    pub axis: Vec<AxisSlot>,
}

impl SeasonalIndex {
    pub fn indices(&self) -> Vec<f64> {
        self.points.iter().map(|(x, _)| *x).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|(_, y)| *y).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

pub fn collapsed_index(time: NaiveDateTime) -> f64 {
    time.month() as f64
}

pub fn expanded_index(time: NaiveDateTime, first_year: i32) -> f64 {
    ((time.year() - first_year) * 12) as f64 + time.month() as f64
}

/// Indexes `points` on the requested axis. The input need not be sorted.
pub fn index_series(points: &[Point], mode: IndexMode) -> SeasonalIndex {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| p.time);

    let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
        return SeasonalIndex {
            mode,
            points: Vec::new(),
            axis: Vec::new(),
        };
    };
    let first_year = first.year();
    let last_year = last.year();

    let indexed = sorted
        .iter()
        .map(|p| {
            let x = match mode {
                IndexMode::Collapsed => collapsed_index(p.time),
                IndexMode::Expanded => expanded_index(p.time, first_year),
            };
            (x, p.value)
        })
        .collect();

    let axis = match mode {
        IndexMode::Collapsed => month_slots(first_year, first_year, first_year),
        IndexMode::Expanded => month_slots(first_year, last_year, first_year),
    };

    SeasonalIndex {
        mode,
        points: indexed,
        axis,
    }
}

fn month_slots(from_year: i32, to_year: i32, first_year: i32) -> Vec<AxisSlot> {
    (from_year..=to_year)
        .flat_map(|year| (1..=12).map(move |month| (year, month)))
        .filter_map(|(year, month)| {
            let date = NaiveDate::from_ymd_opt(year, month, 1)?;
            let index = ((year - first_year) * 12) as f64 + month as f64;
            Some(AxisSlot { index, date })
        })
        .collect()
}

/// Number of points falling in each calendar month, January first.
pub fn monthly_frequency(points: &[Point]) -> [usize; 12] {
    let mut counts = [0usize; 12];
    for p in points {
        counts[p.month() as usize - 1] += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(year: i32, month: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, 10)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap()
    }

    fn series() -> Vec<Point> {
        vec![
            Point::new(at(2003, 2), 3.0),
            Point::new(at(2001, 11), 1.0),
            Point::new(at(2002, 5), 2.0),
        ]
    }

    #[test]
    fn test_collapsed_index_is_month_of_year() {
        let index = index_series(&series(), IndexMode::Collapsed);
        assert_eq!(index.points, vec![(11.0, 1.0), (5.0, 2.0), (2.0, 3.0)]);
        assert_eq!(index.axis.len(), 12);
        assert_eq!(index.axis[0].index, 1.0);
        assert_eq!(index.axis[11].date, NaiveDate::from_ymd_opt(2001, 12, 1).unwrap());
    }

    #[test]
    fn test_expanded_index_counts_months_from_first_year() {
        let index = index_series(&series(), IndexMode::Expanded);
        assert_eq!(index.indices(), vec![11.0, 17.0, 26.0]);
        assert_eq!(index.values(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_expanded_axis_has_a_slot_for_every_month_even_unsampled() {
        let index = index_series(&series(), IndexMode::Expanded);
        assert_eq!(index.axis.len(), 36, "three calendar years of months");
        for (i, slot) in index.axis.iter().enumerate() {
            assert_eq!(slot.index, (i + 1) as f64, "slots are evenly spaced");
        }
        assert_eq!(index.axis[35].date, NaiveDate::from_ymd_opt(2003, 12, 1).unwrap());
    }

    #[test]
    fn test_empty_series_indexes_to_empty_axis() {
        let index = index_series(&[], IndexMode::Expanded);
        assert!(index.is_empty());
        assert!(index.axis.is_empty());
    }

    #[test]
    fn test_monthly_frequency() {
        let mut points = series();
        points.push(Point::new(at(2010, 2), 9.0));
        let counts = monthly_frequency(&points);
        assert_eq!(counts[1], 2);
        assert_eq!(counts[4], 1);
        assert_eq!(counts[10], 1);
        assert_eq!(counts.iter().sum::<usize>(), 4);
    }
}
