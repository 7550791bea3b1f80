//! Joining two variables observed at the same instant.
//!
//! Used for salinity/oxygen relationship charts. Series are matched on exact
//! timestamp equality with a hash join. When several readings share a
//! timestamp on both sides, every combination is emitted; timestamps present
//! on only one side contribute nothing.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDateTime};
use serde::Serialize;

use crate::model::{Point, Season};

/// Two values observed at `time`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pair {
    pub time: NaiveDateTime,
    pub x: f64,
    pub y: f64,
}

/// All `(x, y)` pairs with equal timestamps, sorted by time.
pub fn join_on_time(xs: &[Point], ys: &[Point]) -> Vec<Pair> {
    let mut by_time: HashMap<NaiveDateTime, Vec<f64>> = HashMap::with_capacity(ys.len());
    for p in ys {
        by_time.entry(p.time).or_default().push(p.value);
    }

    let mut pairs: Vec<Pair> = xs
        .iter()
        .flat_map(|x| {
            by_time
                .get(&x.time)
                .into_iter()
                .flatten()
                .map(move |&y| Pair {
                    time: x.time,
                    x: x.value,
                    y,
                })
        })
        .collect();
    pairs.sort_by_key(|p| p.time);
    pairs
}

/// Pairs of one group (a calendar month or a season).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairGroup {
    pub label: String,
    pub pairs: Vec<(f64, f64)>,
}

const MONTH_LABELS: [&str; 12] = [
    "JA", "FE", "MR", "AL", "MA", "JN", "JL", "AU", "SE", "OC", "NO", "DE",
];

/// Splits pairs by calendar month. Months without pairs are omitted.
pub fn group_by_month(pairs: &[Pair]) -> Vec<PairGroup> {
    (1..=12u32)
        .filter_map(|month| {
            let members: Vec<(f64, f64)> = pairs
                .iter()
                .filter(|p| p.time.month() == month)
                .map(|p| (p.x, p.y))
                .collect();
            (!members.is_empty()).then(|| PairGroup {
                label: MONTH_LABELS[month as usize - 1].to_string(),
                pairs: members,
            })
        })
        .collect()
}

/// Splits pairs by season, in season order. A pair lands in every season
/// that lists its month; seasons without pairs are omitted.
pub fn group_by_season(pairs: &[Pair], seasons: &[Season]) -> Vec<PairGroup> {
    seasons
        .iter()
        .filter_map(|season| {
            let members: Vec<(f64, f64)> = pairs
                .iter()
                .filter(|p| season.contains_month(p.time.month()))
                .map(|p| (p.x, p.y))
                .collect();
            (!members.is_empty()).then(|| PairGroup {
                label: season.label.clone(),
                pairs: members,
            })
        })
        .collect()
}
