//! Range-limit outlier filtering.
//!
//! Every analysis stage runs on the output of [`apply_limit`]. Limits are
//! strict open intervals: a value sitting exactly on either bound is treated
//! as an outlier. A missing limit means "unrestricted".

use serde::{Deserialize, Serialize};

use crate::model::Point;

/// An open interval `(low, high)` of acceptable values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    pub low: f64,
    pub high: f64,
}

impl Limit {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// `low < value < high`. NaN is never admitted.
    pub fn admits(&self, value: f64) -> bool {
        self.low < value && value < self.high
    }
}

/// Returns the points whose value passes `limit`.
///
/// `None` keeps every point. NaN readings never survive either way, so
/// downstream stages can sum without checking. An empty result is normal
/// and means "no data for this bucket".
pub fn apply_limit(points: &[Point], limit: Option<Limit>) -> Vec<Point> {
    points
        .iter()
        .filter(|p| !p.value.is_nan())
        .filter(|p| limit.is_none_or(|l| l.admits(p.value)))
        .copied()
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
