//! Linear and harmonic trend fitting on month-indexed series.
//!
//! The harmonic model is
//!
//! ```text
//! value = amplitude * sin(2π * frequency * index + phase) + offset
//! ```
//!
//! with `frequency` fixed at 1/12, 1/6 or 1/3 cycles per month and the other
//! three parameters free. Fits are solved with Levenberg–Marquardt from the
//! starting point `offset = mean`, `amplitude = (max - min) / 2`, `phase = 1`.
//! Each period is fitted independently; a failure for one period is reported
//! and does not affect the others or the linear trend.

use std::f64::consts::{PI, TAU};

use chrono::{NaiveDate, NaiveDateTime};
use nalgebra::{Matrix3, Vector3};
use serde::Serialize;

use crate::analysis::aggregate::mean;
use crate::analysis::seasonal::{AxisSlot, SeasonalIndex};
use crate::model::{AnalysisError, Point};

/// Periods, in months, of the harmonics fitted by [`fit_trends`].
pub const HARMONIC_PERIODS: [u32; 3] = [12, 6, 3];

const MAX_ITERATIONS: usize = 500;
const FTOL: f64 = 1e-12;
const XTOL: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e16;

// ---------------------------------------------------------------------------
// Linear
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn evaluate(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Ordinary least squares line. `None` with fewer than two points or when
/// every `x` is the same.
pub fn fit_linear(xs: &[f64], ys: &[f64]) -> Option<LinearFit> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let ss_x: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    if ss_x.abs() < 1e-15 {
        return None;
    }
    let sp: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();
    let slope = sp / ss_x;
    Some(LinearFit {
        slope,
        intercept: mean_y - slope * mean_x,
    })
}

/// A line through a time series, with days since the first observation as
/// the x axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatedTrend {
    pub fit: LinearFit,
    /// Fitted value at each observation time, in time order.
    pub line: Vec<(NaiveDateTime, f64)>,
}

pub fn linear_trend_by_days(points: &[Point]) -> Option<DatedTrend> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| p.time);
    let start = sorted.first()?.time;

    let xs: Vec<f64> = sorted
        .iter()
        .map(|p| (p.time - start).num_seconds() as f64 / 86_400.0)
        .collect();
    let ys: Vec<f64> = sorted.iter().map(|p| p.value).collect();
    let fit = fit_linear(&xs, &ys)?;

    let line = sorted
        .iter()
        .zip(&xs)
        .map(|(p, x)| (p.time, fit.evaluate(*x)))
        .collect();
    Some(DatedTrend { fit, line })
}

// ---------------------------------------------------------------------------
// Harmonics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarmonicFit {
    pub period_months: u32,
    /// Cycles per month.
    pub frequency: f64,
    /// Always non-negative.
    pub amplitude: f64,
    /// Radians in `[0, 2π)`.
    pub phase: f64,
    pub offset: f64,
    /// Residual sum of squares at the solution.
    pub rss: f64,
    pub iterations: usize,
}

impl HarmonicFit {
    pub fn evaluate(&self, index: f64) -> f64 {
        sine_model(index, self.frequency, self.amplitude, self.phase, self.offset)
    }

    /// The fitted curve sampled at every slot of a month axis.
    pub fn curve(&self, axis: &[AxisSlot]) -> Vec<(NaiveDate, f64)> {
        axis.iter().map(|s| (s.date, self.evaluate(s.index))).collect()
    }
}

fn sine_model(x: f64, frequency: f64, amplitude: f64, phase: f64, offset: f64) -> f64 {
    amplitude * (TAU * frequency * x + phase).sin() + offset
}

/// Fits one fixed-period harmonic to `(xs, ys)`.
pub fn fit_harmonic(xs: &[f64], ys: &[f64], period_months: u32) -> Result<HarmonicFit, AnalysisError> {
    let fail = |reason: String| AnalysisError::NonConvergence {
        period_months,
        reason,
    };

    if period_months == 0 {
        return Err(fail("period must be positive".to_string()));
    }
    let n = xs.len().min(ys.len());
    if n < 3 {
        return Err(fail(format!("need at least 3 points, got {}", n)));
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    if xs.iter().chain(ys).any(|v| !v.is_finite()) {
        return Err(fail("non-finite input".to_string()));
    }
    // Amplitude, phase and offset need three distinct positions in the cycle.
    let positions = distinct_cycle_positions(xs, period_months);
    if positions < 3 {
        return Err(fail(format!(
            "need 3 distinct positions in the {}-month cycle, got {}",
            period_months, positions
        )));
    }

    let frequency = 1.0 / period_months as f64;
    let omega = TAU * frequency;
    let max = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = ys.iter().copied().fold(f64::INFINITY, f64::min);
    let offset = mean(ys.iter().copied()).unwrap_or(0.0);

    // [amplitude, phase, offset]
    let mut params = Vector3::new((max - min) / 2.0, 1.0, offset);
    let mut cost = residual_cost(xs, ys, omega, &params);
    let mut damping = 1e-3;
    let mut converged = cost == 0.0;
    let mut iterations = 0;

    while !converged && iterations < MAX_ITERATIONS {
        iterations += 1;

        let mut jtj = Matrix3::<f64>::zeros();
        let mut jtr = Vector3::<f64>::zeros();
        for (&x, &y) in xs.iter().zip(ys) {
            let theta = omega * x + params[1];
            let (sin, cos) = theta.sin_cos();
            let residual = y - (params[0] * sin + params[2]);
            let row = Vector3::new(sin, params[0] * cos, 1.0);
            jtj += row * row.transpose();
            jtr += row * residual;
        }

        let mut scale = jtj.diagonal();
        scale.apply(|d| *d = d.max(1e-12));
        let system = jtj + Matrix3::from_diagonal(&(scale * damping));

        let Some(step) = system.cholesky().map(|c| c.solve(&jtr)) else {
            damping *= 10.0;
            if damping > MAX_DAMPING {
                break;
            }
            continue;
        };

        let candidate = params + step;
        let candidate_cost = residual_cost(xs, ys, omega, &candidate);

        if candidate_cost.is_finite() && candidate_cost < cost {
            let improvement = cost - candidate_cost;
            let small_step = step.norm() <= XTOL * (params.norm() + XTOL);
            params = candidate;
            cost = candidate_cost;
            damping = (damping / 10.0).max(1e-15);
            if improvement <= FTOL * cost || small_step || cost == 0.0 {
                converged = true;
            }
        } else {
            damping *= 10.0;
            // No step in any direction lowers the cost: we are at a minimum.
            if damping > MAX_DAMPING {
                converged = true;
            }
        }
    }

    if !converged {
        return Err(fail(format!("no convergence after {} iterations", iterations)));
    }
    if params.iter().any(|p| !p.is_finite()) {
        return Err(fail("diverged to non-finite parameters".to_string()));
    }

    let (mut amplitude, mut phase) = (params[0], params[1]);
    if amplitude < 0.0 {
        amplitude = -amplitude;
        phase += PI;
    }

    Ok(HarmonicFit {
        period_months,
        frequency,
        amplitude,
        phase: phase.rem_euclid(TAU),
        offset: params[2],
        rss: cost,
        iterations,
    })
}

/// Number of distinct values of `x mod period` in `xs`.
fn distinct_cycle_positions(xs: &[f64], period_months: u32) -> usize {
    let period = f64::from(period_months);
    let mut positions: Vec<f64> = xs.iter().map(|x| x.rem_euclid(period)).collect();
    positions.sort_by(f64::total_cmp);
    positions.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    // 0 and a value just under `period` are the same spot on the cycle.
    let n = positions.len();
    if n > 1 && period - (positions[n - 1] - positions[0]) < 1e-9 {
        positions.pop();
    }
    positions.len()
}

fn residual_cost(xs: &[f64], ys: &[f64], omega: f64, params: &Vector3<f64>) -> f64 {
    xs.iter()
        .zip(ys)
        .map(|(&x, &y)| {
            let r = y - (params[0] * (omega * x + params[1]).sin() + params[2]);
            r * r
        })
        .sum()
}

// ---------------------------------------------------------------------------
// Combined
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedHarmonic {
    pub period_months: u32,
    pub reason: String,
}

/// Linear trend plus every harmonic that could be fitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendFits {
    pub linear: Option<LinearFit>,
    pub harmonics: Vec<HarmonicFit>,
    pub skipped: Vec<SkippedHarmonic>,
}

impl TrendFits {
    pub fn harmonic(&self, period_months: u32) -> Option<&HarmonicFit> {
        self.harmonics.iter().find(|h| h.period_months == period_months)
    }
}

pub fn fit_trends(index: &SeasonalIndex) -> TrendFits {
    let xs = index.indices();
    let ys = index.values();

    let mut harmonics = Vec::new();
    let mut skipped = Vec::new();
    for period in HARMONIC_PERIODS {
        match fit_harmonic(&xs, &ys, period) {
            Ok(fit) => harmonics.push(fit),
            Err(AnalysisError::NonConvergence { period_months, reason }) => {
                skipped.push(SkippedHarmonic { period_months, reason })
            }
            Err(other) => skipped.push(SkippedHarmonic {
                period_months: period,
                reason: other.to_string(),
            }),
        }
    }

    TrendFits {
        linear: fit_linear(&xs, &ys),
        harmonics,
        skipped,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::seasonal::{IndexMode, index_series};

    fn synthetic() -> (Vec<f64>, Vec<f64>) {
        let xs: Vec<f64> = (1..=24).map(f64::from).collect();
        let ys = xs.iter().map(|m| 5.0 * (TAU * m / 12.0).sin() + 20.0).collect();
        (xs, ys)
    }

    #[test]
    fn test_twelve_month_harmonic_is_recovered() {
        let (xs, ys) = synthetic();
        let fit = fit_harmonic(&xs, &ys, 12).expect("12-month fit should converge");
        assert!((fit.amplitude - 5.0).abs() < 0.1, "amplitude was {}", fit.amplitude);
        assert!((fit.offset - 20.0).abs() < 0.1, "offset was {}", fit.offset);
        assert!(fit.rss < 1e-6, "noise-free data should fit exactly, rss {}", fit.rss);
        assert!(fit.phase.abs() < 1e-3 || (fit.phase - TAU).abs() < 1e-3);
    }

    #[test]
    fn test_shorter_harmonics_still_return_parameters() {
        let (xs, ys) = synthetic();
        for period in [6, 3] {
            let fit = fit_harmonic(&xs, &ys, period)
                .unwrap_or_else(|e| panic!("{}-month fit should return parameters: {}", period, e));
            assert!(fit.amplitude.is_finite());
            assert!(fit.offset.is_finite());
            assert!(fit.amplitude >= 0.0);
        }
    }

    #[test]
    fn test_fitted_curve_follows_axis() {
        let (xs, ys) = synthetic();
        let fit = fit_harmonic(&xs, &ys, 12).unwrap();
        for (x, y) in xs.iter().zip(&ys) {
            assert!((fit.evaluate(*x) - y).abs() < 1e-3);
        }
    }

    #[test]
    fn test_constant_series_fits_flat_curve() {
        let xs: Vec<f64> = (1..=10).map(f64::from).collect();
        let ys = vec![7.0; 10];
        let fit = fit_harmonic(&xs, &ys, 12).expect("flat data is a valid fit");
        assert_eq!(fit.amplitude, 0.0);
        assert_eq!(fit.offset, 7.0);
    }

    #[test]
    fn test_too_few_points_does_not_converge() {
        let err = fit_harmonic(&[1.0, 2.0], &[3.0, 4.0], 6).unwrap_err();
        assert!(matches!(err, AnalysisError::NonConvergence { period_months: 6, .. }));
    }

    #[test]
    fn test_single_month_collapsed_series_skips_every_harmonic() {
        // One July cast a year: a single position on the annual cycle.
        let points: Vec<Point> = (2000..2010)
            .map(|year| {
                Point::new(
                    NaiveDate::from_ymd_opt(year, 7, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                    f64::from(year),
                )
            })
            .collect();
        let fits = fit_trends(&index_series(&points, IndexMode::Collapsed));

        assert!(fits.harmonics.is_empty(), "no curve from one month: {:?}", fits.harmonics);
        let periods: Vec<u32> = fits.skipped.iter().map(|s| s.period_months).collect();
        assert_eq!(periods, HARMONIC_PERIODS.to_vec());
        assert!(fits.linear.is_none());
    }

    #[test]
    fn test_months_that_alias_on_short_period_are_skipped() {
        // January, April, July, October sit at one point of a 3-month cycle.
        let xs = [1.0, 4.0, 7.0, 10.0, 1.0, 4.0];
        let ys = [3.0, 5.0, 4.0, 6.0, 2.0, 5.0];
        let err = fit_harmonic(&xs, &ys, 3).unwrap_err();
        assert!(matches!(err, AnalysisError::NonConvergence { period_months: 3, .. }));
        assert!(fit_harmonic(&xs, &ys, 12).is_ok(), "four months pin down an annual cycle");
    }

    #[test]
    fn test_linear_fit() {
        let fit = fit_linear(&[1.0, 2.0, 3.0], &[3.0, 5.0, 7.0]).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!(fit_linear(&[4.0, 4.0], &[1.0, 2.0]).is_none());
        assert!(fit_linear(&[1.0], &[1.0]).is_none());
    }

    #[test]
    fn test_fit_trends_skips_harmonics_but_keeps_linear() {
        let points = vec![
            Point::new(
                NaiveDate::from_ymd_opt(2001, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                1.0,
            ),
            Point::new(
                NaiveDate::from_ymd_opt(2001, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                2.0,
            ),
        ];
        let fits = fit_trends(&index_series(&points, IndexMode::Expanded));
        assert!(fits.linear.is_some());
        assert!(fits.harmonics.is_empty());
        let periods: Vec<u32> = fits.skipped.iter().map(|s| s.period_months).collect();
        assert_eq!(periods, HARMONIC_PERIODS.to_vec());
    }

    #[test]
    fn test_linear_trend_by_days() {
        let start = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let points = vec![
            Point::new(start + chrono::Duration::days(10), 2.0),
            Point::new(start, 1.0),
        ];
        let trend = linear_trend_by_days(&points).unwrap();
        assert!((trend.fit.slope - 0.1).abs() < 1e-12);
        assert_eq!(trend.line[0].0, start, "line is in time order");
        assert!(linear_trend_by_days(&[]).is_none());
    }
}
