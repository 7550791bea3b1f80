//! Batch analysis reports
//!
//! Runs every configured query against every inlet and gathers the results
//! into one serializable report for the rendering side. Each query is
//! independent: a failure is recorded as a failed outcome and the batch
//! carries on.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use rayon::prelude::*;
use serde::Serialize;

use crate::analysis::aggregate::{
    AveragingFn, DecadeAverage, annual_average, annual_averaging, anomalies, anomaly_averaging,
    decadal_average, remove_monthly_climatology, remove_seasonal_means, yearly_series,
};
use crate::analysis::filter::apply_limit;
use crate::analysis::pairing::{Pair, PairGroup, group_by_month, group_by_season, join_on_time};
use crate::analysis::sampling::{CoverageGrid, StationHistogram, coverage_grid, station_histogram};
use crate::analysis::seasonal::{IndexMode, SeasonalIndex, index_series, monthly_frequency};
use crate::analysis::trend::{DatedTrend, TrendFits, fit_trends, linear_trend_by_days};
use crate::config::{AnalysisSettings, VariableQuery};
use crate::inlets::{Inlet, RecordStore, group_by_area};
use crate::logging::{self, Stage};
use crate::model::{AnalysisError, Category, Point, Variable};

// ============================================================================
// Query Results
// ============================================================================

/// Why a completed query is missing part of its output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Gap {
    EmptyBucket { what: String },
    SkippedHarmonic {
        mode: IndexMode,
        period_months: u32,
        reason: String,
    },
    NoLinearTrend { mode: IndexMode },
}

impl Gap {
    /// The analysis error behind this gap, for logging. A missing linear
    /// trend is not an error.
    pub fn as_error(&self) -> Option<AnalysisError> {
        match self {
            Gap::EmptyBucket { what } => Some(AnalysisError::EmptyBucket { what: what.clone() }),
            Gap::SkippedHarmonic {
                period_months,
                reason,
                ..
            } => Some(AnalysisError::NonConvergence {
                period_months: *period_months,
                reason: reason.clone(),
            }),
            Gap::NoLinearTrend { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarmonicCurve {
    pub period_months: u32,
    pub points: Vec<(NaiveDate, f64)>,
}

/// A series on one month axis with its fitted curves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonalTrend {
    pub index: SeasonalIndex,
    pub fits: TrendFits,
    /// Linear trend evaluated on every axis slot. Empty when no line fits.
    pub linear_line: Vec<(NaiveDate, f64)>,
    pub curves: Vec<HarmonicCurve>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryReport {
    pub query: VariableQuery,
    /// Depth legend text, e.g. `"100m-200m"`.
    pub label: String,
    /// Value axis text with units, e.g. `"DO (mL/L)"`.
    pub axis_label: &'static str,
    pub points: Vec<Point>,
    /// Points removed by the range limit (NaN included).
    pub excluded: usize,
    pub annual: BTreeMap<i32, f64>,
    pub anomalies: BTreeMap<i32, f64>,
    pub decadal: Vec<DecadeAverage>,
    pub decadal_anomalies: Vec<DecadeAverage>,
    pub seasonal_decadal_anomalies: Vec<DecadeAverage>,
    pub monthly_frequency: [usize; 12],
    pub collapsed: SeasonalTrend,
    pub expanded: SeasonalTrend,
    pub dated_trend: Option<DatedTrend>,
    pub gaps: Vec<Gap>,
}

impl QueryReport {
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    Completed { report: Box<QueryReport> },
    Failed { query: VariableQuery, message: String },
}

impl QueryOutcome {
    pub fn report(&self) -> Option<&QueryReport> {
        match self {
            QueryOutcome::Completed { report } => Some(report.as_ref()),
            QueryOutcome::Failed { .. } => None,
        }
    }
}

// ============================================================================
// Single Query
// ============================================================================

/// Records for a query, restricted to the cutoff, averaged if requested and
/// passed through the range limit. Returns `(retained, excluded)`.
pub fn filtered_series(
    inlet: &Inlet,
    query: VariableQuery,
    settings: &AnalysisSettings,
) -> (Vec<Point>, usize) {
    let raw = inlet.variable_data(
        query.variable,
        query.category,
        settings.before,
        settings.do_average,
    );
    let limit = if settings.use_limits {
        inlet.limits().limit_for(query.variable, query.category)
    } else {
        None
    };
    let kept = apply_limit(&raw, limit);
    let excluded = raw.len() - kept.len();
    (kept, excluded)
}

fn seasonal_trend(points: &[Point], mode: IndexMode, gaps: &mut Vec<Gap>) -> SeasonalTrend {
    let index = index_series(points, mode);
    let fits = fit_trends(&index);

    let linear_line = match &fits.linear {
        Some(line) => index
            .axis
            .iter()
            .map(|slot| (slot.date, line.evaluate(slot.index)))
            .collect(),
        None => {
            gaps.push(Gap::NoLinearTrend { mode });
            Vec::new()
        }
    };
    let curves = fits
        .harmonics
        .iter()
        .map(|h| HarmonicCurve {
            period_months: h.period_months,
            points: h.curve(&index.axis),
        })
        .collect();
    for skipped in &fits.skipped {
        gaps.push(Gap::SkippedHarmonic {
            mode,
            period_months: skipped.period_months,
            reason: skipped.reason.clone(),
        });
    }

    SeasonalTrend {
        index,
        fits,
        linear_line,
        curves,
    }
}

/// Runs every analysis stage for one variable × category of one inlet.
///
/// Only configuration problems (a category with no bounds) fail the query.
/// Missing data and failed fits still produce a report, marked with gaps.
pub fn analyze_query(
    inlet: &Inlet,
    query: VariableQuery,
    settings: &AnalysisSettings,
) -> Result<QueryReport, AnalysisError> {
    let label = inlet.bounds_label(query.category)?;
    let (points, excluded) = filtered_series(inlet, query, settings);
    logging::debug(
        Stage::Filter,
        Some(inlet.name()),
        &format!("{}: kept {} points, excluded {}", query, points.len(), excluded),
    );

    let mut gaps = Vec::new();
    if points.is_empty() {
        gaps.push(Gap::EmptyBucket {
            what: format!("{} {}", inlet.name(), query),
        });
    }

    let collapsed = seasonal_trend(&points, IndexMode::Collapsed, &mut gaps);
    let expanded = seasonal_trend(&points, IndexMode::Expanded, &mut gaps);
    for err in gaps.iter().filter_map(Gap::as_error) {
        logging::log_query_gap(inlet.name(), &query.to_string(), &err);
    }

    Ok(QueryReport {
        query,
        label,
        axis_label: query.variable.axis_label(),
        excluded,
        annual: annual_average(&points),
        anomalies: anomalies(&points),
        decadal: decadal_average(&points),
        decadal_anomalies: decadal_average(&remove_monthly_climatology(&points)),
        seasonal_decadal_anomalies: decadal_average(&remove_seasonal_means(
            &points,
            inlet.seasons(),
        )),
        monthly_frequency: monthly_frequency(&points),
        collapsed,
        expanded,
        dated_trend: linear_trend_by_days(&points),
        gaps,
        points,
    })
}

// ============================================================================
// Paired Relationship
// ============================================================================

/// Deep salinity against deep oxygen at matching timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairedRelationship {
    pub label: String,
    pub pairs: Vec<Pair>,
    pub by_month: Vec<PairGroup>,
    pub by_season: Vec<PairGroup>,
}

pub fn paired_relationship(
    inlet: &Inlet,
    settings: &AnalysisSettings,
) -> Result<PairedRelationship, AnalysisError> {
    let category = Category::Deep;
    let label = inlet.bounds_label(category)?;
    let (salinity, _) = filtered_series(inlet, VariableQuery::new(Variable::Salinity, category), settings);
    let (oxygen, _) = filtered_series(inlet, VariableQuery::new(Variable::Oxygen, category), settings);

    let pairs = join_on_time(&salinity, &oxygen);
    Ok(PairedRelationship {
        label,
        by_month: group_by_month(&pairs),
        by_season: group_by_season(&pairs, inlet.seasons()),
        pairs,
    })
}

// ============================================================================
// Area Comparison
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Averaging {
    Annual,
    Anomaly,
}

impl Averaging {
    pub fn strategy(self) -> AveragingFn {
        match self {
            Averaging::Annual => annual_averaging,
            Averaging::Anomaly => anomaly_averaging,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InletSeries {
    pub inlet: String,
    pub label: String,
    pub values: BTreeMap<i32, f64>,
}

/// Yearly series of several inlets in the same area, for one chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaComparison {
    pub area: String,
    pub query: VariableQuery,
    pub averaging: Averaging,
    /// Combined depth range, `None` when no inlet defines the category.
    pub span: Option<String>,
    pub series: Vec<InletSeries>,
}

/// `"below {lowest}m"` when any inlet's range is open at the bottom,
/// otherwise `"{lowest}-{highest}m"`.
pub fn span_label<'a>(inlets: impl IntoIterator<Item = &'a Inlet>, category: Category) -> Option<String> {
    let bounds: Vec<_> = inlets.into_iter().filter_map(|i| i.bounds(category)).collect();
    let lowest = bounds.iter().map(|b| b.lower).reduce(f64::min)?;
    if bounds.iter().any(|b| b.upper.is_none()) {
        return Some(format!("below {}m", lowest));
    }
    let highest = bounds.iter().filter_map(|b| b.upper).reduce(f64::max)?;
    Some(format!("{}-{}m", lowest, highest))
}

pub fn compare_area(
    area: &str,
    inlets: &[&Inlet],
    query: VariableQuery,
    averaging: Averaging,
    settings: &AnalysisSettings,
) -> AreaComparison {
    let series = inlets
        .iter()
        .filter_map(|inlet| match inlet.bounds_label(query.category) {
            Ok(label) => {
                let (points, _) = filtered_series(inlet, query, settings);
                Some(InletSeries {
                    inlet: inlet.name().to_string(),
                    label,
                    values: yearly_series(&points, averaging.strategy()),
                })
            }
            Err(e) => {
                logging::debug(Stage::Aggregate, Some(inlet.name()), &format!("left out of {} comparison: {}", area, e));
                None
            }
        })
        .collect();

    AreaComparison {
        area: area.to_string(),
        query,
        averaging,
        span: span_label(inlets.iter().copied(), query.category),
        series,
    }
}

// ============================================================================
// Batch
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InletReport {
    pub name: String,
    pub area: String,
    pub stations: StationHistogram,
    pub coverage: CoverageGrid,
    pub paired: Option<PairedRelationship>,
    pub queries: Vec<QueryOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub inlets: usize,
    pub completed: usize,
    pub incomplete: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub before: NaiveDateTime,
    pub inlets: Vec<InletReport>,
    pub comparisons: Vec<AreaComparison>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn inlet(&self, name: &str) -> Option<&InletReport> {
        self.inlets.iter().find(|r| r.name == name)
    }
}

pub fn analyze_inlet(inlet: &Inlet, settings: &AnalysisSettings) -> InletReport {
    logging::info(
        Stage::Batch,
        Some(inlet.name()),
        &format!("analysing {} records", inlet.records().len()),
    );

    let queries = settings
        .queries
        .iter()
        .map(|&query| match analyze_query(inlet, query, settings) {
            Ok(report) => QueryOutcome::Completed {
                report: Box::new(report),
            },
            Err(e) => {
                logging::log_query_failure(inlet.name(), &query.to_string(), &e);
                QueryOutcome::Failed {
                    query,
                    message: e.to_string(),
                }
            }
        })
        .collect();

    let paired = paired_relationship(inlet, settings)
        .inspect_err(|e| {
            logging::debug(Stage::Batch, Some(inlet.name()), &format!("no paired relationship: {}", e))
        })
        .ok();

    let current = inlet
        .records()
        .iter()
        .filter(|r| r.timestamp() < settings.before);

    InletReport {
        name: inlet.name().to_string(),
        area: inlet.area().to_string(),
        stations: station_histogram(&inlet.station_data(settings.before)),
        coverage: coverage_grid(current),
        paired,
        queries,
    }
}

fn summarize(inlets: &[InletReport]) -> BatchSummary {
    let mut summary = BatchSummary {
        inlets: inlets.len(),
        ..BatchSummary::default()
    };
    for outcome in inlets.iter().flat_map(|r| &r.queries) {
        match outcome.report() {
            Some(report) => {
                summary.completed += 1;
                if !report.is_complete() {
                    summary.incomplete += 1;
                }
            }
            None => summary.failed += 1,
        }
    }
    summary
}

/// Analyses every inlet in parallel, then builds area comparisons.
pub fn run_batch(inlets: &[Inlet], settings: &AnalysisSettings) -> BatchReport {
    let reports: Vec<InletReport> = inlets
        .par_iter()
        .map(|inlet| analyze_inlet(inlet, settings))
        .collect();

    let comparisons = group_by_area(inlets)
        .into_iter()
        .flat_map(move |(area, members)| {
            settings.queries.iter().flat_map(move |&query| {
                let members = members.clone();
                [Averaging::Annual, Averaging::Anomaly]
                    .into_iter()
                    .map(move |averaging| compare_area(area, &members, query, averaging, settings))
            })
        })
        .collect();

    let summary = summarize(&reports);
    logging::log_batch_summary(
        summary.inlets,
        summary.completed,
        summary.incomplete,
        summary.failed,
    );

    BatchReport {
        before: settings.before,
        inlets: reports,
        comparisons,
        summary,
    }
}

// ============================================================================
// Tests
// ============================================================================
