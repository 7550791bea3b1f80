/// Inlet registry and in-memory record store.
///
/// An [`Inlet`] owns its depth bounds, outlier limits, seasons and the
/// collection of measurement records that ingestion assigned to it. The
/// analysis stages never see the collection directly: they ask a
/// [`RecordStore`] for a `(timestamp, value)` view restricted to a variable,
/// a depth category and the run's cutoff. Nothing here mutates a record and
/// nothing here caches a derived series.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;

use crate::analysis::sampling;
use crate::config::LimitTable;
use crate::model::{
    Category, ConfigError, DepthBounds, MeasurementRecord, Point, Season, Variable,
    label_from_bounds,
};

// ---------------------------------------------------------------------------
// Record store boundary
// ---------------------------------------------------------------------------

/// Read-only access to an inlet's records.
pub trait RecordStore {
    /// Points for `variable` in every base category covered by `category`,
    /// restricted to `timestamp < before` and sorted by time.
    ///
    /// With `do_average`, readings sharing a timestamp and a source are
    /// collapsed to their mean before being returned.
    fn variable_data(
        &self,
        variable: Variable,
        category: Category,
        before: NaiveDateTime,
        do_average: bool,
    ) -> Vec<Point>;

    /// Distinct sources per year, over all variables and depths.
    fn station_data(&self, before: NaiveDateTime) -> BTreeMap<i32, BTreeSet<String>>;

    /// Caller-defined seasons, in configuration order.
    fn seasons(&self) -> &[Season];
}

// ---------------------------------------------------------------------------
// Inlet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Inlet {
    name: String,
    area: String,
    bounds: BTreeMap<Category, DepthBounds>,
    limits: LimitTable,
    seasons: Vec<Season>,
    records: Vec<MeasurementRecord>,
}

impl Inlet {
    /// Creates an inlet with no records. An inlet without an `area` forms
    /// its own comparison group.
    pub fn new(
        name: impl Into<String>,
        area: Option<String>,
        bounds: BTreeMap<Category, DepthBounds>,
        limits: LimitTable,
        seasons: Vec<Season>,
    ) -> Self {
        let name = name.into();
        let area = area.unwrap_or_else(|| name.clone());
        Self {
            name,
            area,
            bounds,
            limits,
            seasons,
            records: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn area(&self) -> &str {
        &self.area
    }

    pub fn limits(&self) -> &LimitTable {
        &self.limits
    }

    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    /// Appends a record. Records must carry a base category.
    pub fn add_record(&mut self, record: MeasurementRecord) -> Result<(), ConfigError> {
        if !record.category().is_base() {
            return Err(ConfigError::CompositeCategory(record.category().to_string()));
        }
        self.records.push(record);
        Ok(())
    }

    pub fn with_records(
        mut self,
        records: impl IntoIterator<Item = MeasurementRecord>,
    ) -> Result<Self, ConfigError> {
        for record in records {
            self.add_record(record)?;
        }
        Ok(self)
    }

    /// Depth range of a category. For composites this spans from the
    /// shallowest defined constituent's lower bound to the deepest defined
    /// constituent's upper bound.
    pub fn bounds(&self, category: Category) -> Option<DepthBounds> {
        let defined: Vec<&DepthBounds> = category
            .constituents()
            .iter()
            .filter_map(|c| self.bounds.get(c))
            .collect();
        let first = defined.first()?;
        let last = defined.last()?;
        Some(DepthBounds::new(first.lower, last.upper))
    }

    /// Legend text for a category, e.g. `"100m-200m"`.
    pub fn bounds_label(&self, category: Category) -> Result<String, ConfigError> {
        self.bounds(category)
            .map(|b| label_from_bounds(b.lower, b.upper))
            .ok_or_else(|| ConfigError::MissingBounds {
                inlet: self.name.clone(),
                category: category.to_string(),
            })
    }

    /// Assigns a depth to the shallowest base category whose bounds contain it.
    pub fn categorize(&self, depth: f64) -> Option<Category> {
        Category::BASE
            .into_iter()
            .find(|c| self.bounds.get(c).is_some_and(|b| b.contains(depth)))
    }

    fn records_before(&self, before: NaiveDateTime) -> impl Iterator<Item = &MeasurementRecord> {
        self.records.iter().filter(move |r| r.timestamp() < before)
    }
}

impl RecordStore for Inlet {
    fn variable_data(
        &self,
        variable: Variable,
        category: Category,
        before: NaiveDateTime,
        do_average: bool,
    ) -> Vec<Point> {
        // One pass over the records; each record is tested once against the
        // resolved category set, so composites cannot double count.
        let wanted = category.resolve();
        let selected = self
            .records_before(before)
            .filter(|r| r.variable() == variable && wanted.contains(&r.category()));

        let mut points: Vec<Point> = if do_average {
            let mut groups: BTreeMap<(NaiveDateTime, &str), (f64, usize)> = BTreeMap::new();
            for record in selected {
                let entry = groups
                    .entry((record.timestamp(), record.source()))
                    .or_insert((0.0, 0));
                if !record.value().is_nan() {
                    entry.0 += record.value();
                    entry.1 += 1;
                }
            }
            groups
                .into_iter()
                .map(|((time, _), (sum, n))| {
                    let value = if n == 0 { f64::NAN } else { sum / n as f64 };
                    Point::new(time, value)
                })
                .collect()
        } else {
            selected.map(MeasurementRecord::point).collect()
        };

        points.sort_by_key(|p| p.time);
        points
    }

    fn station_data(&self, before: NaiveDateTime) -> BTreeMap<i32, BTreeSet<String>> {
        sampling::counts_by_year(self.records_before(before))
    }

    fn seasons(&self) -> &[Season] {
        &self.seasons
    }
}

// ---------------------------------------------------------------------------
// Registry helpers
// ---------------------------------------------------------------------------

/// Lower-case, trimmed, spaces replaced by dashes: `"Burke Channel"` →
/// `"burke-channel"`.
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

/// Applies keep/drop name lists. An empty `keep` list keeps everything.
pub fn select_inlets(inlets: Vec<Inlet>, keep: &[String], drop: &[String]) -> Vec<Inlet> {
    let keep: BTreeSet<String> = keep.iter().map(|n| normalize(n)).collect();
    let drop: BTreeSet<String> = drop.iter().map(|n| normalize(n)).collect();
    inlets
        .into_iter()
        .filter(|i| {
            let name = normalize(&i.name);
            (keep.is_empty() || keep.contains(&name)) && !drop.contains(&name)
        })
        .collect()
}

/// Groups inlets by area, preserving input order within each area.
pub fn group_by_area(inlets: &[Inlet]) -> BTreeMap<&str, Vec<&Inlet>> {
    let mut groups: BTreeMap<&str, Vec<&Inlet>> = BTreeMap::new();
    for inlet in inlets {
        groups.entry(inlet.area()).or_default().push(inlet);
    }
    groups
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
