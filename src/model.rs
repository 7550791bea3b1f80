/// Core data types for the inlet trend analysis engine.
///
/// This module defines the shared domain model imported by all other modules:
/// measured variables, the closed set of depth categories and their
/// composition table, measurement records, seasons, and the error types.
/// It contains no I/O.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

/// An oceanographic quantity measured in a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Temperature,
    Salinity,
    Oxygen,
}

impl Variable {
    pub const ALL: [Variable; 3] = [Variable::Temperature, Variable::Salinity, Variable::Oxygen];

    /// Configuration key, e.g. `"temperature"`.
    pub fn key(self) -> &'static str {
        match self {
            Variable::Temperature => "temperature",
            Variable::Salinity => "salinity",
            Variable::Oxygen => "oxygen",
        }
    }

    /// Axis label including units, as shown on charts.
    pub fn axis_label(self) -> &'static str {
        match self {
            Variable::Temperature => "Temperature (C)",
            Variable::Salinity => "Salinity (PSU)",
            Variable::Oxygen => "DO (mL/L)",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Variable {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variable::ALL
            .into_iter()
            .find(|v| v.key() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| ConfigError::UnknownVariable(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Depth categories
// ---------------------------------------------------------------------------

/// Depth stratum attached to a measurement.
///
/// The five base categories are disjoint and ordered from the surface down.
/// `UsedSurface` and `UsedDeep` are composites: their membership is the union
/// of the base categories listed in [`Category::constituents`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Surface,
    Shallow,
    Deep,
    Deeper,
    Deepest,
    UsedSurface,
    UsedDeep,
}

/// Which limit entry (`surface` or `deep`) applies to a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stratum {
    Surface,
    Deep,
}

impl Category {
    /// Base categories in depth order.
    pub const BASE: [Category; 5] = [
        Category::Surface,
        Category::Shallow,
        Category::Deep,
        Category::Deeper,
        Category::Deepest,
    ];

    pub const ALL: [Category; 7] = [
        Category::Surface,
        Category::Shallow,
        Category::Deep,
        Category::Deeper,
        Category::Deepest,
        Category::UsedSurface,
        Category::UsedDeep,
    ];

    /// Static composition table. Base categories are their own sole member.
    pub fn constituents(self) -> &'static [Category] {
        match self {
            Category::Surface => &[Category::Surface],
            Category::Shallow => &[Category::Shallow],
            Category::Deep => &[Category::Deep],
            Category::Deeper => &[Category::Deeper],
            Category::Deepest => &[Category::Deepest],
            Category::UsedSurface => &[Category::Surface, Category::Shallow],
            Category::UsedDeep => &[Category::Deep, Category::Deeper, Category::Deepest],
        }
    }

    /// The set of base categories a query for `self` covers.
    pub fn resolve(self) -> BTreeSet<Category> {
        self.constituents().iter().copied().collect()
    }

    pub fn is_base(self) -> bool {
        !matches!(self, Category::UsedSurface | Category::UsedDeep)
    }

    /// True when a record tagged `base` belongs to a query for `self`.
    pub fn includes(self, base: Category) -> bool {
        self.constituents().contains(&base)
    }

    pub fn stratum(self) -> Stratum {
        match self {
            Category::Surface | Category::Shallow | Category::UsedSurface => Stratum::Surface,
            Category::Deep | Category::Deeper | Category::Deepest | Category::UsedDeep => {
                Stratum::Deep
            }
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Category::Surface => "surface",
            Category::Shallow => "shallow",
            Category::Deep => "deep",
            Category::Deeper => "deeper",
            Category::Deepest => "deepest",
            Category::UsedSurface => "used_surface",
            Category::UsedDeep => "used_deep",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.key() == wanted)
            .ok_or_else(|| ConfigError::UnknownCategory(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Depth bounds
// ---------------------------------------------------------------------------

/// A depth range in metres. `upper == None` means "to the bottom".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthBounds {
    pub lower: f64,
    pub upper: Option<f64>,
}

impl DepthBounds {
    pub fn new(lower: f64, upper: Option<f64>) -> Self {
        Self { lower, upper }
    }

    /// Half-open containment: `lower <= depth < upper`.
    pub fn contains(&self, depth: f64) -> bool {
        depth >= self.lower && self.upper.is_none_or(|upper| depth < upper)
    }

    pub fn label(&self) -> String {
        label_from_bounds(self.lower, self.upper)
    }
}

/// Legend text for a depth range, e.g. `"100m-200m"` or `">300m"`.
pub fn label_from_bounds(lower: f64, upper: Option<f64>) -> String {
    match upper {
        Some(upper) => format!("{}m-{}m", lower, upper),
        None => format!(">{}m", lower),
    }
}

// ---------------------------------------------------------------------------
// Records and points
// ---------------------------------------------------------------------------

/// A single `(timestamp, value)` observation handed between analysis stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub time: NaiveDateTime,
    pub value: f64,
}

impl Point {
    pub fn new(time: NaiveDateTime, value: f64) -> Self {
        Self { time, value }
    }

    pub fn year(&self) -> i32 {
        self.time.year()
    }

    pub fn month(&self) -> u32 {
        self.time.month()
    }
}

/// One measurement from a profile, already assigned to a base depth category.
///
/// Records are immutable: fields are only readable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    timestamp: NaiveDateTime,
    #[serde(deserialize_with = "nan_from_null")]
    value: f64,
    variable: Variable,
    category: Category,
    source: String,
}

impl MeasurementRecord {
    pub fn new(
        timestamp: NaiveDateTime,
        value: f64,
        variable: Variable,
        category: Category,
        source: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            value,
            variable,
            category,
            source: source.into(),
        }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn variable(&self) -> Variable {
        self.variable
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn point(&self) -> Point {
        Point::new(self.timestamp, self.value)
    }
}

// serde_json writes NaN as `null`; read it back the same way.
fn nan_from_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

// ---------------------------------------------------------------------------
// Seasons
// ---------------------------------------------------------------------------

/// A named group of calendar months, e.g. `{12, 1, 2}` → "Winter".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub months: BTreeSet<u32>,
    pub label: String,
}

impl Season {
    pub fn new(months: impl IntoIterator<Item = u32>, label: impl Into<String>) -> Self {
        Self {
            months: months.into_iter().collect(),
            label: label.into(),
        }
    }

    pub fn contains_month(&self, month: u32) -> bool {
        self.months.contains(&month)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Configuration mistakes. These are fatal for the configuration that
/// contains them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Unknown depth category: {0}")]
    UnknownCategory(String),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Malformed limit for {variable}/{stratum}: expected [] or [low, high], got {len} values")]
    MalformedLimit {
        variable: String,
        stratum: String,
        len: usize,
    },

    #[error("Limit for {variable}/{stratum} has low {low} not below high {high}")]
    InvertedLimit {
        variable: String,
        stratum: String,
        low: f64,
        high: f64,
    },

    #[error("Malformed depth bounds for '{category}' in inlet '{inlet}'")]
    MalformedBounds { inlet: String, category: String },

    #[error("Composite category '{0}' cannot label a record or bound a depth range")]
    CompositeCategory(String),

    #[error("Inlet '{inlet}' defines no depth bounds for '{category}'")]
    MissingBounds { inlet: String, category: String },

    #[error("Invalid month {month} in season '{season}'")]
    InvalidMonth { season: String, month: u32 },

    #[error("Invalid cutoff timestamp: {0}")]
    InvalidCutoff(String),

    #[error("Failed to read configuration: {0}")]
    Io(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Failures raised by a single analysis query.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// The query retained no points after filtering.
    #[error("No data for {what}")]
    EmptyBucket { what: String },

    /// A harmonic fit could not produce parameters.
    #[error("{period_months}-month harmonic fit did not converge: {reason}")]
    NonConvergence { period_months: u32, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
