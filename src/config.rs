/// Run configuration for the inlet trend analysis.
///
/// The configuration is a TOML file with one `[analysis]` table and any
/// number of `[[inlets]]` tables:
///
/// ```toml
/// [analysis]
/// before = "2023-01-01T00:00:00"
/// use_limits = true
/// do_average = true
/// queries = [
///     { variable = "temperature", category = "used_deep" },
///     { variable = "oxygen", category = "deep" },
/// ]
///
/// [[inlets]]
/// name = "Burke Channel"
/// area = "Central Coast"
///
/// [inlets.bounds]
/// surface = [0, 30]
/// deep = [100, 200]
/// deepest = [300]          # no upper bound
///
/// [inlets.limits.temperature]
/// surface = [0, 20]
/// deep = []                # unrestricted
///
/// [[inlets.seasons]]
/// months = [12, 1, 2]
/// label = "Winter"
/// ```
///
/// Parsing happens in two steps: serde reads the loosely-typed raw tables,
/// then validation turns them into typed structures. Any unknown category,
/// unknown variable or malformed range fails the whole load, since it is a
/// configuration mistake rather than a data condition.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::analysis::filter::Limit;
use crate::inlets::{Inlet, select_inlets};
use crate::model::{Category, ConfigError, DepthBounds, Season, Stratum, Variable};

// ---------------------------------------------------------------------------
// Typed limits
// ---------------------------------------------------------------------------

/// Surface and deep limits for one variable. `None` = unrestricted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StratumLimits {
    pub surface: Option<Limit>,
    pub deep: Option<Limit>,
}

impl StratumLimits {
    pub fn get(&self, stratum: Stratum) -> Option<Limit> {
        match stratum {
            Stratum::Surface => self.surface,
            Stratum::Deep => self.deep,
        }
    }
}

/// Outlier limits for every (variable, stratum) pair an inlet may define.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LimitTable {
    pub temperature: StratumLimits,
    pub salinity: StratumLimits,
    pub oxygen: StratumLimits,
}

impl LimitTable {
    pub fn for_variable(&self, variable: Variable) -> &StratumLimits {
        match variable {
            Variable::Temperature => &self.temperature,
            Variable::Salinity => &self.salinity,
            Variable::Oxygen => &self.oxygen,
        }
    }

    fn for_variable_mut(&mut self, variable: Variable) -> &mut StratumLimits {
        match variable {
            Variable::Temperature => &mut self.temperature,
            Variable::Salinity => &mut self.salinity,
            Variable::Oxygen => &mut self.oxygen,
        }
    }

    /// The limit applying to a query, chosen by the category's stratum.
    pub fn limit_for(&self, variable: Variable, category: Category) -> Option<Limit> {
        self.for_variable(variable).get(category.stratum())
    }
}

// ---------------------------------------------------------------------------
// Analysis settings
// ---------------------------------------------------------------------------

/// One variable × category combination to analyse for every inlet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VariableQuery {
    pub variable: Variable,
    pub category: Category,
}

impl VariableQuery {
    pub fn new(variable: Variable, category: Category) -> Self {
        Self { variable, category }
    }
}

impl std::fmt::Display for VariableQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.variable, self.category)
    }
}

/// Run-wide settings. `before` is fixed once per run so results are
/// reproducible for a given input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSettings {
    pub before: NaiveDateTime,
    pub use_limits: bool,
    pub do_average: bool,
    pub queries: Vec<VariableQuery>,
}

impl AnalysisSettings {
    /// Settings with limits and averaging on, analysing surface and deep
    /// composites for every variable.
    pub fn with_cutoff(before: NaiveDateTime) -> Self {
        let queries = Variable::ALL
            .into_iter()
            .flat_map(|v| {
                [
                    VariableQuery::new(v, Category::UsedSurface),
                    VariableQuery::new(v, Category::UsedDeep),
                ]
            })
            .collect();
        Self {
            before,
            use_limits: true,
            do_average: true,
            queries,
        }
    }
}

/// A fully validated configuration: settings plus inlets without records.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: AnalysisSettings,
    pub inlets: Vec<Inlet>,
}

// ---------------------------------------------------------------------------
// Raw TOML structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    analysis: RawAnalysis,
    #[serde(default)]
    inlets: Vec<RawInlet>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    before: String,
    #[serde(default = "default_true")]
    use_limits: bool,
    #[serde(default = "default_true")]
    do_average: bool,
    #[serde(default)]
    queries: Vec<RawQuery>,
    /// Inlet names to analyse; empty means all.
    #[serde(default)]
    keep: Vec<String>,
    #[serde(default)]
    drop: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawQuery {
    variable: String,
    category: String,
}

#[derive(Debug, Deserialize)]
struct RawInlet {
    name: String,
    #[serde(default)]
    area: Option<String>,
    #[serde(default)]
    bounds: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    limits: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
    #[serde(default)]
    seasons: Vec<RawSeason>,
}

#[derive(Debug, Deserialize)]
struct RawSeason {
    months: Vec<u32>,
    label: String,
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

/// Reads and validates a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
    parse_config(&text)
}

/// Parses and validates configuration text.
pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let before = parse_cutoff(&raw.analysis.before)?;
    let queries = if raw.analysis.queries.is_empty() {
        AnalysisSettings::with_cutoff(before).queries
    } else {
        raw.analysis
            .queries
            .iter()
            .map(|q| Ok(VariableQuery::new(q.variable.parse()?, q.category.parse()?)))
            .collect::<Result<Vec<_>, ConfigError>>()?
    };

    let settings = AnalysisSettings {
        before,
        use_limits: raw.analysis.use_limits,
        do_average: raw.analysis.do_average,
        queries,
    };

    let inlets = raw
        .inlets
        .into_iter()
        .map(validate_inlet)
        .collect::<Result<Vec<_>, _>>()?;
    let inlets = select_inlets(inlets, &raw.analysis.keep, &raw.analysis.drop);

    Ok(Config { settings, inlets })
}

/// Accepts `YYYY-MM-DDTHH:MM:SS` or a bare `YYYY-MM-DD` (midnight).
pub fn parse_cutoff(text: &str) -> Result<NaiveDateTime, ConfigError> {
    let text = text.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ConfigError::InvalidCutoff(text.to_string()))
}

fn validate_inlet(raw: RawInlet) -> Result<Inlet, ConfigError> {
    let mut bounds = BTreeMap::new();
    for (key, range) in &raw.bounds {
        let category: Category = key.parse()?;
        if !category.is_base() {
            return Err(ConfigError::CompositeCategory(key.clone()));
        }
        let malformed = || ConfigError::MalformedBounds {
            inlet: raw.name.clone(),
            category: key.clone(),
        };
        let parsed = match range.as_slice() {
            [lower] => DepthBounds::new(*lower, None),
            [lower, upper] if upper > lower => DepthBounds::new(*lower, Some(*upper)),
            _ => return Err(malformed()),
        };
        bounds.insert(category, parsed);
    }

    let mut limits = LimitTable::default();
    for (variable_key, strata) in &raw.limits {
        let variable: Variable = variable_key.parse()?;
        for (stratum_key, range) in strata {
            let stratum = match stratum_key.trim().to_ascii_lowercase().as_str() {
                "surface" => Stratum::Surface,
                "deep" => Stratum::Deep,
                _ => return Err(ConfigError::UnknownCategory(stratum_key.clone())),
            };
            let limit = parse_limit(variable_key, stratum_key, range)?;
            let slot = limits.for_variable_mut(variable);
            match stratum {
                Stratum::Surface => slot.surface = limit,
                Stratum::Deep => slot.deep = limit,
            }
        }
    }

    let mut seasons = Vec::with_capacity(raw.seasons.len());
    for season in raw.seasons {
        if let Some(&month) = season.months.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(ConfigError::InvalidMonth {
                season: season.label,
                month,
            });
        }
        seasons.push(Season::new(season.months, season.label));
    }

    Ok(Inlet::new(raw.name, raw.area, bounds, limits, seasons))
}

fn parse_limit(variable: &str, stratum: &str, range: &[f64]) -> Result<Option<Limit>, ConfigError> {
    match range {
        [] => Ok(None),
        [low, high] if low < high => Ok(Some(Limit::new(*low, *high))),
        [low, high] => Err(ConfigError::InvertedLimit {
            variable: variable.to_string(),
            stratum: stratum.to_string(),
            low: *low,
            high: *high,
        }),
        other => Err(ConfigError::MalformedLimit {
            variable: variable.to_string(),
            stratum: stratum.to_string(),
            len: other.len(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
