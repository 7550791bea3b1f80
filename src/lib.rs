//! Depth-bucketed trend analysis for coastal inlet profile data.
//!
//! Records (temperature, salinity, dissolved oxygen) are grouped by depth
//! category, range-filtered, and reduced to annual, decadal and seasonal
//! summaries with linear and harmonic trend fits. The output is plain
//! serializable data for a separate charting step.

pub mod analysis;
pub mod config;
pub mod inlets;
pub mod logging;
pub mod model;
pub mod report;
pub mod snapshot;

pub use config::{AnalysisSettings, Config, VariableQuery, load_config};
pub use inlets::{Inlet, RecordStore};
pub use model::{AnalysisError, Category, ConfigError, MeasurementRecord, Point, Season, Variable};
pub use report::{BatchReport, run_batch};
pub use snapshot::{Snapshot, SnapshotError, attach_records, load_snapshot};
