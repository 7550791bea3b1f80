/// Structured logging for the analysis pipeline
///
/// Every message carries the pipeline stage that produced it and, where
/// relevant, the inlet it concerns. Output goes through the `log` facade;
/// the binary installs `env_logger` as the sink so `RUST_LOG` controls
/// verbosity.

use std::fmt;

use crate::model::AnalysisError;

// ---------------------------------------------------------------------------
// Pipeline Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Store,
    Filter,
    Aggregate,
    Trend,
    Batch,
    Snapshot,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Config => write!(f, "CONFIG"),
            Stage::Store => write!(f, "STORE"),
            Stage::Filter => write!(f, "FILTER"),
            Stage::Aggregate => write!(f, "AGG"),
            Stage::Trend => write!(f, "TREND"),
            Stage::Batch => write!(f, "BATCH"),
            Stage::Snapshot => write!(f, "SNAPSHOT"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - sparse sampling, e.g. a category with no data yet
    Expected,
    /// Unexpected failure - indicates a configuration problem
    Unexpected,
    /// Unknown - the data may or may not be able to support the fit
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classify an analysis failure by its error variant
pub fn classify_failure(err: &AnalysisError) -> FailureType {
    match err {
        AnalysisError::EmptyBucket { .. } => FailureType::Expected,
        AnalysisError::NonConvergence { .. } => FailureType::Unknown,
        AnalysisError::Config(_) => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Logger Setup
// ---------------------------------------------------------------------------

/// Install `env_logger` as the `log` sink.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies. Calling this
/// twice is harmless, the second call is ignored.
pub fn init_logger(default_level: log::LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .format_timestamp_secs()
        .try_init();
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

fn format_entry(stage: Stage, inlet: Option<&str>, message: &str) -> String {
    let inlet_part = inlet.map(|s| format!(" [{}]", s)).unwrap_or_default();
    format!("{}{}: {}", stage, inlet_part, message)
}

pub fn info(stage: Stage, inlet: Option<&str>, message: &str) {
    log::info!("{}", format_entry(stage, inlet, message));
}

pub fn warn(stage: Stage, inlet: Option<&str>, message: &str) {
    log::warn!("{}", format_entry(stage, inlet, message));
}

pub fn error(stage: Stage, inlet: Option<&str>, message: &str) {
    log::error!("{}", format_entry(stage, inlet, message));
}

pub fn debug(stage: Stage, inlet: Option<&str>, message: &str) {
    log::debug!("{}", format_entry(stage, inlet, message));
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a failed query with automatic classification
pub fn log_query_failure(inlet: &str, query: &str, err: &AnalysisError) {
    let failure_type = classify_failure(err);
    let message = format!("{} failed [{}]: {}", query, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(Stage::Batch, Some(inlet), &message),
        FailureType::Unexpected => error(Stage::Batch, Some(inlet), &message),
        FailureType::Unknown => warn(Stage::Batch, Some(inlet), &message),
    }
}

/// Stage that raises a given analysis error
pub fn stage_for(err: &AnalysisError) -> Stage {
    match err {
        AnalysisError::EmptyBucket { .. } => Stage::Aggregate,
        AnalysisError::NonConvergence { .. } => Stage::Trend,
        AnalysisError::Config(_) => Stage::Config,
    }
}

/// Log part of a completed query that could not be produced
pub fn log_query_gap(inlet: &str, query: &str, err: &AnalysisError) {
    let failure_type = classify_failure(err);
    let message = format!("{} incomplete [{}]: {}", query, failure_type, err);
    let stage = stage_for(err);

    match failure_type {
        FailureType::Expected => debug(stage, Some(inlet), &message),
        FailureType::Unexpected => error(stage, Some(inlet), &message),
        FailureType::Unknown => warn(stage, Some(inlet), &message),
    }
}

// ---------------------------------------------------------------------------
// Batch Summary Logging
// ---------------------------------------------------------------------------

/// Level for a batch summary: clean runs are info, total failure is an
/// error, anything in between is a warning.
pub fn summary_level(completed: usize, failed: usize) -> log::Level {
    if failed == 0 {
        log::Level::Info
    } else if completed == 0 {
        log::Level::Error
    } else {
        log::Level::Warn
    }
}

/// Log a summary of a batch run
pub fn log_batch_summary(inlets: usize, completed: usize, incomplete: usize, failed: usize) {
    let message = format!(
        "Batch complete: {} inlets, {}/{} queries completed ({} incomplete), {} failed",
        inlets,
        completed,
        completed + failed,
        incomplete,
        failed
    );

    match summary_level(completed, failed) {
        log::Level::Info => info(Stage::Batch, None, &message),
        log::Level::Error => error(Stage::Batch, None, &message),
        _ => warn(Stage::Batch, None, &message),
    }
}
