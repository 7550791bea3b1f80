/// Pure analysis stages applied to a filtered point series.
///
/// Nothing in here touches configuration files, snapshots or logging; each
/// function takes points (or records) and returns plain serializable data.
///
/// Submodules:
/// - `filter`: strict range limits, applied before anything else.
/// - `aggregate`: annual and decadal averages, anomalies, seasonal adjustment.
/// - `seasonal`: collapsed and expanded month axes.
/// - `trend`: linear trend and fixed-period harmonic fits.
/// - `sampling`: distinct-source counts and coverage grids.
/// - `pairing`: timestamp joins between two variables.

pub mod aggregate;
pub mod filter;
pub mod pairing;
pub mod sampling;
pub mod seasonal;
pub mod trend;
