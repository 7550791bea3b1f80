/// Integration tests for the full analysis pipeline
///
/// These tests verify:
/// 1. A TOML configuration and a JSON snapshot load from disk
/// 2. Snapshot records attach to configured inlets
/// 3. Composite categories select each record once
/// 4. Limits, annual averages and anomalies agree with hand-computed values
/// 5. Empty and misconfigured queries are isolated from the rest of a batch
///
/// Run with: cargo test --test pipeline_integration

use std::collections::BTreeMap;
use std::io::Write;

use chrono::{NaiveDate, NaiveDateTime};
use inlet_trends::analysis::filter::{Limit, apply_limit};
use inlet_trends::report::{Gap, QueryOutcome, analyze_query};
use inlet_trends::snapshot::{InletRecords, save_snapshot};
use inlet_trends::{
    Category, MeasurementRecord, Point, RecordStore, Snapshot, Variable, VariableQuery,
    attach_records, load_config, load_snapshot, run_batch,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const CONFIG: &str = r#"
[analysis]
before = "2020-01-01"
queries = [
    { variable = "temperature", category = "used_deep" },
    { variable = "salinity", category = "used_surface" },
    { variable = "oxygen", category = "deepest" },
]

[[inlets]]
name = "Saanich Inlet"
area = "Vancouver Island"

[inlets.bounds]
surface = [0, 5]
shallow = [5, 25]
deep = [25, 100]
deeper = [100, 150]

[inlets.limits.temperature]
surface = []
deep = [0, 10]

[[inlets.seasons]]
months = [12, 1, 2]
label = "Winter"

[[inlets.seasons]]
months = [6, 7, 8]
label = "Summer"
"#;

fn at(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

fn temp(time: NaiveDateTime, value: f64, category: Category, source: &str) -> MeasurementRecord {
    MeasurementRecord::new(time, value, Variable::Temperature, category, source)
}

fn records() -> Vec<MeasurementRecord> {
    vec![
        temp(at(2010, 3, 1), 5.0, Category::Deep, "cast-1"),
        temp(at(2010, 9, 1), 7.0, Category::Deeper, "cast-2"),
        temp(at(2011, 6, 1), 9.0, Category::Deep, "cast-3"),
        // Outside the strict (0, 10) deep limit.
        temp(at(2011, 7, 1), 10.0, Category::Deeper, "cast-4"),
        // Not part of used_deep.
        temp(at(2011, 7, 1), 14.0, Category::Surface, "cast-4"),
        // After the cutoff.
        temp(at(2021, 1, 1), 6.0, Category::Deep, "cast-5"),
        MeasurementRecord::new(at(2010, 3, 1), 29.5, Variable::Salinity, Category::Shallow, "cast-1"),
    ]
}

fn write_inputs(dir: &tempfile::TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
    let config_path = dir.path().join("inlets.toml");
    let mut file = std::fs::File::create(&config_path).unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();

    let snapshot_path = dir.path().join("snapshot.json");
    let snapshot = Snapshot {
        inlets: vec![InletRecords {
            name: "saanich inlet".to_string(),
            records: records(),
        }],
    };
    save_snapshot(&snapshot_path, &snapshot).unwrap();
    (config_path, snapshot_path)
}

fn values(points: &[Point]) -> Vec<f64> {
    points.iter().map(|p| p.value).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_config_and_snapshot_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let (config_path, snapshot_path) = write_inputs(&dir);

    let config = load_config(&config_path).expect("config should load");
    let mut inlets = config.inlets;
    let attached = attach_records(&mut inlets, load_snapshot(&snapshot_path).unwrap()).unwrap();

    assert_eq!(attached, records().len());
    assert_eq!(inlets[0].records().len(), records().len());
    assert_eq!(inlets[0].area(), "Vancouver Island");
}

#[test]
fn test_composite_selects_each_deep_record_once() {
    let dir = tempfile::tempdir().unwrap();
    let (config_path, snapshot_path) = write_inputs(&dir);
    let config = load_config(&config_path).unwrap();
    let mut inlets = config.inlets;
    attach_records(&mut inlets, load_snapshot(&snapshot_path).unwrap()).unwrap();

    let points = inlets[0].variable_data(
        Variable::Temperature,
        Category::UsedDeep,
        config.settings.before,
        false,
    );
    assert_eq!(
        values(&points),
        vec![5.0, 7.0, 9.0, 10.0],
        "exactly the deep/deeper records before the cutoff, in time order"
    );
}

#[test]
fn test_strict_limits_exclude_both_bounds() {
    let points: Vec<Point> = [0.0, 0.001, 5.0, 9.999, 10.0, f64::NAN]
        .into_iter()
        .enumerate()
        .map(|(i, v)| Point::new(at(2015, 1, 1 + i as u32), v))
        .collect();
    let kept = apply_limit(&points, Some(Limit::new(0.0, 10.0)));
    assert_eq!(values(&kept), vec![0.001, 5.0, 9.999]);
}

#[test]
fn test_batch_report_matches_hand_computed_values() {
    let dir = tempfile::tempdir().unwrap();
    let (config_path, snapshot_path) = write_inputs(&dir);
    let config = load_config(&config_path).unwrap();
    let mut inlets = config.inlets;
    attach_records(&mut inlets, load_snapshot(&snapshot_path).unwrap()).unwrap();

    let batch = run_batch(&inlets, &config.settings);
    let inlet = batch.inlet("Saanich Inlet").expect("inlet report present");

    let deep = inlet.queries[0].report().expect("used_deep temperature completes");
    assert_eq!(deep.label, "25m-150m");
    assert_eq!(deep.excluded, 1, "10.0 sits on the limit and is excluded");
    assert_eq!(deep.annual, BTreeMap::from([(2010, 6.0), (2011, 9.0)]));
    assert_eq!(deep.anomalies, BTreeMap::from([(2010, -1.0), (2011, 2.0)]));
    assert_eq!(deep.decadal.len(), 1);
    assert!((deep.decadal[0].value - 7.5).abs() < 1e-12);

    let surface = inlet.queries[1].report().expect("used_surface salinity completes");
    assert_eq!(surface.label, "0m-25m");
    assert_eq!(surface.points.len(), 1);
    assert!(
        surface.gaps.iter().any(|g| matches!(g, Gap::SkippedHarmonic { .. })),
        "one point cannot support a harmonic fit"
    );

    assert!(
        matches!(inlet.queries[2], QueryOutcome::Failed { .. }),
        "deepest has no bounds for this inlet"
    );
    assert_eq!(batch.summary.completed, 2);
    assert_eq!(batch.summary.failed, 1);

    assert_eq!(inlet.stations.total, 4, "cast-5 falls after the cutoff");
    assert_eq!(inlet.coverage.years, vec![2010, 2011]);
    assert_eq!(inlet.coverage.cell(7, 2011), 1, "cast-4 counts once in July 2011");

    let json = serde_json::to_string(&batch).expect("report serializes");
    assert!(json.contains("\"status\":\"failed\""));
}

#[test]
fn test_empty_after_filter_is_safe_through_every_stage() {
    let dir = tempfile::tempdir().unwrap();
    let (config_path, snapshot_path) = write_inputs(&dir);
    let config = load_config(&config_path).unwrap();
    let mut inlets = config.inlets;
    attach_records(&mut inlets, load_snapshot(&snapshot_path).unwrap()).unwrap();

    let query = VariableQuery::new(Variable::Oxygen, Category::UsedDeep);
    let report = analyze_query(&inlets[0], query, &config.settings).unwrap();

    assert!(report.points.is_empty());
    assert!(report.annual.is_empty());
    assert!(report.anomalies.is_empty());
    assert!(report.decadal.is_empty());
    assert!(report.decadal_anomalies.is_empty());
    assert!(report.seasonal_decadal_anomalies.is_empty());
    assert!(report.expanded.index.axis.is_empty());
    assert!(report.expanded.curves.is_empty());
    assert!(report.dated_trend.is_none());
    assert_eq!(report.monthly_frequency, [0; 12]);
    assert!(!report.is_complete());
}

#[test]
fn test_unknown_key_in_config_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, CONFIG.replace("\"deepest\"", "\"abyssal\"")).unwrap();
    assert!(load_config(&path).is_err());
}
