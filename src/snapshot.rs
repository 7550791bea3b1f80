//! JSON snapshots of loaded records.
//!
//! Ingestion writes a snapshot once so later runs can skip it. The analysis
//! behaves the same on records read back from a snapshot as on fresh ones;
//! NaN values are written as `null` and read back as NaN.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inlets::{Inlet, normalize};
use crate::logging::{self, Stage};
use crate::model::{ConfigError, MeasurementRecord};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid record for inlet '{inlet}': {source}")]
    Record { inlet: String, source: ConfigError },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InletRecords {
    pub name: String,
    pub records: Vec<MeasurementRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub inlets: Vec<InletRecords>,
}

impl Snapshot {
    pub fn from_inlets(inlets: &[Inlet]) -> Self {
        Self {
            inlets: inlets
                .iter()
                .map(|inlet| InletRecords {
                    name: inlet.name().to_string(),
                    records: inlet.records().to_vec(),
                })
                .collect(),
        }
    }

    pub fn record_count(&self) -> usize {
        self.inlets.iter().map(|i| i.records.len()).sum()
    }
}

pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Snapshot, SnapshotError> {
    let file = File::open(path.as_ref())?;
    let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))?;
    logging::info(
        Stage::Snapshot,
        None,
        &format!(
            "loaded {} records for {} inlets from {}",
            snapshot.record_count(),
            snapshot.inlets.len(),
            path.as_ref().display()
        ),
    );
    Ok(snapshot)
}

pub fn save_snapshot(path: impl AsRef<Path>, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let file = File::create(path.as_ref())?;
    serde_json::to_writer(BufWriter::new(file), snapshot)?;
    Ok(())
}

/// Moves snapshot records onto the configured inlets, matching names
/// case-insensitively. Snapshot entries for unconfigured inlets are skipped
/// with a warning. Returns the number of records attached.
pub fn attach_records(inlets: &mut [Inlet], snapshot: Snapshot) -> Result<usize, SnapshotError> {
    let mut attached = 0;
    for entry in snapshot.inlets {
        let key = normalize(&entry.name);
        let Some(inlet) = inlets.iter_mut().find(|i| normalize(i.name()) == key) else {
            logging::warn(
                Stage::Snapshot,
                Some(&entry.name),
                &format!("not configured, skipping {} records", entry.records.len()),
            );
            continue;
        };
        for record in entry.records {
            inlet.add_record(record).map_err(|source| SnapshotError::Record {
                inlet: entry.name.clone(),
                source,
            })?;
            attached += 1;
        }
    }
    Ok(attached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitTable;
    use crate::model::{Category, Variable};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn record(value: f64, category: Category) -> MeasurementRecord {
        let time = NaiveDate::from_ymd_opt(2019, 4, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        MeasurementRecord::new(time, value, Variable::Oxygen, category, "cast-1")
    }

    fn bare(name: &str) -> Inlet {
        Inlet::new(name, None, BTreeMap::new(), LimitTable::default(), Vec::new())
    }

    #[test]
    fn test_nan_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let snapshot = Snapshot {
            inlets: vec![InletRecords {
                name: "Howe Sound".to_string(),
                records: vec![record(f64::NAN, Category::Deep), record(3.1, Category::Deeper)],
            }],
        };
        save_snapshot(&path, &snapshot).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("null"), "NaN should be written as null: {}", text);

        let loaded = load_snapshot(&path).unwrap();
        assert!(loaded.inlets[0].records[0].value().is_nan());
        assert_eq!(loaded.inlets[0].records[1], snapshot.inlets[0].records[1]);
    }

    #[test]
    fn test_attach_matches_names_case_insensitively() {
        let mut inlets = vec![bare("Howe Sound"), bare("Indian Arm")];
        let snapshot = Snapshot {
            inlets: vec![
                InletRecords {
                    name: "howe sound".to_string(),
                    records: vec![record(3.0, Category::Deep)],
                },
                InletRecords {
                    name: "Nowhere".to_string(),
                    records: vec![record(3.0, Category::Deep)],
                },
            ],
        };
        assert_eq!(attach_records(&mut inlets, snapshot).unwrap(), 1);
        assert_eq!(inlets[0].records().len(), 1);
        assert!(inlets[1].records().is_empty());
    }

    #[test]
    fn test_composite_records_are_rejected() {
        let mut inlets = vec![bare("Howe Sound")];
        let snapshot = Snapshot {
            inlets: vec![InletRecords {
                name: "Howe Sound".to_string(),
                records: vec![record(3.0, Category::UsedDeep)],
            }],
        };
        let err = attach_records(&mut inlets, snapshot).unwrap_err();
        assert!(matches!(err, SnapshotError::Record { .. }), "got {:?}", err);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_snapshot(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SnapshotError::Io(_)));
    }

    #[test]
    fn test_snapshot_of_inlets() {
        let inlet = bare("Howe Sound").with_records([record(2.0, Category::Deep)]).unwrap();
        let snapshot = Snapshot::from_inlets(&[inlet]);
        assert_eq!(snapshot.record_count(), 1);
    }
}
