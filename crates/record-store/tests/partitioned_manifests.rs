use std::collections::BTreeSet;
use std::path::PathBuf;

use rendermill_job_model::{JobStatus, RunManifest, TemplateSlotMap};
use rendermill_record_store::{
    load_manifest, persist_manifest, read_manifest, select_records, Dataset, ManifestLock,
    Partition, RowRange,
};

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("fixtures")
        .join("sample-batch")
}

fn load_fixture() -> (TemplateSlotMap, Dataset) {
    let slot_map = TemplateSlotMap::load(fixture_dir().join("slots.json"))
        .expect("fixture slot map should load");
    let dataset = Dataset::load(
        fixture_dir().join("records.csv"),
        slot_map.id_column.as_deref(),
    )
    .expect("fixture dataset should load");
    (slot_map, dataset)
}

#[test]
fn fixture_dataset_matches_slot_map() {
    let (slot_map, dataset) = load_fixture();
    dataset.validate_schema(&slot_map).unwrap();

    let ids: Vec<&str> = dataset.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["p-001", "p-002", "p-003", "p-004", "p-005"]);
    assert_eq!(dataset.records[4].row, 5);
}

#[test]
fn partition_workers_own_disjoint_manifests() {
    let (_, dataset) = load_fixture();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("manifest.json");

    let mut paths = vec![];
    let mut owned = BTreeSet::new();
    for index in 1..=2 {
        let partition = Partition::new(index, 2).unwrap();
        let path = partition.manifest_path(&base);
        let _lock = ManifestLock::acquire(&path, false).unwrap();

        let mut manifest = load_manifest(&path);
        for record in select_records(&dataset.records, RowRange::default(), Some(partition)) {
            assert!(owned.insert(record.id.clone()), "{} owned twice", record.id);
            manifest
                .entry(&record.id, record.row)
                .mark_succeeded(PathBuf::from(format!("render/{}.mp4", record.id)));
        }
        persist_manifest(&manifest, &path).unwrap();
        paths.push(path);
    }

    assert_eq!(owned.len(), dataset.records.len());
    assert_eq!(
        paths[0].file_name().unwrap().to_string_lossy(),
        "manifest.part-1-of-2.json"
    );

    let manifests: Vec<RunManifest> = paths.iter().map(|p| read_manifest(p).unwrap()).collect();
    let merged = RunManifest::merge(&manifests);
    assert_eq!(merged.summary().succeeded, 5);
    assert_eq!(merged.status_of("p-003"), Some(JobStatus::Succeeded));
}

#[test]
fn row_range_narrows_before_partitioning() {
    let (_, dataset) = load_fixture();
    let range = RowRange {
        start: Some(2),
        end: Some(4),
    };

    let whole = select_records(&dataset.records, range, None);
    assert_eq!(whole.len(), 3);

    let first = select_records(&dataset.records, range, Partition::new(1, 2));
    let second = select_records(&dataset.records, range, Partition::new(2, 2));
    let ids: Vec<&str> = first
        .iter()
        .chain(second.iter())
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(ids, vec!["p-002", "p-003", "p-004"]);
}
