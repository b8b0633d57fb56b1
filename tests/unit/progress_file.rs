//! Unit tests for the persisted progress file format

use registry_pull::progress::{ChunkStatus, ProgressError, ProgressRecord, ProgressStore};
use registry_pull::range::Chunk;
use tempfile::TempDir;

fn running_record() -> ProgressRecord {
    let chunk = Chunk::new(3, 901000301, 901000401);
    let mut record = ProgressRecord::new(&chunk);
    record.mark_running().unwrap();
    record.record_success(901000301).unwrap();
    record.record_failure(901000302).unwrap();
    record
}

#[test]
fn test_file_layout() {
    let temp_dir = TempDir::new().unwrap();
    let store = ProgressStore::new(temp_dir.path());
    store.save(&running_record()).unwrap();

    let path = store.path_for(3);
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        "students_range_chunk_3_progress.json"
    );

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["schema_version"], "1.0.0");
    assert_eq!(json["chunk_id"], 3);
    assert_eq!(json["start"], 901000301);
    assert_eq!(json["end"], 901000401);
    assert_eq!(json["current"], 901000303);
    assert_eq!(json["failed"], serde_json::json!([901000302]));
    assert_eq!(json["status"], "running");
    assert!(json["started_at"].is_i64());
}

#[test]
fn test_save_then_load() {
    let temp_dir = TempDir::new().unwrap();
    let store = ProgressStore::new(temp_dir.path());
    let record = running_record();
    store.save(&record).unwrap();

    assert_eq!(store.load(3).unwrap(), Some(record));
    assert_eq!(store.load(4).unwrap(), None);
}

#[test]
fn test_unknown_schema_version_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let store = ProgressStore::new(temp_dir.path());
    store.save(&running_record()).unwrap();

    let path = store.path_for(3);
    let patched = std::fs::read_to_string(&path)
        .unwrap()
        .replace("\"1.0.0\"", "\"9.0.0\"");
    std::fs::write(&path, patched).unwrap();

    assert!(matches!(
        store.load(3),
        Err(ProgressError::SchemaVersionMismatch { .. })
    ));
}

#[test]
fn test_terminal_record_changes_only_through_reset() {
    let temp_dir = TempDir::new().unwrap();
    let store = ProgressStore::new(temp_dir.path());

    let chunk = Chunk::new(0, 1, 3);
    let mut record = ProgressRecord::new(&chunk);
    record.mark_running().unwrap();
    record.record_success(1).unwrap();
    record.record_failure(2).unwrap();
    assert_eq!(record.finish().unwrap(), ChunkStatus::Failed);
    assert!(matches!(
        record.mark_running(),
        Err(ProgressError::Transition { .. })
    ));
    store.save(&record).unwrap();

    let reset = store.reset(0).unwrap().unwrap();
    assert_eq!(reset.status(), ChunkStatus::Pending);
    assert_eq!(reset.current(), 1);
    assert!(reset.failed().is_empty());
    assert_eq!(store.load(0).unwrap(), Some(reset));
}

#[test]
fn test_list_all_skips_corrupt_files() {
    let temp_dir = TempDir::new().unwrap();
    let store = ProgressStore::new(temp_dir.path());
    store.save(&running_record()).unwrap();
    std::fs::write(store.path_for(7), b"garbage").unwrap();
    std::fs::write(temp_dir.path().join("unrelated.json"), b"{}").unwrap();

    let records = store.list_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].chunk_id(), 3);
}
