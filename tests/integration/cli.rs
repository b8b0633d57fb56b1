//! End-to-end tests of the registry-pull binary

use assert_cmd::Command;
use registry_pull::progress::{ProgressRecord, ProgressStore};
use registry_pull::range::Chunk;
use tempfile::TempDir;

fn registry_pull(progress_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("registry-pull").unwrap();
    cmd.arg("--progress-dir").arg(progress_dir.path());
    cmd
}

#[test]
fn test_status_without_progress_files() {
    let temp_dir = TempDir::new().unwrap();

    let output = registry_pull(&temp_dir).arg("status").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("PARALLEL STUDENTS RANGE PULL"));
    assert!(stdout.contains("No chunk progress files found."));
}

#[test]
fn test_status_lists_chunks() {
    let temp_dir = TempDir::new().unwrap();
    let store = ProgressStore::new(temp_dir.path());
    store
        .save(&ProgressRecord::new(&Chunk::new(0, 901000001, 901000101)))
        .unwrap();

    let output = registry_pull(&temp_dir).arg("status").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("0/100"));
    assert!(stdout.contains("pending"));
}

#[test]
fn test_empty_range_fails() {
    let temp_dir = TempDir::new().unwrap();

    registry_pull(&temp_dir)
        .args(["pull", "--start", "901000001", "--end", "901000001", "--yes"])
        .assert()
        .failure();
}

#[test]
fn test_clean_refuses_unfinished_chunks() {
    let temp_dir = TempDir::new().unwrap();
    let store = ProgressStore::new(temp_dir.path());
    store
        .save(&ProgressRecord::new(&Chunk::new(0, 1, 11)))
        .unwrap();

    registry_pull(&temp_dir)
        .args(["clean", "--yes"])
        .assert()
        .failure();
    assert!(store.path_for(0).exists());

    registry_pull(&temp_dir)
        .args(["clean", "--force", "--yes"])
        .assert()
        .success();
    assert!(!store.path_for(0).exists());
}
