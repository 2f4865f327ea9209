use std::process::Command;

use serde_json::Value;
use tempfile::tempdir;

fn intervault(dir: &std::path::Path, args: &[&str]) -> Value {
    let output = Command::new(env!("CARGO_BIN_EXE_intervault"))
        .arg("--db")
        .arg(dir.join("state.sqlite3"))
        .arg("--settings")
        .arg(dir.join("settings.json"))
        .args(args)
        .env_remove("INTERVAULT_DB_PATH")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn dump_on_fresh_database_is_empty() {
    let dir = tempdir().unwrap();
    let report = intervault(dir.path(), &["dump"]);
    assert_eq!(report["boot"]["primaryCandidates"], 0);
    assert_eq!(report["state"]["candidates"].as_array().unwrap().len(), 0);
    assert_eq!(report["state"]["unknownKeys"].as_array().unwrap().len(), 0);
}

#[test]
fn flush_then_dump_shows_primary_key() {
    let dir = tempdir().unwrap();
    let flushed = intervault(dir.path(), &["flush"]);
    assert_eq!(flushed["flushed"], true);

    let report = intervault(dir.path(), &["dump"]);
    let primary = report["state"]["keys"]["primary"].as_array().unwrap();
    assert_eq!(primary.len(), 1);
}

#[test]
fn unknown_sort_field_fails() {
    let dir = tempdir().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_intervault"))
        .arg("--db")
        .arg(dir.path().join("state.sqlite3"))
        .arg("--settings")
        .arg(dir.path().join("settings.json"))
        .args(["list", "--sort", "salary"])
        .output()
        .unwrap()
        .status;
    assert!(!status.success());
}

#[test]
fn clear_removes_persisted_state() {
    let dir = tempdir().unwrap();
    intervault(dir.path(), &["flush"]);

    let cleared = intervault(dir.path(), &["clear"]);
    assert_eq!(cleared["removed"], 1);

    let report = intervault(dir.path(), &["dump"]);
    assert!(report["state"]["keys"]["primary"]
        .as_array()
        .map_or(true, |keys| keys.is_empty()));
}

#[test]
fn prune_on_fresh_database_removes_nothing() {
    let dir = tempdir().unwrap();
    let pruned = intervault(dir.path(), &["prune", "--days", "3"]);
    assert_eq!(pruned["removed"].as_array().unwrap().len(), 0);
    assert!(pruned["cutoff"].is_string());
}
