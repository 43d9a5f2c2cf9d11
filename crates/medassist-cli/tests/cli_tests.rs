//! Integration tests for the medassist binary
//!
//! Tests:
//! - help lists every command
//! - config prints defaults and honours --config
//! - config --save writes a loadable file and masks keys
//! - JSON config output
//! - invalid config values and ingestion input map to exit code 3
//! - missing query arguments are rejected by the parser

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn medassist_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("medassist").unwrap();
    cmd.current_dir(dir.path())
        .env("MEDASSIST_DB", dir.path().join("vectors.sqlite"))
        .env("MEDASSIST_CONFIG", dir.path().join("missing.yml"))
        .env_remove("MEDASSIST_LLM_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    medassist_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest-knowledge"))
        .stdout(predicate::str::contains("ingest-doctors"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("chat"));
}

#[test]
fn test_config_shows_defaults() {
    let dir = TempDir::new().unwrap();
    medassist_cmd(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("knowledge_base_collection"))
        .stdout(predicate::str::contains("doctor_collection"))
        .stdout(predicate::str::contains("max_tool_rounds: 4"));
}

#[test]
fn test_config_save_writes_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.yml");

    medassist_cmd(&dir)
        .env("MEDASSIST_LLM_API_KEY", "sk-secret")
        .arg("--config")
        .arg(&path)
        .arg("config")
        .arg("--save")
        .assert()
        .success()
        .stdout(predicate::str::contains("sk-secret").not())
        .stdout(predicate::str::contains("********"));

    let saved = fs::read_to_string(&path).unwrap();
    assert!(saved.contains("knowledge_collection: knowledge_base_collection"));
}

#[test]
fn test_config_file_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yml");
    fs::write(&path, "retrieval:\n  knowledge_collection: articles\n").unwrap();

    medassist_cmd(&dir)
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("knowledge_collection: articles"));
}

#[test]
fn test_config_json_format() {
    let dir = TempDir::new().unwrap();
    let output = medassist_cmd(&dir)
        .args(["--format", "json", "config"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["retrieval"]["knowledge_limit"], 3);
    assert_eq!(value["dispatcher"]["poll_interval_ms"], 100);
}

#[test]
fn test_invalid_config_exit_code() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yml");
    fs::write(&path, "retrieval:\n  knowledge_threshold: 1.5\n").unwrap();

    medassist_cmd(&dir)
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("knowledge_threshold"));
}

#[test]
fn test_ingest_knowledge_rejects_feed_without_items() {
    let dir = TempDir::new().unwrap();
    let feed = dir.path().join("feed.json");
    fs::write(&feed, r#"{"rss": {"channel": {}}}"#).unwrap();

    medassist_cmd(&dir)
        .arg("ingest-knowledge")
        .arg(&feed)
        .assert()
        .code(3);
}

#[test]
fn test_ingest_knowledge_missing_file() {
    let dir = TempDir::new().unwrap();
    medassist_cmd(&dir)
        .arg("ingest-knowledge")
        .arg(dir.path().join("nope.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_search_requires_query() {
    let dir = TempDir::new().unwrap();
    medassist_cmd(&dir)
        .args(["search", "knowledge"])
        .assert()
        .failure();
}

#[test]
fn test_search_rejects_unknown_target() {
    let dir = TempDir::new().unwrap();
    medassist_cmd(&dir)
        .args(["search", "pharmacies", "aspirin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
