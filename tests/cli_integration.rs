//! CLI Integration Tests
//!
//! End-to-end tests for CLI commands using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

/// Get the switchyard binary for testing
fn switchyard_cmd() -> Command {
    let mut cmd = Command::cargo_bin("switchyard").unwrap();
    cmd.env_remove("SWITCHYARD_CONFIG")
        .env_remove("SWITCHYARD_CATALOG")
        .env_remove("SWITCHYARD_CLOUD")
        .env_remove("SWITCHYARD_FEDERATION")
        .env_remove("RUST_LOG");
    cmd
}

fn repo_file(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

#[test]
fn test_version_output() {
    switchyard_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("switchyard"));
}

#[test]
fn test_help_shows_all_commands() {
    switchyard_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("catalog"))
        .stdout(predicate::str::contains("budget"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_plan_json_for_code_work() {
    let example_config = repo_file("switchyard.example.toml");
    let plan = json_stdout(switchyard_cmd().args([
        "plan",
        "refactor the parser and fix its tests",
        "--json",
        "-c",
        example_config.as_str(),
    ]));
    assert_eq!(plan["task_class"], "NON_BASIC");
    assert_eq!(plan["candidates"], serde_json::json!(["oath", "api", "local"]));
}

#[test]
fn test_plan_table_without_network() {
    let example_config = repo_file("switchyard.example.toml");
    switchyard_cmd()
        .args(["plan", "refactor the parser", "--no-network"])
        .args(["-c", example_config.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("network disallowed"));
}

#[test]
fn test_plan_rejects_unknown_backend() {
    switchyard_cmd()
        .args(["plan", "anything", "--prefer", "mainframe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid backend: mainframe"));
}

#[test]
fn test_catalog_validate_example() {
    let catalog = repo_file("catalog.example.toml");
    let report = json_stdout(switchyard_cmd().args([
        "catalog",
        "validate",
        "--catalog",
        catalog.as_str(),
        "--json",
    ]));
    assert_eq!(report["valid"], true);
    assert_eq!(report["providers"].as_array().unwrap().len(), 3);
    assert_eq!(report["providers"][0]["credential"], "n/a");
}

#[test]
fn test_catalog_validate_strict_without_credentials() {
    let catalog = repo_file("catalog.example.toml");
    switchyard_cmd()
        .env_remove("GROQ_API_KEY")
        .env_remove("OPENROUTER_API_KEY")
        .env_remove("OR_API_KEY")
        .args([
            "catalog",
            "validate",
            "--catalog",
            catalog.as_str(),
            "--strict",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing credentials for: groq, openrouter"));
}

#[test]
fn test_catalog_rank_with_cloud() {
    let catalog = repo_file("catalog.example.toml");
    let report = json_stdout(switchyard_cmd().args([
        "catalog",
        "rank",
        "list the open tickets",
        "--catalog",
        catalog.as_str(),
        "--task-class",
        "BASIC",
        "--arousal",
        "low",
        "--cloud",
        "--assume-credentials",
        "--json",
    ]));
    assert_eq!(report["request"]["task_class"], "BASIC");
    assert_eq!(report["ranking"]["candidates"][0]["provider_id"], "groq");
}

#[test]
fn test_budget_agent_state_from_stdin() {
    let state = serde_json::json!({
        "goal": "ship the release",
        "rollingSummary": "short",
        "scratch": { "perTask": { "t-1": "x".repeat(3_000) } },
    });
    let output = switchyard_cmd()
        .args(["budget", "agent-state", "-", "--max-tokens", "200", "--json"])
        .write_stdin(state.to_string())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["ok"], true);
    assert_eq!(report["applied"], serde_json::json!(["dropped perTask scratch"]));
    assert_eq!(report["state"]["goal"], "ship the release");
}

#[test]
fn test_config_init_creates_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("switchyard.toml");

    switchyard_cmd()
        .args(["config", "init", "-o", config_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file created"));

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[routing]"));
}

#[test]
fn test_config_init_no_overwrite() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("switchyard.toml");
    std::fs::write(&config_path, "existing content").unwrap();

    switchyard_cmd()
        .args(["config", "init", "-o", config_path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exists"));
}

#[test]
fn test_invalid_config_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("switchyard.toml");
    std::fs::write(&config_path, "[continuity]\nmax_chars = 0\n").unwrap();

    switchyard_cmd()
        .args(["plan", "hello", "-c", config_path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error:"));
}

#[test]
fn test_invalid_command() {
    switchyard_cmd()
        .arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}
