//! CLI Integration Tests
//!
//! These tests run the `workshare` binary end-to-end. They stay off the
//! network: only `identity`, `analyze` and argument handling are exercised.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::{NamedTempFile, TempDir};

// ============================================================================
// Test Utilities
// ============================================================================

/// Create a CLI command with an empty config file so the user's own config
/// is never picked up
fn cli_cmd(config_dir: &TempDir) -> Command {
    let config = config_dir.path().join("config.json");
    std::fs::write(&config, "{}").unwrap();

    let mut cmd = Command::cargo_bin("workshare").expect("Failed to find workshare binary");
    cmd.arg("--config").arg(config);
    cmd
}

/// Create a CLI command with the given config contents
fn cli_cmd_with_config(config_dir: &TempDir, json: &str) -> Command {
    let config = config_dir.path().join("custom.json");
    std::fs::write(&config, json).unwrap();

    let mut cmd = Command::cargo_bin("workshare").expect("Failed to find workshare binary");
    cmd.arg("--config").arg(config);
    cmd
}

fn scenario_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

const CONFLICT_SCENARIO: &str = r#"{
    "activities": [
        { "element_id": "E1", "element_name": "Wall 1", "category": "Walls", "level": "Level 2",
          "user": "bob", "activity": "Moved", "minutes_ago": 3 },
        { "element_id": "E2", "element_name": "Door 7", "category": "Doors", "level": "Level 2",
          "user": "bob", "activity": "Viewed", "minutes_ago": 1 }
    ],
    "pending": {
        "alice": [
            { "element_id": "E1", "element_name": "Wall 1", "change_type": "Geometry" },
            { "element_id": "E2", "element_name": "Door 7", "change_type": "Parameters" }
        ]
    },
    "worksets": [
        { "name": "Shell", "owner": "alice" },
        { "name": "Interiors" }
    ]
}"#;

// ============================================================================
// Argument Handling
// ============================================================================

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("workshare")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("identity"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("peers"))
        .stdout(predicate::str::contains("analyze"));
}

#[test]
fn test_serve_requires_project() {
    let dir = TempDir::new().unwrap();
    cli_cmd(&dir)
        .arg("serve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--project"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("bad.json");
    std::fs::write(&config, r#"{ "monitor": { "ledger_capacity": 0 } }"#).unwrap();

    Command::cargo_bin("workshare")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("identity")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ledger_capacity"));
}

// ============================================================================
// Identity Command Tests
// ============================================================================

#[test]
fn test_identity_with_username_override() {
    let dir = TempDir::new().unwrap();
    cli_cmd(&dir)
        .args(["--username", "alice", "identity"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Peer ID:"))
        .stdout(predicate::str::contains("Username: alice"))
        .stdout(predicate::str::contains("Discovery port: 51234"));
}

// ============================================================================
// Analyze Command Tests
// ============================================================================

#[test]
fn test_analyze_predicts_conflicts() {
    let dir = TempDir::new().unwrap();
    let scenario = scenario_file(CONFLICT_SCENARIO);

    cli_cmd(&dir)
        .arg("analyze")
        .arg(scenario.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Predicted conflicts for alice (2):"))
        .stdout(predicate::str::contains("[high] 90% bob moved 'Wall 1' 3 min ago"))
        .stdout(predicate::str::contains("[low] 90% bob viewed 'Door 7' 1 min ago"))
        .stdout(predicate::str::contains("Shell: alice"))
        .stdout(predicate::str::contains("Interiors: (available)"))
        .stdout(predicate::str::contains("alice: ⚠"));
}

#[test]
fn test_analyze_reports_hotspot() {
    let dir = TempDir::new().unwrap();
    let scenario = scenario_file(
        r#"{
        "activities": [
            { "element_id": "W1", "category": "Walls", "level": "Level 3", "user": "a", "activity": "Modified", "minutes_ago": 1 },
            { "element_id": "W2", "category": "Walls", "level": "Level 3", "user": "b", "activity": "Modified", "minutes_ago": 2 },
            { "element_id": "W3", "category": "Walls", "level": "Level 3", "user": "c", "activity": "Modified", "minutes_ago": 3 },
            { "element_id": "W4", "category": "Floors", "level": "Level 3", "user": "a", "activity": "Modified", "minutes_ago": 4 },
            { "element_id": "W5", "category": "Walls", "level": "Level 3", "user": "b", "activity": "Created", "minutes_ago": 5 },
            { "element_id": "W6", "category": "Walls", "level": "Level 3", "user": "c", "activity": "Moved", "minutes_ago": 6 }
        ]
    }"#,
    );

    cli_cmd(&dir)
        .arg("analyze")
        .arg(scenario.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Activity hotspots (1):"))
        .stdout(predicate::str::contains("Level 3 (Walls): 6 activities, 3 users HIGH RISK"));
}

#[test]
fn test_analyze_uses_monitor_config() {
    let scenario = scenario_file(
        r#"{
        "activities": [
            { "element_id": "W1", "category": "Walls", "level": "Level 4", "user": "a", "activity": "Modified", "minutes_ago": 1 },
            { "element_id": "W2", "category": "Walls", "level": "Level 4", "user": "b", "activity": "Modified", "minutes_ago": 2 }
        ]
    }"#,
    );

    let dir = TempDir::new().unwrap();
    cli_cmd(&dir)
        .arg("analyze")
        .arg(scenario.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No activity hotspots."));

    cli_cmd_with_config(&dir, r#"{ "monitor": { "hotspot_min_activity": 2 } }"#)
        .arg("analyze")
        .arg(scenario.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Level 4 (Walls): 2 activities, 2 users"));
}

#[test]
fn test_analyze_rejects_out_of_range_minutes() {
    let dir = TempDir::new().unwrap();
    let scenario = scenario_file(
        r#"{
        "activities": [
            { "element_id": "E1", "user": "bob", "activity": "Modified", "minutes_ago": 9223372036854775807 }
        ]
    }"#,
    );

    cli_cmd(&dir)
        .arg("analyze")
        .arg(scenario.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("minutes_ago"));
}

#[test]
fn test_analyze_empty_scenario() {
    let dir = TempDir::new().unwrap();
    let scenario = scenario_file("{}");

    cli_cmd(&dir)
        .arg("analyze")
        .arg(scenario.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No activity hotspots."));
}

#[test]
fn test_analyze_missing_file() {
    let dir = TempDir::new().unwrap();
    cli_cmd(&dir)
        .arg("analyze")
        .arg(dir.path().join("nope.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read scenario"));
}
