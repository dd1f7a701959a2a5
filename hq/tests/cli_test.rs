//! Binary-level tests for the oct-hq CLI

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn oct_hq(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("oct-hq").expect("binary builds");
    // Keep the log file and user config lookups inside the temp dir
    cmd.env("HOME", home.path())
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .current_dir(home.path());
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    oct_hq(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_config_prints_defaults() {
    let home = TempDir::new().unwrap();
    oct_hq(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("run-time: 30"))
        .stdout(predicate::str::contains("rc-port: 5001"));
}

#[test]
fn test_config_reads_local_file() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join("oct-hq.yml"), "run:\n  run-time: 90\n").unwrap();

    oct_hq(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("run-time: 90"));
}

#[test]
fn test_config_reads_project_json() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("config.json");
    std::fs::write(&path, r#"{"run_time": 45, "results_ts_interval": 5}"#).unwrap();

    oct_hq(&home)
        .arg("config")
        .arg("--config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("run-time: 45"))
        .stdout(predicate::str::contains("results-ts-interval: 5"));
}

#[test]
fn test_run_rejects_zero_turrets() {
    let home = TempDir::new().unwrap();
    oct_hq(&home)
        .args(["run", "--turrets", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("turrets must be at least 1"));
}

#[test]
fn test_run_rejects_shared_port() {
    let home = TempDir::new().unwrap();
    oct_hq(&home)
        .args(["run", "--publish-port", "6000", "--rc-port", "6000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must differ"));
}
