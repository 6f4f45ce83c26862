//! Smoke tests for the `openneuro` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn openneuro() -> Command {
    let mut cmd = Command::cargo_bin("openneuro").unwrap();
    cmd.env_remove("OPENNEURO_SERVER")
        .env_remove("OPENNEURO_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_commands() {
    openneuro()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("publish"));
}

#[test]
fn invalid_dataset_id_is_rejected() {
    openneuro()
        .args(["publish", "ds/0001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid"));
}

#[test]
fn upload_without_token_cannot_create_dataset() {
    let config = tempdir().unwrap();
    let data = tempdir().unwrap();
    openneuro()
        .arg("--config-dir")
        .arg(config.path())
        .arg("upload")
        .arg("--force")
        .current_dir(data.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("openneuro login"));
}

#[test]
fn unreachable_server_fails_download() {
    let config = tempdir().unwrap();
    let out = tempdir().unwrap();
    openneuro()
        .arg("--config-dir")
        .arg(config.path())
        .args(["--server", "http://127.0.0.1:1"])
        .args(["download", "--dry-run", "ds000001"])
        .arg(out.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot list ds000001"));
}

#[test]
fn corrupt_credentials_are_reported() {
    let config = tempdir().unwrap();
    std::fs::write(config.path().join("credentials.json"), "{").unwrap();
    openneuro()
        .arg("--config-dir")
        .arg(config.path())
        .args(["publish", "ds000001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid credential file"));
}
