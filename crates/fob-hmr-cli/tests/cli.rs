//! Binary-level tests for `fob-hmr`.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn fob_hmr() -> Command {
    Command::new(env!("CARGO_BIN_EXE_fob-hmr"))
}

#[test]
fn test_help_lists_serve() {
    fob_hmr()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn test_serve_rejects_missing_root() {
    let temp = TempDir::new().unwrap();
    fob_hmr()
        .args(["--no-color", "serve", "--root"])
        .arg(temp.path().join("missing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("root"));
}

#[test]
fn test_serve_rejects_invalid_config_file() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("fob-hmr.config.json"), "{ \"port\": \"nope\" }").unwrap();

    fob_hmr()
        .args(["--no-color", "serve", "--root"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}
