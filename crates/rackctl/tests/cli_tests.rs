//! CLI surface smoke tests

use assert_cmd::Command;
use predicates::prelude::*;

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn test_help_lists_subcommands() -> TestResult {
    Command::cargo_bin("rackctl")?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("factory-reset"))
        .stdout(predicate::str::contains("version"));
    Ok(())
}

#[test]
fn test_update_requires_a_package_argument() -> TestResult {
    Command::cargo_bin("rackctl")?
        .arg("update")
        .assert()
        .failure()
        .stderr(predicate::str::contains("FILE"));
    Ok(())
}

#[test]
fn test_missing_package_maps_to_package_invalid_exit_code() -> TestResult {
    Command::cargo_bin("rackctl")?
        .args([
            "update",
            "/nonexistent/firmware.tar",
            "--yes",
            "--no-lock",
            "--no-sign",
        ])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("not found"));
    Ok(())
}
