//! Smoke tests for the `aerolog` binary surface.

use assert_cmd::Command;
use predicates::prelude::*;

fn aerolog() -> Command {
    Command::cargo_bin("aerolog").unwrap_or_else(|err| panic!("binary should build: {err}"))
}

#[test]
fn no_arguments_prints_usage() {
    aerolog()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_lists_every_operation() {
    aerolog()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("start-instance"))
        .stdout(predicate::str::contains("stop-instance"))
        .stdout(predicate::str::contains("instance-status"))
        .stdout(predicate::str::contains("artifact-paths"))
        .stdout(predicate::str::contains("solve-captcha"));
}

#[test]
fn run_requires_credentials() {
    aerolog()
        .args(["run", "--login", "pilot@example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--password"));
}

#[test]
fn callback_endpoints_must_be_paired() {
    aerolog()
        .args([
            "run",
            "--login",
            "pilot@example.com",
            "--password",
            "hunter2",
            "--callback-ok",
            "http://localhost/ok",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--callback-error"));
}

#[test]
fn fake_run_mode_exits_zero_on_success() {
    aerolog()
        .env("AEROLOG_FAKE_RUN_MODE", "ok")
        .args(["run", "--login", "pilot@example.com", "--password", "hunter2"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status":"ok""#));
}

#[test]
fn fake_run_mode_exits_nonzero_on_error() {
    aerolog()
        .env("AEROLOG_FAKE_RUN_MODE", "error")
        .args(["run", "--login", "pilot@example.com", "--password", "hunter2"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(r#""status":"error""#));
}

#[test]
fn fake_config_failure_reports_on_stderr() {
    aerolog()
        .env("AEROLOG_FAKE_RUN_MODE", "config")
        .args(["run", "--login", "pilot@example.com", "--password", "hunter2"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("configuration error"));
}
