//! CLI smoke tests

use assert_cmd::Command;
use predicates::prelude::*;

fn tp() -> Command {
    Command::cargo_bin("tp").expect("binary builds")
}

#[test]
fn test_help_lists_subcommands() {
    tp().arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("iris-new"))
        .stdout(predicate::str::contains("auth"));
}

#[test]
fn test_add_then_list() {
    let temp = tempfile::tempdir().unwrap();

    tp().current_dir(temp.path())
        .args(["add", "write release notes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created task 1"));

    tp().current_dir(temp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("write release notes"));
}

#[test]
fn test_list_empty() {
    let temp = tempfile::tempdir().unwrap();

    tp().current_dir(temp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No tasks"));
}

#[test]
fn test_logs_missing_task_fails() {
    let temp = tempfile::tempdir().unwrap();

    tp().current_dir(temp.path()).args(["logs", "99"]).assert().failure();
}

#[test]
fn test_pause_pending_task_fails() {
    let temp = tempfile::tempdir().unwrap();

    tp().current_dir(temp.path()).args(["add", "goal"]).assert().success();
    // Pending tasks cannot pause; exit code reports the failure
    tp().current_dir(temp.path()).args(["pause", "1"]).assert().failure();
}
