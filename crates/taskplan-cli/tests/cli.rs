//! CLI surface tests.
//!
//! These exercise the binary without a Taskwarrior installation: the help
//! surface, the no-flags behavior, configuration failure exit codes, and the
//! install round trip against a throwaway taskrc.

use assert_cmd::Command;
use predicates::prelude::*;

fn taskplan() -> Command {
    let mut cmd = Command::cargo_bin("taskplan").expect("binary builds");
    // Keep the test hermetic: config and cache lookups land in a sandbox
    cmd.env_remove("TASKRC");
    cmd
}

#[test]
fn help_lists_the_flag_surface() {
    taskplan()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--schedule")
                .and(predicate::str::contains("--report"))
                .and(predicate::str::contains("--force-update"))
                .and(predicate::str::contains("--taskrc"))
                .and(predicate::str::contains("--urgency-weight"))
                .and(predicate::str::contains("--dry-run")),
        );
}

#[test]
fn no_flags_prints_help_and_succeeds() {
    taskplan()
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn schedule_without_config_fails() {
    let sandbox = tempfile::tempdir().unwrap();
    taskplan()
        .arg("--schedule")
        .env("HOME", sandbox.path())
        .env("XDG_CONFIG_HOME", sandbox.path().join("config"))
        .env("XDG_CACHE_HOME", sandbox.path().join("cache"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}

#[test]
fn install_appends_then_becomes_a_noop() {
    let sandbox = tempfile::tempdir().unwrap();
    let taskrc = sandbox.path().join("taskrc");
    std::fs::write(&taskrc, "data.location=~/.task\n").unwrap();

    taskplan()
        .arg("--install")
        .arg("--taskrc")
        .arg(&taskrc)
        .assert()
        .success()
        .stdout(predicate::str::contains("added"));

    let written = std::fs::read_to_string(&taskrc).unwrap();
    assert!(written.contains("uda.estimated.type=duration"));
    assert!(written.contains("uda.scheduling.type=string"));
    assert!(written.contains("urgency.uda.estimated.P0DT1H.coefficient=10.0"));

    taskplan()
        .arg("--install")
        .arg("--taskrc")
        .arg(&taskrc)
        .assert()
        .success()
        .stdout(predicate::str::contains("already carries"));

    // The second run must not duplicate anything
    let after = std::fs::read_to_string(&taskrc).unwrap();
    assert_eq!(written, after);
}
