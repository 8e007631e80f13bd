//! Integration tests for core CLI contract behavior.

use assert_cmd::Command;
use predicates::prelude::*;

fn cli_cmd() -> Command {
    Command::cargo_bin("updiflash").unwrap()
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    cli_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("updiflash"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero() {
    cli_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("updiflash"));
}

#[test]
fn missing_required_flags_fail_with_usage() {
    cli_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("--device"));
}

#[test]
fn missing_action_fails_before_touching_the_port() {
    cli_cmd()
        .args(["-d", "tiny416", "-c", "/dev/null", "-b", "115200"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no valid action"));
}

#[test]
fn unknown_device_lists_supported_parts() {
    cli_cmd()
        .args(["-d", "tiny9999", "-c", "/dev/null", "-b", "115200", "-i"])
        .assert()
        .failure()
        .stderr(
            predicate::str::contains("Unknown device")
                .and(predicate::str::contains("tiny416")),
        );
}

#[test]
fn write_fuse_without_value_is_rejected() {
    cli_cmd()
        .args([
            "-d",
            "tiny416",
            "-c",
            "/dev/null",
            "-b",
            "115200",
            "--writefuse",
            "1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--fusebit"));
}
