//! CLI-level tests for the avmerge binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn missing_arguments_print_usage() {
    Command::cargo_bin("avmerge")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn nonexistent_inputs_fail_with_open_error() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("merged.mp4");

    Command::cargo_bin("avmerge")
        .unwrap()
        .args([
            "--video",
            "no-such-video.mp4",
            "--audio",
            "no-such-audio.m4a",
            "--output",
            output.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open input file"));
}
