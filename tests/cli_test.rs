//! CLI smoke tests: argument handling and exit codes.

#![allow(clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn index_docs_list_prints_allowlist() {
    Command::cargo_bin("lightopedia")
        .unwrap()
        .args(["index-docs", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("light-platform/help-center"));
}

#[test]
fn index_docs_alias_accepted() {
    Command::cargo_bin("lightopedia")
        .unwrap()
        .args(["index:docs", "--list"])
        .assert()
        .success();
}

#[test]
fn index_docs_without_repo_fails() {
    Command::cargo_bin("lightopedia")
        .unwrap()
        .args(["index-docs"])
        .assert()
        .failure();
}

#[test]
fn unknown_subcommand_fails() {
    Command::cargo_bin("lightopedia")
        .unwrap()
        .arg("frobnicate")
        .assert()
        .failure();
}
