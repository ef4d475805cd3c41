//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;

#[test]
fn cli_without_arguments_prints_usage() {
    let mut cmd = cargo_bin_cmd!("perch");
    cmd.assert().failure().stderr(contains("Usage"));
}

#[test]
fn cli_help_describes_the_console_subcommand() {
    let mut cmd = cargo_bin_cmd!("perch");
    cmd.arg("--help");
    cmd.assert().success().stdout(contains("console"));
}

#[test]
fn console_help_documents_the_selection_flags() {
    let mut cmd = cargo_bin_cmd!("perch");
    cmd.args(["console", "--help"]);
    cmd.assert()
        .success()
        .stdout(contains("--select"))
        .stdout(contains("MACHINE_ID"));
}
