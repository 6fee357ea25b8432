//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;

#[test]
fn cli_without_arguments_prints_usage() {
    let mut cmd = cargo_bin_cmd!("cloudwait");
    cmd.assert().failure().stderr(contains("Usage"));
}

#[test]
fn cli_help_lists_subcommands() {
    let mut cmd = cargo_bin_cmd!("cloudwait");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(contains("create-server"))
        .stdout(contains("delete-servers"))
        .stdout(contains("list-snapshots"))
        .stdout(contains("list-objects"));
}

#[test]
fn cli_rejects_zero_count() {
    let mut cmd = cargo_bin_cmd!("cloudwait");
    cmd.args(["create-server", "--count", "0"])
        .assert()
        .failure()
        .stderr(contains("--count"));
}

#[test]
fn cli_rejects_empty_delete_prefix() {
    let mut cmd = cargo_bin_cmd!("cloudwait");
    cmd.args(["delete-servers", "--prefix", ""])
        .assert()
        .failure()
        .code(2)
        .stderr(contains("--prefix"));
}

#[test]
fn cli_reports_missing_configuration() {
    let mut cmd = cargo_bin_cmd!("cloudwait");
    cmd.arg("list-snapshots")
        .env_remove("SCW_DEFAULT_PROJECT_ID")
        .env("CLOUDWAIT_CONFIG_PATH", "/nonexistent/cloudwait.toml")
        .env("SCW_SECRET_KEY", "")
        .assert()
        .code(1)
        .stderr(contains("configuration error"));
}

#[test]
fn cli_list_objects_requires_access_key() {
    let mut cmd = cargo_bin_cmd!("cloudwait");
    cmd.args(["list-objects", "--bucket", "cloudwait-example"])
        .env_remove("SCW_ACCESS_KEY")
        .env("CLOUDWAIT_CONFIG_PATH", "/nonexistent/cloudwait.toml")
        .env("SCW_SECRET_KEY", "secret")
        .env("SCW_DEFAULT_PROJECT_ID", "project")
        .assert()
        .code(1)
        .stderr(contains("SCW_ACCESS_KEY"));
}

#[test]
fn cli_rejects_empty_bucket() {
    let mut cmd = cargo_bin_cmd!("cloudwait");
    cmd.args(["list-objects", "--bucket", ""])
        .assert()
        .failure()
        .code(2)
        .stderr(contains("--bucket"));
}
