//! BDD step definitions for server teardown.

use cloudwait::ServerStatus;
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Builder;

use super::test_helpers::{TeardownContext, TeardownOutcome, ZONE};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("servers named \"{names}\" exist")]
fn servers_exist(mut teardown_context: TeardownContext, names: String) -> TeardownContext {
    for name in names.split(',').map(str::trim) {
        let handle = teardown_context
            .backend
            .insert_server(name, ZONE, vec![ServerStatus::Running]);
        teardown_context.servers.push((name.to_owned(), handle));
    }
    teardown_context
}

#[given("deleting \"{name}\" fails")]
fn deletion_fails(teardown_context: TeardownContext, name: String) -> TeardownContext {
    let handle = teardown_context.handle_for(&name);
    teardown_context.backend.fail_delete(&handle.id);
    teardown_context
}

#[given("server \"{name}\" survives deletion")]
fn server_survives(teardown_context: TeardownContext, name: String) -> TeardownContext {
    let handle = teardown_context.handle_for(&name);
    teardown_context.backend.keep_after_delete(&handle.id);
    teardown_context
}

#[when("I delete servers with prefix \"{prefix}\"")]
fn delete_with_prefix(
    mut teardown_context: TeardownContext,
    prefix: String,
) -> Result<TeardownContext, StepError> {
    // Paused time lets the teardown wait run to its deadline instantly.
    let runtime = Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .map_err(|err| StepError::Assertion(err.to_string()))?;
    let provisioner = teardown_context.provisioner();

    let result = runtime.block_on(async move { provisioner.delete_servers(&prefix).await });
    teardown_context.outcome = Some(match result {
        Ok(report) => TeardownOutcome::Report(report),
        Err(err) => TeardownOutcome::Failure(err.to_string()),
    });
    Ok(teardown_context)
}

fn report(teardown_context: &TeardownContext) -> Result<&cloudwait::TeardownReport, StepError> {
    match teardown_context.outcome.as_ref() {
        Some(TeardownOutcome::Report(report)) => Ok(report),
        Some(TeardownOutcome::Failure(message)) => Err(StepError::Assertion(format!(
            "expected a report, got failure: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

fn expect_count(label: &str, actual: usize, expected: u32) -> Result<(), StepError> {
    if actual == expected as usize {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected} {label}, got {actual}"
        )))
    }
}

#[then("the report lists {count:u32} deleted servers")]
fn reports_deleted(teardown_context: &TeardownContext, count: u32) -> Result<(), StepError> {
    expect_count("deleted servers", report(teardown_context)?.deleted.len(), count)
}

#[then("the report lists {count:u32} failed deletions")]
fn reports_failures(teardown_context: &TeardownContext, count: u32) -> Result<(), StepError> {
    expect_count("failures", report(teardown_context)?.failures.len(), count)
}

#[then("the report lists {count:u32} residual servers")]
fn reports_residual(teardown_context: &TeardownContext, count: u32) -> Result<(), StepError> {
    expect_count("residual servers", report(teardown_context)?.residual.len(), count)
}

#[then("the report is clean")]
fn report_clean(teardown_context: &TeardownContext) -> Result<(), StepError> {
    let summary = report(teardown_context)?;
    if summary.is_clean() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("expected clean report: {summary}")))
    }
}

#[then("the report is not clean")]
fn report_not_clean(teardown_context: &TeardownContext) -> Result<(), StepError> {
    let summary = report(teardown_context)?;
    if summary.is_clean() {
        Err(StepError::Assertion(format!("expected residue: {summary}")))
    } else {
        Ok(())
    }
}

#[then("server \"{name}\" was not touched")]
fn server_untouched(teardown_context: &TeardownContext, name: String) -> Result<(), StepError> {
    let handle = teardown_context.handle_for(&name);
    let deleted = teardown_context.backend.delete_requests();
    if deleted.contains(&handle.id) {
        return Err(StepError::Assertion(format!(
            "server {name} should not be deleted"
        )));
    }
    if teardown_context.backend.server_ids().contains(&handle.id) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("server {name} should still exist")))
    }
}
