//! BDD scenarios for server teardown.

use rstest_bdd_macros::scenario;

use super::test_helpers::{TeardownContext, teardown_context};

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Delete every server matching a prefix"
)]
fn scenario_delete_matching(teardown_context: TeardownContext) {
    drop(teardown_context);
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Record failed deletions and keep going"
)]
fn scenario_failed_deletion(teardown_context: TeardownContext) {
    drop(teardown_context);
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Report servers that never disappear"
)]
fn scenario_residual_server(teardown_context: TeardownContext) {
    drop(teardown_context);
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Nothing matches the prefix"
)]
fn scenario_nothing_matches(teardown_context: TeardownContext) {
    drop(teardown_context);
}
