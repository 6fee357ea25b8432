//! Shared fixtures for teardown BDD scenarios.

use std::time::Duration;

use cloudwait::test_support::{FakeBackend, ScriptedRunner};
use cloudwait::{
    PollPolicy, Provisioner, RemoteShell, ServerHandle, ServerTemplate, SshConfig,
    TeardownReport, WaitPolicies,
};
use rstest::fixture;

pub const ZONE: &str = "fr-par-1";

#[derive(Clone, Debug)]
pub enum TeardownOutcome {
    Report(TeardownReport),
    Failure(String),
}

#[derive(Clone, Debug)]
pub struct TeardownContext {
    pub backend: FakeBackend,
    pub runner: ScriptedRunner,
    pub servers: Vec<(String, ServerHandle)>,
    pub outcome: Option<TeardownOutcome>,
}

impl TeardownContext {
    pub fn handle_for(&self, name: &str) -> ServerHandle {
        self.servers
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, handle)| handle.clone())
            .unwrap_or_else(|| panic!("test setup has no server named {name}"))
    }

    pub fn provisioner(&self) -> Provisioner<FakeBackend, ScriptedRunner> {
        let shell = RemoteShell::new(SshConfig::default(), self.runner.clone())
            .unwrap_or_else(|err| panic!("default ssh config should be valid: {err}"));
        let policy = PollPolicy::new(Duration::from_secs(120), Duration::from_secs(20))
            .unwrap_or_else(|err| panic!("teardown policy should be valid: {err}"));
        Provisioner::new(
            self.backend.clone(),
            shell,
            template(),
            WaitPolicies::uniform(policy),
        )
    }
}

#[fixture]
pub fn teardown_context() -> TeardownContext {
    TeardownContext {
        backend: FakeBackend::new(),
        runner: ScriptedRunner::new(),
        servers: Vec::new(),
        outcome: None,
    }
}

fn template() -> ServerTemplate {
    ServerTemplate {
        image_label: String::from("Ubuntu 24.04 Noble Numbat"),
        instance_type: String::from("DEV1-S"),
        zone: String::from(ZONE),
        project_id: String::from("project"),
        organisation_id: None,
        architecture: String::from("x86_64"),
    }
}
