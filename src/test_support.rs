//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ffi::OsString;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::backend::{
    BackendFuture, ComputeBackend, Flavor, SecurityGroupHandle, SecurityGroupRequest,
    ServerDetails, ServerHandle, ServerRequest, ServerStatus, SnapshotDetails, SnapshotHandle,
    SnapshotRequest, SnapshotStatus, VolumeSummary,
};
use crate::remote::{CommandOutput, CommandRunner, RemoteError};
use crate::storage::{ObjectStorage, ObjectSummary};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| RemoteError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Error returned by [`FakeBackend`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("fake backend: {0}")]
pub struct FakeBackendError(pub String);

#[derive(Debug)]
struct FakeServer {
    name: String,
    zone: String,
    statuses: VecDeque<ServerStatus>,
    public_ip: Option<IpAddr>,
    security_group: Option<String>,
}

impl FakeServer {
    /// Returns the current view and advances the status script.
    fn observe(&mut self, id: &str) -> ServerDetails {
        let status = if self.statuses.len() > 1 {
            self.statuses.pop_front()
        } else {
            self.statuses.front().cloned()
        }
        .unwrap_or(ServerStatus::Running);

        ServerDetails {
            id: id.to_owned(),
            name: self.name.clone(),
            zone: self.zone.clone(),
            status,
            public_ip: self.public_ip,
        }
    }
}

#[derive(Debug)]
struct FakeSecurityGroup {
    name: String,
    zone: String,
    inbound_ports: Vec<u16>,
}

#[derive(Debug)]
struct FakeSnapshot {
    name: String,
    zone: String,
    volume_id: String,
    statuses: VecDeque<SnapshotStatus>,
}

#[derive(Debug)]
struct FakeState {
    next_id: u32,
    servers: BTreeMap<String, FakeServer>,
    snapshots: BTreeMap<String, FakeSnapshot>,
    security_groups: BTreeMap<String, FakeSecurityGroup>,
    failing_group_deletes: bool,
    flavors: Vec<Flavor>,
    volumes: Vec<VolumeSummary>,
    new_server_statuses: Vec<ServerStatus>,
    new_snapshot_statuses: Vec<SnapshotStatus>,
    public_ip: IpAddr,
    failing_deletes: BTreeSet<String>,
    sticky_servers: BTreeSet<String>,
    reads_before_failure: Option<u32>,
    reads: u32,
    created: Vec<ServerRequest>,
    snapshot_requests: Vec<SnapshotRequest>,
    delete_requests: Vec<String>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            next_id: 0,
            servers: BTreeMap::new(),
            snapshots: BTreeMap::new(),
            security_groups: BTreeMap::new(),
            failing_group_deletes: false,
            flavors: Vec::new(),
            volumes: Vec::new(),
            new_server_statuses: vec![ServerStatus::Running],
            new_snapshot_statuses: vec![SnapshotStatus::Available],
            public_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            failing_deletes: BTreeSet::new(),
            sticky_servers: BTreeSet::new(),
            reads_before_failure: None,
            reads: 0,
            created: Vec::new(),
            snapshot_requests: Vec::new(),
            delete_requests: Vec::new(),
        }
    }
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn record_read(&mut self) -> Result<(), FakeBackendError> {
        self.reads += 1;
        match self.reads_before_failure {
            Some(limit) if self.reads > limit => Err(FakeBackendError(String::from(
                "status endpoint unavailable",
            ))),
            _ => Ok(()),
        }
    }
}

/// In-memory [`ComputeBackend`] with scripted status progressions.
///
/// Every read of a server or snapshot advances its status script by one
/// step; the last status repeats forever.
#[derive(Clone, Debug, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    /// Creates an empty backend whose new servers are immediately running.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flavors returned by `list_flavors`.
    pub fn set_flavors(&self, flavors: Vec<Flavor>) {
        lock(&self.state).flavors = flavors;
    }

    /// Sets the status script given to servers created from now on.
    pub fn set_new_server_statuses(&self, statuses: Vec<ServerStatus>) {
        lock(&self.state).new_server_statuses = statuses;
    }

    /// Sets the status script given to snapshots created from now on.
    pub fn set_new_snapshot_statuses(&self, statuses: Vec<SnapshotStatus>) {
        lock(&self.state).new_snapshot_statuses = statuses;
    }

    /// Sets the public address assigned to created servers.
    pub fn set_public_ip(&self, address: IpAddr) {
        lock(&self.state).public_ip = address;
    }

    /// Adds an existing server and returns its handle.
    pub fn insert_server(
        &self,
        name: &str,
        zone: &str,
        statuses: Vec<ServerStatus>,
    ) -> ServerHandle {
        let mut state = lock(&self.state);
        let id = state.next_id("srv");
        let public_ip = Some(state.public_ip);
        state.servers.insert(
            id.clone(),
            FakeServer {
                name: name.to_owned(),
                zone: zone.to_owned(),
                statuses: statuses.into(),
                public_ip,
                security_group: None,
            },
        );
        ServerHandle {
            id,
            zone: zone.to_owned(),
        }
    }

    /// Adds a volume.
    pub fn insert_volume(&self, name: &str, zone: &str, size_bytes: u64) -> VolumeSummary {
        let mut state = lock(&self.state);
        let volume = VolumeSummary {
            id: state.next_id("vol"),
            name: name.to_owned(),
            zone: zone.to_owned(),
            size_bytes,
        };
        state.volumes.push(volume.clone());
        volume
    }

    /// Makes deletion of `server_id` fail.
    pub fn fail_delete(&self, server_id: &str) {
        lock(&self.state)
            .failing_deletes
            .insert(server_id.to_owned());
    }

    /// Accepts deletion of `server_id` but keeps listing it.
    pub fn keep_after_delete(&self, server_id: &str) {
        lock(&self.state)
            .sticky_servers
            .insert(server_id.to_owned());
    }

    /// Makes every read after the first `count` reads fail.
    pub fn fail_reads_after(&self, count: u32) {
        lock(&self.state).reads_before_failure = Some(count);
    }

    /// Number of server and snapshot reads served so far.
    #[must_use]
    pub fn read_count(&self) -> u32 {
        lock(&self.state).reads
    }

    /// Requests passed to `create_server`, in order.
    #[must_use]
    pub fn created_requests(&self) -> Vec<ServerRequest> {
        lock(&self.state).created.clone()
    }

    /// Requests passed to `create_snapshot`, in order.
    #[must_use]
    pub fn snapshot_requests(&self) -> Vec<SnapshotRequest> {
        lock(&self.state).snapshot_requests.clone()
    }

    /// Server ids passed to `delete_server`, in order.
    #[must_use]
    pub fn delete_requests(&self) -> Vec<String> {
        lock(&self.state).delete_requests.clone()
    }

    /// Ids of the servers that currently exist.
    #[must_use]
    pub fn server_ids(&self) -> Vec<String> {
        lock(&self.state).servers.keys().cloned().collect()
    }

    /// Adds an existing security group and returns its handle.
    pub fn insert_security_group(&self, name: &str, zone: &str) -> SecurityGroupHandle {
        let mut state = lock(&self.state);
        let id = state.next_id("sg");
        state.security_groups.insert(
            id.clone(),
            FakeSecurityGroup {
                name: name.to_owned(),
                zone: zone.to_owned(),
                inbound_ports: Vec::new(),
            },
        );
        SecurityGroupHandle {
            id,
            zone: zone.to_owned(),
        }
    }

    /// Makes every security group deletion fail.
    pub fn fail_security_group_deletes(&self) {
        lock(&self.state).failing_group_deletes = true;
    }

    /// Inbound ports of the security group called `name`, if it exists.
    #[must_use]
    pub fn security_group_ports(&self, name: &str) -> Option<Vec<u16>> {
        lock(&self.state)
            .security_groups
            .values()
            .find(|group| group.name == name)
            .map(|group| group.inbound_ports.clone())
    }

    /// Names of the security groups that currently exist.
    #[must_use]
    pub fn security_group_names(&self) -> Vec<String> {
        lock(&self.state)
            .security_groups
            .values()
            .map(|group| group.name.clone())
            .collect()
    }
}

impl ComputeBackend for FakeBackend {
    type Error = FakeBackendError;

    fn create_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> BackendFuture<'a, ServerHandle, Self::Error> {
        Box::pin(async move {
            let statuses = lock(&self.state).new_server_statuses.clone();
            let handle = self.insert_server(&request.name, &request.zone, statuses);
            let mut state = lock(&self.state);
            if let Some(server) = state.servers.get_mut(&handle.id) {
                server.security_group.clone_from(&request.security_group);
            }
            state.created.push(request.clone());
            Ok(handle)
        })
    }

    fn get_server<'a>(
        &'a self,
        handle: &'a ServerHandle,
    ) -> BackendFuture<'a, Option<ServerDetails>, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record_read()?;
            Ok(state
                .servers
                .get_mut(&handle.id)
                .map(|server| server.observe(&handle.id)))
        })
    }

    fn list_servers<'a>(
        &'a self,
        zone: &'a str,
    ) -> BackendFuture<'a, Vec<ServerDetails>, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record_read()?;
            Ok(state
                .servers
                .iter_mut()
                .filter(|(_, server)| server.zone == zone)
                .map(|(id, server)| server.observe(id))
                .collect())
        })
    }

    fn delete_server<'a>(
        &'a self,
        handle: &'a ServerHandle,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.delete_requests.push(handle.id.clone());
            if state.failing_deletes.contains(&handle.id) {
                return Err(FakeBackendError(format!(
                    "server {} is locked",
                    handle.id
                )));
            }
            if !state.sticky_servers.contains(&handle.id) {
                state.servers.remove(&handle.id);
            }
            Ok(())
        })
    }

    fn list_flavors<'a>(&'a self, _zone: &'a str) -> BackendFuture<'a, Vec<Flavor>, Self::Error> {
        Box::pin(async move { Ok(lock(&self.state).flavors.clone()) })
    }

    fn list_volumes<'a>(
        &'a self,
        zone: &'a str,
    ) -> BackendFuture<'a, Vec<VolumeSummary>, Self::Error> {
        Box::pin(async move {
            Ok(lock(&self.state)
                .volumes
                .iter()
                .filter(|volume| volume.zone == zone)
                .cloned()
                .collect())
        })
    }

    fn create_snapshot<'a>(
        &'a self,
        request: &'a SnapshotRequest,
    ) -> BackendFuture<'a, SnapshotHandle, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            let id = state.next_id("snap");
            let statuses = state.new_snapshot_statuses.clone().into();
            state.snapshots.insert(
                id.clone(),
                FakeSnapshot {
                    name: request.name.clone(),
                    zone: request.zone.clone(),
                    volume_id: request.volume_id.clone(),
                    statuses,
                },
            );
            state.snapshot_requests.push(request.clone());
            Ok(SnapshotHandle {
                id,
                zone: request.zone.clone(),
            })
        })
    }

    fn get_snapshot<'a>(
        &'a self,
        handle: &'a SnapshotHandle,
    ) -> BackendFuture<'a, Option<SnapshotDetails>, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record_read()?;
            Ok(state.snapshots.get_mut(&handle.id).map(|snapshot| {
                let status = if snapshot.statuses.len() > 1 {
                    snapshot.statuses.pop_front()
                } else {
                    snapshot.statuses.front().cloned()
                }
                .unwrap_or(SnapshotStatus::Available);
                SnapshotDetails {
                    id: handle.id.clone(),
                    name: snapshot.name.clone(),
                    zone: snapshot.zone.clone(),
                    status,
                    volume_id: Some(snapshot.volume_id.clone()),
                }
            }))
        })
    }

    fn list_snapshots<'a>(
        &'a self,
        zone: &'a str,
    ) -> BackendFuture<'a, Vec<SnapshotDetails>, Self::Error> {
        Box::pin(async move {
            Ok(lock(&self.state)
                .snapshots
                .iter()
                .filter(|(_, snapshot)| snapshot.zone == zone)
                .map(|(id, snapshot)| SnapshotDetails {
                    id: id.clone(),
                    name: snapshot.name.clone(),
                    zone: snapshot.zone.clone(),
                    status: snapshot
                        .statuses
                        .front()
                        .cloned()
                        .unwrap_or(SnapshotStatus::Available),
                    volume_id: Some(snapshot.volume_id.clone()),
                })
                .collect())
        })
    }

    fn create_security_group<'a>(
        &'a self,
        request: &'a SecurityGroupRequest,
    ) -> BackendFuture<'a, SecurityGroupHandle, Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            let id = state.next_id("sg");
            state.security_groups.insert(
                id.clone(),
                FakeSecurityGroup {
                    name: request.name.clone(),
                    zone: request.zone.clone(),
                    inbound_ports: request.inbound_ports.clone(),
                },
            );
            Ok(SecurityGroupHandle {
                id,
                zone: request.zone.clone(),
            })
        })
    }

    fn find_security_group<'a>(
        &'a self,
        zone: &'a str,
        name: &'a str,
    ) -> BackendFuture<'a, Option<SecurityGroupHandle>, Self::Error> {
        Box::pin(async move {
            Ok(lock(&self.state)
                .security_groups
                .iter()
                .find(|(_, group)| group.zone == zone && group.name == name)
                .map(|(id, group)| SecurityGroupHandle {
                    id: id.clone(),
                    zone: group.zone.clone(),
                }))
        })
    }

    fn delete_security_group<'a>(
        &'a self,
        handle: &'a SecurityGroupHandle,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            if state.failing_group_deletes {
                return Err(FakeBackendError(format!(
                    "security group {} is locked",
                    handle.id
                )));
            }
            let in_use = state
                .servers
                .values()
                .any(|server| server.security_group.as_deref() == Some(handle.id.as_str()));
            if in_use {
                return Err(FakeBackendError(format!(
                    "security group {} is in use",
                    handle.id
                )));
            }
            state
                .security_groups
                .remove(&handle.id)
                .map(|_| ())
                .ok_or_else(|| FakeBackendError(format!("security group {} not found", handle.id)))
        })
    }
}

/// In-memory [`ObjectStorage`]; listing an unknown bucket fails the way a
/// missing bucket does on a real store.
#[derive(Clone, Debug, Default)]
pub struct FakeObjectStorage {
    buckets: Arc<Mutex<BTreeMap<String, Vec<ObjectSummary>>>>,
}

impl FakeObjectStorage {
    /// Creates a store without buckets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `bucket` if needed and stores an object in it.
    pub fn put(&self, bucket: &str, key: &str, size_bytes: u64) {
        lock(&self.buckets)
            .entry(bucket.to_owned())
            .or_default()
            .push(ObjectSummary {
                key: key.to_owned(),
                size_bytes,
                last_modified: String::from("2024-05-01T12:00:00.000Z"),
            });
    }
}

impl ObjectStorage for FakeObjectStorage {
    type Error = FakeBackendError;

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
    ) -> BackendFuture<'a, Vec<ObjectSummary>, Self::Error> {
        Box::pin(async move {
            lock(&self.buckets)
                .get(bucket)
                .map(|objects| {
                    objects
                        .iter()
                        .filter(|object| object.key.starts_with(prefix))
                        .cloned()
                        .collect()
                })
                .ok_or_else(|| FakeBackendError(format!("bucket {bucket} does not exist")))
        })
    }
}
