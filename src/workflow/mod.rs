//! Provisioning workflows built on the await-condition poller.
//!
//! Each operation drives a [`ComputeBackend`] and blocks on a [`Poller`]
//! until the resources it touched reach the state the operation promises:
//! servers running, ports accepting connections, snapshots available or
//! deleted servers gone. [`list_objects`] reads a bucket through an
//! [`crate::storage::ObjectStorage`] instead.

mod error;
mod objects;
mod report;

use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};

use tracing::{info, warn};

use crate::backend::{
    BackendError, ComputeBackend, Flavor, SecurityGroupHandle, SecurityGroupRequest,
    ServerDetails, ServerHandle, ServerRequest, ServerStatus, SnapshotDetails, SnapshotRequest,
};
use crate::conditions::{
    AllServersStatusIs, ConditionError, ServersGone, SnapshotAvailable, TcpReachable,
};
use crate::config::{ScalewayConfig, WaitPolicies};
use crate::poll::{Condition, PollOutcome, Poller};
use crate::remote::{CommandRunner, RemoteShell};
use crate::script::{lamp_script, web_server_script};

pub use error::WorkflowError;
use error::describe_exit;
pub use objects::{ObjectListing, list_objects};
pub use report::{CleanupStep, TeardownFailure, TeardownReport};

/// Port the SSH daemon listens on.
pub const DEFAULT_SSH_PORT: u16 = 22;
/// Port the published web server listens on.
pub const DEFAULT_HTTP_PORT: u16 = 80;
/// Inbound TCP ports the LAMP security group opens: HTTP, alternate HTTP,
/// HTTPS and SSH.
pub const LAMP_PORTS: [u16; 4] = [80, 8080, 443, 22];
/// Tag attached to every server the workflows create.
pub const SERVER_TAG: &str = "cloudwait";

/// Server settings shared by every server a workflow creates.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerTemplate {
    /// Image label resolved by the backend.
    pub image_label: String,
    /// Preferred commercial type.
    pub instance_type: String,
    /// Zone servers are created in.
    pub zone: String,
    /// Project owning the servers.
    pub project_id: String,
    /// Optional organisation identifier.
    pub organisation_id: Option<String>,
    /// CPU architecture.
    pub architecture: String,
}

impl From<&ScalewayConfig> for ServerTemplate {
    fn from(config: &ScalewayConfig) -> Self {
        Self {
            image_label: config.default_image.clone(),
            instance_type: config.default_instance_type.clone(),
            zone: config.default_zone.clone(),
            project_id: config.default_project_id.clone(),
            organisation_id: config.default_organization_id.clone(),
            architecture: config.default_architecture.clone(),
        }
    }
}

/// A server reachable over HTTP.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublishedServer {
    /// Server state once it became reachable.
    pub server: ServerDetails,
    /// URL of the page it serves.
    pub url: String,
}

/// Snapshots found in a zone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ZoneSnapshots {
    /// Zone that was listed.
    pub zone: String,
    /// Snapshots in that zone.
    pub snapshots: Vec<SnapshotDetails>,
}

/// Picks the preferred flavor when offered, otherwise the first one listed.
#[must_use]
pub fn choose_flavor<'f>(flavors: &'f [Flavor], preferred: &str) -> Option<&'f Flavor> {
    if let Some(flavor) = flavors.iter().find(|flavor| flavor.name == preferred) {
        return Some(flavor);
    }
    let fallback = flavors.first()?;
    warn!(
        preferred,
        fallback = %fallback.name,
        "preferred server type not offered; using first available"
    );
    Some(fallback)
}

/// Runs provisioning workflows against a backend.
#[derive(Debug)]
pub struct Provisioner<B, R: CommandRunner> {
    backend: B,
    shell: RemoteShell<R>,
    template: ServerTemplate,
    policies: WaitPolicies,
    ssh_port: u16,
    http_port: u16,
}

type WorkflowResult<T, B> = Result<T, WorkflowError<<B as ComputeBackend>::Error>>;

impl<B, R> Provisioner<B, R>
where
    B: ComputeBackend + Sync,
    R: CommandRunner,
{
    /// Creates a provisioner.
    #[must_use]
    pub const fn new(
        backend: B,
        shell: RemoteShell<R>,
        template: ServerTemplate,
        policies: WaitPolicies,
    ) -> Self {
        Self {
            backend,
            shell,
            template,
            policies,
            ssh_port: DEFAULT_SSH_PORT,
            http_port: DEFAULT_HTTP_PORT,
        }
    }

    /// Overrides the SSH and HTTP ports probed on new servers.
    #[must_use]
    pub const fn with_ports(mut self, ssh_port: u16, http_port: u16) -> Self {
        self.ssh_port = ssh_port;
        self.http_port = http_port;
        self
    }

    /// Returns the backend the provisioner drives.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Creates `count` servers named after `name` and waits for all of them
    /// to run.
    ///
    /// A single server is named `name`; batches are suffixed `-1`, `-2`, and
    /// so on.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Timeout`] when the servers do not all run
    /// within the active-wait policy, and other variants when requests fail.
    pub async fn create_servers(
        &self,
        name: &str,
        count: u32,
    ) -> WorkflowResult<Vec<ServerDetails>, B> {
        self.create_batch(name, count, None, None).await
    }

    /// Creates a server, installs a web server over SSH and publishes
    /// `page` on it.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::RemoteExit`] when the setup script fails and
    /// [`WorkflowError::Timeout`] when the server never accepts SSH.
    pub async fn publish(&self, name: &str, page: &str) -> WorkflowResult<PublishedServer, B> {
        let server = self.create_single(name, None, None).await?;
        let address = public_ip(&server)?;

        self.await_port(address, self.ssh_port).await?;
        let script = web_server_script(page).render();
        let ssh_target = SocketAddr::new(address, self.ssh_port);
        let output = self.shell.run_script(ssh_target, &script)?;
        if output.exit_code != Some(0) {
            return Err(WorkflowError::RemoteExit {
                host: address.to_string(),
                status: describe_exit(output.exit_code),
                stderr: output.stderr.trim().to_owned(),
            });
        }

        let url = self.url_for(address);
        info!(server_id = %server.id, %url, "page published");
        Ok(PublishedServer { server, url })
    }

    /// Creates a server that installs a LAMP stack on first boot and waits
    /// until both SSH and HTTP accept connections.
    ///
    /// The server joins a security group of the same name that only admits
    /// [`LAMP_PORTS`]; [`Provisioner::destroy_lamp`] removes both.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Request`] for a blank name and
    /// [`WorkflowError::Timeout`] when the server does not run or a port
    /// never opens.
    pub async fn launch_lamp(&self, name: &str) -> WorkflowResult<PublishedServer, B> {
        let server_name = name.trim();
        if server_name.is_empty() {
            return Err(BackendError::Validation(String::from("name")).into());
        }
        let group = self
            .backend
            .create_security_group(&SecurityGroupRequest {
                name: server_name.to_owned(),
                zone: self.template.zone.clone(),
                project_id: self.template.project_id.clone(),
                inbound_ports: LAMP_PORTS.to_vec(),
            })
            .await
            .map_err(|source| WorkflowError::Backend {
                action: "creating security group",
                source,
            })?;
        info!(security_group_id = %group.id, ports = ?LAMP_PORTS, "security group ready");

        let user_data = lamp_script().render();
        let server = self
            .create_single(server_name, Some(user_data), Some(group.id))
            .await?;
        let address = public_ip(&server)?;

        self.await_port(address, self.ssh_port).await?;
        self.await_port(address, self.http_port).await?;

        let url = self.url_for(address);
        info!(server_id = %server.id, %url, "LAMP server ready");
        Ok(PublishedServer { server, url })
    }

    /// Deletes every server whose name starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Request`] for a blank prefix, which would
    /// match every server, and [`WorkflowError`] when listing fails or the
    /// teardown wait is aborted; individual deletion failures are reported,
    /// not raised.
    pub async fn delete_servers(&self, prefix: &str) -> WorkflowResult<TeardownReport, B> {
        if prefix.trim().is_empty() {
            return Err(BackendError::Validation(String::from("prefix")).into());
        }
        let matching = self
            .servers_matching(|server| server.name.starts_with(prefix))
            .await?;
        self.teardown(matching).await
    }

    /// Deletes every server named exactly `name`, then the security group
    /// created for it.
    ///
    /// The group is removed even when no server matched, so a launch that
    /// failed half-way can still be cleaned up.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError`] when listing fails or the teardown wait is
    /// aborted; individual deletion failures, including the security
    /// group's, are reported, not raised.
    pub async fn destroy_lamp(&self, name: &str) -> WorkflowResult<TeardownReport, B> {
        let server_name = name.trim();
        if server_name.is_empty() {
            return Err(BackendError::Validation(String::from("name")).into());
        }
        let matching = self
            .servers_matching(|server| server.name == server_name)
            .await?;
        let mut report = self.teardown(matching).await?;

        let group = self
            .backend
            .find_security_group(&self.template.zone, server_name)
            .await
            .map_err(|source| WorkflowError::Backend {
                action: "looking up security group",
                source,
            })?;
        if let Some(handle) = group {
            report.cleanup.push(self.remove_security_group(&handle).await);
        }
        Ok(report)
    }

    /// Snapshots the first volume whose name starts with `volume_prefix` and
    /// waits until the snapshot is available.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotFound`] when no volume matches and
    /// [`WorkflowError::Timeout`] when the snapshot never becomes available.
    pub async fn create_snapshot(
        &self,
        volume_prefix: &str,
        name: &str,
    ) -> WorkflowResult<SnapshotDetails, B> {
        if name.trim().is_empty() {
            return Err(BackendError::Validation(String::from("name")).into());
        }
        let zone = &self.template.zone;
        let volumes = self
            .backend
            .list_volumes(zone)
            .await
            .map_err(|source| WorkflowError::Backend {
                action: "listing volumes",
                source,
            })?;
        let volume = volumes
            .into_iter()
            .find(|volume| volume.name.starts_with(volume_prefix))
            .ok_or_else(|| WorkflowError::NotFound {
                what: format!("volume starting with '{volume_prefix}' in zone {zone}"),
                hint: String::from("Create a volume and attach it to a server first."),
            })?;

        let request = SnapshotRequest {
            name: name.trim().to_owned(),
            volume_id: volume.id.clone(),
            zone: volume.zone.clone(),
            project_id: self.template.project_id.clone(),
            description: Some(format!("Snapshot of {}", volume.id)),
        };
        let started = self
            .backend
            .create_snapshot(&request)
            .await
            .map_err(|source| WorkflowError::Backend {
                action: "creating snapshot",
                source,
            })?;
        info!(snapshot_id = %started.id, volume_id = %volume.id, "snapshot started");

        let resource = started.id.clone();
        let handle = await_policy(
            Poller::new(
                SnapshotAvailable::new(&self.backend),
                self.policies.snapshot_available,
            ),
            started,
            "waiting for snapshot",
        )
        .await?
        .ok_or_else(|| WorkflowError::Timeout {
            action: "waiting for snapshot to become available",
            resource,
        })?;

        self.backend
            .get_snapshot(&handle)
            .await
            .map_err(|source| WorkflowError::Backend {
                action: "fetching snapshot",
                source,
            })?
            .ok_or_else(|| WorkflowError::NotFound {
                what: format!("snapshot {}", handle.id),
                hint: String::from("It was deleted while being created."),
            })
    }

    /// Lists snapshots in each of `zones`, or in the default zone when none
    /// is given.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Backend`] when listing any zone fails.
    pub async fn list_snapshots(&self, zones: &[String]) -> WorkflowResult<Vec<ZoneSnapshots>, B> {
        let targets = if zones.is_empty() {
            vec![self.template.zone.clone()]
        } else {
            zones.to_vec()
        };

        let mut listed = Vec::with_capacity(targets.len());
        for zone in targets {
            let snapshots = self.backend.list_snapshots(&zone).await.map_err(|source| {
                WorkflowError::Backend {
                    action: "listing snapshots",
                    source,
                }
            })?;
            listed.push(ZoneSnapshots { zone, snapshots });
        }
        Ok(listed)
    }

    async fn remove_security_group(&self, handle: &SecurityGroupHandle) -> CleanupStep {
        let resource = format!("security group {}", handle.id);
        match self.backend.delete_security_group(handle).await {
            Ok(()) => {
                info!(security_group_id = %handle.id, "security group deleted");
                CleanupStep {
                    resource,
                    error: None,
                }
            }
            Err(err) => {
                warn!(security_group_id = %handle.id, error = %err, "security group deletion failed");
                CleanupStep {
                    resource,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn create_single(
        &self,
        name: &str,
        user_data: Option<String>,
        security_group: Option<String>,
    ) -> WorkflowResult<ServerDetails, B> {
        let mut servers = self
            .create_batch(name, 1, user_data, security_group)
            .await?;
        servers.pop().ok_or_else(|| WorkflowError::NotFound {
            what: format!("server {name}"),
            hint: String::from("It was deleted while starting."),
        })
    }

    async fn create_batch(
        &self,
        name: &str,
        count: u32,
        user_data: Option<String>,
        security_group: Option<String>,
    ) -> WorkflowResult<Vec<ServerDetails>, B> {
        if count == 0 {
            return Err(BackendError::Validation(String::from("count")).into());
        }
        let instance_type = self.pick_instance_type().await?;

        let mut handles = Vec::new();
        for index in 1..=count {
            let server_name = if count == 1 {
                name.to_owned()
            } else {
                format!("{name}-{index}")
            };
            let request = ServerRequest::builder()
                .name(server_name)
                .image_label(&self.template.image_label)
                .instance_type(&instance_type)
                .zone(&self.template.zone)
                .project_id(&self.template.project_id)
                .organisation_id(self.template.organisation_id.clone())
                .architecture(&self.template.architecture)
                .user_data(user_data.clone())
                .security_group(security_group.clone())
                .tag(SERVER_TAG)
                .build()?;
            let handle = self
                .backend
                .create_server(&request)
                .await
                .map_err(|source| WorkflowError::Backend {
                    action: "creating server",
                    source,
                })?;
            info!(server_id = %handle.id, name = %request.name, "server requested");
            handles.push(handle);
        }

        let running = self.await_running(handles).await?;
        self.describe(&running).await
    }

    async fn pick_instance_type(&self) -> WorkflowResult<String, B> {
        let zone = &self.template.zone;
        let flavors = self
            .backend
            .list_flavors(zone)
            .await
            .map_err(|source| WorkflowError::Backend {
                action: "listing server types",
                source,
            })?;
        choose_flavor(&flavors, &self.template.instance_type)
            .map(|flavor| flavor.name.clone())
            .ok_or_else(|| WorkflowError::NotFound {
                what: format!("server types in zone {zone}"),
                hint: String::from("Choose a zone that offers instances."),
            })
    }

    async fn await_running(
        &self,
        handles: Vec<ServerHandle>,
    ) -> WorkflowResult<Vec<ServerHandle>, B> {
        let resource = join_ids(&handles);
        await_policy(
            Poller::new(
                AllServersStatusIs::new(&self.backend, ServerStatus::Running),
                self.policies.server_active,
            ),
            handles,
            "waiting for servers to run",
        )
        .await?
        .ok_or_else(|| WorkflowError::Timeout {
            action: "waiting for servers to run",
            resource,
        })
    }

    async fn describe(&self, handles: &[ServerHandle]) -> WorkflowResult<Vec<ServerDetails>, B> {
        let mut servers = Vec::with_capacity(handles.len());
        for handle in handles {
            let server = self
                .backend
                .get_server(handle)
                .await
                .map_err(|source| WorkflowError::Backend {
                    action: "fetching server",
                    source,
                })?
                .ok_or_else(|| WorkflowError::NotFound {
                    what: format!("server {}", handle.id),
                    hint: String::from("It was deleted while starting."),
                })?;
            servers.push(server);
        }
        Ok(servers)
    }

    async fn await_port(&self, address: IpAddr, port: u16) -> WorkflowResult<(), B> {
        let target = SocketAddr::new(address, port);
        let outcome = Poller::new(TcpReachable::new(), self.policies.port_open)
            .wait(target)
            .await
            .unwrap_or_else(|never| match never {});
        match outcome {
            PollOutcome::Success(_) => {
                info!(%target, "port open");
                Ok(())
            }
            PollOutcome::TimedOut => Err(WorkflowError::Timeout {
                action: "waiting for port to open",
                resource: target.to_string(),
            }),
        }
    }

    async fn servers_matching(
        &self,
        predicate: impl Fn(&ServerDetails) -> bool,
    ) -> WorkflowResult<Vec<ServerDetails>, B> {
        let servers = self
            .backend
            .list_servers(&self.template.zone)
            .await
            .map_err(|source| WorkflowError::Backend {
                action: "listing servers",
                source,
            })?;
        Ok(servers.into_iter().filter(|server| predicate(server)).collect())
    }

    async fn teardown(&self, servers: Vec<ServerDetails>) -> WorkflowResult<TeardownReport, B> {
        let mut report = TeardownReport::default();
        if servers.is_empty() {
            info!("no servers matched; nothing to delete");
            return Ok(report);
        }

        let mut accepted = Vec::new();
        for server in &servers {
            let handle = server.handle();
            match self.backend.delete_server(&handle).await {
                Ok(()) => {
                    info!(server_id = %handle.id, name = %server.name, "deletion requested");
                    accepted.push(handle);
                }
                Err(err) => {
                    warn!(server_id = %handle.id, error = %err, "deletion failed");
                    report.failures.push(TeardownFailure {
                        server: handle,
                        message: err.to_string(),
                    });
                }
            }
        }
        if accepted.is_empty() {
            return Ok(report);
        }

        let outcome = Poller::new(ServersGone::new(&self.backend), self.policies.teardown)
            .wait(accepted)
            .await
            .map_err(|source| WorkflowError::Condition {
                action: "waiting for servers to disappear",
                source,
            })?;
        match outcome {
            PollOutcome::Success(gone) => report.deleted = gone,
            PollOutcome::TimedOut => {
                let remaining = self.still_listed(&servers).await?;
                for server in servers {
                    let handle = server.handle();
                    if report.failures.iter().any(|failure| failure.server == handle) {
                        continue;
                    }
                    if remaining.contains(&handle.id) {
                        report.residual.push(handle);
                    } else {
                        report.deleted.push(handle);
                    }
                }
                warn!(residual = report.residual.len(), "servers still present after teardown wait");
            }
        }
        Ok(report)
    }

    async fn still_listed(&self, servers: &[ServerDetails]) -> WorkflowResult<BTreeSet<String>, B> {
        let zones = servers
            .iter()
            .map(|server| server.zone.as_str())
            .collect::<BTreeSet<_>>();
        let mut remaining = BTreeSet::new();
        for zone in zones {
            let listed = self
                .backend
                .list_servers(zone)
                .await
                .map_err(|source| WorkflowError::Backend {
                    action: "listing servers",
                    source,
                })?;
            remaining.extend(listed.into_iter().map(|server| server.id));
        }
        Ok(remaining)
    }

    fn url_for(&self, address: IpAddr) -> String {
        let host = SocketAddr::new(address, self.http_port);
        if self.http_port == DEFAULT_HTTP_PORT {
            format!("http://{}/", host.ip())
        } else {
            format!("http://{host}/")
        }
    }
}

async fn await_policy<C, T, E>(
    poller: Poller<C>,
    input: T,
    action: &'static str,
) -> Result<Option<T>, WorkflowError<E>>
where
    C: Condition<T, Error = ConditionError<E>>,
    E: std::error::Error + 'static,
{
    poller
        .wait(input)
        .await
        .map(PollOutcome::into_success)
        .map_err(|source| WorkflowError::Condition { action, source })
}

fn public_ip<E>(server: &ServerDetails) -> Result<IpAddr, WorkflowError<E>>
where
    E: std::error::Error + 'static,
{
    server.public_ip.ok_or_else(|| WorkflowError::NotFound {
        what: format!("public IP address for server {}", server.id),
        hint: String::from("Enable a public IPv4 address in the project."),
    })
}

fn join_ids(handles: &[ServerHandle]) -> String {
    handles
        .iter()
        .map(|handle| handle.id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
