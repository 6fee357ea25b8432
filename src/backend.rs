//! Backend abstraction over the cloud provider calls the workflows need.

use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use thiserror::Error;

/// Parameters required to create a new server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerRequest {
    /// Server name shown by the provider.
    pub name: String,
    /// Human readable label used for the boot image. The backend resolves this
    /// to a provider specific image identifier.
    pub image_label: String,
    /// Commercial type or flavour to request (for example `DEV1-S`).
    pub instance_type: String,
    /// Target availability zone (for example `fr-par-1`).
    pub zone: String,
    /// Project identifier used for billing and ownership.
    pub project_id: String,
    /// Optional organisation identifier when the provider requires one.
    pub organisation_id: Option<String>,
    /// CPU architecture requested for the server.
    pub architecture: String,
    /// Script or cloud-config handed to the server on first boot.
    pub user_data: Option<String>,
    /// Tags attached to the server.
    pub tags: Vec<String>,
    /// Security group the server joins instead of the project default.
    pub security_group: Option<String>,
}

impl ServerRequest {
    /// Starts a builder for a [`ServerRequest`].
    #[must_use]
    pub fn builder() -> ServerRequestBuilder {
        ServerRequestBuilder::new()
    }

    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any required string field is
    /// empty.
    pub fn validate(&self) -> Result<(), BackendError> {
        let required = [
            ("name", &self.name),
            ("image_label", &self.image_label),
            ("instance_type", &self.instance_type),
            ("zone", &self.zone),
            ("project_id", &self.project_id),
            ("architecture", &self.architecture),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(BackendError::Validation(field.to_owned()));
            }
        }
        Ok(())
    }
}

/// Builder for [`ServerRequest`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServerRequestBuilder {
    name: String,
    image_label: String,
    instance_type: String,
    zone: String,
    project_id: String,
    organisation_id: Option<String>,
    architecture: String,
    user_data: Option<String>,
    tags: Vec<String>,
    security_group: Option<String>,
}

impl ServerRequestBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the image label.
    #[must_use]
    pub fn image_label(mut self, value: impl Into<String>) -> Self {
        self.image_label = value.into();
        self
    }

    /// Sets the instance type.
    #[must_use]
    pub fn instance_type(mut self, value: impl Into<String>) -> Self {
        self.instance_type = value.into();
        self
    }

    /// Sets the availability zone.
    #[must_use]
    pub fn zone(mut self, value: impl Into<String>) -> Self {
        self.zone = value.into();
        self
    }

    /// Sets the project identifier.
    #[must_use]
    pub fn project_id(mut self, value: impl Into<String>) -> Self {
        self.project_id = value.into();
        self
    }

    /// Sets the optional organisation identifier.
    #[must_use]
    pub fn organisation_id(mut self, value: Option<String>) -> Self {
        self.organisation_id = value;
        self
    }

    /// Sets the architecture.
    #[must_use]
    pub fn architecture(mut self, value: impl Into<String>) -> Self {
        self.architecture = value.into();
        self
    }

    /// Sets the first-boot user-data.
    #[must_use]
    pub fn user_data(mut self, value: Option<String>) -> Self {
        self.user_data = value;
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, value: impl Into<String>) -> Self {
        self.tags.push(value.into());
        self
    }

    /// Sets the security group identifier.
    #[must_use]
    pub fn security_group(mut self, value: Option<String>) -> Self {
        self.security_group = value;
        self
    }

    /// Builds and validates the [`ServerRequest`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any required field is empty.
    pub fn build(self) -> Result<ServerRequest, BackendError> {
        let request = ServerRequest {
            name: self.name.trim().to_owned(),
            image_label: self.image_label.trim().to_owned(),
            instance_type: self.instance_type.trim().to_owned(),
            zone: self.zone.trim().to_owned(),
            project_id: self.project_id.trim().to_owned(),
            organisation_id: self.organisation_id.map(|value| value.trim().to_owned()),
            architecture: self.architecture.trim().to_owned(),
            user_data: self.user_data,
            tags: self
                .tags
                .into_iter()
                .map(|tag| tag.trim().to_owned())
                .filter(|tag| !tag.is_empty())
                .collect(),
            security_group: self
                .security_group
                .map(|group| group.trim().to_owned())
                .filter(|group| !group.is_empty()),
        };
        request.validate()?;
        Ok(request)
    }
}

/// Handle identifying a server.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ServerHandle {
    /// Provider specific identifier for the server.
    pub id: String,
    /// Zone in which the server lives.
    pub zone: String,
}

/// Lifecycle status reported for a server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ServerStatus {
    /// Booting.
    Starting,
    /// Powered on; the equivalent of `ACTIVE`.
    Running,
    /// Shutting down.
    Stopping,
    /// Powered off.
    Stopped,
    /// Locked by the provider.
    Locked,
    /// Any state this crate does not model.
    Other(String),
}

impl ServerStatus {
    /// Maps a provider state string onto a status.
    #[must_use]
    pub fn from_provider(state: &str) -> Self {
        match state {
            "starting" => Self::Starting,
            "running" => Self::Running,
            "stopping" => Self::Stopping,
            "stopped" | "stopped in place" => Self::Stopped,
            "locked" => Self::Locked,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => f.write_str("starting"),
            Self::Running => f.write_str("running"),
            Self::Stopping => f.write_str("stopping"),
            Self::Stopped => f.write_str("stopped"),
            Self::Locked => f.write_str("locked"),
            Self::Other(state) => f.write_str(state),
        }
    }
}

/// Point-in-time view of a server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerDetails {
    /// Provider specific identifier.
    pub id: String,
    /// Server name.
    pub name: String,
    /// Zone in which the server lives.
    pub zone: String,
    /// Current lifecycle status.
    pub status: ServerStatus,
    /// Public IPv4 address once assigned.
    pub public_ip: Option<IpAddr>,
}

impl ServerDetails {
    /// Returns the handle for this server.
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            id: self.id.clone(),
            zone: self.zone.clone(),
        }
    }
}

/// Commercial server type offered in a zone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Flavor {
    /// Commercial type name (for example `DEV1-S`).
    pub name: String,
    /// Memory in bytes.
    pub ram_bytes: u64,
    /// Virtual CPU count.
    pub vcpus: u32,
}

/// Block volume summary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeSummary {
    /// Volume identifier.
    pub id: String,
    /// Volume name.
    pub name: String,
    /// Zone in which the volume lives.
    pub zone: String,
    /// Size in bytes.
    pub size_bytes: u64,
}

/// Parameters for snapshotting a volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SnapshotRequest {
    /// Snapshot name.
    pub name: String,
    /// Volume to snapshot.
    pub volume_id: String,
    /// Zone of the volume.
    pub zone: String,
    /// Project owning the snapshot.
    pub project_id: String,
    /// Free-form description, stored as a tag.
    pub description: Option<String>,
}

/// Handle identifying a snapshot.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SnapshotHandle {
    /// Provider specific identifier.
    pub id: String,
    /// Zone in which the snapshot lives.
    pub zone: String,
}

/// Lifecycle status reported for a snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SnapshotStatus {
    /// Still being taken.
    Creating,
    /// Ready for use.
    Available,
    /// Provider gave up on the snapshot.
    Failed,
    /// Any state this crate does not model.
    Other(String),
}

impl SnapshotStatus {
    /// Maps a provider state string onto a status.
    #[must_use]
    pub fn from_provider(state: &str) -> Self {
        match state {
            "snapshotting" | "creating" => Self::Creating,
            "available" => Self::Available,
            "error" | "invalid_data" => Self::Failed,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => f.write_str("creating"),
            Self::Available => f.write_str("available"),
            Self::Failed => f.write_str("failed"),
            Self::Other(state) => f.write_str(state),
        }
    }
}

/// Point-in-time view of a snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SnapshotDetails {
    /// Provider specific identifier.
    pub id: String,
    /// Snapshot name.
    pub name: String,
    /// Zone in which the snapshot lives.
    pub zone: String,
    /// Current lifecycle status.
    pub status: SnapshotStatus,
    /// Source volume, when the provider reports it.
    pub volume_id: Option<String>,
}

impl SnapshotDetails {
    /// Returns the handle for this snapshot.
    #[must_use]
    pub fn handle(&self) -> SnapshotHandle {
        SnapshotHandle {
            id: self.id.clone(),
            zone: self.zone.clone(),
        }
    }
}

/// Parameters for a security group that accepts inbound TCP on a set of
/// ports and drops everything else.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecurityGroupRequest {
    /// Group name; workflows reuse the server name.
    pub name: String,
    /// Zone the group is created in.
    pub zone: String,
    /// Project owning the group.
    pub project_id: String,
    /// TCP ports opened to any source address.
    pub inbound_ports: Vec<u16>,
}

/// Handle identifying a security group.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SecurityGroupHandle {
    /// Provider specific identifier.
    pub id: String,
    /// Zone in which the group lives.
    pub zone: String,
}

/// Errors raised by backend-neutral request validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum BackendError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Provider calls used by the workflows and conditions.
pub trait ComputeBackend {
    /// Provider specific error type returned by the backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates a server and returns its handle without waiting for it.
    fn create_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> BackendFuture<'a, ServerHandle, Self::Error>;

    /// Fetches a server, returning `None` once it no longer exists.
    fn get_server<'a>(
        &'a self,
        handle: &'a ServerHandle,
    ) -> BackendFuture<'a, Option<ServerDetails>, Self::Error>;

    /// Lists the servers in `zone`.
    fn list_servers<'a>(&'a self, zone: &'a str)
    -> BackendFuture<'a, Vec<ServerDetails>, Self::Error>;

    /// Requests deletion of a server; does not wait for it to disappear.
    fn delete_server<'a>(&'a self, handle: &'a ServerHandle) -> BackendFuture<'a, (), Self::Error>;

    /// Lists the server types offered in `zone`.
    fn list_flavors<'a>(&'a self, zone: &'a str) -> BackendFuture<'a, Vec<Flavor>, Self::Error>;

    /// Lists the block volumes in `zone`.
    fn list_volumes<'a>(
        &'a self,
        zone: &'a str,
    ) -> BackendFuture<'a, Vec<VolumeSummary>, Self::Error>;

    /// Starts a snapshot of a volume and returns its handle.
    fn create_snapshot<'a>(
        &'a self,
        request: &'a SnapshotRequest,
    ) -> BackendFuture<'a, SnapshotHandle, Self::Error>;

    /// Fetches a snapshot, returning `None` once it no longer exists.
    fn get_snapshot<'a>(
        &'a self,
        handle: &'a SnapshotHandle,
    ) -> BackendFuture<'a, Option<SnapshotDetails>, Self::Error>;

    /// Lists the snapshots in `zone`.
    fn list_snapshots<'a>(
        &'a self,
        zone: &'a str,
    ) -> BackendFuture<'a, Vec<SnapshotDetails>, Self::Error>;

    /// Creates a security group and authorises its inbound ports.
    fn create_security_group<'a>(
        &'a self,
        request: &'a SecurityGroupRequest,
    ) -> BackendFuture<'a, SecurityGroupHandle, Self::Error>;

    /// Finds the security group called `name` in `zone`.
    fn find_security_group<'a>(
        &'a self,
        zone: &'a str,
        name: &'a str,
    ) -> BackendFuture<'a, Option<SecurityGroupHandle>, Self::Error>;

    /// Deletes a security group; fails while servers still use it.
    fn delete_security_group<'a>(
        &'a self,
        handle: &'a SecurityGroupHandle,
    ) -> BackendFuture<'a, (), Self::Error>;
}
