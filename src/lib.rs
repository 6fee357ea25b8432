//! Core library for the cloudwait provisioning tool.
//!
//! The crate is built around an await-condition [`Poller`]: it applies a
//! [`Condition`] to a value repeatedly, at a fixed period, until the
//! condition holds, fails, or the policy's maximum wait elapses. On top of
//! it sit ready-made cloud conditions, a backend abstraction with a Scaleway
//! implementation, object storage listing, and the provisioning workflows the
//! binary exposes.

pub mod backend;
pub mod conditions;
pub mod config;
pub mod logging;
pub mod poll;
pub mod remote;
pub mod scaleway;
pub mod script;
pub mod storage;
pub mod test_support;
pub mod workflow;

pub use backend::{
    BackendError, ComputeBackend, Flavor, SecurityGroupHandle, SecurityGroupRequest,
    ServerDetails, ServerHandle, ServerRequest, ServerRequestBuilder, ServerStatus,
    SnapshotDetails, SnapshotHandle, SnapshotRequest, SnapshotStatus, VolumeSummary,
};
pub use conditions::{
    AllServersStatusIs, ConditionError, ServerStatusIs, ServersGone, SnapshotAvailable,
    TcpReachable,
};
pub use config::{ConfigError, ScalewayConfig, WaitConfig, WaitPolicies};
pub use poll::{Condition, PollError, PollOutcome, PollPolicy, Poller, condition_fn};
pub use remote::{
    CommandOutput, CommandRunner, ProcessCommandRunner, RemoteCommandOutput, RemoteError,
    RemoteShell, SshConfig, SshConfigLoadError,
};
pub use scaleway::{ScalewayBackend, ScalewayBackendError};
pub use script::ScriptBuilder;
pub use storage::{ObjectStorage, ObjectSummary, ScalewayObjectStorage, StorageError};
pub use workflow::{
    CleanupStep, LAMP_PORTS, ObjectListing, Provisioner, PublishedServer, ServerTemplate,
    TeardownFailure, TeardownReport, WorkflowError, ZoneSnapshots, list_objects,
};
