//! Command-line interface definitions for the `cloudwait` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `cloudwait` binary.
#[derive(Debug, Parser)]
#[command(
    name = "cloudwait",
    about = "Provision Scaleway resources and wait until they are ready",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Log filter: a level such as `debug`, or `tracing` directives.
    #[arg(long, global = true, value_name = "FILTER")]
    pub(crate) log_filter: Option<String>,
    /// Operation to run.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Operations offered by `cloudwait`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Create servers and wait until they all run.
    #[command(name = "create-server")]
    CreateServer(CreateServerCommand),
    /// Create a server and publish a web page on it.
    #[command(name = "publish")]
    Publish(PublishCommand),
    /// Delete every server whose name starts with a prefix.
    #[command(name = "delete-servers")]
    DeleteServers(DeleteServersCommand),
    /// Snapshot a volume and wait until the snapshot is available.
    #[command(name = "create-snapshot")]
    CreateSnapshot(CreateSnapshotCommand),
    /// List snapshots per zone.
    #[command(name = "list-snapshots")]
    ListSnapshots(ListSnapshotsCommand),
    /// List the objects in a bucket.
    #[command(name = "list-objects")]
    ListObjects(ListObjectsCommand),
    /// Launch or destroy a LAMP server.
    #[command(name = "lamp", subcommand)]
    Lamp(LampCommand),
}

/// Arguments for `cloudwait create-server`.
#[derive(Debug, Args)]
pub(crate) struct CreateServerCommand {
    /// Server name; batches are suffixed `-1`, `-2`, and so on.
    #[arg(long, default_value = "cloudwait-server")]
    pub(crate) name: String,
    /// Number of servers to create.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub(crate) count: u32,
}

/// Arguments for `cloudwait publish`.
#[derive(Debug, Args)]
pub(crate) struct PublishCommand {
    /// Server name.
    #[arg(long, default_value = "cloudwait-publish")]
    pub(crate) name: String,
    /// Text served as the index page.
    #[arg(long, default_value = "Hello Cloud Servers")]
    pub(crate) page: String,
}

/// Arguments for `cloudwait delete-servers`.
#[derive(Debug, Args)]
pub(crate) struct DeleteServersCommand {
    /// Name prefix selecting the servers to delete; must not be empty.
    #[arg(
        long,
        default_value = "cloudwait-",
        value_parser = clap::builder::NonEmptyStringValueParser::new()
    )]
    pub(crate) prefix: String,
}

/// Arguments for `cloudwait create-snapshot`.
#[derive(Debug, Args)]
pub(crate) struct CreateSnapshotCommand {
    /// Name prefix of the volume to snapshot; the first match is used.
    #[arg(long, default_value = "cloudwait-volume")]
    pub(crate) volume_prefix: String,
    /// Snapshot name.
    #[arg(long, default_value = "cloudwait-snapshot")]
    pub(crate) name: String,
}

/// Arguments for `cloudwait list-snapshots`.
#[derive(Debug, Args)]
pub(crate) struct ListSnapshotsCommand {
    /// Zone to list; repeat for several. Defaults to the configured zone.
    #[arg(long = "zone", value_name = "ZONE")]
    pub(crate) zones: Vec<String>,
}

/// Arguments for `cloudwait list-objects`.
#[derive(Debug, Args)]
pub(crate) struct ListObjectsCommand {
    /// Bucket to list.
    #[arg(
        long,
        default_value = "cloudwait-example",
        value_parser = clap::builder::NonEmptyStringValueParser::new()
    )]
    pub(crate) bucket: String,
    /// Only list keys starting with this prefix.
    #[arg(long, default_value = "")]
    pub(crate) prefix: String,
}

/// LAMP server operations.
#[derive(Debug, Subcommand)]
pub(crate) enum LampCommand {
    /// Launch a LAMP server behind its own security group and wait for SSH
    /// and HTTP.
    Create {
        /// Server name.
        name: String,
    },
    /// Delete the LAMP server with this name and its security group.
    Destroy {
        /// Server name.
        name: String,
    },
}
