//! Ready-made [`Condition`] implementations for cloud resources.
//!
//! Each condition performs one remote read per check and compares what it
//! sees with a target state. Provider failures surface as
//! [`ConditionError::Backend`] and abort the surrounding wait.

use std::collections::{BTreeSet, HashMap};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use crate::backend::{
    ComputeBackend, ServerDetails, ServerHandle, ServerStatus, SnapshotHandle, SnapshotStatus,
};
use crate::poll::{Condition, ConditionFuture};

/// Default per-attempt connect timeout for [`TcpReachable`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors raised while checking a condition.
#[derive(Debug, Error)]
pub enum ConditionError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the provider call behind the check fails.
    #[error("status check failed: {0}")]
    Backend(#[source] E),
    /// Raised when a server being watched no longer exists.
    #[error("server {server_id} disappeared while waiting for {expected}")]
    ServerMissing {
        /// Provider server identifier.
        server_id: String,
        /// Status the wait was expecting.
        expected: ServerStatus,
    },
    /// Raised when a snapshot being watched no longer exists.
    #[error("snapshot {snapshot_id} disappeared while waiting for it")]
    SnapshotMissing {
        /// Provider snapshot identifier.
        snapshot_id: String,
    },
    /// Raised when the provider reports the snapshot as failed.
    #[error("snapshot {snapshot_id} failed")]
    SnapshotFailed {
        /// Provider snapshot identifier.
        snapshot_id: String,
    },
}

/// True once a single server reports the target status.
#[derive(Debug)]
pub struct ServerStatusIs<'b, B> {
    backend: &'b B,
    status: ServerStatus,
}

impl<'b, B> ServerStatusIs<'b, B> {
    /// Watches servers through `backend` for `status`.
    #[must_use]
    pub const fn new(backend: &'b B, status: ServerStatus) -> Self {
        Self { backend, status }
    }
}

impl<B> Condition<ServerHandle> for ServerStatusIs<'_, B>
where
    B: ComputeBackend + Sync,
{
    type Error = ConditionError<B::Error>;

    fn check<'a>(&'a mut self, input: &'a ServerHandle) -> ConditionFuture<'a, Self::Error> {
        Box::pin(async move {
            let server = self
                .backend
                .get_server(input)
                .await
                .map_err(ConditionError::Backend)?
                .ok_or_else(|| ConditionError::ServerMissing {
                    server_id: input.id.clone(),
                    expected: self.status.clone(),
                })?;

            trace!(
                server_id = %input.id,
                expected = %self.status,
                current = %server.status,
                "looking for server status"
            );
            Ok(server.status == self.status)
        })
    }
}

/// True once every server in a batch reports the target status.
///
/// Servers are listed once per zone per check rather than fetched one by one.
#[derive(Debug)]
pub struct AllServersStatusIs<'b, B> {
    backend: &'b B,
    status: ServerStatus,
}

impl<'b, B> AllServersStatusIs<'b, B> {
    /// Watches batches of servers through `backend` for `status`.
    #[must_use]
    pub const fn new(backend: &'b B, status: ServerStatus) -> Self {
        Self { backend, status }
    }
}

impl<B> Condition<Vec<ServerHandle>> for AllServersStatusIs<'_, B>
where
    B: ComputeBackend + Sync,
{
    type Error = ConditionError<B::Error>;

    fn check<'a>(&'a mut self, input: &'a Vec<ServerHandle>) -> ConditionFuture<'a, Self::Error> {
        Box::pin(async move {
            let listed = list_by_id(self.backend, input).await?;

            let mut servers = Vec::with_capacity(input.len());
            for handle in input {
                let server =
                    listed
                        .get(&handle.id)
                        .ok_or_else(|| ConditionError::ServerMissing {
                            server_id: handle.id.clone(),
                            expected: self.status.clone(),
                        })?;
                servers.push(server);
            }

            for server in servers {
                trace!(
                    server_id = %server.id,
                    expected = %self.status,
                    current = %server.status,
                    "looking for server status"
                );
                if server.status != self.status {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }
}

/// True once none of the servers in a batch is listed any more.
#[derive(Debug)]
pub struct ServersGone<'b, B> {
    backend: &'b B,
}

impl<'b, B> ServersGone<'b, B> {
    /// Watches batches of servers through `backend` for disappearance.
    #[must_use]
    pub const fn new(backend: &'b B) -> Self {
        Self { backend }
    }
}

impl<B> Condition<Vec<ServerHandle>> for ServersGone<'_, B>
where
    B: ComputeBackend + Sync,
{
    type Error = ConditionError<B::Error>;

    fn check<'a>(&'a mut self, input: &'a Vec<ServerHandle>) -> ConditionFuture<'a, Self::Error> {
        Box::pin(async move {
            let listed = list_by_id(self.backend, input).await?;
            let remaining = input
                .iter()
                .filter(|handle| listed.contains_key(&handle.id))
                .count();
            trace!(remaining, "waiting for servers to disappear");
            Ok(remaining == 0)
        })
    }
}

async fn list_by_id<B>(
    backend: &B,
    handles: &[ServerHandle],
) -> Result<HashMap<String, ServerDetails>, ConditionError<B::Error>>
where
    B: ComputeBackend + Sync,
{
    let zones = handles
        .iter()
        .map(|handle| handle.zone.as_str())
        .collect::<BTreeSet<_>>();

    let mut listed = HashMap::new();
    for zone in zones {
        let servers = backend
            .list_servers(zone)
            .await
            .map_err(ConditionError::Backend)?;
        listed.extend(servers.into_iter().map(|server| (server.id.clone(), server)));
    }
    Ok(listed)
}

/// True once a snapshot reports [`SnapshotStatus::Available`].
#[derive(Debug)]
pub struct SnapshotAvailable<'b, B> {
    backend: &'b B,
}

impl<'b, B> SnapshotAvailable<'b, B> {
    /// Watches snapshots through `backend`.
    #[must_use]
    pub const fn new(backend: &'b B) -> Self {
        Self { backend }
    }
}

impl<B> Condition<SnapshotHandle> for SnapshotAvailable<'_, B>
where
    B: ComputeBackend + Sync,
{
    type Error = ConditionError<B::Error>;

    fn check<'a>(&'a mut self, input: &'a SnapshotHandle) -> ConditionFuture<'a, Self::Error> {
        Box::pin(async move {
            let snapshot = self
                .backend
                .get_snapshot(input)
                .await
                .map_err(ConditionError::Backend)?
                .ok_or_else(|| ConditionError::SnapshotMissing {
                    snapshot_id: input.id.clone(),
                })?;

            trace!(snapshot_id = %input.id, current = %snapshot.status, "looking for snapshot");
            match snapshot.status {
                SnapshotStatus::Available => Ok(true),
                SnapshotStatus::Failed => Err(ConditionError::SnapshotFailed {
                    snapshot_id: input.id.clone(),
                }),
                SnapshotStatus::Creating | SnapshotStatus::Other(_) => Ok(false),
            }
        })
    }
}

/// True once a TCP connection to the address succeeds.
///
/// Refused or timed-out connections count as "not yet", never as errors.
#[derive(Clone, Copy, Debug)]
pub struct TcpReachable {
    connect_timeout: Duration,
}

impl TcpReachable {
    /// Probes with [`DEFAULT_CONNECT_TIMEOUT`] per attempt.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_connect_timeout(DEFAULT_CONNECT_TIMEOUT)
    }

    /// Probes with a custom per-attempt connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpReachable {
    fn default() -> Self {
        Self::new()
    }
}

impl Condition<SocketAddr> for TcpReachable {
    type Error = Infallible;

    fn check<'a>(&'a mut self, input: &'a SocketAddr) -> ConditionFuture<'a, Self::Error> {
        Box::pin(async move {
            let connect = timeout(self.connect_timeout, TcpStream::connect(*input)).await;
            let reachable = matches!(connect, Ok(Ok(_)));
            trace!(address = %input, reachable, "probing tcp endpoint");
            Ok(reachable)
        })
    }
}

#[cfg(test)]
mod tests;
