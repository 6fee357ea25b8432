//! Scaleway implementation of [`ComputeBackend`].

mod api;
mod error;
mod image;

use scaleway_rs::ScalewayApi;
use tracing::{debug, info};

use crate::backend::{
    BackendFuture, ComputeBackend, Flavor, SecurityGroupHandle, SecurityGroupRequest,
    ServerDetails, ServerHandle, ServerRequest, ServerStatus, SnapshotDetails, SnapshotHandle,
    SnapshotRequest, VolumeSummary,
};
use crate::config::ScalewayConfig;

pub use error::ScalewayBackendError;

const POWER_ON_ACTION: &str = "poweron";

/// Backend that talks to the Scaleway Instances API.
#[derive(Clone)]
pub struct ScalewayBackend {
    api: ScalewayApi,
    config: ScalewayConfig,
}

impl ScalewayBackend {
    /// Constructs a new backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayBackendError::Config`] when the provided configuration
    /// fails validation.
    pub fn new(config: ScalewayConfig) -> Result<Self, ScalewayBackendError> {
        config.validate()?;
        Ok(Self {
            api: ScalewayApi::new(&config.secret_key),
            config,
        })
    }

    /// Returns the configuration the backend was built with.
    #[must_use]
    pub const fn config(&self) -> &ScalewayConfig {
        &self.config
    }

    async fn power_on_if_needed(
        &self,
        zone: &str,
        server: &api::ServerRecord,
    ) -> Result<(), ScalewayBackendError> {
        if server.state == "running" {
            return Ok(());
        }

        if server
            .allowed_actions
            .iter()
            .any(|action| action == POWER_ON_ACTION)
        {
            self.api
                .perform_instance_action_async(zone, &server.id, POWER_ON_ACTION)
                .await?;
            return Ok(());
        }

        Err(ScalewayBackendError::PowerOnNotAllowed {
            server_id: server.id.clone(),
            state: server.state.clone(),
        })
    }
}

impl ComputeBackend for ScalewayBackend {
    type Error = ScalewayBackendError;

    fn create_server<'a>(
        &'a self,
        request: &'a ServerRequest,
    ) -> BackendFuture<'a, ServerHandle, Self::Error> {
        Box::pin(async move {
            request.validate()?;
            let image_id = self.resolve_image_id(request).await?;
            let server = self.create_server_stopped(request, &image_id).await?;
            debug!(server_id = %server.id, image_id = %image_id, "server created stopped");

            if let Some(script) = &request.user_data {
                self.put_user_data(&request.zone, &server.id, script).await?;
            }
            self.power_on_if_needed(&request.zone, &server).await?;
            info!(server_id = %server.id, name = %request.name, zone = %request.zone, "server powering on");

            Ok(ServerHandle {
                id: server.id,
                zone: request.zone.clone(),
            })
        })
    }

    fn get_server<'a>(
        &'a self,
        handle: &'a ServerHandle,
    ) -> BackendFuture<'a, Option<ServerDetails>, Self::Error> {
        Box::pin(async move {
            let mut servers = self
                .api
                .list_instances(&handle.zone)
                .servers(&handle.id)
                .per_page(1)
                .run_async()
                .await?;

            Ok(servers
                .pop()
                .filter(|server| server.id == handle.id)
                .map(|server| ServerDetails {
                    id: server.id,
                    name: server.name,
                    zone: handle.zone.clone(),
                    status: ServerStatus::from_provider(&server.state),
                    public_ip: server
                        .public_ip
                        .and_then(|ip| ip.address.parse().ok()),
                }))
        })
    }

    fn list_servers<'a>(
        &'a self,
        zone: &'a str,
    ) -> BackendFuture<'a, Vec<ServerDetails>, Self::Error> {
        Box::pin(async move {
            let servers = self.fetch_servers(zone).await?;
            Ok(servers
                .into_iter()
                .map(|server| server.into_details(zone))
                .collect())
        })
    }

    fn delete_server<'a>(
        &'a self,
        handle: &'a ServerHandle,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.api
                .delete_instance_async(&handle.zone, &handle.id)
                .await?;
            Ok(())
        })
    }

    fn list_flavors<'a>(&'a self, zone: &'a str) -> BackendFuture<'a, Vec<Flavor>, Self::Error> {
        Box::pin(async move { self.fetch_flavors(zone).await })
    }

    fn list_volumes<'a>(
        &'a self,
        zone: &'a str,
    ) -> BackendFuture<'a, Vec<VolumeSummary>, Self::Error> {
        Box::pin(async move { self.fetch_volumes(zone).await })
    }

    fn create_snapshot<'a>(
        &'a self,
        request: &'a SnapshotRequest,
    ) -> BackendFuture<'a, SnapshotHandle, Self::Error> {
        Box::pin(async move {
            let snapshot = self.post_snapshot(request).await?;
            Ok(snapshot.handle())
        })
    }

    fn get_snapshot<'a>(
        &'a self,
        handle: &'a SnapshotHandle,
    ) -> BackendFuture<'a, Option<SnapshotDetails>, Self::Error> {
        Box::pin(async move { self.fetch_snapshot(&handle.zone, &handle.id).await })
    }

    fn list_snapshots<'a>(
        &'a self,
        zone: &'a str,
    ) -> BackendFuture<'a, Vec<SnapshotDetails>, Self::Error> {
        Box::pin(async move { self.fetch_snapshots(zone).await })
    }

    fn create_security_group<'a>(
        &'a self,
        request: &'a SecurityGroupRequest,
    ) -> BackendFuture<'a, SecurityGroupHandle, Self::Error> {
        Box::pin(async move {
            let handle = self.post_security_group(request).await?;
            info!(
                security_group_id = %handle.id,
                name = %request.name,
                ports = ?request.inbound_ports,
                "security group created"
            );
            Ok(handle)
        })
    }

    fn find_security_group<'a>(
        &'a self,
        zone: &'a str,
        name: &'a str,
    ) -> BackendFuture<'a, Option<SecurityGroupHandle>, Self::Error> {
        Box::pin(async move { self.fetch_security_group(zone, name).await })
    }

    fn delete_security_group<'a>(
        &'a self,
        handle: &'a SecurityGroupHandle,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move { self.remove_security_group(handle).await })
    }
}
