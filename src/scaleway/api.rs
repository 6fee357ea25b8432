//! Direct Instance API calls for endpoints the SDK does not cover.
//!
//! Requests carry the secret key in `X-Auth-Token`; non-2xx responses are
//! surfaced with the provider's response body as the error message.

use std::collections::BTreeMap;
use std::future::Future;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::backend::{
    Flavor, SecurityGroupHandle, SecurityGroupRequest, ServerDetails, ServerRequest,
    ServerStatus, SnapshotDetails, SnapshotRequest, SnapshotStatus, VolumeSummary,
};

use super::{ScalewayBackend, ScalewayBackendError};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const INSTANCE_API_BASE: &str = "https://api.scaleway.com/instance/v1";
const PAGE_SIZE: usize = 100;

/// Reserved user-data key consumed by cloud-init on first boot.
pub(super) const CLOUD_INIT_USER_DATA_KEY: &str = "cloud-init";

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

pub(super) fn zone_url(zone: &str, path: &str) -> String {
    format!("{INSTANCE_API_BASE}/zones/{zone}/{path}")
}

/// Requests pages `1, 2, ...` until one comes back shorter than
/// `page_size`, concatenating the results in order.
pub(super) async fn collect_pages<T, E, F, Fut>(
    page_size: usize,
    mut fetch_page: F,
) -> Result<Vec<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    let mut collected = Vec::new();
    let mut page: u32 = 1;
    loop {
        let batch = fetch_page(page).await?;
        let short = batch.len() < page_size;
        collected.extend(batch);
        if short {
            return Ok(collected);
        }
        page = page.saturating_add(1);
    }
}

#[derive(Serialize)]
struct CreateServerBody<'a> {
    name: &'a str,
    commercial_type: &'a str,
    image: &'a str,
    project: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization: Option<&'a str>,
    routed_ip_enabled: bool,
    dynamic_ip_required: bool,
    tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    security_group: Option<&'a str>,
    stopped: bool,
}

#[derive(Serialize)]
struct CreateSecurityGroupBody<'a> {
    name: &'a str,
    project: &'a str,
    stateful: bool,
    inbound_default_policy: &'a str,
    outbound_default_policy: &'a str,
}

#[derive(Serialize)]
pub(super) struct SecurityGroupRuleBody {
    pub(super) protocol: &'static str,
    pub(super) direction: &'static str,
    pub(super) action: &'static str,
    pub(super) ip_range: &'static str,
    pub(super) dest_port_from: u16,
}

impl SecurityGroupRuleBody {
    /// Accepts inbound TCP traffic on `port` from any address.
    pub(super) const fn open_tcp(port: u16) -> Self {
        Self {
            protocol: "TCP",
            direction: "inbound",
            action: "accept",
            ip_range: "0.0.0.0/0",
            dest_port_from: port,
        }
    }
}

#[derive(Serialize)]
pub(super) struct CreateSnapshotBody<'a> {
    name: &'a str,
    volume_id: &'a str,
    project: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerEnvelope {
    pub(super) server: ServerRecord,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerList {
    pub(super) servers: Vec<ServerRecord>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerRecord {
    pub(super) id: String,
    pub(super) name: String,
    pub(super) state: String,
    #[serde(default)]
    pub(super) allowed_actions: Vec<String>,
    pub(super) public_ip: Option<PublicIpRecord>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PublicIpRecord {
    pub(super) address: String,
}

impl ServerRecord {
    pub(super) fn into_details(self, zone: &str) -> ServerDetails {
        ServerDetails {
            status: ServerStatus::from_provider(&self.state),
            public_ip: self
                .public_ip
                .and_then(|ip| IpAddr::from_str(&ip.address).ok()),
            id: self.id,
            name: self.name,
            zone: zone.to_owned(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct SecurityGroupEnvelope {
    pub(super) security_group: SecurityGroupRecord,
}

#[derive(Debug, Deserialize)]
pub(super) struct SecurityGroupList {
    pub(super) security_groups: Vec<SecurityGroupRecord>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SecurityGroupRecord {
    pub(super) id: String,
    pub(super) name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProductCatalogue {
    pub(super) servers: BTreeMap<String, ProductRecord>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProductRecord {
    pub(super) ram: u64,
    pub(super) ncpus: u32,
}

impl ProductCatalogue {
    pub(super) fn into_flavors(self) -> Vec<Flavor> {
        self.servers
            .into_iter()
            .map(|(name, product)| Flavor {
                name,
                ram_bytes: product.ram,
                vcpus: product.ncpus,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct VolumeList {
    pub(super) volumes: Vec<VolumeRecord>,
}

#[derive(Debug, Deserialize)]
pub(super) struct VolumeRecord {
    pub(super) id: String,
    pub(super) name: String,
    pub(super) size: u64,
    pub(super) zone: String,
}

impl From<VolumeRecord> for VolumeSummary {
    fn from(value: VolumeRecord) -> Self {
        Self {
            id: value.id,
            name: value.name,
            zone: value.zone,
            size_bytes: value.size,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct SnapshotEnvelope {
    pub(super) snapshot: SnapshotRecord,
}

#[derive(Debug, Deserialize)]
pub(super) struct SnapshotList {
    pub(super) snapshots: Vec<SnapshotRecord>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SnapshotRecord {
    pub(super) id: String,
    pub(super) name: String,
    pub(super) state: String,
    pub(super) zone: String,
    pub(super) base_volume: Option<BaseVolumeRecord>,
}

#[derive(Debug, Deserialize)]
pub(super) struct BaseVolumeRecord {
    pub(super) id: String,
}

impl From<SnapshotRecord> for SnapshotDetails {
    fn from(value: SnapshotRecord) -> Self {
        Self {
            status: SnapshotStatus::from_provider(&value.state),
            id: value.id,
            name: value.name,
            zone: value.zone,
            volume_id: value.base_volume.map(|volume| volume.id),
        }
    }
}

impl ScalewayBackend {
    async fn execute(
        &self,
        request: RequestBuilder,
    ) -> Result<(StatusCode, Vec<u8>), ScalewayBackendError> {
        let response = request
            .header("X-Auth-Token", &self.config.secret_key)
            .send()
            .await
            .map_err(ScalewayBackendError::provider)?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(ScalewayBackendError::provider)?;
        Ok((status, body.to_vec()))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ScalewayBackendError> {
        let (status, body) = self.execute(request).await?;
        if status.is_success() {
            return serde_json::from_slice(&body).map_err(ScalewayBackendError::provider);
        }
        Err(ScalewayBackendError::Provider {
            message: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    /// Creates a server in the stopped state so user-data can be attached
    /// before its first boot.
    pub(super) async fn create_server_stopped(
        &self,
        request: &ServerRequest,
        image_id: &str,
    ) -> Result<ServerRecord, ScalewayBackendError> {
        let body = CreateServerBody {
            name: &request.name,
            commercial_type: &request.instance_type,
            image: image_id,
            project: &request.project_id,
            organization: request.organisation_id.as_deref(),
            routed_ip_enabled: true,
            dynamic_ip_required: true,
            tags: &request.tags,
            security_group: request.security_group.as_deref(),
            stopped: true,
        };
        let (status, payload) = self
            .execute(
                HTTP_CLIENT
                    .post(zone_url(&request.zone, "servers"))
                    .json(&body),
            )
            .await?;

        if status.is_success() {
            let parsed: ServerEnvelope =
                serde_json::from_slice(&payload).map_err(ScalewayBackendError::provider)?;
            return Ok(parsed.server);
        }

        if let Ok(api_err) = serde_json::from_slice::<scaleway_rs::ScalewayApiError>(&payload)
            && Self::is_instance_type_error(&api_err, request)
        {
            return Err(ScalewayBackendError::InstanceTypeUnavailable {
                instance_type: request.instance_type.clone(),
                zone: request.zone.clone(),
            });
        }
        Err(ScalewayBackendError::Provider {
            message: String::from_utf8_lossy(&payload).into_owned(),
        })
    }

    fn is_instance_type_error(
        api_err: &scaleway_rs::ScalewayApiError,
        request: &ServerRequest,
    ) -> bool {
        matches!(api_err.resource.as_deref(), Some("commercial_type"))
            || api_err
                .resource_id
                .as_deref()
                .is_some_and(|id| id == request.instance_type)
            || (api_err.etype == "invalid_arguments"
                && api_err
                    .message
                    .to_ascii_lowercase()
                    .contains("commercial_type"))
    }

    /// Stores `script` under the cloud-init user-data key of a server.
    pub(super) async fn put_user_data(
        &self,
        zone: &str,
        server_id: &str,
        script: &str,
    ) -> Result<(), ScalewayBackendError> {
        let url = zone_url(
            zone,
            &format!("servers/{server_id}/user_data/{CLOUD_INIT_USER_DATA_KEY}"),
        );
        let (status, payload) = self
            .execute(
                HTTP_CLIENT
                    .patch(url)
                    .header("Content-Type", "text/plain")
                    .body(script.to_owned()),
            )
            .await?;
        if status.is_success() {
            return Ok(());
        }
        Err(ScalewayBackendError::Provider {
            message: String::from_utf8_lossy(&payload).into_owned(),
        })
    }

    /// Builds a project-scoped listing request for one page of `path`.
    fn project_page(&self, zone: &str, path: &str, page: u32) -> RequestBuilder {
        HTTP_CLIENT.get(zone_url(zone, path)).query(&[
            ("project", self.config.default_project_id.clone()),
            ("per_page", PAGE_SIZE.to_string()),
            ("page", page.to_string()),
        ])
    }

    pub(super) async fn fetch_servers(
        &self,
        zone: &str,
    ) -> Result<Vec<ServerRecord>, ScalewayBackendError> {
        collect_pages(PAGE_SIZE, |page| async move {
            let list: ServerList = self
                .send_json(self.project_page(zone, "servers", page))
                .await?;
            Ok::<_, ScalewayBackendError>(list.servers)
        })
        .await
    }

    pub(super) async fn fetch_flavors(&self, zone: &str) -> Result<Vec<Flavor>, ScalewayBackendError> {
        let catalogue: ProductCatalogue = self
            .send_json(
                HTTP_CLIENT
                    .get(zone_url(zone, "products/servers"))
                    .query(&[("per_page", PAGE_SIZE.to_string())]),
            )
            .await?;
        Ok(catalogue.into_flavors())
    }

    pub(super) async fn fetch_volumes(
        &self,
        zone: &str,
    ) -> Result<Vec<VolumeSummary>, ScalewayBackendError> {
        let volumes = collect_pages(PAGE_SIZE, |page| async move {
            let list: VolumeList = self
                .send_json(self.project_page(zone, "volumes", page))
                .await?;
            Ok::<_, ScalewayBackendError>(list.volumes)
        })
        .await?;
        Ok(volumes.into_iter().map(VolumeSummary::from).collect())
    }

    pub(super) async fn post_snapshot(
        &self,
        request: &SnapshotRequest,
    ) -> Result<SnapshotDetails, ScalewayBackendError> {
        let body = snapshot_body(request);
        let envelope: SnapshotEnvelope = self
            .send_json(
                HTTP_CLIENT
                    .post(zone_url(&request.zone, "snapshots"))
                    .json(&body),
            )
            .await?;
        Ok(envelope.snapshot.into())
    }

    pub(super) async fn fetch_snapshot(
        &self,
        zone: &str,
        snapshot_id: &str,
    ) -> Result<Option<SnapshotDetails>, ScalewayBackendError> {
        let (status, payload) = self
            .execute(HTTP_CLIENT.get(zone_url(zone, &format!("snapshots/{snapshot_id}"))))
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ScalewayBackendError::Provider {
                message: String::from_utf8_lossy(&payload).into_owned(),
            });
        }
        let envelope: SnapshotEnvelope =
            serde_json::from_slice(&payload).map_err(ScalewayBackendError::provider)?;
        Ok(Some(envelope.snapshot.into()))
    }

    pub(super) async fn fetch_snapshots(
        &self,
        zone: &str,
    ) -> Result<Vec<SnapshotDetails>, ScalewayBackendError> {
        let snapshots = collect_pages(PAGE_SIZE, |page| async move {
            let list: SnapshotList = self
                .send_json(self.project_page(zone, "snapshots", page))
                .await?;
            Ok::<_, ScalewayBackendError>(list.snapshots)
        })
        .await?;
        Ok(snapshots.into_iter().map(SnapshotDetails::from).collect())
    }

    /// Creates a security group that drops inbound traffic except on the
    /// requested TCP ports.
    pub(super) async fn post_security_group(
        &self,
        request: &SecurityGroupRequest,
    ) -> Result<SecurityGroupHandle, ScalewayBackendError> {
        let body = CreateSecurityGroupBody {
            name: &request.name,
            project: &request.project_id,
            stateful: true,
            inbound_default_policy: "drop",
            outbound_default_policy: "accept",
        };
        let envelope: SecurityGroupEnvelope = self
            .send_json(
                HTTP_CLIENT
                    .post(zone_url(&request.zone, "security_groups"))
                    .json(&body),
            )
            .await?;
        let group_id = envelope.security_group.id;

        let rules_url = zone_url(&request.zone, &format!("security_groups/{group_id}/rules"));
        for port in &request.inbound_ports {
            let (status, payload) = self
                .execute(
                    HTTP_CLIENT
                        .post(&rules_url)
                        .json(&SecurityGroupRuleBody::open_tcp(*port)),
                )
                .await?;
            if !status.is_success() {
                return Err(ScalewayBackendError::Provider {
                    message: String::from_utf8_lossy(&payload).into_owned(),
                });
            }
        }

        Ok(SecurityGroupHandle {
            id: group_id,
            zone: request.zone.clone(),
        })
    }

    pub(super) async fn fetch_security_group(
        &self,
        zone: &str,
        name: &str,
    ) -> Result<Option<SecurityGroupHandle>, ScalewayBackendError> {
        let groups = collect_pages(PAGE_SIZE, |page| async move {
            let list: SecurityGroupList = self
                .send_json(
                    self.project_page(zone, "security_groups", page)
                        .query(&[("name", name)]),
                )
                .await?;
            Ok::<_, ScalewayBackendError>(list.security_groups)
        })
        .await?;
        Ok(find_named_group(groups, name).map(|id| SecurityGroupHandle {
            id,
            zone: zone.to_owned(),
        }))
    }

    pub(super) async fn remove_security_group(
        &self,
        handle: &SecurityGroupHandle,
    ) -> Result<(), ScalewayBackendError> {
        let url = zone_url(&handle.zone, &format!("security_groups/{}", handle.id));
        let (status, payload) = self.execute(HTTP_CLIENT.delete(url)).await?;
        if status.is_success() {
            return Ok(());
        }
        Err(ScalewayBackendError::Provider {
            message: String::from_utf8_lossy(&payload).into_owned(),
        })
    }
}

/// Snapshots carry no description field, so the description becomes a tag.
pub(super) fn snapshot_body(request: &SnapshotRequest) -> CreateSnapshotBody<'_> {
    CreateSnapshotBody {
        name: &request.name,
        volume_id: &request.volume_id,
        project: &request.project_id,
        tags: request.description.iter().cloned().collect(),
    }
}

/// The listing filter matches on substrings, so only an exact name counts.
pub(super) fn find_named_group(groups: Vec<SecurityGroupRecord>, name: &str) -> Option<String> {
    groups
        .into_iter()
        .find(|group| group.name == name)
        .map(|group| group.id)
}
