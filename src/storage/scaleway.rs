//! Scaleway Object Storage through its S3-compatible endpoint.

use s3::creds::Credentials;
use s3::serde_types::Object;
use s3::{Bucket, Region};
use tracing::debug;

use super::{ObjectStorage, ObjectSummary, StorageError};
use crate::backend::BackendFuture;
use crate::config::ScalewayConfig;

/// Storage regions are named after their zones without the trailing
/// number: `fr-par-1` lives in `fr-par`.
#[must_use]
pub fn region_for_zone(zone: &str) -> &str {
    zone.rsplit_once('-')
        .filter(|(_, suffix)| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
        .map_or(zone, |(region, _)| region)
}

/// S3 endpoint serving `region`.
#[must_use]
pub fn endpoint_for(region: &str) -> String {
    format!("https://s3.{region}.scw.cloud")
}

/// [`ObjectStorage`] backed by Scaleway Object Storage.
#[derive(Clone, Debug)]
pub struct ScalewayObjectStorage {
    region: Region,
    credentials: Credentials,
}

impl ScalewayObjectStorage {
    /// Builds a client for the region containing the configured zone.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Config`] when the access or secret key is
    /// missing.
    pub fn from_config(config: &ScalewayConfig) -> Result<Self, StorageError> {
        let (access_key, secret_key) = config.storage_keys()?;
        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(StorageError::provider)?;
        let region = region_for_zone(config.default_zone.trim());
        Ok(Self {
            region: Region::Custom {
                region: region.to_owned(),
                endpoint: endpoint_for(region),
            },
            credentials,
        })
    }

    /// Returns the region requests are sent to.
    #[must_use]
    pub const fn region(&self) -> &Region {
        &self.region
    }
}

impl From<Object> for ObjectSummary {
    fn from(value: Object) -> Self {
        Self {
            key: value.key,
            size_bytes: value.size,
            last_modified: value.last_modified,
        }
    }
}

impl ObjectStorage for ScalewayObjectStorage {
    type Error = StorageError;

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
    ) -> BackendFuture<'a, Vec<ObjectSummary>, Self::Error> {
        Box::pin(async move {
            let handle = Bucket::new(bucket, self.region.clone(), self.credentials.clone())
                .map_err(StorageError::provider)?;
            let pages = handle
                .list(prefix.to_owned(), None)
                .await
                .map_err(StorageError::provider)?;
            debug!(bucket, prefix, pages = pages.len(), "bucket listed");
            Ok(pages
                .into_iter()
                .flat_map(|page| page.contents)
                .map(ObjectSummary::from)
                .collect())
        })
    }
}
