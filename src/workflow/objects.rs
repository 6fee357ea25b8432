//! Bucket listing.

use tracing::info;

use super::WorkflowError;
use crate::backend::BackendError;
use crate::storage::{ObjectStorage, ObjectSummary};

/// Objects found in a bucket, ordered by key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectListing {
    /// Bucket that was listed.
    pub bucket: String,
    /// Key prefix the listing was filtered by; empty for the whole bucket.
    pub prefix: String,
    /// Matching objects.
    pub objects: Vec<ObjectSummary>,
}

impl ObjectListing {
    /// Total size of the listed objects in bytes.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .iter()
            .map(|object| object.size_bytes)
            .fold(0, u64::saturating_add)
    }
}

/// Lists the objects in `bucket` whose keys start with `prefix`.
///
/// # Errors
///
/// Returns [`WorkflowError::Request`] for a blank bucket name and
/// [`WorkflowError::Backend`] when the listing request fails.
pub async fn list_objects<S>(
    storage: &S,
    bucket: &str,
    prefix: &str,
) -> Result<ObjectListing, WorkflowError<S::Error>>
where
    S: ObjectStorage + Sync,
{
    let bucket_name = bucket.trim();
    if bucket_name.is_empty() {
        return Err(BackendError::Validation(String::from("bucket")).into());
    }
    let mut objects = storage
        .list_objects(bucket_name, prefix)
        .await
        .map_err(|source| WorkflowError::Backend {
            action: "listing objects",
            source,
        })?;
    objects.sort_by(|left, right| left.key.cmp(&right.key));
    info!(bucket = bucket_name, prefix, count = objects.len(), "bucket listed");

    Ok(ObjectListing {
        bucket: bucket_name.to_owned(),
        prefix: prefix.to_owned(),
        objects,
    })
}
