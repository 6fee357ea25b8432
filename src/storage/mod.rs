//! Object listing against S3-compatible storage.
//!
//! [`ObjectStorage`] mirrors [`crate::backend::ComputeBackend`]: the
//! workflows only see boxed futures, and [`ScalewayObjectStorage`] signs
//! requests against Scaleway Object Storage with the `SCW_*` keys.

mod scaleway;

use thiserror::Error;

use crate::backend::BackendFuture;
use crate::config::ConfigError;

pub use scaleway::{ScalewayObjectStorage, endpoint_for, region_for_zone};

/// An object stored in a bucket.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectSummary {
    /// Full object key.
    pub key: String,
    /// Object size in bytes.
    pub size_bytes: u64,
    /// Last modification time as reported by the provider (RFC 3339).
    pub last_modified: String,
}

/// Read access to a bucket store.
pub trait ObjectStorage {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists every object in `bucket` whose key starts with `prefix`.
    ///
    /// An empty prefix lists the whole bucket.
    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
    ) -> BackendFuture<'a, Vec<ObjectSummary>, Self::Error>;
}

/// Errors raised by [`ScalewayObjectStorage`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// Raised when the keys needed to sign requests are missing.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when the storage endpoint rejects a request.
    #[error("object storage request failed: {message}")]
    Provider {
        /// Provider supplied error message.
        message: String,
    },
}

impl StorageError {
    pub(crate) fn provider(err: impl std::fmt::Display) -> Self {
        Self::Provider {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests;
