//! Addresses of individual blobs within a storage account.

use serde::Serialize;
use std::fmt;
use url::Url;

/// One listed object: the container it lives in, its full (prefixed) name
/// and the URL the storage account resolves it at.
///
/// Produced by the store's listing call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobRef {
    pub container: String,
    pub name: String,
    pub url: Url,
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.name)
    }
}

/// Handle to an addressable blob that may or may not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
    pub container: String,
    pub name: String,
    pub url: Url,
}

impl From<BlobRef> for BlobHandle {
    fn from(blob: BlobRef) -> Self {
        Self {
            container: blob.container,
            name: blob.name,
            url: blob.url,
        }
    }
}
