//! src/services/blob_store.rs
//!
//! The storage primitives every command is built from. Implementations must
//! be safe to share between concurrently running transfer tasks.

use crate::{
    errors::StoreResult,
    models::blob::{BlobHandle, BlobRef},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::fmt::Debug;
use url::Url;

#[async_trait]
pub trait BlobStore: Debug + Send + Sync + 'static {
    /// Lazily list every blob in `container` whose name starts with
    /// `name_prefix`. This is a plain string prefix, not a path prefix.
    fn list_objects<'a>(
        &'a self,
        container: &'a str,
        name_prefix: &'a str,
    ) -> BoxStream<'a, StoreResult<BlobRef>>;

    /// Resolve the handle of a blob, whether or not it exists.
    fn blob_handle(&self, container: &str, name: &str) -> StoreResult<BlobHandle>;

    /// Server-side copy of the blob at `source_url` onto `destination`.
    async fn copy_from_url(&self, destination: &BlobHandle, source_url: &Url) -> StoreResult<()>;

    async fn delete(&self, handle: &BlobHandle) -> StoreResult<()>;

    async fn exists(&self, handle: &BlobHandle) -> StoreResult<bool>;

    /// Create the blob with `data`. Returns `false` without writing when the
    /// blob already exists.
    async fn upload(&self, handle: &BlobHandle, data: Bytes) -> StoreResult<bool>;
}
