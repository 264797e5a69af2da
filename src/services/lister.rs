//! Prefix listing, straight through to the store.

use crate::{errors::StoreResult, models::blob::BlobRef, services::blob_store::BlobStore};
use futures::stream::BoxStream;

/// Lazily list the blobs in `container` whose names start with `prefix`.
///
/// Pagination is whatever the store's own listing does; nothing is buffered here.
pub fn list<'a>(
    store: &'a dyn BlobStore,
    container: &'a str,
    prefix: &'a str,
) -> BoxStream<'a, StoreResult<BlobRef>> {
    store.list_objects(container, prefix)
}
