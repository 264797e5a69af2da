//! Arrival markers: small blobs whose existence signals that a drop is complete.

use crate::{errors::StoreResult, services::blob_store::BlobStore};
use bytes::Bytes;
use tracing::{debug, info};

/// Create `path` in `container` with `content` unless it already exists.
///
/// Returns whether the marker was created. There is no locking: this is
/// meant for a single writer. A writer racing past the existence check
/// still cannot overwrite, the upload is create-only.
pub async fn ensure_marker(
    store: &dyn BlobStore,
    container: &str,
    path: &str,
    content: impl Into<Bytes>,
) -> StoreResult<bool> {
    let handle = store.blob_handle(container, path)?;
    if store.exists(&handle).await? {
        debug!(container, path, "marker already exists");
        return Ok(false);
    }

    let created = store.upload(&handle, content.into()).await?;
    if created {
        info!(container, path, url = %handle.url, "created marker");
    } else {
        debug!(container, path, "marker appeared concurrently");
    }
    Ok(created)
}
