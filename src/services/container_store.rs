//! src/services/container_store.rs
//!
//! `BlobStore` on top of the `object_store` crate. One store is opened per
//! container named on the command line; Azure containers share the account
//! credentials parsed from the connection string, while the in-memory
//! backend gives every container its own `InMemory` store.
//!
//! Azure copies go through [`ServerSideCopy`] for every container pair. The
//! in-memory backend copies within a container natively and relays the
//! payload between containers.
//!
//! Blob URLs are `{endpoint}/{container}/{name}` with each path segment
//! percent-encoded, the same shape the storage account itself serves.

use crate::{
    config::ConnectionString,
    errors::{ConfigError, StoreError, StoreResult},
    models::blob::{BlobHandle, BlobRef},
    services::{
        azure_copy::{AzureCopy, ServerSideCopy},
        blob_store::BlobStore,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{
    StreamExt, TryStreamExt, future,
    stream::{self, BoxStream},
};
use object_store::{ObjectStore, PutMode, PutPayload, memory::InMemory, path::Path};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;
use url::Url;

const MEMORY_ENDPOINT: &str = "memory://local/";

#[derive(Debug)]
pub struct ContainerStore {
    /// Account-level blob endpoint; container and blob name are appended as path segments.
    endpoint: Url,
    containers: HashMap<String, Arc<dyn ObjectStore>>,
    /// Copies that never read the payload; `None` relays between containers.
    server_copy: Option<Arc<dyn ServerSideCopy>>,
    /// Set for backends whose delete succeeds on a missing object.
    head_before_delete: bool,
}

impl ContainerStore {
    /// Open Azure Blob Storage containers with the account described by `account`.
    ///
    /// No request is sent here; credentials are only exercised by the first call.
    pub fn azure<'c>(
        account: &ConnectionString,
        containers: impl IntoIterator<Item = &'c str>,
    ) -> Result<Self, ConfigError> {
        let endpoint = account.blob_endpoint()?;
        let mut stores: HashMap<String, Arc<dyn ObjectStore>> = HashMap::new();
        for container in containers {
            if stores.contains_key(container) {
                continue;
            }
            let store = account
                .azure_builder()
                .with_container_name(container)
                .build()
                .map_err(|err| ConfigError::InvalidConnectionString(err.to_string()))?;
            debug!(container, "opened azure container");
            stores.insert(container.to_string(), Arc::new(store));
        }
        let server_copy = AzureCopy::new(account)?;
        Ok(Self {
            endpoint,
            containers: stores,
            server_copy: None,
            head_before_delete: false,
        }
        .with_server_copy(Arc::new(server_copy)))
    }

    /// Empty in-process containers for offline runs and tests. Nothing is
    /// read from a real account, so every container starts out empty.
    pub fn in_memory<'c>(
        containers: impl IntoIterator<Item = &'c str>,
    ) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(MEMORY_ENDPOINT)
            .map_err(|err| ConfigError::InvalidConnectionString(err.to_string()))?;
        let containers = containers
            .into_iter()
            .map(|name| {
                let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
                (name.to_string(), store)
            })
            .collect();
        Ok(Self {
            endpoint,
            containers,
            server_copy: None,
            head_before_delete: true,
        })
    }

    /// Route every copy through `server_copy` instead of the object stores.
    pub fn with_server_copy(mut self, server_copy: Arc<dyn ServerSideCopy>) -> Self {
        self.server_copy = Some(server_copy);
        self
    }

    fn store_for(&self, container: &str) -> StoreResult<&Arc<dyn ObjectStore>> {
        self.containers
            .get(container)
            .ok_or_else(|| StoreError::UnknownContainer(container.to_string()))
    }

    fn blob_url(&self, container: &str, name: &str) -> StoreResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.endpoint.to_string()))?
            .pop_if_empty()
            .push(container)
            .extend(name.split('/'));
        Ok(url)
    }

    /// Split a blob URL issued by this store back into (container, name).
    pub(crate) fn locate(&self, url: &Url) -> StoreResult<(String, String)> {
        let foreign = || StoreError::ForeignUrl(url.to_string());
        if url.scheme() != self.endpoint.scheme()
            || url.host_str() != self.endpoint.host_str()
            || url.port_or_known_default() != self.endpoint.port_or_known_default()
        {
            return Err(foreign());
        }

        let base: Vec<&str> = self
            .endpoint
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let segments: Vec<&str> = url
            .path_segments()
            .ok_or_else(|| StoreError::InvalidUrl(url.to_string()))?
            .collect();
        if segments.len() < base.len() + 2 || segments[..base.len()] != base[..] {
            return Err(foreign());
        }

        let decode = |segment: &str| {
            urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .map_err(|_| StoreError::InvalidUrl(url.to_string()))
        };
        let container = decode(segments[base.len()])?;
        let name = segments[base.len() + 1..]
            .iter()
            .map(|s| decode(s))
            .collect::<StoreResult<Vec<_>>>()?
            .join("/");
        Ok((container, name))
    }
}

/// Validate a blob name and convert it to an object store location.
///
/// Leading and trailing separators are not significant to the store.
fn object_path(name: &str) -> StoreResult<Path> {
    if name.trim_matches('/').is_empty() {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
            reason: "name is empty".into(),
        });
    }
    Path::parse(name).map_err(|err| StoreError::InvalidName {
        name: name.to_string(),
        reason: err.to_string(),
    })
}

/// Deepest directory that contains every name starting with `prefix`.
///
/// The object store lists by directory; the string-prefix match is applied
/// on top of that listing.
fn listing_root(prefix: &str) -> StoreResult<Option<Path>> {
    match prefix.rfind('/') {
        Some(pos) if pos > 0 => object_path(&prefix[..pos]).map(Some),
        _ => Ok(None),
    }
}

#[async_trait]
impl BlobStore for ContainerStore {
    fn list_objects<'a>(
        &'a self,
        container: &'a str,
        name_prefix: &'a str,
    ) -> BoxStream<'a, StoreResult<BlobRef>> {
        let wanted = name_prefix.trim_start_matches('/');
        let (store, root) = match self
            .store_for(container)
            .and_then(|store| Ok((store, listing_root(wanted)?)))
        {
            Ok(found) => found,
            Err(err) => return stream::once(future::ready(Err(err))).boxed(),
        };

        store
            .list(root.as_ref())
            .map_err(StoreError::from)
            .try_filter_map(move |meta| {
                let name = meta.location.to_string();
                let blob = if name.starts_with(wanted) {
                    self.blob_url(container, &name).map(|url| {
                        Some(BlobRef {
                            container: container.to_string(),
                            name,
                            url,
                        })
                    })
                } else {
                    Ok(None)
                };
                future::ready(blob)
            })
            .boxed()
    }

    fn blob_handle(&self, container: &str, name: &str) -> StoreResult<BlobHandle> {
        self.store_for(container)?;
        object_path(name)?;
        Ok(BlobHandle {
            container: container.to_string(),
            name: name.to_string(),
            url: self.blob_url(container, name)?,
        })
    }

    async fn copy_from_url(&self, destination: &BlobHandle, source_url: &Url) -> StoreResult<()> {
        let (source_container, source_name) = self.locate(source_url)?;
        let from = object_path(&source_name)?;
        let to = object_path(&destination.name)?;
        let target = self.store_for(&destination.container)?;

        if let Some(server_copy) = &self.server_copy {
            return server_copy.copy_blob(destination, source_url).await;
        }
        if source_container == destination.container {
            target.copy(&from, &to).await?;
            return Ok(());
        }

        // Each in-memory container is its own object store.
        let payload = self
            .store_for(&source_container)?
            .get(&from)
            .await?
            .bytes()
            .await?;
        target.put(&to, PutPayload::from(payload)).await?;
        Ok(())
    }

    async fn delete(&self, handle: &BlobHandle) -> StoreResult<()> {
        let location = object_path(&handle.name)?;
        let store = self.store_for(&handle.container)?;
        if self.head_before_delete {
            store.head(&location).await?;
        }
        store.delete(&location).await?;
        Ok(())
    }

    async fn exists(&self, handle: &BlobHandle) -> StoreResult<bool> {
        let location = object_path(&handle.name)?;
        match self.store_for(&handle.container)?.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn upload(&self, handle: &BlobHandle, data: Bytes) -> StoreResult<bool> {
        let location = object_path(&handle.name)?;
        let store = self.store_for(&handle.container)?;
        match store
            .put_opts(&location, PutPayload::from(data), PutMode::Create.into())
            .await
        {
            Ok(_) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
