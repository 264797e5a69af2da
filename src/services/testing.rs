//! Test double wrapping the in-memory store: counts calls, records deletes
//! and fails chosen operations on demand.

use crate::{
    errors::{StoreError, StoreResult},
    models::blob::{BlobHandle, BlobRef},
    services::{blob_store::BlobStore, container_store::ContainerStore},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{
    StreamExt, TryStreamExt, future,
    stream::{self, BoxStream},
};
use parking_lot::Mutex;
use std::{
    collections::HashSet,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use url::Url;

#[derive(Debug)]
pub(crate) struct ScriptedStore {
    inner: ContainerStore,
    calls: AtomicUsize,
    copies: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_listing: AtomicBool,
    failing_copies: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    panicking_copies: Mutex<HashSet<String>>,
    deleted: Mutex<Vec<String>>,
}

fn injected(operation: &str) -> StoreError {
    StoreError::Backend(object_store::Error::Generic {
        store: "scripted",
        source: format!("injected {operation} failure").into(),
    })
}

impl ScriptedStore {
    pub(crate) fn new(inner: ContainerStore) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            copies: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            fail_listing: AtomicBool::new(false),
            failing_copies: Mutex::new(HashSet::new()),
            failing_deletes: Mutex::new(HashSet::new()),
            panicking_copies: Mutex::new(HashSet::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    /// Fail copies whose source blob is `name`.
    pub(crate) fn fail_copy(&self, name: &str) {
        self.failing_copies.lock().insert(name.to_string());
    }

    /// Panic inside copies whose source blob is `name`.
    pub(crate) fn panic_on_copy(&self, name: &str) {
        self.panicking_copies.lock().insert(name.to_string());
    }

    pub(crate) fn fail_delete(&self, name: &str) {
        self.failing_deletes.lock().insert(name.to_string());
    }

    pub(crate) fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn copies(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every attempted delete, sorted.
    pub(crate) fn deleted(&self) -> Vec<String> {
        let mut deleted = self.deleted.lock().clone();
        deleted.sort();
        deleted
    }

    /// Current blob names in `container`, sorted. Not counted as a call.
    pub(crate) async fn names(&self, container: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .list_objects(container, "")
            .map_ok(|blob| blob.name)
            .try_collect()
            .await
            .unwrap_or_default();
        names.sort();
        names
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for ScriptedStore {
    fn list_objects<'a>(
        &'a self,
        container: &'a str,
        name_prefix: &'a str,
    ) -> BoxStream<'a, StoreResult<BlobRef>> {
        self.record_call();
        if self.fail_listing.load(Ordering::SeqCst) {
            return stream::once(future::ready(Err(injected("list")))).boxed();
        }
        self.inner.list_objects(container, name_prefix)
    }

    fn blob_handle(&self, container: &str, name: &str) -> StoreResult<BlobHandle> {
        self.record_call();
        self.inner.blob_handle(container, name)
    }

    async fn copy_from_url(&self, destination: &BlobHandle, source_url: &Url) -> StoreResult<()> {
        self.record_call();
        self.copies.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        // Give sibling tasks a chance to overlap with this one.
        tokio::task::yield_now().await;
        let source = self.inner.locate(source_url).map(|(_, name)| name).ok();
        let panicking = source
            .as_ref()
            .is_some_and(|name| self.panicking_copies.lock().contains(name));
        if panicking {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            panic!("injected copy panic");
        }
        let failing = source
            .as_ref()
            .is_some_and(|name| self.failing_copies.lock().contains(name));
        let result = if failing {
            Err(injected("copy"))
        } else {
            self.inner.copy_from_url(destination, source_url).await
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn delete(&self, handle: &BlobHandle) -> StoreResult<()> {
        self.record_call();
        self.deleted.lock().push(handle.name.clone());
        let failing = self.failing_deletes.lock().contains(&handle.name);
        if failing {
            return Err(injected("delete"));
        }
        self.inner.delete(handle).await
    }

    async fn exists(&self, handle: &BlobHandle) -> StoreResult<bool> {
        self.record_call();
        self.inner.exists(handle).await
    }

    async fn upload(&self, handle: &BlobHandle, data: Bytes) -> StoreResult<bool> {
        self.record_call();
        self.inner.upload(handle, data).await
    }
}
