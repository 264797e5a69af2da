//! src/services/archiver.rs
//!
//! Archiver: moves (copy, then delete) every blob under a source prefix to a
//! destination prefix and finally removes the source marker object.
//!
//! Transfers run as independent tokio tasks, at most `pool_size` at a time.
//! Every task is joined before the marker is touched; a failed transfer is
//! recorded in the summary and never cancels its siblings. Only a failed
//! listing aborts the run, and it does so before any blob is touched.

use crate::{
    errors::{ArchiveError, ConfigError, MarkerDeleteError, MoveError, StoreError, StoreResult},
    models::{
        blob::{BlobHandle, BlobRef},
        job::{ArchiveJob, MarkerPolicy},
        summary::{MarkerOutcome, MoveResult, Summary},
    },
    services::blob_store::BlobStore,
};
use futures::{TryStreamExt, stream::BoxStream};
use std::{collections::HashMap, sync::Arc, time::Instant};
use tokio::task::{self, JoinError, JoinSet};
use tracing::{debug, info, instrument, warn};

/// Default number of concurrent transfers: a few more than the CPU count,
/// capped at 32.
pub fn default_pool_size() -> usize {
    (num_cpus::get() + 4).min(32)
}

/// Whether a transfer removes the source after copying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Move,
    Copy,
}

#[derive(Debug)]
pub struct Archiver {
    job: ArchiveJob,
    store: Arc<dyn BlobStore>,
    pool_size: usize,
    marker_policy: MarkerPolicy,
}

impl Archiver {
    /// Validate `job` and bind it to `store`. No remote call is made.
    pub fn new(job: ArchiveJob, store: Arc<dyn BlobStore>) -> Result<Self, ConfigError> {
        job.validate()?;
        Ok(Self {
            job,
            store,
            pool_size: default_pool_size(),
            marker_policy: MarkerPolicy::default(),
        })
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Result<Self, ConfigError> {
        if pool_size == 0 {
            return Err(ConfigError::InvalidWorkers);
        }
        self.pool_size = pool_size;
        Ok(self)
    }

    pub fn with_marker_policy(mut self, marker_policy: MarkerPolicy) -> Self {
        self.marker_policy = marker_policy;
        self
    }

    pub fn job(&self) -> &ArchiveJob {
        &self.job
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Lazily list the blobs under the source prefix. Each call starts a new listing.
    pub fn list_source_objects(&self) -> BoxStream<'_, StoreResult<BlobRef>> {
        self.store
            .list_objects(self.job.source_container(), self.job.source_prefix())
    }

    pub fn destination_name(&self, object_name: &str) -> String {
        destination_name(
            self.job.destination_prefix(),
            self.job.source_prefix(),
            object_name,
        )
    }

    /// Copy `blob` to its destination name, then delete it from the source.
    pub async fn move_one(&self, blob: BlobRef) -> MoveResult {
        self.transfer(blob, Transfer::Move).await
    }

    /// Move every source blob, wait for all of them, then delete the marker.
    #[instrument(skip(self), fields(job = ?self.job))]
    pub async fn archive(self: &Arc<Self>) -> Result<Summary, ArchiveError> {
        let started = Instant::now();
        let mut summary = Summary::from_results(self.run_pool(Transfer::Move).await?);

        summary.marker = match self.marker_policy {
            MarkerPolicy::OnlyIfClean if summary.failed > 0 => {
                warn!(
                    failed = summary.failed,
                    marker = self.job.marker_name(),
                    "keeping source marker because some moves failed"
                );
                MarkerOutcome::Skipped
            }
            _ => self.delete_marker().await,
        };
        summary.elapsed = started.elapsed();

        info!(
            listed = summary.total(),
            moved = summary.moved,
            failed = summary.failed,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "archive completed: moved {}/{} to {}/{}/",
            self.job.source_container(),
            self.job.source_prefix(),
            self.job.destination_container(),
            self.job.destination_prefix(),
        );
        Ok(summary)
    }

    /// Copy every source blob to the destination, leaving the source and its
    /// marker untouched.
    #[instrument(skip(self), fields(job = ?self.job))]
    pub async fn copy_all(self: &Arc<Self>) -> Result<Summary, ArchiveError> {
        let started = Instant::now();
        let mut summary = Summary::from_results(self.run_pool(Transfer::Copy).await?);
        summary.elapsed = started.elapsed();
        info!(
            copied = summary.moved,
            failed = summary.failed,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "copy completed"
        );
        Ok(summary)
    }

    /// List everything, then run one task per blob with at most `pool_size`
    /// in flight. Returns exactly one result per listed blob.
    async fn run_pool(self: &Arc<Self>, kind: Transfer) -> Result<Vec<MoveResult>, ArchiveError> {
        let blobs: Vec<BlobRef> = self
            .list_source_objects()
            .try_collect()
            .await
            .map_err(ArchiveError::List)?;
        debug!(count = blobs.len(), pool_size = self.pool_size, "dispatching transfers");

        let mut results = Vec::with_capacity(blobs.len());
        let mut in_flight: HashMap<task::Id, BlobRef> = HashMap::new();
        let mut join_set = JoinSet::new();

        for blob in blobs {
            while join_set.len() >= self.pool_size {
                if let Some(joined) = join_set.join_next_with_id().await {
                    results.extend(self.settle(joined, &mut in_flight));
                }
            }
            let this = Arc::clone(self);
            let owned = blob.clone();
            let handle = join_set.spawn(async move {
                match kind {
                    Transfer::Move => this.move_one(owned).await,
                    Transfer::Copy => this.transfer(owned, kind).await,
                }
            });
            in_flight.insert(handle.id(), blob);
        }

        while let Some(joined) = join_set.join_next_with_id().await {
            results.extend(self.settle(joined, &mut in_flight));
        }
        // Every blob still mapped here finished without a result.
        for (id, blob) in in_flight.drain() {
            warn!(blob = %blob, task = %id, "transfer task ended without a result");
            results.push(self.aborted(blob, format!("task {id} ended without a result")));
        }
        Ok(results)
    }

    /// Turn a joined task into its result. A panicked task still yields a
    /// failed result for the blob it was working on; a task id that was never
    /// dispatched yields nothing.
    fn settle(
        &self,
        joined: Result<(task::Id, MoveResult), JoinError>,
        in_flight: &mut HashMap<task::Id, BlobRef>,
    ) -> Option<MoveResult> {
        match joined {
            Ok((id, result)) => {
                in_flight.remove(&id);
                Some(result)
            }
            Err(err) => {
                let Some(blob) = in_flight.remove(&err.id()) else {
                    warn!(task = %err.id(), error = %err, "joined a transfer task that was never dispatched");
                    return None;
                };
                warn!(blob = %blob, error = %err, "transfer task aborted");
                Some(self.aborted(blob, err.to_string()))
            }
        }
    }

    fn aborted(&self, blob: BlobRef, reason: String) -> MoveResult {
        MoveResult {
            destination: self.destination_name(&blob.name),
            outcome: Err(MoveError::Aborted {
                blob: blob.name.clone(),
                reason,
            }),
            blob,
        }
    }

    async fn transfer(&self, blob: BlobRef, kind: Transfer) -> MoveResult {
        let destination = self.destination_name(&blob.name);
        let outcome = match self.copy_to_destination(&blob, &destination).await {
            Ok(()) if kind == Transfer::Move => self.delete_source(&blob).await,
            other => other,
        };
        match &outcome {
            Ok(()) => debug!(blob = %blob, destination = %destination, ?kind, "transferred"),
            Err(err) => warn!(blob = %blob, destination = %destination, error = %err, "transfer failed"),
        }
        MoveResult {
            blob,
            destination,
            outcome,
        }
    }

    async fn copy_to_destination(&self, blob: &BlobRef, destination: &str) -> Result<(), MoveError> {
        let copy_error = |cause: StoreError| MoveError::Copy {
            blob: blob.name.clone(),
            destination: destination.to_string(),
            cause,
        };
        let target = self
            .store
            .blob_handle(self.job.destination_container(), destination)
            .map_err(copy_error)?;
        self.store
            .copy_from_url(&target, &blob.url)
            .await
            .map_err(copy_error)
    }

    async fn delete_source(&self, blob: &BlobRef) -> Result<(), MoveError> {
        self.store
            .delete(&BlobHandle::from(blob.clone()))
            .await
            .map_err(|cause| MoveError::Delete {
                blob: blob.name.clone(),
                cause,
            })
    }

    async fn delete_marker(&self) -> MarkerOutcome {
        let container = self.job.source_container();
        let marker = self.job.marker_name();
        let deleted = match self.store.blob_handle(container, marker) {
            Ok(handle) => self.store.delete(&handle).await,
            Err(err) => Err(err),
        };
        match deleted {
            Ok(()) => {
                debug!(container, marker, "deleted source marker");
                MarkerOutcome::Deleted
            }
            Err(StoreError::NotFound(_)) => {
                debug!(container, marker, "no source marker to delete");
                MarkerOutcome::Missing
            }
            Err(cause) => {
                let err = MarkerDeleteError {
                    container: container.to_string(),
                    marker: marker.to_string(),
                    cause,
                };
                warn!(error = %err, "source marker cleanup failed");
                MarkerOutcome::Failed(err)
            }
        }
    }
}

/// Name a source blob is archived under.
///
/// `destination_prefix` loses its trailing `/`, then the first occurrence of
/// `source_prefix` anywhere in `object_name` is removed. This is a substring
/// replacement, not a strict prefix strip.
pub fn destination_name(destination_prefix: &str, source_prefix: &str, object_name: &str) -> String {
    format!(
        "{}/{}",
        destination_prefix.trim_end_matches('/'),
        object_name.replacen(source_prefix, "", 1)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{container_store::ContainerStore, testing::ScriptedStore};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = "databricks/file_arrival_trigger/source/";
    const DESTINATION: &str = "databricks/file_arrival_trigger/destination/";

    fn job() -> ArchiveJob {
        ArchiveJob::new("memory", "dropzone", SOURCE, "archive", DESTINATION)
    }

    async fn store_with(names: &[&str]) -> Arc<ScriptedStore> {
        let inner = ContainerStore::in_memory(["dropzone", "archive"]).unwrap();
        for name in names {
            let handle = inner.blob_handle("dropzone", name).unwrap();
            inner.upload(&handle, Bytes::from_static(b"payload")).await.unwrap();
        }
        Arc::new(ScriptedStore::new(inner))
    }

    fn archiver(store: &Arc<ScriptedStore>) -> Arc<Archiver> {
        let store: Arc<dyn BlobStore> = Arc::clone(store) as _;
        Arc::new(Archiver::new(job(), store).unwrap())
    }

    #[test]
    fn strips_first_occurrence_only() {
        assert_eq!(destination_name("b/", "a/", "a/sub/a/file.txt"), "b/sub/a/file.txt");
        assert_eq!(destination_name("b", "a/", "x/a/y.txt"), "b/x/y.txt");
        assert_eq!(
            destination_name("copied_recipes/", "recipes/", "recipes/cake.json"),
            "copied_recipes/cake.json"
        );
        assert_eq!(destination_name("b///", "zzz", "a.txt"), "b/a.txt");
    }

    #[test_log::test(tokio::test)]
    async fn moves_every_blob_and_deletes_marker() {
        let names = [
            "databricks/file_arrival_trigger/source",
            "databricks/file_arrival_trigger/source/a.csv",
            "databricks/file_arrival_trigger/source/nested/b.csv",
        ];
        let store = store_with(&names).await;
        let summary = archiver(&store).archive().await.unwrap();

        assert_eq!((summary.moved, summary.failed), (2, 0));
        assert!(matches!(summary.marker, MarkerOutcome::Deleted));
        assert_eq!(
            store.names("archive").await,
            vec![
                "databricks/file_arrival_trigger/destination/a.csv",
                "databricks/file_arrival_trigger/destination/nested/b.csv",
            ]
        );
        assert!(store.names("dropzone").await.is_empty());
        assert_eq!(
            store.deleted(),
            vec![
                "databricks/file_arrival_trigger/source",
                "databricks/file_arrival_trigger/source/a.csv",
                "databricks/file_arrival_trigger/source/nested/b.csv",
            ]
        );
    }

    #[tokio::test]
    async fn empty_source_still_attempts_marker_delete() {
        let store = store_with(&["unrelated/file.txt"]).await;
        let summary = archiver(&store).archive().await.unwrap();

        assert_eq!((summary.moved, summary.failed), (0, 0));
        assert_eq!(store.copies(), 0);
        assert_eq!(store.deleted(), vec!["databricks/file_arrival_trigger/source"]);
        assert!(matches!(summary.marker, MarkerOutcome::Missing), "{}", summary.marker);
        assert!(summary.is_clean());
    }

    #[tokio::test]
    async fn absent_marker_is_reported_missing_after_moves() {
        let store = store_with(&[&format!("{SOURCE}a.csv")]).await;
        let summary = archiver(&store).archive().await.unwrap();

        assert_eq!(summary.moved, 1);
        assert!(matches!(summary.marker, MarkerOutcome::Missing), "{}", summary.marker);
    }

    #[tokio::test]
    async fn leading_separator_in_source_prefix_is_stripped_from_destination() {
        let store = store_with(&["in/a.txt", "in/sub/b.txt"]).await;
        let store_dyn: Arc<dyn BlobStore> = Arc::clone(&store) as _;
        let job = ArchiveJob::new("memory", "dropzone", "/in/", "archive", "out/");
        let archiver = Arc::new(Archiver::new(job, store_dyn).unwrap());

        let summary = archiver.archive().await.unwrap();
        assert_eq!((summary.moved, summary.failed), (2, 0));
        assert_eq!(store.names("archive").await, vec!["out/a.txt", "out/sub/b.txt"]);
        assert!(store.names("dropzone").await.is_empty());
    }

    #[tokio::test]
    async fn panicking_transfer_is_recorded_as_aborted() {
        let names: Vec<String> = (0..6).map(|i| format!("{SOURCE}file-{i}.bin")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let store = store_with(&refs).await;
        store.panic_on_copy(&names[2]);

        let store_dyn: Arc<dyn BlobStore> = Arc::clone(&store) as _;
        let archiver = Arc::new(Archiver::new(job(), store_dyn).unwrap().with_pool_size(2).unwrap());
        let summary = archiver.archive().await.unwrap();

        assert_eq!(summary.total(), 6);
        assert_eq!((summary.moved, summary.failed), (5, 1));
        let failure = &summary.failures[0];
        assert_eq!(failure.blob.name, names[2]);
        assert_eq!(failure.destination, format!("{DESTINATION}file-2.bin"));
        assert!(
            matches!(&failure.outcome, Err(MoveError::Aborted { blob, .. }) if *blob == names[2]),
            "{:?}",
            failure.outcome
        );
    }

    #[tokio::test]
    async fn pool_smaller_than_batch_finishes_every_task() {
        let names: Vec<String> = (0..25).map(|i| format!("{SOURCE}file-{i:02}.bin")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let store = store_with(&refs).await;
        store.fail_copy(&format!("{SOURCE}file-07.bin"));

        let store_dyn: Arc<dyn BlobStore> = Arc::clone(&store) as _;
        let archiver = Arc::new(Archiver::new(job(), store_dyn).unwrap().with_pool_size(3).unwrap());
        let summary = archiver.archive().await.unwrap();

        assert_eq!(summary.total(), 25);
        assert_eq!((summary.moved, summary.failed), (24, 1));
        assert_eq!(store.copies(), 25);
        assert!(store.max_in_flight() <= 3, "{}", store.max_in_flight());
    }

    #[tokio::test]
    async fn delete_failure_after_copy_is_reported_as_duplicate() {
        let blob = format!("{SOURCE}keep.csv");
        let store = store_with(&[blob.as_str()]).await;
        store.fail_delete(&blob);

        let summary = archiver(&store).archive().await.unwrap();
        assert_eq!((summary.moved, summary.failed), (0, 1));
        let failure = &summary.failures[0];
        assert!(
            matches!(&failure.outcome, Err(MoveError::Delete { blob: b, .. }) if *b == blob),
            "{:?}",
            failure.outcome
        );
        // Both copies exist now.
        assert_eq!(store.names("dropzone").await, vec![blob.clone()]);
        assert_eq!(store.names("archive").await, vec![format!("{DESTINATION}keep.csv")]);
    }

    #[tokio::test]
    async fn copy_failure_leaves_source_in_place() {
        let blob = format!("{SOURCE}broken.csv");
        let store = store_with(&[blob.as_str()]).await;
        store.fail_copy(&blob);

        let summary = archiver(&store).archive().await.unwrap();
        assert!(matches!(summary.failures[0].outcome, Err(MoveError::Copy { .. })));
        assert_eq!(store.names("dropzone").await, vec![blob.clone()]);
        // Marker deletion still runs with the default policy.
        assert_eq!(store.deleted(), vec!["databricks/file_arrival_trigger/source"]);
    }

    #[tokio::test]
    async fn clean_only_policy_keeps_marker_after_failure() {
        let blob = format!("{SOURCE}broken.csv");
        let store = store_with(&["databricks/file_arrival_trigger/source", blob.as_str()]).await;
        store.fail_copy(&blob);

        let store_dyn: Arc<dyn BlobStore> = Arc::clone(&store) as _;
        let archiver = Arc::new(
            Archiver::new(job(), store_dyn)
                .unwrap()
                .with_marker_policy(MarkerPolicy::OnlyIfClean),
        );
        let summary = archiver.archive().await.unwrap();
        assert!(matches!(summary.marker, MarkerOutcome::Skipped));
        assert!(store.deleted().is_empty());
    }

    #[tokio::test]
    async fn marker_delete_failure_does_not_fail_the_run() {
        let marker = "databricks/file_arrival_trigger/source";
        let store = store_with(&[marker, &format!("{SOURCE}a.csv")]).await;
        store.fail_delete(marker);

        let summary = archiver(&store).archive().await.unwrap();
        assert_eq!(summary.moved, 1);
        assert!(matches!(summary.marker, MarkerOutcome::Failed(_)));
        assert!(!summary.is_clean());
    }

    #[tokio::test]
    async fn listing_failure_aborts_before_any_transfer() {
        let store = store_with(&[&format!("{SOURCE}a.csv")]).await;
        store.fail_listing();

        let err = archiver(&store).archive().await.unwrap_err();
        assert!(matches!(err, ArchiveError::List(_)));
        assert_eq!(store.copies(), 0);
        assert!(store.deleted().is_empty());
    }

    #[tokio::test]
    async fn copy_all_leaves_source_and_marker() {
        let marker = "databricks/file_arrival_trigger/source";
        let store = store_with(&[marker, &format!("{SOURCE}a.csv")]).await;

        let summary = archiver(&store).copy_all().await.unwrap();
        assert_eq!(summary.moved, 1);
        assert!(matches!(summary.marker, MarkerOutcome::NotApplicable));
        assert!(store.deleted().is_empty());
        assert_eq!(store.names("dropzone").await.len(), 2);
        assert_eq!(store.names("archive").await, vec![format!("{DESTINATION}a.csv")]);
    }

    #[tokio::test]
    async fn empty_job_fields_are_rejected_without_store_calls() {
        let store = store_with(&[]).await;
        let store_dyn: Arc<dyn BlobStore> = Arc::clone(&store) as _;

        let missing_credential = ArchiveJob::new("", "dropzone", SOURCE, "archive", DESTINATION);
        let err = Archiver::new(missing_credential, Arc::clone(&store_dyn)).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyField("connection_string")));

        let bare_separator = ArchiveJob::new("memory", "dropzone", "/", "archive", DESTINATION);
        let err = Archiver::new(bare_separator, store_dyn).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyField("source_prefix")));

        assert_eq!(store.calls(), 0);
    }

    #[test]
    fn zero_workers_is_invalid() {
        let store: Arc<dyn BlobStore> =
            Arc::new(ContainerStore::in_memory(["dropzone", "archive"]).unwrap());
        let err = Archiver::new(job(), store).unwrap().with_pool_size(0).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWorkers));
    }
}
