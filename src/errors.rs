//! Error types shared by the storage, archive and configuration layers.
//!
//! Fatal errors (`ConfigError`, `ArchiveError`) stop a run before any object
//! is touched. Per-object errors (`MoveError`) and the final marker cleanup
//! (`MarkerDeleteError`) are collected into the run summary instead.

use thiserror::Error;

/// Startup configuration problems. Raised before any remote call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("STORAGE_CONNECTION_STRING is not set")]
    MissingCredential,
    #[error("`{0}` must not be empty")]
    EmptyField(&'static str),
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),
    #[error("worker pool size must be at least 1")]
    InvalidWorkers,
}

/// Failures reported by a [`BlobStore`](crate::services::blob_store::BlobStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("blob `{0}` not found")]
    NotFound(String),
    #[error("blob `{0}` already exists")]
    AlreadyExists(String),
    #[error("container `{0}` is not configured for this store")]
    UnknownContainer(String),
    #[error("invalid blob name `{name}`: {reason}")]
    InvalidName { name: String, reason: String },
    #[error("invalid blob url `{0}`")]
    InvalidUrl(String),
    #[error("url `{0}` does not belong to this storage account")]
    ForeignUrl(String),
    #[error("copy onto `{name}` ended with status {status}")]
    CopyNotCompleted { name: String, status: String },
    #[error(transparent)]
    Backend(object_store::Error),
    #[error(transparent)]
    Azure(azure_core::Error),
}

impl From<object_store::Error> for StoreError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StoreError::NotFound(path),
            object_store::Error::AlreadyExists { path, .. } => StoreError::AlreadyExists(path),
            other => StoreError::Backend(other),
        }
    }
}

impl From<azure_core::Error> for StoreError {
    fn from(err: azure_core::Error) -> Self {
        let not_found = matches!(
            err.kind(),
            azure_core::error::ErrorKind::HttpResponse { status, .. }
                if *status == azure_core::StatusCode::NotFound
        );
        if not_found {
            StoreError::NotFound(err.to_string())
        } else {
            StoreError::Azure(err)
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that abort a whole archive or copy run.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("listing source objects failed: {0}")]
    List(#[source] StoreError),
}

/// Outcome of a failed per-object transfer.
#[derive(Debug, Error)]
pub enum MoveError {
    /// The server-side copy did not complete; the object is still only at the source.
    #[error("copying `{blob}` to `{destination}` failed: {cause}")]
    Copy {
        blob: String,
        destination: String,
        #[source]
        cause: StoreError,
    },
    /// The copy succeeded but the source could not be removed, so the object
    /// now exists at both locations.
    #[error("deleting `{blob}` after copy failed, object is duplicated: {cause}")]
    Delete {
        blob: String,
        #[source]
        cause: StoreError,
    },
    #[error("transfer task for `{blob}` aborted: {reason}")]
    Aborted { blob: String, reason: String },
}

impl MoveError {
    pub fn blob(&self) -> &str {
        match self {
            MoveError::Copy { blob, .. }
            | MoveError::Delete { blob, .. }
            | MoveError::Aborted { blob, .. } => blob,
        }
    }
}

/// The marker object for the source prefix could not be removed.
#[derive(Debug, Error)]
#[error("deleting marker `{marker}` in container `{container}` failed: {cause}")]
pub struct MarkerDeleteError {
    pub container: String,
    pub marker: String,
    #[source]
    pub cause: StoreError,
}
