//! Maps each subcommand onto its handler.
//!
//! ## Commands
//! - `archive`: move blobs between virtual directories, then drop the source marker
//! - `copy`:    copy blobs between virtual directories
//! - `list`:    list blobs under a prefix
//! - `mark`:    create an arrival marker blob
//!
//! The store is opened here, once per run, for exactly the containers the
//! command names.

use crate::{
    config::{AppConfig, Backend, Command},
    errors::ConfigError,
    handlers::{archive_handlers, blob_handlers},
    services::{blob_store::BlobStore, container_store::ContainerStore},
};
use anyhow::Result;
use std::{process::ExitCode, sync::Arc};

/// Open the store for `command` and run it.
pub async fn dispatch(cfg: &AppConfig, command: Command) -> Result<ExitCode> {
    let store = open_store(cfg, &command)?;
    match command {
        Command::Archive(args) => archive_handlers::archive(cfg, store, args).await,
        Command::Copy(args) => archive_handlers::copy(cfg, store, args).await,
        Command::List(args) => blob_handlers::list(store.as_ref(), args).await,
        Command::Mark(args) => blob_handlers::mark(store.as_ref(), args).await,
    }
}

pub fn open_store(cfg: &AppConfig, command: &Command) -> Result<Arc<dyn BlobStore>, ConfigError> {
    let containers = command.containers();
    let store = match (cfg.backend, &cfg.account) {
        (Backend::Azure, Some(account)) => ContainerStore::azure(account, containers)?,
        (Backend::Azure, None) => return Err(ConfigError::MissingCredential),
        (Backend::Memory, _) => {
            tracing::warn!(
                "using the in-memory backend: containers start empty and nothing is read from or written to Azure"
            );
            ContainerStore::in_memory(containers)?
        }
    };
    Ok(Arc::new(store))
}
