//! Handlers for the `archive` and `copy` commands.
//! Both build an `ArchiveJob` from the command line, run it through the
//! `Archiver` and report the summary on stdout.

use crate::{
    config::{AppConfig, ArchiveArgs, TransferArgs},
    models::{
        job::{ArchiveJob, MarkerPolicy},
        summary::Summary,
    },
    services::{archiver::Archiver, blob_store::BlobStore},
};
use anyhow::Result;
use std::{process::ExitCode, sync::Arc};
use tracing::{debug, warn};

/// `archive`: move every blob under the source prefix, then drop the marker.
pub async fn archive(
    cfg: &AppConfig,
    store: Arc<dyn BlobStore>,
    args: ArchiveArgs,
) -> Result<ExitCode> {
    let policy = if args.keep_marker_on_failure {
        MarkerPolicy::OnlyIfClean
    } else {
        MarkerPolicy::Always
    };
    let archiver = Arc::new(build_archiver(cfg, store, &args.transfer)?.with_marker_policy(policy));
    let summary = archiver.archive().await?;

    println!(
        "Directory archive completed. Moved files from {}/{} to {}/{}/: {}",
        args.transfer.source_container,
        args.transfer.source_prefix,
        archiver.job().destination_container(),
        archiver.job().destination_prefix(),
        summary
    );
    Ok(exit_code(&summary, args.transfer.fail_on_error))
}

/// `copy`: copy every blob under the source prefix, leaving the source in place.
pub async fn copy(cfg: &AppConfig, store: Arc<dyn BlobStore>, args: TransferArgs) -> Result<ExitCode> {
    let archiver = Arc::new(build_archiver(cfg, store, &args)?);
    let summary = archiver.copy_all().await?;

    println!(
        "Copied files from {}/{} to {}/{}/: {}",
        args.source_container,
        args.source_prefix,
        archiver.job().destination_container(),
        archiver.job().destination_prefix(),
        summary
    );
    Ok(exit_code(&summary, args.fail_on_error))
}

fn build_archiver(
    cfg: &AppConfig,
    store: Arc<dyn BlobStore>,
    args: &TransferArgs,
) -> Result<Archiver> {
    let job = ArchiveJob::new(
        cfg.credential(),
        &args.source_container,
        &args.source_prefix,
        &args.destination_container,
        &args.destination_prefix,
    );
    let archiver = Archiver::new(job, store)?;
    let archiver = match args.workers {
        Some(workers) => archiver.with_pool_size(workers)?,
        None => archiver,
    };
    debug!(job = ?archiver.job(), workers = archiver.pool_size(), "prepared archiver");
    Ok(archiver)
}

/// Report failures individually; they only change the exit code when asked to.
fn exit_code(summary: &Summary, fail_on_error: bool) -> ExitCode {
    for failure in &summary.failures {
        if let Err(err) = &failure.outcome {
            warn!(blob = err.blob(), destination = %failure.destination, "{err}");
        }
    }
    if fail_on_error && !summary.is_clean() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
