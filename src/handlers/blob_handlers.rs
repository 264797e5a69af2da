//! Handlers for the `list` and `mark` commands.

use crate::{
    config::{ListArgs, MarkArgs},
    services::{blob_store::BlobStore, lister, marker},
};
use anyhow::{Context, Result};
use futures::TryStreamExt;
use std::{
    io::{self, Write},
    process::ExitCode,
};

/// `list`: print every blob under the prefix as it is listed.
pub async fn list(store: &dyn BlobStore, args: ListArgs) -> Result<ExitCode> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let count = write_listing(store, &args, &mut out).await?;
    tracing::debug!(count, container = %args.container, prefix = %args.prefix, "listed blobs");
    Ok(ExitCode::SUCCESS)
}

async fn write_listing(store: &dyn BlobStore, args: &ListArgs, out: &mut impl Write) -> Result<usize> {
    let mut blobs = lister::list(store, &args.container, &args.prefix);
    let mut count = 0;
    while let Some(blob) = blobs
        .try_next()
        .await
        .with_context(|| format!("listing {}/{}", args.container, args.prefix))?
    {
        if args.json {
            serde_json::to_writer(&mut *out, &blob)?;
            writeln!(out)?;
        } else {
            writeln!(out, "{}\t{}", blob.name, blob.url)?;
        }
        count += 1;
    }
    Ok(count)
}

/// `mark`: create the arrival marker unless it is already there.
pub async fn mark(store: &dyn BlobStore, args: MarkArgs) -> Result<ExitCode> {
    let path = args.marker_path();
    let created = marker::ensure_marker(store, &args.container, &path, args.content.clone())
        .await
        .with_context(|| format!("creating marker {}/{}", args.container, path))?;
    if created {
        println!("created {}/{}", args.container, path);
    } else {
        println!("{}/{} already exists", args.container, path);
    }
    Ok(ExitCode::SUCCESS)
}
