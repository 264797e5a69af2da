//! Core data models for the blob archiver.
//!
//! These describe what a run works on (`BlobRef`, `ArchiveJob`) and what it
//! produces (`MoveResult`, `Summary`).

pub mod blob;
pub mod job;
pub mod summary;
