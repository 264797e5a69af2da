pub mod archive_handlers;
pub mod blob_handlers;
