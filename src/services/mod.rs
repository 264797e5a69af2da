//! Storage access and the workflows built on it.

pub mod archiver;
pub mod azure_copy;
pub mod blob_store;
pub mod container_store;
pub mod lister;
pub mod marker;

#[cfg(test)]
pub(crate) mod testing;
