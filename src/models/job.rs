//! Configuration of a single archive or copy run.

use crate::errors::ConfigError;
use std::fmt;

/// What to move and where.
///
/// Built once at startup and read-only for the lifetime of the run. The
/// source prefix is exposed without its leading `/` and the destination
/// prefix without its trailing `/`; the separator is re-added when
/// destination names are computed.
#[derive(Clone, PartialEq, Eq)]
pub struct ArchiveJob {
    connection_string: String,
    source_container: String,
    source_prefix: String,
    destination_container: String,
    destination_prefix: String,
}

impl ArchiveJob {
    pub fn new(
        connection_string: impl Into<String>,
        source_container: impl Into<String>,
        source_prefix: impl Into<String>,
        destination_container: impl Into<String>,
        destination_prefix: impl Into<String>,
    ) -> Self {
        Self {
            connection_string: connection_string.into(),
            source_container: source_container.into(),
            source_prefix: source_prefix.into(),
            destination_container: destination_container.into(),
            destination_prefix: destination_prefix.into(),
        }
    }

    /// Reject jobs with any empty field.
    ///
    /// A source prefix made only of separators is rejected too: its marker
    /// name would be empty and listing it would match the whole container.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("connection_string", &self.connection_string),
            ("source_container", &self.source_container),
            ("source_prefix", &self.source_prefix),
            ("destination_container", &self.destination_container),
            ("destination_prefix", &self.destination_prefix),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyField(field));
            }
        }
        if self.source_prefix.trim_matches('/').is_empty() {
            return Err(ConfigError::EmptyField("source_prefix"));
        }
        Ok(())
    }

    pub fn source_container(&self) -> &str {
        &self.source_container
    }

    /// Source prefix without leading separators. Blob names never start
    /// with `/`, so a leading one would keep the prefix from matching.
    pub fn source_prefix(&self) -> &str {
        self.source_prefix.trim_start_matches('/')
    }

    pub fn destination_container(&self) -> &str {
        &self.destination_container
    }

    /// Destination prefix with trailing separators removed.
    pub fn destination_prefix(&self) -> &str {
        self.destination_prefix.trim_end_matches('/')
    }

    /// Name of the placeholder object that stands for the source "directory".
    pub fn marker_name(&self) -> &str {
        self.source_prefix.trim_matches('/')
    }
}

// The connection string carries the account key; keep it out of logs.
impl fmt::Debug for ArchiveJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveJob")
            .field("connection_string", &"<redacted>")
            .field("source_container", &self.source_container)
            .field("source_prefix", &self.source_prefix)
            .field("destination_container", &self.destination_container)
            .field("destination_prefix", &self.destination_prefix())
            .finish()
    }
}

/// Whether the source marker is removed when some transfers failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MarkerPolicy {
    /// Delete the marker once every transfer has finished, successful or not.
    #[default]
    Always,
    /// Keep the marker when at least one transfer failed, so the source
    /// directory stays visible next to the objects left behind.
    OnlyIfClean,
}
