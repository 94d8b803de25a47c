use std::path::PathBuf;

use thiserror::Error;

use super::fields::RawFieldMap;
use crate::models::CanonicalRecord;

/// Errors raised by a metadata gateway.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The metadata tool process could not be started.
    #[error("Failed to start metadata tool '{executable}': {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading from or writing to the tool process failed.
    #[error("Metadata tool I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The tool process closed its output or broke the request framing.
    #[error("Metadata tool protocol error: {0}")]
    Protocol(String),

    /// The tool reported an error for the request.
    #[error("Metadata tool error for {path}: {message}")]
    Tool { path: PathBuf, message: String },

    /// Tool output could not be parsed.
    #[error("Malformed metadata tool output: {0}")]
    Parse(#[source] serde_json::Error),

    /// The gateway was used after shutdown.
    #[error("Metadata tool has been shut down")]
    Closed,
}

/// Flags applied to a metadata write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Keep a copy of the original file before overwriting.
    pub backup: bool,
    /// Validate the write but do not touch the file.
    pub dry_run: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            backup: true,
            dry_run: false,
        }
    }
}

/// Access to file metadata through an external tool.
///
/// Implementations are driven from a single thread; calls are never issued
/// concurrently. This trait also lets the pipeline run against an in-memory
/// store in tests.
pub trait MetadataGateway {
    /// Reads every recognised alias field for a batch of files.
    ///
    /// When `validate` is set, each returned map carries the tool's
    /// validation summary. Files the tool cannot read are omitted.
    fn read_batch(
        &mut self,
        files: &[PathBuf],
        validate: bool,
    ) -> Result<Vec<RawFieldMap>, MetadataError>;

    /// Persists the record's identifier, status, description and keywords,
    /// leaving all other metadata untouched.
    fn write(&mut self, record: &CanonicalRecord, options: WriteOptions)
    -> Result<(), MetadataError>;

    /// Releases the underlying tool process. Safe to call more than once.
    fn shutdown(&mut self) -> Result<(), MetadataError>;
}
