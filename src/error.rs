use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by knowledge graph operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// A persisted line failed shape or invariant validation on load.
    #[error("Malformed record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// Caller input failed validation; nothing was read or written.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Entity '{0}' does not exist")]
    EntityNotFound(String),

    #[error("Storage unavailable at {}: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MemoryError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StorageUnavailable {
            path: path.into(),
            source,
        }
    }

    /// True for errors caused by the request itself rather than the store.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::EntityNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
