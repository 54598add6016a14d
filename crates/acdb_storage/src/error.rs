//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A persisted table could not be encoded or decoded.
    #[error("table codec error: {0}")]
    Table(#[from] acdb_table::TableError),

    /// A cached table file is unreadable.
    #[error("cache file corrupted at {}: {message}", path.display())]
    Corrupted {
        /// File that failed to decode.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// The sync state could not be serialized.
    #[error("state encoding failed: {0}")]
    StateEncoding(String),
}

impl StoreError {
    /// Creates a corrupted-file error.
    pub fn corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corrupted {
            path: path.into(),
            message: message.into(),
        }
    }
}
