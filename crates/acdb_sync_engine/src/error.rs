//! Error types for the sync engine.

use acdb_storage::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Recoverable conditions (empty pages, duplicate pages, results that are
/// not published yet) never surface here; parsers and adapters absorb them.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The registry or engine setup is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The dataset is not declared in the registry.
    #[error("unknown dataset: {0}")]
    UnknownDataset(String),

    /// A network call failed or returned a non-success status.
    #[error("transport error for {dataset} at {request}: {message}")]
    Transport {
        /// Dataset being synced.
        dataset: String,
        /// Request that failed.
        request: String,
        /// Error message.
        message: String,
    },

    /// The remote returned something the parser rejects.
    #[error("unexpected payload for {dataset} at {request}: {message}")]
    Payload {
        /// Dataset being synced.
        dataset: String,
        /// Request whose payload was rejected.
        request: String,
        /// Parser message.
        message: String,
    },

    /// The operator-supplied base snapshot is too old.
    #[error("base snapshot of {dataset} is stale: last epoch {last_epoch} is {age_secs}s old")]
    StaleBaseSnapshot {
        /// Dataset owning the snapshot.
        dataset: String,
        /// Last ordering value in the snapshot.
        last_epoch: i64,
        /// Age of that value relative to now.
        age_secs: i64,
    },

    /// The declared base snapshot file does not exist.
    #[error("base snapshot of {dataset} not found at {}; place it there before syncing", path.display())]
    MissingBaseSnapshot {
        /// Dataset owning the snapshot.
        dataset: String,
        /// Expected location.
        path: PathBuf,
    },

    /// Cache or state store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a transport error.
    pub fn transport(
        dataset: impl Into<String>,
        request: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            dataset: dataset.into(),
            request: request.to_string(),
            message: message.into(),
        }
    }

    /// Creates a payload error.
    pub fn payload(
        dataset: impl Into<String>,
        request: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self::Payload {
            dataset: dataset.into(),
            request: request.to_string(),
            message: message.into(),
        }
    }

    /// Dataset named by the error, if any.
    pub fn dataset(&self) -> Option<&str> {
        match self {
            SyncError::UnknownDataset(d) => Some(d),
            SyncError::Transport { dataset, .. }
            | SyncError::Payload { dataset, .. }
            | SyncError::StaleBaseSnapshot { dataset, .. }
            | SyncError::MissingBaseSnapshot { dataset, .. } => Some(dataset),
            SyncError::Config(_) | SyncError::Store(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_name_dataset_and_step() {
        let err = SyncError::transport("contests", "contests/main:https://x?page=3", "HTTP 503");
        assert_eq!(err.dataset(), Some("contests"));
        let text = err.to_string();
        assert!(text.contains("contests/main:https://x?page=3"));
        assert!(text.contains("HTTP 503"));

        assert_eq!(SyncError::config("bad").dataset(), None);
    }

    #[test]
    fn stale_snapshot_display() {
        let err = SyncError::StaleBaseSnapshot {
            dataset: "submissions".into(),
            last_epoch: 1_000,
            age_secs: 900_000,
        };
        assert!(err.to_string().contains("900000s"));
    }
}
