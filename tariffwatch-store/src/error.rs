//! Store error types.

use std::path::PathBuf;

use tariffwatch_fetch::PersistError;
use thiserror::Error;

/// Errors that can occur in the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No config entry exists yet.
    #[error("Not configured: {} does not exist (run `tariffwatch login` first)", .0.display())]
    NotConfigured(PathBuf),

    /// An update cycle is already fetching.
    #[error("Refresh already in progress")]
    RefreshInProgress,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<StoreError> for PersistError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io(e) => PersistError::Io(e),
            StoreError::Serialization(e) => PersistError::Serialization(e),
            other => PersistError::Storage(other.to_string()),
        }
    }
}
