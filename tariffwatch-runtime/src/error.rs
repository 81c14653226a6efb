//! Runtime error types.

use tariffwatch_engie::EngieError;
use tariffwatch_fetch::PersistError;
use tariffwatch_store::StoreError;
use thiserror::Error;

/// Errors raised while setting up or driving an integration.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Provider error.
    #[error(transparent)]
    Engie(#[from] EngieError),

    /// Store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Token storage could not be read.
    #[error("Token storage error: {0}")]
    Persist(#[from] PersistError),

    /// Invalid runtime configuration.
    #[error("Invalid runtime configuration: {0}")]
    Config(String),
}

impl RuntimeError {
    /// Returns true if only a new interactive login can recover.
    pub fn is_reauth_required(&self) -> bool {
        matches!(self, RuntimeError::Engie(e) if e.is_reauth_required())
    }
}
