//! Core error types for `Tariffwatch`.

use thiserror::Error;

/// Core error type for `Tariffwatch` operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The EAN matches neither the gas nor the electricity prefix.
    #[error("Unknown contract: EAN {ean} matches no known energy prefix")]
    UnknownContract {
        /// The offending EAN, as received.
        ean: String,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
