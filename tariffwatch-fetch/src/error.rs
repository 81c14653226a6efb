//! Fetch-layer error types.

use thiserror::Error;

// ============================================================================
// HTTP Error
// ============================================================================

/// Failure of a single HTTP exchange.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Connection, TLS, or body failure.
    #[error("Transport error: {0}")]
    Transport(reqwest::Error),

    /// The client timeout elapsed.
    #[error("Request timed out")]
    Timeout,

    /// The URL's host is outside the client's allowlist.
    #[error("Host not allowed: {0}")]
    HostNotAllowed(String),

    /// The URL could not be parsed or has no host.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The underlying client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HttpError::Timeout
        } else {
            HttpError::Transport(err)
        }
    }
}

// ============================================================================
// Keychain Error
// ============================================================================

/// Failure of the platform secret store.
#[derive(Debug, Error)]
pub enum KeychainError {
    /// The secret store refused access (locked, or no permission).
    #[error("Keychain access denied: {0}")]
    AccessDenied(String),

    /// The platform backend failed.
    #[error("Keychain backend failure: {0}")]
    Backend(String),

    /// The blocking keychain call panicked or was cancelled.
    #[error("Keychain task failed: {0}")]
    Task(String),
}

impl From<keyring::Error> for KeychainError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::NoStorageAccess(e) => KeychainError::AccessDenied(e.to_string()),
            keyring::Error::PlatformFailure(e) => KeychainError::Backend(e.to_string()),
            other => KeychainError::Backend(other.to_string()),
        }
    }
}

// ============================================================================
// Persist Error
// ============================================================================

/// Error writing or reading durable token storage.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Keychain backend failed.
    #[error("Keychain error: {0}")]
    Keychain(#[from] KeychainError),

    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend-specific failure.
    #[error("Storage error: {0}")]
    Storage(String),
}
