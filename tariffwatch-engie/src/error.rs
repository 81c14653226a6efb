//! ENGIE-specific error types.

use tariffwatch_core::CoreError;
use tariffwatch_fetch::PersistError;
use thiserror::Error;

/// Errors raised by the ENGIE session, fetcher, and classifier.
#[derive(Debug, Error)]
pub enum EngieError {
    /// Login failed: bad credentials, unexpected page, or transport failure.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The 2FA code was wrong, expired, or malformed. The user may retry.
    #[error("Invalid verification code: {0}")]
    InvalidCode(String),

    /// The refresh token is dead; the full login sequence must run again.
    #[error("Reauthentication required: {0}")]
    ReauthRequired(String),

    /// Rate limited by the provider.
    #[error("Rate limited, retry after {retry_after:?} seconds")]
    RateLimited {
        /// Seconds to wait, from `Retry-After`.
        retry_after: Option<u64>,
    },

    /// The API rejected the access token.
    #[error("Unauthorized (HTTP {status})")]
    Unauthorized {
        /// HTTP status (401 or 403).
        status: u16,
    },

    /// Malformed response, unexpected status, transport failure or timeout.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A contract's EAN carries no known energy prefix.
    #[error("Unknown contract: EAN {ean}")]
    UnknownContract {
        /// The offending EAN.
        ean: String,
    },

    /// Writing tokens to durable storage failed.
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    /// Invalid configuration (blank credentials, bad endpoint URL).
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngieError {
    /// Returns true if only a new interactive login can recover.
    pub fn is_reauth_required(&self) -> bool {
        matches!(self, EngieError::ReauthRequired(_))
    }

    /// Returns true if retrying later may succeed without user action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngieError::Upstream(_) | EngieError::RateLimited { .. } | EngieError::Unauthorized { .. }
        )
    }

    /// Returns true if the user can fix the problem in place (retype the code).
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, EngieError::InvalidCode(_))
    }
}

impl From<CoreError> for EngieError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownContract { ean } => EngieError::UnknownContract { ean },
            CoreError::InvalidConfig(msg) => EngieError::Config(msg),
        }
    }
}
