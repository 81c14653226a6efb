//! Runtime settings.

use std::time::Duration;

use tariffwatch_core::UpdateInterval;
use tariffwatch_engie::{EngieEndpoints, SessionConfig};
use tariffwatch_store::DEFAULT_MAX_STALENESS;

use crate::error::RuntimeError;

/// Default period of the token refresh loop.
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(60);

/// Default remaining validity below which the loop refreshes.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(75);

/// Default per-request HTTP timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings of a running integration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How often the token refresh loop ticks.
    pub refresh_period: Duration,
    /// Refresh when the access token expires within this margin.
    pub refresh_margin: Duration,
    /// Price polling interval.
    pub update_interval: UpdateInterval,
    /// Results older than this are withheld; `None` disables the cap.
    pub max_staleness: Option<Duration>,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    /// Service base URLs.
    pub endpoints: EngieEndpoints,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            refresh_period: DEFAULT_REFRESH_PERIOD,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            update_interval: UpdateInterval::default(),
            max_staleness: Some(DEFAULT_MAX_STALENESS),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            endpoints: EngieEndpoints::default(),
        }
    }
}

impl RuntimeConfig {
    /// Sets the update interval.
    #[must_use]
    pub fn with_update_interval(mut self, interval: UpdateInterval) -> Self {
        self.update_interval = interval;
        self
    }

    /// Sets the service base URLs.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: EngieEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Checks that the timers are usable.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] for a zero period or timeout.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.refresh_period.is_zero() {
            return Err(RuntimeError::Config("refresh period must be positive".into()));
        }
        if self.http_timeout.is_zero() {
            return Err(RuntimeError::Config("HTTP timeout must be positive".into()));
        }
        Ok(())
    }

    /// Session settings for `client_id`.
    pub fn session_config(&self, client_id: impl Into<String>) -> SessionConfig {
        SessionConfig {
            endpoints: self.endpoints.clone(),
            client_id: client_id.into(),
            timeout: self.http_timeout,
        }
    }
}
