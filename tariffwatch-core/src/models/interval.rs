//! Update interval option.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CoreError;

/// How often the price coordinator polls, in whole hours (1-24).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct UpdateInterval(u8);

impl UpdateInterval {
    /// Shortest allowed interval in hours.
    pub const MIN_HOURS: u8 = 1;
    /// Longest allowed interval in hours.
    pub const MAX_HOURS: u8 = 24;
    /// Default interval in hours.
    pub const DEFAULT_HOURS: u8 = 1;

    /// Creates an interval, rejecting values outside 1-24 hours.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for out-of-range values.
    pub fn from_hours(hours: u8) -> Result<Self, CoreError> {
        if (Self::MIN_HOURS..=Self::MAX_HOURS).contains(&hours) {
            Ok(Self(hours))
        } else {
            Err(CoreError::InvalidConfig(format!(
                "update interval must be between {} and {} hours, got {hours}",
                Self::MIN_HOURS,
                Self::MAX_HOURS
            )))
        }
    }

    /// Interval in hours.
    pub fn hours(self) -> u8 {
        self.0
    }

    /// Interval as a duration.
    pub fn as_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.0) * 3600)
    }
}

impl Default for UpdateInterval {
    fn default() -> Self {
        Self(Self::DEFAULT_HOURS)
    }
}

impl TryFrom<u8> for UpdateInterval {
    type Error = CoreError;

    fn try_from(hours: u8) -> Result<Self, Self::Error> {
        Self::from_hours(hours)
    }
}

impl From<UpdateInterval> for u8 {
    fn from(interval: UpdateInterval) -> Self {
        interval.0
    }
}

impl std::fmt::Display for UpdateInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 == 1 {
            write!(f, "1 hour")
        } else {
            write!(f, "{} hours", self.0)
        }
    }
}
