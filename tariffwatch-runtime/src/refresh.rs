//! Token refresh loop.
//!
//! Access tokens live for about two minutes, far shorter than the price
//! polling interval, so a dedicated timer keeps the session alive.

use std::sync::Arc;
use std::time::Duration;

use tariffwatch_engie::TokenProvider;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one loop tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The token was refreshed.
    Refreshed,
    /// The token was still valid beyond the margin.
    NotDue,
    /// The session needs a new login; no request was made or renewal stopped.
    NeedsReauth,
    /// The refresh failed and will be retried on the next tick.
    Failed,
}

/// Periodically refreshes the access token before it expires.
pub struct TokenRefreshLoop {
    tokens: Arc<dyn TokenProvider>,
    period: Duration,
    margin: Duration,
}

impl TokenRefreshLoop {
    /// Creates a loop ticking every `period`, refreshing within `margin`.
    pub fn new(tokens: Arc<dyn TokenProvider>, period: Duration, margin: Duration) -> Self {
        Self {
            tokens,
            period,
            margin,
        }
    }

    /// Runs one tick.
    pub async fn tick(&self) -> TickOutcome {
        if self.tokens.needs_reauth() {
            debug!("Session needs reauthentication, skipping refresh");
            return TickOutcome::NeedsReauth;
        }

        match self.tokens.refresh_if_expiring(self.margin).await {
            Ok(true) => TickOutcome::Refreshed,
            Ok(false) => TickOutcome::NotDue,
            Err(e) if e.is_reauth_required() => {
                warn!(error = %e, "Refresh token rejected, renewal paused until next login");
                TickOutcome::NeedsReauth
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, retrying next tick");
                TickOutcome::Failed
            }
        }
    }

    /// Ticks until `cancel` fires. The first tick comes one period after
    /// start.
    pub async fn run(self, cancel: CancellationToken) {
        info!(period_secs = self.period.as_secs(), "Token refresh loop started");
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = self.tick() => {}
            }
        }
        info!("Token refresh loop stopped");
    }

    /// Spawns [`Self::run`] on the current runtime.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

// ============================================================================
// Tests
// ============================================================================
