//! Update coordinator: drives fetch-classify cycles into the price store.
//!
//! ```text
//! idle ──tick/manual──▶ fetching ──ok──▶ success
//!                          │
//!                          └──error──▶ failed (previous snapshot kept)
//! ```
//!
//! At most one cycle is in flight; a tick arriving while fetching is a no-op.

use std::sync::Arc;

use tariffwatch_core::{PriceSnapshot, UpdateInterval};
use tariffwatch_engie::{Classification, EngieError, PriceSource, TokenProvider, classify};
use tariffwatch_store::PriceStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Outcome of [`UpdateCoordinator::refresh_now`].
#[derive(Debug)]
pub enum CycleOutcome {
    /// New prices were stored.
    Updated {
        /// Contracts in the new snapshot.
        contracts: usize,
        /// Contracts skipped by the classifier.
        skipped: Vec<EngieError>,
    },
    /// The cycle failed; the previous snapshot stays available.
    Failed(EngieError),
    /// Another cycle was already fetching.
    Skipped,
}

impl CycleOutcome {
    /// Returns true if new prices were stored.
    pub fn is_updated(&self) -> bool {
        matches!(self, CycleOutcome::Updated { .. })
    }
}

/// Schedules and runs price update cycles.
pub struct UpdateCoordinator {
    tokens: Arc<dyn TokenProvider>,
    source: Arc<dyn PriceSource>,
    store: Arc<PriceStore>,
    customer_number: String,
    interval: watch::Sender<UpdateInterval>,
    manual: watch::Sender<bool>,
}

impl UpdateCoordinator {
    /// Creates a coordinator writing into `store`.
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        source: Arc<dyn PriceSource>,
        store: Arc<PriceStore>,
        customer_number: impl Into<String>,
        interval: UpdateInterval,
    ) -> Self {
        let (interval, _) = watch::channel(interval);
        let (manual, _) = watch::channel(false);
        Self {
            tokens,
            source,
            store,
            customer_number: customer_number.into(),
            interval,
            manual,
        }
    }

    /// The store this coordinator writes into.
    pub fn store(&self) -> &Arc<PriceStore> {
        &self.store
    }

    /// Current polling interval.
    pub fn interval(&self) -> UpdateInterval {
        *self.interval.borrow()
    }

    /// Changes the polling interval; the running wait is re-timed.
    pub fn set_interval(&self, interval: UpdateInterval) {
        let previous = self.interval.send_replace(interval);
        if previous != interval {
            info!(from = %previous, to = %interval, "Update interval changed");
        }
    }

    /// Asks the running loop to start a cycle now.
    ///
    /// A request made while a cycle is fetching is dropped when that cycle
    /// ends.
    pub fn request_refresh(&self) {
        self.manual.send_replace(true);
    }

    // ========================================================================
    // Cycle
    // ========================================================================

    /// Runs one cycle unless one is already fetching.
    #[instrument(skip(self), fields(customer = %self.customer_number))]
    pub async fn refresh_now(&self) -> CycleOutcome {
        if self.store.start_refresh().await.is_err() {
            debug!("Update already in progress, skipping");
            return CycleOutcome::Skipped;
        }

        match self.fetch_and_classify().await {
            Ok(classification) => {
                let contracts = classification.contracts.len();
                self.store
                    .finish_success(PriceSnapshot::new(classification.contracts))
                    .await;
                CycleOutcome::Updated {
                    contracts,
                    skipped: classification.skipped,
                }
            }
            Err(e) => {
                self.store.finish_failure(e.to_string()).await;
                CycleOutcome::Failed(e)
            }
        }
    }

    async fn fetch_and_classify(&self) -> Result<Classification, EngieError> {
        let token = self.tokens.access_token().await?;

        let raw = match self.source.fetch_prices(&token, &self.customer_number).await {
            Err(EngieError::Unauthorized { status }) => {
                warn!(status, "Access token rejected, retrying once with a fresh token");
                let fresh = self.tokens.renew_after_rejection(&token).await?;
                self.source
                    .fetch_prices(&fresh, &self.customer_number)
                    .await?
            }
            other => other?,
        };

        Ok(classify(&raw))
    }

    // ========================================================================
    // Loop
    // ========================================================================

    /// Runs a cycle immediately, then one per interval or manual request,
    /// until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval_rx = self.interval.subscribe();
        let mut manual_rx = self.manual.subscribe();
        info!(interval = %self.interval(), "Update coordinator started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    self.store.abort_refresh().await;
                    break;
                }
                _ = self.refresh_now() => {}
            }
            self.manual.send_replace(false);
            manual_rx.borrow_and_update();

            let wait_started = Instant::now();
            loop {
                let deadline = wait_started + interval_rx.borrow_and_update().as_duration();
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("Update coordinator stopped");
                        return;
                    }
                    changed = interval_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    changed = manual_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        if *manual_rx.borrow_and_update() {
                            debug!("Manual refresh requested");
                            break;
                        }
                    }
                    () = sleep_until(deadline) => break,
                }
            }
        }
        info!("Update coordinator stopped");
    }

    /// Spawns [`Self::run`] on the current runtime.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(cancel))
    }
}

// ============================================================================
// Tests
// ============================================================================
