//! Latest price result and update-cycle state.
//!
//! Readers always see either the previous or the new snapshot, never a mix:
//! a successful cycle swaps the whole [`PriceSnapshot`] under the write lock.
//! A failed cycle keeps the previous snapshot available alongside the error.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tariffwatch_core::{PriceSnapshot, Reading, ReadingKey};
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use crate::error::StoreError;

/// Results older than this are withheld from readers by default.
pub const DEFAULT_MAX_STALENESS: Duration = Duration::from_secs(48 * 3600);

// ============================================================================
// Update State
// ============================================================================

/// State of the update coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateState {
    /// No cycle has run yet.
    #[default]
    Idle,
    /// A cycle is in flight.
    Fetching,
    /// The last cycle succeeded.
    Success,
    /// The last cycle failed.
    Failed,
}

impl std::fmt::Display for UpdateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UpdateState::Idle => "idle",
            UpdateState::Fetching => "fetching",
            UpdateState::Success => "success",
            UpdateState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Point-in-time summary of the store.
#[derive(Debug, Clone, Serialize)]
pub struct PriceStatus {
    /// Coordinator state.
    pub state: UpdateState,
    /// When the held snapshot was fetched.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Whether the held snapshot is withheld as too old.
    pub withheld: bool,
    /// When the last cycle started.
    pub last_attempt: Option<DateTime<Utc>>,
    /// Error of the last failed cycle.
    pub last_error: Option<String>,
}

// ============================================================================
// Inner State
// ============================================================================

#[derive(Default)]
struct PriceStoreInner {
    snapshot: Option<PriceSnapshot>,
    state: UpdateState,
    last_attempt: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

// ============================================================================
// Price Store
// ============================================================================

/// Shared store for the latest price snapshot.
///
/// Observable via a watch channel carrying a version counter.
pub struct PriceStore {
    inner: Arc<RwLock<PriceStoreInner>>,
    notify: watch::Sender<u64>,
    max_staleness: Option<chrono::Duration>,
}

impl Default for PriceStore {
    fn default() -> Self {
        Self::new(Some(DEFAULT_MAX_STALENESS))
    }
}

impl PriceStore {
    /// Creates an empty store.
    ///
    /// Snapshots older than `max_staleness` are withheld from [`Self::latest`];
    /// `None` disables the cap.
    pub fn new(max_staleness: Option<Duration>) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(PriceStoreInner::default())),
            notify,
            max_staleness: max_staleness
                .map(|d| chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)),
        }
    }

    // ========================================================================
    // Snapshot Access
    // ========================================================================

    /// The latest snapshot, unless it is older than the staleness cap.
    pub async fn latest(&self) -> Option<PriceSnapshot> {
        self.latest_at(Utc::now()).await
    }

    /// [`Self::latest`] evaluated at `now`.
    pub async fn latest_at(&self, now: DateTime<Utc>) -> Option<PriceSnapshot> {
        let inner = self.inner.read().await;
        inner
            .snapshot
            .as_ref()
            .filter(|s| !self.is_withheld(s, now))
            .cloned()
    }

    /// Readings of the latest snapshot (empty when none is available).
    pub async fn readings(&self) -> BTreeMap<ReadingKey, Reading> {
        self.latest()
            .await
            .map(|s| s.readings())
            .unwrap_or_default()
    }

    fn is_withheld(&self, snapshot: &PriceSnapshot, now: DateTime<Utc>) -> bool {
        self.max_staleness
            .is_some_and(|max| snapshot.is_older_than(max, now))
    }

    // ========================================================================
    // Refresh Management
    // ========================================================================

    /// Marks a cycle as started.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RefreshInProgress`] if a cycle is already
    /// fetching.
    pub async fn start_refresh(&self) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.write().await;
            if inner.state == UpdateState::Fetching {
                return Err(StoreError::RefreshInProgress);
            }
            inner.state = UpdateState::Fetching;
            inner.last_attempt = Some(Utc::now());
        }
        self.notify_change();
        debug!("Update cycle started");
        Ok(())
    }

    /// Ends a cycle with a new snapshot, replacing the previous one.
    pub async fn finish_success(&self, snapshot: PriceSnapshot) {
        let contracts = snapshot.contracts.len();
        {
            let mut inner = self.inner.write().await;
            inner.snapshot = Some(snapshot);
            inner.state = UpdateState::Success;
            inner.last_error = None;
        }
        self.notify_change();
        info!(contracts, "Prices updated");
    }

    /// Ends a cycle with an error. The previous snapshot stays available.
    pub async fn finish_failure(&self, error: impl Into<String>) {
        let error = error.into();
        {
            let mut inner = self.inner.write().await;
            inner.state = UpdateState::Failed;
            inner.last_error = Some(error.clone());
        }
        self.notify_change();
        warn!(error = %error, "Price update failed");
    }

    /// Returns a cycle that was cancelled mid-flight to idle.
    pub async fn abort_refresh(&self) {
        let aborted = {
            let mut inner = self.inner.write().await;
            let fetching = inner.state == UpdateState::Fetching;
            if fetching {
                inner.state = UpdateState::Idle;
            }
            fetching
        };
        if aborted {
            self.notify_change();
            debug!("Update cycle aborted");
        }
    }

    /// Current coordinator state.
    pub async fn state(&self) -> UpdateState {
        self.inner.read().await.state
    }

    /// Checks if a cycle is in flight.
    pub async fn is_refreshing(&self) -> bool {
        self.state().await == UpdateState::Fetching
    }

    /// Error of the last failed cycle.
    pub async fn last_error(&self) -> Option<String> {
        self.inner.read().await.last_error.clone()
    }

    /// Summary for status displays.
    pub async fn status(&self) -> PriceStatus {
        let now = Utc::now();
        let inner = self.inner.read().await;
        PriceStatus {
            state: inner.state,
            fetched_at: inner.snapshot.as_ref().map(|s| s.fetched_at),
            withheld: inner
                .snapshot
                .as_ref()
                .is_some_and(|s| self.is_withheld(s, now)),
            last_attempt: inner.last_attempt,
            last_error: inner.last_error.clone(),
        }
    }

    // ========================================================================
    // Observable
    // ========================================================================

    /// Subscribes to store changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    fn notify_change(&self) {
        self.notify.send_modify(|version| *version += 1);
    }

    // ========================================================================
    // Staleness
    // ========================================================================

    /// Checks if the held snapshot is older than `threshold` (or missing).
    pub async fn is_stale(&self, threshold: Duration) -> bool {
        let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);
        match &self.inner.read().await.snapshot {
            Some(snapshot) => snapshot.is_older_than(threshold, Utc::now()),
            None => true,
        }
    }

    /// Gets the age of the held snapshot.
    pub async fn snapshot_age(&self) -> Option<chrono::Duration> {
        self.inner
            .read()
            .await
            .snapshot
            .as_ref()
            .map(|s| s.age(Utc::now()))
    }
}

impl std::fmt::Debug for PriceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceStore")
            .field("max_staleness", &self.max_staleness)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
