//! Integration lifecycle: setup, readings, reauthentication, shutdown.

use std::collections::BTreeMap;
use std::sync::Arc;

use tariffwatch_core::{Credentials, Reading, ReadingKey, SessionTokens, UpdateInterval};
use tariffwatch_engie::{
    AuthSession, ChallengeState, EngieApiClient, EngieError, PriceSource, TokenProvider,
};
use tariffwatch_fetch::TokenPersistence;
use tariffwatch_store::{PriceStatus, PriceStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::RuntimeConfig;
use crate::coordinator::{CycleOutcome, UpdateCoordinator};
use crate::error::RuntimeError;
use crate::refresh::TokenRefreshLoop;

/// A running integration instance.
///
/// Owns the auth session, the token refresh loop and the update coordinator.
pub struct Integration {
    session: Arc<AuthSession>,
    coordinator: Arc<UpdateCoordinator>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Integration {
    /// Resumes the stored session and starts both recurring tasks.
    ///
    /// Setup performs one token refresh before the loops start. A failed
    /// refresh is logged and the integration starts anyway; a rejected
    /// refresh token leaves the authentication indicator unhealthy until
    /// [`Self::reauthenticate`] succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid configuration or unreadable token
    /// storage.
    #[instrument(skip(config, persistence))]
    pub async fn setup(
        config: RuntimeConfig,
        customer_number: &str,
        client_id: &str,
        persistence: Arc<dyn TokenPersistence>,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;

        let session = Arc::new(AuthSession::new(
            config.session_config(client_id),
            persistence,
        )?);
        if session.restore().await? {
            if let Err(e) = session.refresh().await {
                warn!(error = %e, "Initial token refresh failed");
            }
        } else {
            warn!("No stored session, a login is required");
        }

        let source: Arc<dyn PriceSource> =
            Arc::new(EngieApiClient::new(config.endpoints.clone(), config.http_timeout)?);
        Ok(Self::start(session, source, &config, customer_number))
    }

    /// Starts the loops around an existing session and price source.
    pub fn start(
        session: Arc<AuthSession>,
        source: Arc<dyn PriceSource>,
        config: &RuntimeConfig,
        customer_number: &str,
    ) -> Self {
        let tokens: Arc<dyn TokenProvider> = session.clone();
        let store = Arc::new(PriceStore::new(config.max_staleness));
        let coordinator = Arc::new(UpdateCoordinator::new(
            Arc::clone(&tokens),
            source,
            store,
            customer_number,
            config.update_interval,
        ));

        let cancel = CancellationToken::new();
        let refresh = TokenRefreshLoop::new(tokens, config.refresh_period, config.refresh_margin);
        let tasks = vec![
            refresh.spawn(cancel.child_token()),
            coordinator.spawn(cancel.child_token()),
        ];
        info!(healthy = session.store().is_healthy(), "Integration started");

        Self {
            session,
            coordinator,
            cancel,
            tasks,
        }
    }

    // ========================================================================
    // Sensor Surface
    // ========================================================================

    /// Readings of the latest available snapshot.
    pub async fn readings(&self) -> BTreeMap<ReadingKey, Reading> {
        self.coordinator.store().readings().await
    }

    /// Current update status.
    pub async fn status(&self) -> PriceStatus {
        self.coordinator.store().status().await
    }

    /// Subscribes to price store changes.
    pub fn subscribe_prices(&self) -> watch::Receiver<u64> {
        self.coordinator.store().subscribe()
    }

    /// The authentication health indicator.
    pub fn auth_healthy(&self) -> bool {
        self.session.store().is_healthy()
    }

    /// Subscribes to the authentication health indicator.
    pub fn subscribe_health(&self) -> watch::Receiver<bool> {
        self.session.subscribe_health()
    }

    /// Whether the last token rotation failed to reach durable storage.
    ///
    /// A restart in this state resumes from a consumed refresh token.
    pub fn has_unsaved_tokens(&self) -> bool {
        self.session.store().has_unsaved_tokens()
    }

    // ========================================================================
    // Control
    // ========================================================================

    /// Changes the polling interval without restarting.
    pub fn set_update_interval(&self, interval: UpdateInterval) {
        self.coordinator.set_interval(interval);
    }

    /// Requests an immediate update from the running loop.
    pub fn request_refresh(&self) {
        self.coordinator.request_refresh();
    }

    /// Runs one update cycle now and waits for it.
    pub async fn refresh_now(&self) -> CycleOutcome {
        self.coordinator.refresh_now().await
    }

    /// Starts a new login on the running instance.
    pub async fn begin_reauth(&self, credentials: &Credentials) -> Result<ChallengeState, EngieError> {
        self.session.begin_login(credentials).await
    }

    /// Completes a new login. Token renewal resumes on the next tick and an
    /// update is requested.
    pub async fn reauthenticate(
        &self,
        challenge: &ChallengeState,
        code: &str,
    ) -> Result<SessionTokens, EngieError> {
        let tokens = self.session.submit_2fa(challenge, code).await?;
        info!("Reauthenticated, renewal resumed");
        self.coordinator.request_refresh();
        Ok(tokens)
    }

    /// Cancels both loops and waits for them to stop.
    ///
    /// In-flight requests are abandoned; nothing partial is persisted.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Integration stopped");
    }
}

impl std::fmt::Debug for Integration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Integration")
            .field("healthy", &self.auth_healthy())
            .field("interval", &self.coordinator.interval())
            .finish_non_exhaustive()
    }
}
