//! Token store: the single writer of the rotating refresh token.
//!
//! The current tokens live behind one async mutex. A refresh holds the lock
//! across the whole token exchange, so two refreshes can never start from
//! the same refresh token and readers never see a token that is being
//! rotated out.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tariffwatch_core::SessionTokens;
use tariffwatch_fetch::{PersistError, TokenPersistence};
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::{debug, error, info, warn};

// ============================================================================
// State
// ============================================================================

/// Mutable session state guarded by the store's mutex.
#[derive(Debug, Default)]
pub struct TokenState {
    pub(crate) tokens: Option<SessionTokens>,
    pub(crate) needs_reauth: bool,
}

impl TokenState {
    /// Current tokens, if a session exists.
    pub fn tokens(&self) -> Option<&SessionTokens> {
        self.tokens.as_ref()
    }

    /// Whether only a new login can restore the session.
    pub fn needs_reauth(&self) -> bool {
        self.needs_reauth
    }
}

// ============================================================================
// Token Store
// ============================================================================

/// Holds the current session tokens and writes every rotation through to
/// durable storage.
pub struct TokenStore {
    state: Mutex<TokenState>,
    persistence: Arc<dyn TokenPersistence>,
    healthy: watch::Sender<bool>,
    unsaved: AtomicBool,
}

impl TokenStore {
    /// Creates an empty store. Without tokens the session needs a login.
    pub fn new(persistence: Arc<dyn TokenPersistence>) -> Self {
        let (healthy, _) = watch::channel(false);
        Self {
            state: Mutex::new(TokenState {
                tokens: None,
                needs_reauth: true,
            }),
            persistence,
            healthy,
            unsaved: AtomicBool::new(false),
        }
    }

    /// Loads tokens from durable storage.
    ///
    /// Returns true if a session was resumed.
    ///
    /// # Errors
    ///
    /// Returns the persistence error if storage cannot be read.
    pub async fn restore(&self) -> Result<bool, PersistError> {
        let loaded = self.persistence.load_tokens().await?;
        let mut state = self.state.lock().await;
        let resumed = match loaded {
            Some(tokens) if !tokens.refresh_token.is_empty() => {
                state.tokens = Some(tokens);
                state.needs_reauth = false;
                info!("Resumed session from stored refresh token");
                true
            }
            _ => {
                debug!("No stored session to resume");
                false
            }
        };
        self.publish(&state);
        Ok(resumed)
    }

    /// Copy of the current tokens.
    pub async fn snapshot(&self) -> Option<SessionTokens> {
        self.state.lock().await.tokens.clone()
    }

    /// Whether only a new login can restore the session.
    pub fn needs_reauth(&self) -> bool {
        !*self.healthy.borrow()
    }

    /// Current value of the authentication health indicator.
    pub fn is_healthy(&self) -> bool {
        *self.healthy.borrow()
    }

    /// Subscribes to the authentication health indicator.
    pub fn subscribe_health(&self) -> watch::Receiver<bool> {
        self.healthy.subscribe()
    }

    /// Whether the in-memory tokens differ from durable storage after a
    /// failed write.
    pub fn has_unsaved_tokens(&self) -> bool {
        self.unsaved.load(Ordering::SeqCst)
    }

    /// Locks the state for a read-check-write sequence.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().await
    }

    /// Swaps in new tokens, clears the reauth flag, then persists.
    ///
    /// The in-memory swap happens first: the previous refresh token is
    /// already consumed upstream, so keeping it would strand the session.
    pub(crate) async fn commit(
        &self,
        state: &mut TokenState,
        tokens: SessionTokens,
    ) -> Result<(), PersistError> {
        state.tokens = Some(tokens);
        state.needs_reauth = false;
        self.publish(state);

        self.write_through(state).await
    }

    /// Writes the current tokens again if the last write failed.
    ///
    /// Returns true if a pending write was stored.
    pub(crate) async fn retry_unsaved(&self, state: &TokenState) -> Result<bool, PersistError> {
        if !self.has_unsaved_tokens() {
            return Ok(false);
        }
        self.write_through(state).await?;
        info!("Pending tokens persisted");
        Ok(true)
    }

    async fn write_through(&self, state: &TokenState) -> Result<(), PersistError> {
        let Some(tokens) = state.tokens.as_ref() else {
            return Ok(());
        };
        if let Err(e) = self.persistence.persist_tokens(tokens).await {
            self.unsaved.store(true, Ordering::SeqCst);
            error!(error = %e, "Failed to persist rotated tokens");
            return Err(e);
        }
        self.unsaved.store(false, Ordering::SeqCst);
        debug!(expires_at = %tokens.expires_at, "Tokens persisted");
        Ok(())
    }

    /// Marks the session dead; renewal stops until a new login commits.
    pub(crate) fn mark_reauth(&self, state: &mut TokenState) {
        if !state.needs_reauth {
            warn!("Session needs reauthentication");
        }
        state.needs_reauth = true;
        self.publish(state);
    }

    fn publish(&self, state: &TokenState) {
        let healthy = state.tokens.is_some() && !state.needs_reauth;
        self.healthy.send_if_modified(|current| {
            let changed = *current != healthy;
            *current = healthy;
            changed
        });
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("healthy", &*self.healthy.borrow())
            .field("unsaved", &self.has_unsaved_tokens())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use tariffwatch_fetch::MemoryTokenPersistence;

    struct FailingPersistence;

    #[async_trait]
    impl TokenPersistence for FailingPersistence {
        async fn load_tokens(&self) -> Result<Option<SessionTokens>, PersistError> {
            Ok(None)
        }
        async fn persist_tokens(&self, _tokens: &SessionTokens) -> Result<(), PersistError> {
            Err(PersistError::Storage("disk full".to_string()))
        }
        async fn clear_tokens(&self) -> Result<(), PersistError> {
            Ok(())
        }
    }

    /// Fails the first `failures` writes, then delegates.
    struct FlakyPersistence {
        failures: AtomicUsize,
        inner: MemoryTokenPersistence,
    }

    #[async_trait]
    impl TokenPersistence for FlakyPersistence {
        async fn load_tokens(&self) -> Result<Option<SessionTokens>, PersistError> {
            self.inner.load_tokens().await
        }
        async fn persist_tokens(&self, tokens: &SessionTokens) -> Result<(), PersistError> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(PersistError::Storage("disk full".to_string()));
            }
            self.inner.persist_tokens(tokens).await
        }
        async fn clear_tokens(&self) -> Result<(), PersistError> {
            self.inner.clear_tokens().await
        }
    }

    fn tokens(refresh: &str) -> SessionTokens {
        SessionTokens::issued("access", refresh, Some(120), Utc::now())
    }

    #[tokio::test]
    async fn test_new_store_is_unhealthy() {
        let store = TokenStore::new(Arc::new(MemoryTokenPersistence::new()));
        assert!(!store.is_healthy());
        assert!(store.needs_reauth());
        assert!(!store.restore().await.unwrap());
        assert!(store.needs_reauth());
    }

    #[tokio::test]
    async fn test_restore_resumes_session() {
        let persistence = Arc::new(MemoryTokenPersistence::with_tokens(tokens("rt-1")));
        let store = TokenStore::new(persistence);

        assert!(store.restore().await.unwrap());
        assert!(store.is_healthy());
        assert_eq!(store.snapshot().await.unwrap().refresh_token, "rt-1");
    }

    #[tokio::test]
    async fn test_commit_persists_and_flips_health() {
        let persistence = Arc::new(MemoryTokenPersistence::new());
        let store = TokenStore::new(persistence.clone());
        let mut health = store.subscribe_health();

        {
            let mut state = store.lock().await;
            store.commit(&mut state, tokens("rt-2")).await.unwrap();
        }

        assert!(health.has_changed().unwrap());
        assert!(*health.borrow_and_update());
        assert_eq!(persistence.current().await.unwrap().refresh_token, "rt-2");
        assert_eq!(persistence.write_count().await, 1);
    }

    #[tokio::test]
    async fn test_mark_reauth_flips_health() {
        let persistence = Arc::new(MemoryTokenPersistence::with_tokens(tokens("rt-1")));
        let store = TokenStore::new(persistence);
        store.restore().await.unwrap();

        {
            let mut state = store.lock().await;
            store.mark_reauth(&mut state);
            assert!(state.needs_reauth());
            assert!(state.tokens().is_some());
        }
        assert!(!store.is_healthy());
    }

    #[tokio::test]
    async fn test_commit_keeps_new_tokens_when_persist_fails() {
        let store = TokenStore::new(Arc::new(FailingPersistence));
        let mut state = store.lock().await;

        let result = store.commit(&mut state, tokens("rt-3")).await;
        assert!(result.is_err());
        assert_eq!(state.tokens().unwrap().refresh_token, "rt-3");
        assert!(!state.needs_reauth());
        assert!(store.has_unsaved_tokens());
    }

    #[tokio::test]
    async fn test_failed_write_is_retried() {
        let persistence = Arc::new(FlakyPersistence {
            failures: AtomicUsize::new(1),
            inner: MemoryTokenPersistence::new(),
        });
        let store = TokenStore::new(persistence.clone());
        let mut state = store.lock().await;

        assert!(store.commit(&mut state, tokens("rt-4")).await.is_err());
        assert!(store.has_unsaved_tokens());
        assert!(persistence.inner.current().await.is_none());

        assert!(store.retry_unsaved(&state).await.unwrap());
        assert!(!store.has_unsaved_tokens());
        assert_eq!(persistence.inner.current().await.unwrap().refresh_token, "rt-4");

        // Nothing left to write.
        assert!(!store.retry_unsaved(&state).await.unwrap());
        assert_eq!(persistence.inner.write_count().await, 1);
    }
}
