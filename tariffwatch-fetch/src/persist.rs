//! Durable storage for rotated session tokens.
//!
//! The refresh token is single-use: once exchanged, only the new value is
//! accepted. Every rotation must therefore reach durable storage before the
//! old value is forgotten, or a restart would strand the session.

use std::sync::Arc;

use async_trait::async_trait;
use tariffwatch_core::SessionTokens;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::PersistError;
use crate::host::keychain::{ENGIE_SERVICE, KeychainApi, REFRESH_TOKEN_ACCOUNT};

// ============================================================================
// Trait
// ============================================================================

/// Loads and stores session tokens.
#[async_trait]
pub trait TokenPersistence: Send + Sync {
    /// Loads the stored tokens, if any.
    async fn load_tokens(&self) -> Result<Option<SessionTokens>, PersistError>;

    /// Replaces the stored tokens.
    async fn persist_tokens(&self, tokens: &SessionTokens) -> Result<(), PersistError>;

    /// Removes the stored tokens.
    async fn clear_tokens(&self) -> Result<(), PersistError>;
}

// ============================================================================
// In-Memory
// ============================================================================

/// Keeps tokens in memory only.
#[derive(Debug, Default)]
pub struct MemoryTokenPersistence {
    tokens: Mutex<Option<SessionTokens>>,
    writes: Mutex<usize>,
}

impl MemoryTokenPersistence {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `tokens`.
    pub fn with_tokens(tokens: SessionTokens) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
            writes: Mutex::new(0),
        }
    }

    /// Currently stored tokens.
    pub async fn current(&self) -> Option<SessionTokens> {
        self.tokens.lock().await.clone()
    }

    /// Number of successful `persist_tokens` calls.
    pub async fn write_count(&self) -> usize {
        *self.writes.lock().await
    }
}

#[async_trait]
impl TokenPersistence for MemoryTokenPersistence {
    async fn load_tokens(&self) -> Result<Option<SessionTokens>, PersistError> {
        Ok(self.tokens.lock().await.clone())
    }

    async fn persist_tokens(&self, tokens: &SessionTokens) -> Result<(), PersistError> {
        *self.tokens.lock().await = Some(tokens.clone());
        *self.writes.lock().await += 1;
        Ok(())
    }

    async fn clear_tokens(&self) -> Result<(), PersistError> {
        *self.tokens.lock().await = None;
        Ok(())
    }
}

// ============================================================================
// Keychain
// ============================================================================

/// Stores the refresh token in the system keychain.
///
/// Only the refresh token is kept; a resumed session starts with an expired
/// access token and refreshes on first use.
pub struct KeychainTokenPersistence {
    keychain: Arc<dyn KeychainApi>,
    service: String,
}

impl KeychainTokenPersistence {
    /// Uses `keychain` under the ENGIE service name.
    pub fn new(keychain: Arc<dyn KeychainApi>) -> Self {
        Self {
            keychain,
            service: ENGIE_SERVICE.to_string(),
        }
    }
}

impl std::fmt::Debug for KeychainTokenPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeychainTokenPersistence")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenPersistence for KeychainTokenPersistence {
    async fn load_tokens(&self) -> Result<Option<SessionTokens>, PersistError> {
        let refresh = self
            .keychain
            .get(&self.service, REFRESH_TOKEN_ACCOUNT)
            .await?;
        Ok(refresh.map(SessionTokens::from_refresh_token))
    }

    async fn persist_tokens(&self, tokens: &SessionTokens) -> Result<(), PersistError> {
        self.keychain
            .set(&self.service, REFRESH_TOKEN_ACCOUNT, &tokens.refresh_token)
            .await?;
        debug!(service = %self.service, "Refresh token written to keychain");
        Ok(())
    }

    async fn clear_tokens(&self) -> Result<(), PersistError> {
        self.keychain
            .delete(&self.service, REFRESH_TOKEN_ACCOUNT)
            .await?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::keychain::MemoryKeychain;
    use chrono::Utc;

    #[tokio::test]
    async fn test_memory_persistence_counts_writes() {
        let store = MemoryTokenPersistence::new();
        assert!(store.load_tokens().await.unwrap().is_none());

        let tokens = SessionTokens::issued("at", "rt-1", Some(120), Utc::now());
        store.persist_tokens(&tokens).await.unwrap();
        assert_eq!(store.write_count().await, 1);
        assert_eq!(store.current().await.unwrap().refresh_token, "rt-1");

        store.clear_tokens().await.unwrap();
        assert!(store.current().await.is_none());
    }

    #[tokio::test]
    async fn test_keychain_persistence_stores_refresh_token_only() {
        let keychain = Arc::new(MemoryKeychain::new());
        let store = KeychainTokenPersistence::new(keychain.clone());

        let tokens = SessionTokens::issued("at", "rt-2", Some(120), Utc::now());
        store.persist_tokens(&tokens).await.unwrap();

        let raw = keychain.get("engie", "refresh_token").await.unwrap();
        assert_eq!(raw.as_deref(), Some("rt-2"));

        let loaded = store.load_tokens().await.unwrap().unwrap();
        assert_eq!(loaded.refresh_token, "rt-2");
        assert!(loaded.is_expired_at(Utc::now()));

        store.clear_tokens().await.unwrap();
        assert!(store.load_tokens().await.unwrap().is_none());
    }
}
