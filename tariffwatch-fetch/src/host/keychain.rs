//! Platform secret store for the refresh token.
//!
//! `keyring` talks to Keychain Services on macOS, Credential Manager on
//! Windows and the Secret Service on Linux. Its calls block, so every access
//! runs on the blocking pool.

use std::collections::HashMap;

use async_trait::async_trait;
use keyring::Entry;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::KeychainError;

/// Prefix of every service name written by `Tariffwatch`.
pub const SERVICE_PREFIX: &str = "tariffwatch";

/// Service name of the ENGIE session.
pub const ENGIE_SERVICE: &str = "engie";

/// Account name of the rotating refresh token.
pub const REFRESH_TOKEN_ACCOUNT: &str = "refresh_token";

// ============================================================================
// Keychain API Trait
// ============================================================================

/// Secret storage keyed by service and account.
#[async_trait]
pub trait KeychainApi: Send + Sync {
    /// Reads a secret. A missing or empty entry is `Ok(None)`.
    async fn get(&self, service: &str, account: &str) -> Result<Option<String>, KeychainError>;

    /// Writes a secret, replacing any previous value.
    async fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), KeychainError>;

    /// Removes a secret. Missing entries are not an error.
    async fn delete(&self, service: &str, account: &str) -> Result<(), KeychainError>;

    /// Whether a secret is stored.
    async fn exists(&self, service: &str, account: &str) -> bool {
        matches!(self.get(service, account).await, Ok(Some(_)))
    }
}

// ============================================================================
// System Keychain
// ============================================================================

/// The platform secret store, with service names under a common prefix.
#[derive(Debug, Clone)]
pub struct SystemKeychain {
    prefix: String,
}

impl Default for SystemKeychain {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemKeychain {
    /// Uses the `tariffwatch` prefix.
    pub fn new() -> Self {
        Self {
            prefix: SERVICE_PREFIX.to_string(),
        }
    }

    fn service_name(&self, service: &str) -> String {
        format!("{}:{service}", self.prefix)
    }

    async fn run<T, F>(&self, service: &str, account: &str, op: F) -> Result<T, KeychainError>
    where
        T: Send + 'static,
        F: FnOnce(&Entry) -> keyring::Result<T> + Send + 'static,
    {
        let service = self.service_name(service);
        let account = account.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, &account)?;
            op(&entry)
        })
        .await
        .map_err(|e| KeychainError::Task(e.to_string()))?;
        result.map_err(KeychainError::from)
    }
}

#[async_trait]
impl KeychainApi for SystemKeychain {
    async fn get(&self, service: &str, account: &str) -> Result<Option<String>, KeychainError> {
        let secret = self
            .run(service, account, |entry| match entry.get_password() {
                Ok(secret) if secret.is_empty() => Ok(None),
                Ok(secret) => Ok(Some(secret)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(e),
            })
            .await
            .inspect_err(|e| warn!(service, account, error = %e, "Keychain read failed"))?;
        debug!(service, account, found = secret.is_some(), "Keychain read");
        Ok(secret)
    }

    async fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), KeychainError> {
        let secret = secret.to_string();
        self.run(service, account, move |entry| entry.set_password(&secret))
            .await
            .inspect_err(|e| warn!(service, account, error = %e, "Keychain write failed"))?;
        debug!(service, account, "Keychain entry written");
        Ok(())
    }

    async fn delete(&self, service: &str, account: &str) -> Result<(), KeychainError> {
        self.run(service, account, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        })
        .await
        .inspect_err(|e| warn!(service, account, error = %e, "Keychain delete failed"))
    }
}

// ============================================================================
// In-Memory Keychain
// ============================================================================

/// Process-local keychain, for tests and platforms without a secret store.
#[derive(Debug, Default)]
pub struct MemoryKeychain {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl MemoryKeychain {
    /// Creates an empty keychain.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(service: &str, account: &str) -> (String, String) {
        (service.to_string(), account.to_string())
    }
}

#[async_trait]
impl KeychainApi for MemoryKeychain {
    async fn get(&self, service: &str, account: &str) -> Result<Option<String>, KeychainError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(&Self::key(service, account))
            .filter(|s| !s.is_empty())
            .cloned())
    }

    async fn set(&self, service: &str, account: &str, secret: &str) -> Result<(), KeychainError> {
        self.entries
            .lock()
            .await
            .insert(Self::key(service, account), secret.to_string());
        Ok(())
    }

    async fn delete(&self, service: &str, account: &str) -> Result<(), KeychainError> {
        self.entries.lock().await.remove(&Self::key(service, account));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_is_prefixed() {
        assert_eq!(
            SystemKeychain::new().service_name(ENGIE_SERVICE),
            "tariffwatch:engie"
        );
    }

    #[tokio::test]
    async fn test_memory_keychain_set_get_delete() {
        let keychain = MemoryKeychain::new();
        assert!(!keychain.exists(ENGIE_SERVICE, REFRESH_TOKEN_ACCOUNT).await);

        keychain
            .set(ENGIE_SERVICE, REFRESH_TOKEN_ACCOUNT, "rt-1")
            .await
            .unwrap();
        assert_eq!(
            keychain
                .get(ENGIE_SERVICE, REFRESH_TOKEN_ACCOUNT)
                .await
                .unwrap()
                .as_deref(),
            Some("rt-1")
        );

        keychain.delete(ENGIE_SERVICE, REFRESH_TOKEN_ACCOUNT).await.unwrap();
        keychain.delete(ENGIE_SERVICE, REFRESH_TOKEN_ACCOUNT).await.unwrap();
        assert!(!keychain.exists(ENGIE_SERVICE, REFRESH_TOKEN_ACCOUNT).await);
    }

    #[tokio::test]
    async fn test_empty_secret_reads_as_missing() {
        let keychain = MemoryKeychain::new();
        keychain.set(ENGIE_SERVICE, REFRESH_TOKEN_ACCOUNT, "").await.unwrap();
        assert!(
            keychain
                .get(ENGIE_SERVICE, REFRESH_TOKEN_ACCOUNT)
                .await
                .unwrap()
                .is_none()
        );
    }
}
