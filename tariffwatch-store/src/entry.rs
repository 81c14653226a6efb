//! The config entry: account identity, session tokens, and options.
//!
//! `entry.json` is the durable home of the rotating refresh token unless the
//! entry selects the keychain. Every rotation is written through
//! [`EntryStore`]'s [`TokenPersistence`] impl or [`token_persistence`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tariffwatch_core::{MfaChannel, SessionTokens, UpdateInterval};
use tariffwatch_engie::DEFAULT_CLIENT_ID;
use tariffwatch_fetch::{KeychainApi, KeychainTokenPersistence, PersistError, TokenPersistence};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::persistence::{load_json_if_exists, save_json};

// ============================================================================
// Config Entry
// ============================================================================

/// Options that can be changed after setup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryOptions {
    /// Price polling interval.
    pub update_interval_hours: UpdateInterval,
}

/// Where the rotating refresh token is kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    /// In `entry.json` next to the identity.
    #[default]
    Entry,
    /// In the system keychain; `entry.json` holds no tokens.
    Keychain,
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

/// Contents of `entry.json`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Account email.
    pub email: String,
    /// Customer (business agreement) number.
    pub customer_number: String,
    /// OAuth client id.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// 2FA channel used at login.
    #[serde(default)]
    pub mfa_channel: MfaChannel,
    /// Token storage backend.
    #[serde(default)]
    pub token_storage: TokenStorage,
    /// Last access token.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Current refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry of `access_token`.
    #[serde(default)]
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Runtime options.
    #[serde(default)]
    pub options: EntryOptions,
}

impl ConfigEntry {
    /// Creates an entry without tokens.
    pub fn new(
        email: impl Into<String>,
        customer_number: impl Into<String>,
        client_id: impl Into<String>,
        mfa_channel: MfaChannel,
    ) -> Self {
        Self {
            email: email.into(),
            customer_number: customer_number.into(),
            client_id: client_id.into(),
            mfa_channel,
            token_storage: TokenStorage::default(),
            access_token: None,
            refresh_token: None,
            token_expires_at: None,
            options: EntryOptions::default(),
        }
    }

    /// Stored session tokens, if a refresh token is present.
    ///
    /// Without a recorded expiry the access token is treated as expired.
    pub fn tokens(&self) -> Option<SessionTokens> {
        let refresh_token = self.refresh_token.as_ref().filter(|t| !t.is_empty())?;
        let mut tokens = SessionTokens::from_refresh_token(refresh_token.clone());
        if let (Some(access), Some(expires_at)) = (&self.access_token, self.token_expires_at) {
            tokens.access_token.clone_from(access);
            tokens.expires_at = expires_at;
        }
        Some(tokens)
    }

    /// Replaces the stored tokens.
    pub fn set_tokens(&mut self, tokens: &SessionTokens) {
        self.access_token = Some(tokens.access_token.clone());
        self.refresh_token = Some(tokens.refresh_token.clone());
        self.token_expires_at = Some(tokens.expires_at);
    }

    /// Removes the stored tokens.
    pub fn clear_tokens(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.token_expires_at = None;
    }

    /// Whether a refresh token is stored.
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_ref().is_some_and(|t| !t.is_empty())
    }
}

impl std::fmt::Debug for ConfigEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigEntry")
            .field("email", &self.email)
            .field("customer_number", &self.customer_number)
            .field("client_id", &self.client_id)
            .field("mfa_channel", &self.mfa_channel)
            .field("token_storage", &self.token_storage)
            .field("has_refresh_token", &self.has_refresh_token())
            .field("token_expires_at", &self.token_expires_at)
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// Entry Store
// ============================================================================

/// File-backed config entry.
pub struct EntryStore {
    path: PathBuf,
    entry: Mutex<ConfigEntry>,
}

impl EntryStore {
    /// Opens an existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotConfigured`] if the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entry: ConfigEntry = load_json_if_exists(&path)
            .await?
            .ok_or_else(|| StoreError::NotConfigured(path.clone()))?;
        debug!(path = %path.display(), "Config entry loaded");
        Ok(Self {
            path,
            entry: Mutex::new(entry),
        })
    }

    /// Writes `entry`, keeping the options of an existing entry.
    ///
    /// Used when a new login completes: identity fields are replaced, the
    /// user's options survive.
    pub async fn upsert(path: impl Into<PathBuf>, mut entry: ConfigEntry) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(existing) = load_json_if_exists::<ConfigEntry>(&path).await? {
            entry.options = existing.options;
        }
        save_json(&path, &entry).await?;
        info!(path = %path.display(), "Config entry written");
        Ok(Self {
            path,
            entry: Mutex::new(entry),
        })
    }

    /// Location of the entry file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current entry.
    pub async fn entry(&self) -> ConfigEntry {
        self.entry.lock().await.clone()
    }

    /// Current update interval.
    pub async fn update_interval(&self) -> UpdateInterval {
        self.entry.lock().await.options.update_interval_hours
    }

    /// Changes the update interval and saves the entry.
    pub async fn set_update_interval(&self, interval: UpdateInterval) -> Result<(), StoreError> {
        let mut entry = self.entry.lock().await;
        entry.options.update_interval_hours = interval;
        save_json(&self.path, &*entry).await?;
        info!(interval = %interval, "Update interval changed");
        Ok(())
    }

    async fn update(&self, apply: impl FnOnce(&mut ConfigEntry)) -> Result<(), StoreError> {
        let mut entry = self.entry.lock().await;
        let mut updated = entry.clone();
        apply(&mut updated);
        save_json(&self.path, &updated).await?;
        *entry = updated;
        Ok(())
    }
}

impl std::fmt::Debug for EntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenPersistence for EntryStore {
    async fn load_tokens(&self) -> Result<Option<SessionTokens>, PersistError> {
        Ok(self.entry.lock().await.tokens())
    }

    async fn persist_tokens(&self, tokens: &SessionTokens) -> Result<(), PersistError> {
        self.update(|entry| entry.set_tokens(tokens)).await?;
        debug!(path = %self.path.display(), "Rotated tokens written to config entry");
        Ok(())
    }

    async fn clear_tokens(&self) -> Result<(), PersistError> {
        self.update(ConfigEntry::clear_tokens).await?;
        Ok(())
    }
}

/// Token persistence selected by the entry's [`TokenStorage`].
pub async fn token_persistence(
    store: &Arc<EntryStore>,
    keychain: Arc<dyn KeychainApi>,
) -> Arc<dyn TokenPersistence> {
    match store.entry().await.token_storage {
        TokenStorage::Entry => Arc::clone(store) as Arc<dyn TokenPersistence>,
        TokenStorage::Keychain => Arc::new(KeychainTokenPersistence::new(keychain)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tariffwatch_fetch::MemoryKeychain;
    use tempfile::TempDir;

    fn entry() -> ConfigEntry {
        ConfigEntry::new("user@example.com", "1500000001", DEFAULT_CLIENT_ID, MfaChannel::Sms)
    }

    #[test]
    fn test_minimal_entry_uses_defaults() {
        let parsed: ConfigEntry =
            serde_json::from_str(r#"{"email": "a@b.c", "customer_number": "1"}"#).unwrap();
        assert_eq!(parsed.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(parsed.mfa_channel, MfaChannel::Sms);
        assert_eq!(parsed.options.update_interval_hours.hours(), 1);
        assert!(parsed.tokens().is_none());
    }

    #[test]
    fn test_invalid_interval_is_rejected() {
        let result: Result<ConfigEntry, _> = serde_json::from_str(
            r#"{"email": "a@b.c", "customer_number": "1", "options": {"update_interval_hours": 25}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_refresh_token_without_expiry_is_expired() {
        let mut e = entry();
        e.refresh_token = Some("rt".to_string());
        e.access_token = Some("at".to_string());

        let tokens = e.tokens().unwrap();
        assert_eq!(tokens.refresh_token, "rt");
        assert!(tokens.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_debug_hides_tokens() {
        let mut e = entry();
        e.set_tokens(&SessionTokens::issued("secret-at", "secret-rt", Some(120), Utc::now()));
        let debug = format!("{e:?}");
        assert!(!debug.contains("secret-at"));
        assert!(!debug.contains("secret-rt"));
    }

    #[tokio::test]
    async fn test_open_missing_is_not_configured() {
        let dir = TempDir::new().unwrap();
        let err = EntryStore::open(dir.path().join("entry.json")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_rotation_is_written_through() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry.json");
        let store = EntryStore::upsert(&path, entry()).await.unwrap();

        let tokens = SessionTokens::issued("at-1", "rt-1", Some(120), Utc::now());
        store.persist_tokens(&tokens).await.unwrap();

        let reopened = EntryStore::open(&path).await.unwrap();
        let loaded = reopened.load_tokens().await.unwrap().unwrap();
        assert_eq!(loaded, tokens);

        reopened.clear_tokens().await.unwrap();
        let reopened = EntryStore::open(&path).await.unwrap();
        assert!(reopened.load_tokens().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keychain_storage_bypasses_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry.json");
        let mut keychain_entry = entry();
        keychain_entry.token_storage = TokenStorage::Keychain;
        let store = Arc::new(EntryStore::upsert(&path, keychain_entry).await.unwrap());

        let keychain = Arc::new(MemoryKeychain::new());
        let persistence = token_persistence(&store, keychain.clone()).await;
        let tokens = SessionTokens::issued("at-1", "rt-1", Some(120), Utc::now());
        persistence.persist_tokens(&tokens).await.unwrap();

        assert!(keychain.exists("engie", "refresh_token").await);
        let reopened = EntryStore::open(&path).await.unwrap();
        assert!(!reopened.entry().await.has_refresh_token());
        assert_eq!(reopened.entry().await.token_storage, TokenStorage::Keychain);
    }

    #[tokio::test]
    async fn test_entry_storage_writes_entry() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(
            EntryStore::upsert(dir.path().join("entry.json"), entry())
                .await
                .unwrap(),
        );

        let keychain = Arc::new(MemoryKeychain::new());
        let persistence = token_persistence(&store, keychain.clone()).await;
        let tokens = SessionTokens::issued("at-1", "rt-1", Some(120), Utc::now());
        persistence.persist_tokens(&tokens).await.unwrap();

        assert!(store.entry().await.has_refresh_token());
        assert!(!keychain.exists("engie", "refresh_token").await);
    }

    #[tokio::test]
    async fn test_upsert_keeps_options() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry.json");
        let store = EntryStore::upsert(&path, entry()).await.unwrap();
        store
            .set_update_interval(UpdateInterval::from_hours(6).unwrap())
            .await
            .unwrap();

        let relogin = EntryStore::upsert(&path, entry()).await.unwrap();
        assert_eq!(relogin.update_interval().await.hours(), 6);
    }
}
