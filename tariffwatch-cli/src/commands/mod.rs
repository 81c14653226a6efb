//! CLI command implementations.

pub mod config;
pub mod login;
pub mod prices;
pub mod run;
pub mod status;
pub mod verify;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tariffwatch_engie::{AuthSession, EngieError};
use tariffwatch_fetch::{SystemKeychain, TokenPersistence};
use tariffwatch_runtime::RuntimeConfig;
use tariffwatch_store::{
    CHALLENGE_FILE, ChallengeFile, ENTRY_FILE, EntryStore, default_config_dir,
    token_persistence,
};

use crate::Cli;

/// File locations, honouring `--config-dir`.
pub struct Paths {
    dir: PathBuf,
}

impl Paths {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            dir: cli.config_dir.clone().unwrap_or_else(default_config_dir),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry(&self) -> PathBuf {
        self.dir.join(ENTRY_FILE)
    }

    pub fn challenge(&self) -> ChallengeFile {
        ChallengeFile::new(self.dir.join(CHALLENGE_FILE))
    }

    pub async fn open_entry(&self) -> Result<Arc<EntryStore>> {
        let store = EntryStore::open(self.entry())
            .await
            .context("Failed to load config entry")?;
        Ok(Arc::new(store))
    }
}

/// Runtime settings for an entry.
pub async fn runtime_config(entry: &EntryStore) -> RuntimeConfig {
    RuntimeConfig::default().with_update_interval(entry.update_interval().await)
}

/// Token storage selected by the entry.
pub async fn persistence(entry: &Arc<EntryStore>) -> Arc<dyn TokenPersistence> {
    token_persistence(entry, Arc::new(SystemKeychain::new())).await
}

/// Builds a session backed by the entry's token storage and resumes it.
pub async fn resume_session(
    entry: &Arc<EntryStore>,
    config: &RuntimeConfig,
) -> Result<Arc<AuthSession>> {
    let client_id = entry.entry().await.client_id;
    let persistence = persistence(entry).await;
    let session = AuthSession::new(config.session_config(&client_id), persistence)?;
    if !session.restore().await? {
        return Err(EngieError::ReauthRequired(
            "no stored session, run `tariffwatch login` first".into(),
        )
        .into());
    }
    Ok(Arc::new(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tariffwatch_core::{MfaChannel, UpdateInterval};
    use tariffwatch_store::ConfigEntry;
    use tempfile::TempDir;

    fn cli_with_dir(dir: &Path) -> Cli {
        Cli::try_parse_from([
            "tariffwatch",
            "--config-dir",
            dir.to_str().unwrap(),
            "status",
        ])
        .unwrap()
    }

    #[test]
    fn test_paths_follow_config_dir() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::from_cli(&cli_with_dir(dir.path()));

        assert_eq!(paths.dir(), dir.path());
        assert_eq!(paths.entry(), dir.path().join("entry.json"));
        assert_eq!(paths.challenge().path(), dir.path().join("challenge.json"));
    }

    #[tokio::test]
    async fn test_missing_entry_is_reported() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::from_cli(&cli_with_dir(dir.path()));

        let err = paths.open_entry().await.unwrap_err();
        assert!(format!("{err:#}").contains("tariffwatch login"));
    }

    #[tokio::test]
    async fn test_runtime_config_uses_stored_interval() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::from_cli(&cli_with_dir(dir.path()));
        let entry = ConfigEntry::new("user@example.com", "1500000001", "client", MfaChannel::Sms);
        EntryStore::upsert(paths.entry(), entry).await.unwrap();

        let store = paths.open_entry().await.unwrap();
        store
            .set_update_interval(UpdateInterval::from_hours(12).unwrap())
            .await
            .unwrap();

        let config = runtime_config(&store).await;
        assert_eq!(config.update_interval.hours(), 12);
    }

    #[tokio::test]
    async fn test_resume_without_tokens_requires_login() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::from_cli(&cli_with_dir(dir.path()));
        let entry = ConfigEntry::new("user@example.com", "1500000001", "client", MfaChannel::Sms);
        EntryStore::upsert(paths.entry(), entry).await.unwrap();

        let store = paths.open_entry().await.unwrap();
        let config = runtime_config(&store).await;
        let err = resume_session(&store, &config).await.unwrap_err();
        assert_eq!(crate::ExitCode::for_error(&err), crate::ExitCode::ReauthRequired);
    }
}
