//! Pending 2FA challenge between `login` and `verify`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tariffwatch_engie::ChallengeState;
use tracing::debug;

use crate::entry::{ConfigEntry, TokenStorage};
use crate::error::StoreError;
use crate::persistence::{load_json_if_exists, remove_if_exists, save_json};

/// A login waiting for its 2FA code.
///
/// Carries the account identity next to the challenge so the entry can be
/// written once the code is accepted.
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingLogin {
    /// Account email.
    pub email: String,
    /// Customer (business agreement) number.
    pub customer_number: String,
    /// Resumable challenge.
    pub challenge: ChallengeState,
    /// Where tokens go once the code is accepted.
    #[serde(default)]
    pub token_storage: TokenStorage,
}

impl PendingLogin {
    /// Config entry for this account, without tokens.
    pub fn to_entry(&self) -> ConfigEntry {
        let mut entry = ConfigEntry::new(
            self.email.clone(),
            self.customer_number.clone(),
            self.challenge.client_id.clone(),
            self.challenge.channel,
        );
        entry.token_storage = self.token_storage;
        entry
    }
}

impl std::fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLogin")
            .field("email", &self.email)
            .field("customer_number", &self.customer_number)
            .field("channel", &self.challenge.channel)
            .field("created_at", &self.challenge.created_at)
            .finish_non_exhaustive()
    }
}

/// `challenge.json` on disk.
#[derive(Debug, Clone)]
pub struct ChallengeFile {
    path: PathBuf,
}

impl ChallengeFile {
    /// Uses the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stores a pending login, replacing any previous one.
    pub async fn save(&self, pending: &PendingLogin) -> Result<(), StoreError> {
        save_json(&self.path, pending).await?;
        debug!(path = %self.path.display(), "Challenge saved");
        Ok(())
    }

    /// Loads the pending login, if any.
    pub async fn load(&self) -> Result<Option<PendingLogin>, StoreError> {
        load_json_if_exists(&self.path).await
    }

    /// Removes the pending login. Returns true if one existed.
    pub async fn clear(&self) -> Result<bool, StoreError> {
        remove_if_exists(&self.path).await
    }
}
