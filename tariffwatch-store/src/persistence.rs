//! JSON files in the config directory.
//!
//! Both files may hold a session secret: they are created owner-only
//! (0600, directory 0700 on Unix) and replaced atomically through a temp
//! file, so a crash mid-write leaves the previous refresh token intact.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::StoreError;

// ============================================================================
// Default Paths
// ============================================================================

/// File name of the config entry.
pub const ENTRY_FILE: &str = "entry.json";

/// File name of the pending login.
pub const CHALLENGE_FILE: &str = "challenge.json";

/// The config directory.
///
/// `~/Library/Application Support/Tariffwatch` on macOS, the platform
/// config dir plus `tariffwatch` elsewhere (`~/.config/tariffwatch` on
/// Linux). Falls back to the working directory without a home.
pub fn default_config_dir() -> PathBuf {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library/Application Support/Tariffwatch"))
    } else {
        dirs::config_dir().map(|c| c.join("tariffwatch"))
    };
    base.unwrap_or_else(|| PathBuf::from("."))
}

/// `entry.json` in the default config directory.
pub fn default_entry_path() -> PathBuf {
    default_config_dir().join(ENTRY_FILE)
}

/// `challenge.json` in the default config directory.
pub fn default_challenge_path() -> PathBuf {
    default_config_dir().join(CHALLENGE_FILE)
}

// ============================================================================
// Permissions
// ============================================================================

#[cfg(unix)]
async fn restrict(path: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    debug!(path = %path.display(), mode = format_args!("{mode:o}"), "Permissions restricted");
    Ok(())
}

#[cfg(not(unix))]
async fn restrict(_path: &Path, _mode: u32) -> Result<(), StoreError> {
    Ok(())
}

fn owner_only_options() -> tokio::fs::OpenOptions {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    options
}

// ============================================================================
// File Operations
// ============================================================================

/// Creates `dir` (0700) if it is missing.
pub async fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    if tokio::fs::try_exists(dir).await? {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir).await?;
    restrict(dir, 0o700).await?;
    debug!(path = %dir.display(), "Config directory created");
    Ok(())
}

/// Writes `data` as pretty JSON, atomically and owner-only.
pub async fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<(), StoreError> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(dir).await?;
    }

    let json = serde_json::to_vec_pretty(data)?;
    let temp = path.with_extension("json.tmp");
    let mut file = owner_only_options().open(&temp).await?;
    file.write_all(&json).await?;
    file.sync_all().await?;
    drop(file);
    // An existing temp file keeps its old mode.
    restrict(&temp, 0o600).await?;
    tokio::fs::rename(&temp, path).await?;

    debug!(path = %path.display(), bytes = json.len(), "JSON file saved");
    Ok(())
}

/// Reads and parses a JSON file.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = tokio::fs::read(path).await?;
    debug!(path = %path.display(), bytes = bytes.len(), "JSON file read");
    Ok(serde_json::from_slice(&bytes)?)
}

/// Like [`load_json`], but a missing file is `Ok(None)`.
pub async fn load_json_if_exists<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match load_json(path).await {
        Ok(data) => Ok(Some(data)),
        Err(StoreError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Deletes a file. Returns false if it did not exist.
pub async fn remove_if_exists(path: &Path) -> Result<bool, StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "File removed");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
