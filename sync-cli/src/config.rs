//! Settings management for notesync.
//!
//! Only public material is stored: the server URL, whether post-quantum keys
//! are used, and the owner id the phrase produced at `init`. The phrase
//! itself is never written anywhere.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "settings.json";
const NOTES_FILE: &str = "notes.json";

/// Environment variable that supplies the phrase without a prompt.
pub const PHRASE_ENV: &str = "NOTESYNC_PHRASE";

/// Per-data-directory settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Relay base URL.
    pub server_url: String,
    /// Derive post-quantum keys and prefer them for new envelopes.
    pub post_quantum: bool,
    /// Owner id the phrase produced at `init` (hex).
    pub owner_id: String,
    /// When the directory was initialized (Unix seconds).
    pub created_at: u64,
}

impl Settings {
    /// Create new settings.
    pub fn new(server_url: &str, post_quantum: bool, owner_id: &str) -> Self {
        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            post_quantum,
            owner_id: owner_id.to_string(),
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Load settings from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(SETTINGS_FILE);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Not initialized. Run 'notesync init' first.")?;
        serde_json::from_str(&contents).context("Invalid settings file")
    }

    /// Save settings to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(SETTINGS_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save settings")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }

    /// Check if settings exist.
    pub async fn exists(data_dir: &Path) -> bool {
        data_dir.join(SETTINGS_FILE).exists()
    }
}

/// Path of the local note file.
pub fn notes_path(data_dir: &Path) -> PathBuf {
    data_dir.join(NOTES_FILE)
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
