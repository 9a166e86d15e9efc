//! CLI command implementations.

pub mod init;
pub mod notes;
pub mod phrase;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use sync_client::{DeriveOptions, FileNoteStore, KdfParams, KeyBundle, LocalNotes, SecretPhrase};

use crate::config::{notes_path, Settings, PHRASE_ENV};

/// Read the phrase from `NOTESYNC_PHRASE`, or prompt without echo.
pub fn read_phrase(prompt: &str) -> Result<SecretPhrase> {
    let input = match std::env::var(PHRASE_ENV) {
        Ok(value) if !value.trim().is_empty() => {
            tracing::debug!("Using phrase from {}", PHRASE_ENV);
            value
        }
        _ => rpassword::prompt_password(prompt).context("Failed to read phrase")?,
    };
    SecretPhrase::parse(&input).context("Not a valid secret phrase")
}

/// Derive the key bundle and check it belongs to this data directory.
pub fn unlock(settings: &Settings, phrase: &SecretPhrase, kdf: KdfParams) -> Result<Arc<KeyBundle>> {
    let options = DeriveOptions {
        kdf,
        post_quantum: settings.post_quantum,
    };
    let keys = KeyBundle::derive(phrase, &options).context("Key derivation failed")?;
    if keys.owner_id().to_string() != settings.owner_id {
        anyhow::bail!("This phrase does not match the one this directory was initialized with");
    }
    Ok(Arc::new(keys))
}

/// The local note store for a data directory.
pub fn local_notes(data_dir: &Path) -> LocalNotes<FileNoteStore> {
    LocalNotes::new(FileNoteStore::new(notes_path(data_dir)))
}

/// Format a millisecond timestamp relative to now.
pub fn format_age(ts_ms: i64) -> String {
    let diff = (sync_client::now_ms() - ts_ms).max(0) / 1000;

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}
