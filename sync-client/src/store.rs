//! Local note persistence.
//!
//! [`NoteStore`] is the seam between the client and wherever notes live.
//! [`LocalNotes`] wraps a store with a single async write lock so that a
//! sync merge and a concurrent local edit never interleave their
//! read-modify-write cycles.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sync_core::Note;
use thiserror::Error;
use tokio::sync::Mutex;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("store I/O error at {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Stored data is not a note list.
    #[error("store data is not a note list: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Backing storage for the local note list.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Load every note, including tombstones.
    async fn load(&self) -> Result<Vec<Note>, StoreError>;

    /// Replace the stored list.
    async fn save(&self, notes: &[Note]) -> Result<(), StoreError>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryNoteStore {
    notes: std::sync::Mutex<Vec<Note>>,
}

impl MemoryNoteStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with `notes`.
    pub fn with_notes(notes: Vec<Note>) -> Self {
        Self {
            notes: std::sync::Mutex::new(notes),
        }
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn load(&self) -> Result<Vec<Note>, StoreError> {
        Ok(self
            .notes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    async fn save(&self, notes: &[Note]) -> Result<(), StoreError> {
        *self
            .notes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = notes.to_vec();
        Ok(())
    }
}

/// JSON file store.
///
/// Writes go to a sibling temp file that is then renamed over the target, so
/// a crash mid-write leaves the previous list intact. On Unix the file is
/// created owner-only (0600).
#[derive(Debug, Clone)]
pub struct FileNoteStore {
    path: PathBuf,
}

impl FileNoteStore {
    /// Store notes at `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the notes file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl NoteStore for FileNoteStore {
    async fn load(&self) -> Result<Vec<Note>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn save(&self, notes: &[Note]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(notes)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, &bytes)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        tracing::trace!(path = %self.path.display(), count = notes.len(), "saved notes");
        Ok(())
    }
}

async fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// A note store guarded by one async write lock.
#[derive(Debug)]
pub struct LocalNotes<S> {
    store: Mutex<S>,
}

impl<S: NoteStore> LocalNotes<S> {
    /// Wrap a store.
    pub fn new(store: S) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    /// Current notes, tombstones included.
    pub async fn snapshot(&self) -> Result<Vec<Note>, StoreError> {
        self.store.lock().await.load().await
    }

    /// Run a read-modify-write under the lock.
    ///
    /// The list is saved only if `f` returns `Ok`.
    pub async fn update<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Vec<Note>) -> Result<R, E>,
        E: From<StoreError>,
    {
        let store = self.store.lock().await;
        let mut notes = store.load().await?;
        let result = f(&mut notes)?;
        store.save(&notes).await?;
        Ok(result)
    }
}
