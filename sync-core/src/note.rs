//! The plaintext note model.
//!
//! [`Note`] is the local source of truth. [`NotePayload`] is the subset that
//! gets encrypted; the id travels outside the ciphertext in the envelope.

use serde::{Deserialize, Serialize};
use sync_types::{NoteId, Scheme};

/// Which path last protected a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionType {
    /// Never synced.
    #[default]
    None,
    /// XChaCha20-Poly1305 + Ed25519.
    Classical,
    /// ML-KEM-768 + ML-DSA-65.
    PostQuantum,
}

impl From<Scheme> for EncryptionType {
    fn from(scheme: Scheme) -> Self {
        match scheme {
            Scheme::Classical => EncryptionType::Classical,
            Scheme::PostQuantum => EncryptionType::PostQuantum,
        }
    }
}

/// A plaintext note, local only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Locally unique id, assigned as a creation timestamp (ms).
    pub id: i64,
    /// Title.
    pub title: String,
    /// Body.
    pub content: String,
    /// Creation time (ms).
    pub created_at: i64,
    /// Last modification time (ms); the last-writer-wins key.
    pub updated_at: i64,
    /// Tombstone flag.
    #[serde(default)]
    pub deleted: bool,
    /// Local write not yet acknowledged by the server.
    #[serde(default)]
    pub pending_sync: bool,
    /// Path that last protected this note.
    #[serde(default, rename = "encryptionType")]
    pub encryption_type: EncryptionType,
}

impl Note {
    /// Create a note at `now_ms`. The id is the creation time.
    pub fn new(now_ms: i64, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: now_ms,
            title: title.into(),
            content: content.into(),
            created_at: now_ms,
            updated_at: now_ms,
            deleted: false,
            pending_sync: true,
            encryption_type: EncryptionType::None,
        }
    }

    /// Wire id of this note.
    pub fn note_id(&self) -> NoteId {
        NoteId::new(self.id)
    }

    /// Apply a local edit.
    ///
    /// `updated_at` always moves forward, even if the wall clock did not,
    /// so the edit beats the version it replaces.
    pub fn edit(&mut self, title: impl Into<String>, content: impl Into<String>, now_ms: i64) {
        self.title = title.into();
        self.content = content.into();
        self.touch(now_ms);
    }

    /// Mark deleted. The tombstone propagates on the next sync.
    pub fn tombstone(&mut self, now_ms: i64) {
        self.deleted = true;
        self.touch(now_ms);
    }

    fn touch(&mut self, now_ms: i64) {
        self.updated_at = now_ms.max(self.updated_at.saturating_add(1));
        self.pending_sync = true;
    }

    /// The encrypted part of this note.
    pub fn payload(&self) -> NotePayload {
        NotePayload {
            title: self.title.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted: self.deleted,
        }
    }

    /// Rebuild a note from a decrypted payload.
    pub fn from_payload(id: NoteId, payload: NotePayload, encryption_type: EncryptionType) -> Self {
        Self {
            id: id.value(),
            title: payload.title,
            content: payload.content,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
            deleted: payload.deleted,
            pending_sync: false,
            encryption_type,
        }
    }
}

/// Plaintext fields that are encrypted into an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePayload {
    /// Title.
    pub title: String,
    /// Body.
    pub content: String,
    /// Creation time (ms).
    pub created_at: i64,
    /// Modification time (ms); must equal the envelope timestamp.
    pub updated_at: i64,
    /// Tombstone flag.
    #[serde(default)]
    pub deleted: bool,
}

impl NotePayload {
    /// Serialize for encryption.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize after decryption.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
