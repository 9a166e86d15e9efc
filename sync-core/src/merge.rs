//! Three-way merge of local notes with the server snapshot.
//!
//! Last-writer-wins on `updated_at`, with one exception: a local write that
//! is still pending is never discarded in the round that carried it. The
//! server's verdict for that round ([`RoundOutcome`]) decides whether the
//! pending flag is cleared.
//!
//! Pure function; the caller holds the store's write lock around
//! read → merge → write.

use std::collections::{BTreeMap, HashMap, HashSet};

use sync_types::NoteId;

use crate::note::{EncryptionType, Note};

/// Default client-side tombstone retention (30 days).
pub const DEFAULT_TOMBSTONE_RETENTION_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// A note as it was sent in this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentNote {
    /// `updated_at` at send time.
    pub timestamp: i64,
    /// Scheme it was sealed with.
    pub encryption_type: EncryptionType,
}

/// What was sent and what the server said about it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Sent notes by id.
    pub sent: HashMap<i64, SentNote>,
    /// Ids the server made current.
    pub updated: HashSet<i64>,
    /// Ids the server reported with equal timestamp, different signature.
    pub conflicts: HashSet<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    /// Not sent, or edited after it was sent.
    Unsent,
    /// Server holds this exact write.
    Accepted,
    /// Equal timestamp on the server, different signature.
    Conflicted,
    /// Server already had something newer or identical.
    Stale,
}

impl RoundOutcome {
    /// Record a note that was sealed and included in the request.
    pub fn record_sent(&mut self, note: &Note, encryption_type: EncryptionType) {
        self.sent.insert(
            note.id,
            SentNote {
                timestamp: note.updated_at,
                encryption_type,
            },
        );
    }

    fn verdict(&self, note: &Note) -> Verdict {
        match self.sent.get(&note.id) {
            Some(sent) if sent.timestamp == note.updated_at => {
                if self.updated.contains(&note.id) {
                    Verdict::Accepted
                } else if self.conflicts.contains(&note.id) {
                    Verdict::Conflicted
                } else {
                    Verdict::Stale
                }
            }
            _ => Verdict::Unsent,
        }
    }
}

/// Result of [`merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeResult {
    /// Merged note set, ordered by id.
    pub notes: Vec<Note>,
    /// Conflicts that are real: the server copy differs in content.
    pub conflicts: Vec<NoteId>,
}

/// Merge local notes `local` with the decrypted server snapshot `remote`.
///
/// - start from local notes minus tombstones (protected tombstones stay)
/// - remote tombstone removes the id; otherwise remote is adopted when the
///   id is absent or remote `updated_at` is strictly greater
/// - protected notes (pending and not accepted this round) are never
///   replaced or removed
///
/// A conflict whose server copy has the same content as the local note is
/// a re-encryption of the same write, so it settles like an acceptance.
pub fn merge(local: &[Note], remote: &[Note], outcome: &RoundOutcome) -> MergeResult {
    let remote_by_id: HashMap<i64, &Note> = remote.iter().map(|n| (n.id, n)).collect();

    let mut result: BTreeMap<i64, Note> = BTreeMap::new();
    let mut protected: HashSet<i64> = HashSet::new();
    let mut conflicts = Vec::new();

    for note in local {
        let verdict = match outcome.verdict(note) {
            Verdict::Conflicted if same_content(note, remote_by_id.get(&note.id).copied()) => {
                Verdict::Accepted
            }
            Verdict::Conflicted => {
                conflicts.push(note.note_id());
                Verdict::Conflicted
            }
            other => other,
        };

        let is_protected = note.pending_sync && verdict != Verdict::Accepted;
        if note.deleted && !is_protected {
            continue;
        }

        let mut kept = note.clone();
        if kept.pending_sync && matches!(verdict, Verdict::Accepted | Verdict::Stale) {
            kept.pending_sync = false;
            if let Some(sent) = outcome.sent.get(&note.id) {
                kept.encryption_type = sent.encryption_type;
            }
        }
        if is_protected {
            protected.insert(note.id);
        }
        result.insert(note.id, kept);
    }

    for remote_note in remote {
        if protected.contains(&remote_note.id) {
            continue;
        }
        if remote_note.deleted {
            result.remove(&remote_note.id);
            continue;
        }
        match result.get(&remote_note.id) {
            Some(local_note) if remote_note.updated_at <= local_note.updated_at => {}
            _ => {
                let mut adopted = remote_note.clone();
                adopted.pending_sync = false;
                result.insert(adopted.id, adopted);
            }
        }
    }

    MergeResult {
        notes: result.into_values().collect(),
        conflicts,
    }
}

fn same_content(local: &Note, remote: Option<&Note>) -> bool {
    remote.is_some_and(|r| r.payload() == local.payload())
}

/// Whether `note` is a tombstone older than the retention window.
pub fn is_expired_tombstone(note: &Note, now_ms: i64, retention_ms: i64) -> bool {
    note.deleted && note.updated_at < now_ms.saturating_sub(retention_ms)
}

/// Drop tombstones older than the retention window. Returns how many.
pub fn prune_tombstones(notes: &mut Vec<Note>, now_ms: i64, retention_ms: i64) -> usize {
    let before = notes.len();
    notes.retain(|n| !is_expired_tombstone(n, now_ms, retention_ms));
    before - notes.len()
}
