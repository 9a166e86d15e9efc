//! # sync-core
//!
//! Pure logic for notesync (no I/O, instant tests).
//!
//! This crate implements the note model, the merge algorithm and the sync
//! retry state machine without any network or disk I/O, enabling fast unit
//! tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - One merge algorithm shared by every client surface
//!
//! The actual I/O (network, disk, crypto) is performed by `sync-client`,
//! which interprets the actions produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod merge;
pub mod note;
pub mod state;

pub use merge::{
    is_expired_tombstone, merge, prune_tombstones, MergeResult, RoundOutcome, SentNote,
    DEFAULT_TOMBSTONE_RETENTION_MS,
};
pub use note::{EncryptionType, Note, NotePayload};
pub use state::{Action, Event, RetryPolicy, SyncEvent, SyncState};
