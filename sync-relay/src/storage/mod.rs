//! Storage layer for sync-relay.
//!
//! Holds the latest envelope per (owner, note) and per-owner bookkeeping.
//! Envelopes are opaque here: the relay compares timestamps and signatures,
//! it never looks inside `data`.

mod sqlite;

pub use sqlite::SqliteReplicaStore;

use crate::error::StorageError;
use async_trait::async_trait;
use sync_types::{OwnerId, WireEnvelope};

/// Result of reconciling one sync request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Every stored envelope for the owner after the writes.
    pub snapshot: Vec<WireEnvelope>,
    /// Ids whose incoming envelope became current (or was deleted).
    pub updated: Vec<String>,
    /// Ids with an equal timestamp but a different signature.
    pub conflicts: Vec<String>,
}

/// Per-owner bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    /// Owner id (hex).
    pub owner_id: String,
    /// First sync, ms since epoch.
    pub first_seen: i64,
    /// Most recent sync, ms since epoch.
    pub last_sync: i64,
    /// Number of syncs recorded.
    pub sync_count: i64,
    /// Latest ML-KEM encapsulation key sent by the owner (base64).
    pub pq_public_key: Option<String>,
    /// The owner has announced a post-quantum key.
    pub upgradeable: bool,
}

/// One row of the sync log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLogEntry {
    /// Owner id (hex).
    pub owner_id: String,
    /// When the sync ran, ms since epoch.
    pub synced_at: i64,
    /// Envelopes in the request.
    pub notes_received: i64,
    /// Envelopes in the returned snapshot.
    pub notes_returned: i64,
    /// Ids reported as updated.
    pub updated: i64,
    /// Ids reported as conflicting.
    pub conflicts: i64,
}

/// Row counts for the metrics endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Known accounts.
    pub accounts: u64,
    /// Stored envelopes across all owners.
    pub envelopes: u64,
}

/// Trait for replica storage backends.
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    /// Apply one sync request atomically.
    ///
    /// For each incoming envelope: when nothing is stored or the stored
    /// timestamp is strictly older, the incoming envelope wins (a tombstone
    /// deletes the row) and its id is reported as updated. An equal
    /// timestamp with a different signature is reported as a conflict and
    /// nothing is written. Anything else is ignored.
    ///
    /// The account bookkeeping and a sync log row are written in the same
    /// transaction, and the snapshot is read inside it.
    async fn reconcile(
        &self,
        owner: &OwnerId,
        incoming: &[WireEnvelope],
        pq_public_key: Option<&str>,
    ) -> Result<ReconcileOutcome, StorageError>;

    /// Every stored envelope for `owner`.
    async fn snapshot(&self, owner: &OwnerId) -> Result<Vec<WireEnvelope>, StorageError>;

    /// Bookkeeping for `owner`, if it has ever synced.
    async fn account(&self, owner: &OwnerId) -> Result<Option<AccountRecord>, StorageError>;

    /// Most recent sync log rows for `owner`, newest first.
    async fn recent_syncs(
        &self,
        owner: &OwnerId,
        limit: u32,
    ) -> Result<Vec<SyncLogEntry>, StorageError>;

    /// Ping the backing store.
    async fn health(&self) -> Result<(), StorageError>;

    /// Row counts.
    async fn stats(&self) -> Result<StoreStats, StorageError>;

    /// Forget accounts whose last sync is before `cutoff_ms`.
    ///
    /// Only the bookkeeping goes; stored envelopes are kept.
    /// Returns the number of accounts removed.
    async fn purge_inactive_accounts(&self, cutoff_ms: i64) -> Result<u64, StorageError>;

    /// Drop sync log rows older than `cutoff_ms`.
    ///
    /// Returns the number of rows removed.
    async fn purge_sync_log(&self, cutoff_ms: i64) -> Result<u64, StorageError>;
}
