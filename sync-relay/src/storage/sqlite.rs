//! SQLite storage backend for sync-relay.

use super::{AccountRecord, ReconcileOutcome, ReplicaStore, StoreStats, SyncLogEntry};
use crate::error::StorageError;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use std::cmp::Ordering;
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use sync_types::{OwnerId, WireEnvelope};

/// SQLite-based replica storage.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteReplicaStore {
    pool: SqlitePool,
}

impl SqliteReplicaStore {
    /// Create a new SQLite store from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StorageError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // One connection: every connection to ":memory:" is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS envelopes (
                owner_id TEXT NOT NULL,
                note_id TEXT NOT NULL,
                data TEXT NOT NULL,
                nonce TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                signature TEXT NOT NULL,
                version INTEGER NOT NULL,
                signature_version INTEGER NOT NULL,
                received_at INTEGER NOT NULL,
                PRIMARY KEY (owner_id, note_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                owner_id TEXT PRIMARY KEY,
                first_seen INTEGER NOT NULL,
                last_sync INTEGER NOT NULL,
                sync_count INTEGER NOT NULL DEFAULT 0,
                pq_public_key TEXT,
                upgradeable INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                synced_at INTEGER NOT NULL,
                notes_received INTEGER NOT NULL,
                notes_returned INTEGER NOT NULL,
                updated INTEGER NOT NULL,
                conflicts INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        // Create indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_accounts_last_sync ON accounts(last_sync)")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_log_synced_at ON sync_log(synced_at)")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sync_log_owner ON sync_log(owner_id, synced_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    fn current_timestamp_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Upsert the account row. Runs first in a reconcile so the transaction
/// holds the write lock before it reads anything.
async fn touch_account(
    conn: &mut SqliteConnection,
    owner_id: &str,
    now: i64,
    pq_public_key: Option<&str>,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO accounts (owner_id, first_seen, last_sync, sync_count, pq_public_key, upgradeable)
        VALUES (?1, ?2, ?2, 1, ?3, ?3 IS NOT NULL)
        ON CONFLICT(owner_id) DO UPDATE SET
            last_sync = excluded.last_sync,
            sync_count = accounts.sync_count + 1,
            pq_public_key = COALESCE(excluded.pq_public_key, accounts.pq_public_key),
            upgradeable = accounts.upgradeable OR excluded.upgradeable
        "#,
    )
    .bind(owner_id)
    .bind(now)
    .bind(pq_public_key)
    .execute(&mut *conn)
    .await
    .map_err(StorageError::Database)?;

    Ok(())
}

async fn record_sync(
    conn: &mut SqliteConnection,
    owner_id: &str,
    now: i64,
    received: usize,
    outcome: &ReconcileOutcome,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO sync_log (owner_id, synced_at, notes_received, notes_returned, updated, conflicts)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(owner_id)
    .bind(now)
    .bind(received as i64)
    .bind(outcome.snapshot.len() as i64)
    .bind(outcome.updated.len() as i64)
    .bind(outcome.conflicts.len() as i64)
    .execute(&mut *conn)
    .await
    .map_err(StorageError::Database)?;

    Ok(())
}

async fn load_snapshot(
    conn: &mut SqliteConnection,
    owner_id: &str,
) -> Result<Vec<WireEnvelope>, StorageError> {
    let rows = sqlx::query_as::<_, EnvelopeRow>(
        r#"
        SELECT note_id, data, nonce, timestamp, signature, version, signature_version
        FROM envelopes
        WHERE owner_id = ?1
        ORDER BY timestamp ASC, note_id ASC
        "#,
    )
    .bind(owner_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(StorageError::Database)?;

    rows.into_iter().map(|row| row.try_into()).collect()
}

#[async_trait]
impl ReplicaStore for SqliteReplicaStore {
    async fn reconcile(
        &self,
        owner: &OwnerId,
        incoming: &[WireEnvelope],
        pq_public_key: Option<&str>,
    ) -> Result<ReconcileOutcome, StorageError> {
        let owner_id = owner.to_string();
        let now = Self::current_timestamp_ms();
        let mut tx = self.pool.begin().await.map_err(StorageError::Database)?;

        touch_account(&mut tx, &owner_id, now, pq_public_key).await?;

        let mut outcome = ReconcileOutcome::default();
        for envelope in incoming {
            let stored: Option<(i64, String)> = sqlx::query_as(
                "SELECT timestamp, signature FROM envelopes WHERE owner_id = ?1 AND note_id = ?2",
            )
            .bind(&owner_id)
            .bind(&envelope.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StorageError::Database)?;

            let wins = match stored {
                None => true,
                Some((timestamp, signature)) => match timestamp.cmp(&envelope.timestamp) {
                    Ordering::Less => true,
                    Ordering::Equal => {
                        if signature != envelope.signature {
                            outcome.conflicts.push(envelope.id.clone());
                        }
                        false
                    }
                    Ordering::Greater => false,
                },
            };
            if !wins {
                continue;
            }

            if envelope.is_deleted() {
                sqlx::query("DELETE FROM envelopes WHERE owner_id = ?1 AND note_id = ?2")
                    .bind(&owner_id)
                    .bind(&envelope.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(StorageError::Database)?;
            } else {
                sqlx::query(
                    r#"
                    INSERT INTO envelopes
                        (owner_id, note_id, data, nonce, timestamp, signature, version, signature_version, received_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT(owner_id, note_id) DO UPDATE SET
                        data = excluded.data,
                        nonce = excluded.nonce,
                        timestamp = excluded.timestamp,
                        signature = excluded.signature,
                        version = excluded.version,
                        signature_version = excluded.signature_version,
                        received_at = excluded.received_at
                    "#,
                )
                .bind(&owner_id)
                .bind(&envelope.id)
                .bind(&envelope.data)
                .bind(&envelope.nonce)
                .bind(envelope.timestamp)
                .bind(&envelope.signature)
                .bind(i64::from(envelope.version))
                .bind(i64::from(envelope.signature_version))
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(StorageError::Database)?;
            }
            outcome.updated.push(envelope.id.clone());
        }

        outcome.snapshot = load_snapshot(&mut tx, &owner_id).await?;
        record_sync(&mut tx, &owner_id, now, incoming.len(), &outcome).await?;

        tx.commit().await.map_err(StorageError::Database)?;
        Ok(outcome)
    }

    async fn snapshot(&self, owner: &OwnerId) -> Result<Vec<WireEnvelope>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::Database)?;
        load_snapshot(&mut conn, &owner.to_string()).await
    }

    async fn account(&self, owner: &OwnerId) -> Result<Option<AccountRecord>, StorageError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT owner_id, first_seen, last_sync, sync_count, pq_public_key, upgradeable
            FROM accounts
            WHERE owner_id = ?1
            "#,
        )
        .bind(owner.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(row.map(Into::into))
    }

    async fn recent_syncs(
        &self,
        owner: &OwnerId,
        limit: u32,
    ) -> Result<Vec<SyncLogEntry>, StorageError> {
        let rows = sqlx::query_as::<_, SyncLogRow>(
            r#"
            SELECT owner_id, synced_at, notes_received, notes_returned, updated, conflicts
            FROM sync_log
            WHERE owner_id = ?1
            ORDER BY synced_at DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(owner.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn health(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StorageError> {
        let accounts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Database)?;
        let envelopes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM envelopes")
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(StoreStats {
            accounts: accounts as u64,
            envelopes: envelopes as u64,
        })
    }

    async fn purge_inactive_accounts(&self, cutoff_ms: i64) -> Result<u64, StorageError> {
        // Envelopes stay: a returning owner or a new device still needs them
        let result = sqlx::query("DELETE FROM accounts WHERE last_sync < ?1")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected())
    }

    async fn purge_sync_log(&self, cutoff_ms: i64) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM sync_log WHERE synced_at < ?1")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected())
    }
}

/// Internal row type for envelope queries.
#[derive(sqlx::FromRow)]
struct EnvelopeRow {
    note_id: String,
    data: String,
    nonce: String,
    timestamp: i64,
    signature: String,
    version: i64,
    signature_version: i64,
}

impl TryFrom<EnvelopeRow> for WireEnvelope {
    type Error = StorageError;

    fn try_from(row: EnvelopeRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: &str| StorageError::Corrupt {
            note_id: row.note_id.clone(),
            reason: reason.to_string(),
        };
        let version = u8::try_from(row.version).map_err(|_| corrupt("version out of range"))?;
        let signature_version = u8::try_from(row.signature_version)
            .map_err(|_| corrupt("signature version out of range"))?;

        Ok(WireEnvelope {
            id: row.note_id,
            data: row.data,
            nonce: row.nonce,
            timestamp: row.timestamp,
            signature: row.signature,
            version,
            signature_version,
            // Tombstones are never stored.
            deleted: None,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    owner_id: String,
    first_seen: i64,
    last_sync: i64,
    sync_count: i64,
    pq_public_key: Option<String>,
    upgradeable: bool,
}

impl From<AccountRow> for AccountRecord {
    fn from(row: AccountRow) -> Self {
        AccountRecord {
            owner_id: row.owner_id,
            first_seen: row.first_seen,
            last_sync: row.last_sync,
            sync_count: row.sync_count,
            pq_public_key: row.pq_public_key,
            upgradeable: row.upgradeable,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SyncLogRow {
    owner_id: String,
    synced_at: i64,
    notes_received: i64,
    notes_returned: i64,
    updated: i64,
    conflicts: i64,
}

impl From<SyncLogRow> for SyncLogEntry {
    fn from(row: SyncLogRow) -> Self {
        SyncLogEntry {
            owner_id: row.owner_id,
            synced_at: row.synced_at,
            notes_received: row.notes_received,
            notes_returned: row.notes_returned,
            updated: row.updated,
            conflicts: row.conflicts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(byte: u8) -> OwnerId {
        OwnerId::from_bytes(&[byte; 32]).unwrap()
    }

    fn envelope(id: u64, timestamp: i64, signature: &str) -> WireEnvelope {
        WireEnvelope {
            id: format!("{id:016x}"),
            data: "ZGF0YQ==".into(),
            nonce: "bm9uY2U=".into(),
            timestamp,
            signature: signature.into(),
            version: 1,
            signature_version: 1,
            deleted: None,
        }
    }

    fn tombstone(id: u64, timestamp: i64) -> WireEnvelope {
        WireEnvelope {
            deleted: Some(true),
            ..envelope(id, timestamp, "dG9tYg==")
        }
    }

    // ===========================================
    // Reconcile
    // ===========================================

    #[tokio::test]
    async fn first_sync_stores_everything() {
        let store = SqliteReplicaStore::in_memory().await.unwrap();
        let incoming = vec![envelope(1, 100, "a"), envelope(2, 200, "b")];

        let outcome = store.reconcile(&owner(1), &incoming, None).await.unwrap();

        assert_eq!(outcome.updated, vec![incoming[0].id.clone(), incoming[1].id.clone()]);
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.snapshot, incoming);
    }

    #[tokio::test]
    async fn newer_replaces_and_older_is_ignored() {
        let store = SqliteReplicaStore::in_memory().await.unwrap();
        store
            .reconcile(&owner(1), &[envelope(1, 100, "a")], None)
            .await
            .unwrap();

        let newer = envelope(1, 150, "b");
        let outcome = store.reconcile(&owner(1), &[newer.clone()], None).await.unwrap();
        assert_eq!(outcome.updated, vec![newer.id.clone()]);
        assert_eq!(outcome.snapshot, vec![newer.clone()]);

        let outcome = store
            .reconcile(&owner(1), &[envelope(1, 120, "c")], None)
            .await
            .unwrap();
        assert!(outcome.updated.is_empty());
        assert!(outcome.conflicts.is_empty());
        assert_eq!(outcome.snapshot, vec![newer]);
    }

    #[tokio::test]
    async fn equal_timestamp_different_signature_conflicts() {
        let store = SqliteReplicaStore::in_memory().await.unwrap();
        let original = envelope(1, 100, "a");
        store
            .reconcile(&owner(1), &[original.clone()], None)
            .await
            .unwrap();

        let outcome = store
            .reconcile(&owner(1), &[envelope(1, 100, "different")], None)
            .await
            .unwrap();
        assert_eq!(outcome.conflicts, vec![original.id.clone()]);
        assert!(outcome.updated.is_empty());
        // No write on conflict
        assert_eq!(outcome.snapshot, vec![original.clone()]);

        // Same signature is a plain resend
        let outcome = store.reconcile(&owner(1), &[original], None).await.unwrap();
        assert!(outcome.conflicts.is_empty());
        assert!(outcome.updated.is_empty());
    }

    #[tokio::test]
    async fn tombstone_deletes_row() {
        let store = SqliteReplicaStore::in_memory().await.unwrap();
        store
            .reconcile(&owner(1), &[envelope(1, 100, "a"), envelope(2, 100, "b")], None)
            .await
            .unwrap();

        let outcome = store
            .reconcile(&owner(1), &[tombstone(1, 200)], None)
            .await
            .unwrap();
        assert_eq!(outcome.updated, vec![format!("{:016x}", 1)]);
        assert_eq!(outcome.snapshot.len(), 1);
        assert_eq!(outcome.snapshot[0].id, format!("{:016x}", 2));
    }

    #[tokio::test]
    async fn stale_tombstone_is_ignored() {
        let store = SqliteReplicaStore::in_memory().await.unwrap();
        store
            .reconcile(&owner(1), &[envelope(1, 300, "a")], None)
            .await
            .unwrap();

        let outcome = store
            .reconcile(&owner(1), &[tombstone(1, 200)], None)
            .await
            .unwrap();
        assert!(outcome.updated.is_empty());
        assert_eq!(outcome.snapshot.len(), 1);
    }

    #[tokio::test]
    async fn tombstone_for_unknown_note_is_reported_not_stored() {
        let store = SqliteReplicaStore::in_memory().await.unwrap();
        let outcome = store
            .reconcile(&owner(1), &[tombstone(7, 100)], None)
            .await
            .unwrap();
        assert_eq!(outcome.updated.len(), 1);
        assert!(outcome.snapshot.is_empty());
    }

    #[tokio::test]
    async fn owners_are_isolated() {
        let store = SqliteReplicaStore::in_memory().await.unwrap();
        store
            .reconcile(&owner(1), &[envelope(1, 100, "a")], None)
            .await
            .unwrap();

        let outcome = store
            .reconcile(&owner(2), &[envelope(1, 50, "b")], None)
            .await
            .unwrap();
        // Same note id under another owner is a different row
        assert_eq!(outcome.updated.len(), 1);
        assert_eq!(outcome.snapshot[0].signature, "b");
        assert_eq!(store.snapshot(&owner(1)).await.unwrap()[0].signature, "a");
    }

    #[tokio::test]
    async fn empty_request_returns_snapshot() {
        let store = SqliteReplicaStore::in_memory().await.unwrap();
        store
            .reconcile(&owner(1), &[envelope(1, 100, "a")], None)
            .await
            .unwrap();

        let outcome = store.reconcile(&owner(1), &[], None).await.unwrap();
        assert_eq!(outcome.snapshot.len(), 1);
        assert!(outcome.updated.is_empty());
    }

    #[tokio::test]
    async fn post_quantum_versions_survive() {
        let store = SqliteReplicaStore::in_memory().await.unwrap();
        let pq = WireEnvelope {
            version: 2,
            signature_version: 2,
            ..envelope(1, 100, "a")
        };
        store
            .reconcile(&owner(1), &[pq.clone()], None)
            .await
            .unwrap();
        assert_eq!(store.snapshot(&owner(1)).await.unwrap(), vec![pq]);
    }

    // ===========================================
    // Bookkeeping
    // ===========================================

    #[tokio::test]
    async fn account_tracks_syncs() {
        let store = SqliteReplicaStore::in_memory().await.unwrap();
        assert!(store.account(&owner(1)).await.unwrap().is_none());

        store.reconcile(&owner(1), &[], None).await.unwrap();
        store.reconcile(&owner(1), &[], None).await.unwrap();

        let account = store.account(&owner(1)).await.unwrap().unwrap();
        assert_eq!(account.owner_id, owner(1).to_string());
        assert_eq!(account.sync_count, 2);
        assert!(account.last_sync >= account.first_seen);
        assert!(!account.upgradeable);
        assert!(account.pq_public_key.is_none());
    }

    #[tokio::test]
    async fn pq_key_marks_account_upgradeable() {
        let store = SqliteReplicaStore::in_memory().await.unwrap();
        store.reconcile(&owner(1), &[], None).await.unwrap();
        store
            .reconcile(&owner(1), &[], Some("cHEta2V5"))
            .await
            .unwrap();
        // A later sync without the key keeps it
        store.reconcile(&owner(1), &[], None).await.unwrap();

        let account = store.account(&owner(1)).await.unwrap().unwrap();
        assert!(account.upgradeable);
        assert_eq!(account.pq_public_key.as_deref(), Some("cHEta2V5"));
        assert_eq!(account.sync_count, 3);
    }

    #[tokio::test]
    async fn sync_log_records_counts() {
        let store = SqliteReplicaStore::in_memory().await.unwrap();
        store
            .reconcile(&owner(1), &[envelope(1, 100, "a"), envelope(2, 100, "b")], None)
            .await
            .unwrap();
        store
            .reconcile(&owner(1), &[envelope(1, 100, "x")], None)
            .await
            .unwrap();

        let log = store.recent_syncs(&owner(1), 10).await.unwrap();
        assert_eq!(log.len(), 2);
        // Newest first
        assert_eq!(log[0].notes_received, 1);
        assert_eq!(log[0].notes_returned, 2);
        assert_eq!(log[0].updated, 0);
        assert_eq!(log[0].conflicts, 1);
        assert_eq!(log[1].updated, 2);

        assert_eq!(store.recent_syncs(&owner(1), 1).await.unwrap().len(), 1);
        assert!(store.recent_syncs(&owner(2), 10).await.unwrap().is_empty());
    }

    // ===========================================
    // Cleanup
    // ===========================================

    #[tokio::test]
    async fn purge_inactive_accounts_keeps_envelopes() {
        let store = SqliteReplicaStore::in_memory().await.unwrap();
        store
            .reconcile(&owner(1), &[envelope(1, 100, "a")], None)
            .await
            .unwrap();

        // Cutoff in the past: nothing is inactive yet
        assert_eq!(store.purge_inactive_accounts(0).await.unwrap(), 0);
        assert!(store.account(&owner(1)).await.unwrap().is_some());

        let future = SqliteReplicaStore::current_timestamp_ms() + 60_000;
        assert_eq!(store.purge_inactive_accounts(future).await.unwrap(), 1);
        assert!(store.account(&owner(1)).await.unwrap().is_none());
        assert_eq!(
            store.snapshot(&owner(1)).await.unwrap(),
            vec![envelope(1, 100, "a")]
        );

        // The owner comes back: the account starts over, the notes are there
        let outcome = store.reconcile(&owner(1), &[], None).await.unwrap();
        assert_eq!(outcome.snapshot.len(), 1);
        let account = store.account(&owner(1)).await.unwrap().unwrap();
        assert_eq!(account.sync_count, 1);
    }

    #[tokio::test]
    async fn purge_sync_log_respects_cutoff() {
        let store = SqliteReplicaStore::in_memory().await.unwrap();
        store.reconcile(&owner(1), &[], None).await.unwrap();
        store.reconcile(&owner(2), &[], None).await.unwrap();

        assert_eq!(store.purge_sync_log(0).await.unwrap(), 0);
        let future = SqliteReplicaStore::current_timestamp_ms() + 60_000;
        assert_eq!(store.purge_sync_log(future).await.unwrap(), 2);
        assert!(store.recent_syncs(&owner(1), 10).await.unwrap().is_empty());
        // Accounts are untouched
        assert!(store.account(&owner(1)).await.unwrap().is_some());
    }

    // ===========================================
    // Health and stats
    // ===========================================

    #[tokio::test]
    async fn health_and_stats() {
        let store = SqliteReplicaStore::in_memory().await.unwrap();
        store.health().await.unwrap();
        assert_eq!(store.stats().await.unwrap(), StoreStats::default());

        store
            .reconcile(&owner(1), &[envelope(1, 100, "a"), envelope(2, 100, "b")], None)
            .await
            .unwrap();
        store
            .reconcile(&owner(2), &[envelope(1, 100, "c")], None)
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.accounts, 2);
        assert_eq!(stats.envelopes, 3);
    }

    #[tokio::test]
    async fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.db");

        {
            let store = SqliteReplicaStore::new(&path).await.unwrap();
            store
                .reconcile(&owner(1), &[envelope(1, 100, "a")], Some("a2V5"))
                .await
                .unwrap();
        }

        let reopened = SqliteReplicaStore::new(&path).await.unwrap();
        assert_eq!(reopened.snapshot(&owner(1)).await.unwrap().len(), 1);
        assert!(reopened.account(&owner(1)).await.unwrap().unwrap().upgradeable);
    }
}
