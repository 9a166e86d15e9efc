//! SyncClient - the main interface for notesync.
//!
//! This module provides [`SyncClient`], which runs one sync cycle at a time:
//! seal local notes, exchange them with the server, open what comes back and
//! merge it into the local store.
//!
//! # Architecture
//!
//! SyncClient uses the pure retry state machine from sync-core and
//! interprets its actions to perform the actual I/O via [`SyncTransport`].
//!
//! ```text
//! Application → SyncClient → SyncTransport → Network
//!                   ↓
//!              sync-core (state machine + merge)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sync_client::{ClientConfig, FileNoteStore, KeyBundle, LocalNotes, SyncClient};
//!
//! let keys = Arc::new(KeyBundle::derive(&phrase, &DeriveOptions::default())?);
//! let notes = Arc::new(LocalNotes::new(FileNoteStore::new("notes.json")));
//! let client = SyncClient::with_http(keys, notes, ClientConfig::default())?;
//!
//! let report = client.sync().await?;
//! println!("{} sent, {} received", report.sent, report.received);
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sync_core::{
    is_expired_tombstone, merge, prune_tombstones, Action, EncryptionType, Event, RetryPolicy,
    RoundOutcome, SyncEvent, SyncState, DEFAULT_TOMBSTONE_RETENTION_MS,
};
use sync_types::{Envelope, NoteId, SyncRequest};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::cipher::EncryptPolicy;
use crate::crypto::CryptoError;
use crate::keys::KeyBundle;
use crate::signer::{self, Phase, SealError};
use crate::store::{LocalNotes, NoteStore, StoreError};
use crate::transport::{HttpTransport, SyncTransport, TransportError};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error that retrying will not fix.
    #[error("transmit failed: {0}")]
    Transport(#[from] TransportError),

    /// Local store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Crypto error.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Server requires a newer client. Never retried.
    #[error("client version rejected: {0}")]
    VersionRejected(String),

    /// Every attempt failed.
    #[error("{phase} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Stage the final attempt failed in.
        phase: Phase,
        /// Error from the final attempt.
        #[source]
        last: TransportError,
    },

    /// Internal protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Stage of the sync pipeline this error came from, when it has one.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            ClientError::Transport(_) | ClientError::VersionRejected(_) => Some(Phase::Transmit),
            ClientError::RetriesExhausted { phase, .. } => Some(*phase),
            ClientError::Crypto(_) | ClientError::Store(_) | ClientError::Protocol(_) => None,
        }
    }
}

/// Configuration for SyncClient.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay base URL.
    pub server_url: String,
    /// Version reported to the server's version gate.
    pub client_version: String,
    /// Minimum time between the end of one sync and the start of the next.
    pub min_sync_interval: Duration,
    /// Retry and backoff parameters.
    pub retry: RetryPolicy,
    /// How long local tombstones are kept (and re-sent) before pruning.
    pub tombstone_retention: Duration,
    /// Scheme selection for outgoing notes.
    pub encrypt_policy: EncryptPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3222".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            min_sync_interval: Duration::from_secs(2),
            retry: RetryPolicy::default(),
            tombstone_retention: Duration::from_millis(DEFAULT_TOMBSTONE_RETENTION_MS as u64),
            encrypt_policy: EncryptPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Set the relay URL.
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// Set the reported client version.
    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    /// Set the throttle interval.
    pub fn with_min_sync_interval(mut self, interval: Duration) -> Self {
        self.min_sync_interval = interval;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the tombstone retention window.
    pub fn with_tombstone_retention(mut self, retention: Duration) -> Self {
        self.tombstone_retention = retention;
        self
    }

    /// Set the encryption policy.
    pub fn with_encrypt_policy(mut self, policy: EncryptPolicy) -> Self {
        self.encrypt_policy = policy;
        self
    }

    fn retention_ms(&self) -> i64 {
        i64::try_from(self.tombstone_retention.as_millis()).unwrap_or(i64::MAX)
    }
}

/// What one sync did.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Envelopes sent.
    pub sent: usize,
    /// Envelopes in the server snapshot.
    pub received: usize,
    /// Ids the server made current.
    pub updated: usize,
    /// Notes whose server copy differs at the same timestamp.
    pub conflicts: Vec<NoteId>,
    /// Per-note failures; those notes were left as they were.
    pub skipped: Vec<SealError>,
    /// Tombstones pruned after the merge.
    pub pruned: usize,
    /// Attempts it took.
    pub attempts: u32,
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// The main sync client.
///
/// At most one sync runs at a time; calls made while one is running wait
/// for it and then for the throttle interval.
pub struct SyncClient<T, S> {
    keys: Arc<KeyBundle>,
    transport: T,
    notes: Arc<LocalNotes<S>>,
    config: ClientConfig,
    /// Completion time of the last sync. Held for the whole cycle.
    gate: Mutex<Option<Instant>>,
}

impl<S: NoteStore> SyncClient<HttpTransport, S> {
    /// Create a client talking HTTP to `config.server_url`.
    pub fn with_http(
        keys: Arc<KeyBundle>,
        notes: Arc<LocalNotes<S>>,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(&config.server_url)?;
        Ok(Self::new(keys, transport, notes, config))
    }
}

impl<T: SyncTransport, S: NoteStore> SyncClient<T, S> {
    /// Create a new SyncClient.
    pub fn new(
        keys: Arc<KeyBundle>,
        transport: T,
        notes: Arc<LocalNotes<S>>,
        config: ClientConfig,
    ) -> Self {
        Self {
            keys,
            transport,
            notes,
            config,
            gate: Mutex::new(None),
        }
    }

    /// The local note store this client merges into.
    pub fn notes(&self) -> &Arc<LocalNotes<S>> {
        &self.notes
    }

    /// The key bundle.
    pub fn keys(&self) -> &Arc<KeyBundle> {
        &self.keys
    }

    /// The configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Synchronize once, with health checks and retries.
    ///
    /// Idempotent: running it again with nothing changed sends the same
    /// notes and leaves the store as it was.
    pub async fn sync(&self) -> Result<SyncReport, ClientError> {
        let mut gate = self.gate.lock().await;
        self.throttle(*gate).await;
        let result = self.run().await;
        *gate = Some(Instant::now());
        result
    }

    /// Like [`sync`](Self::sync), but returns `Ok(None)` immediately when a
    /// sync is already running. Meant for auto-sync after local edits.
    pub async fn sync_if_idle(&self) -> Result<Option<SyncReport>, ClientError> {
        let Ok(mut gate) = self.gate.try_lock() else {
            tracing::debug!("sync already in progress, skipping");
            return Ok(None);
        };
        self.throttle(*gate).await;
        let result = self.run().await;
        *gate = Some(Instant::now());
        result.map(Some)
    }

    async fn throttle(&self, last: Option<Instant>) {
        let Some(last) = last else { return };
        let ready_at = last + self.config.min_sync_interval;
        if Instant::now() < ready_at {
            tracing::debug!(
                wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                "throttling sync"
            );
            tokio::time::sleep_until(ready_at).await;
        }
    }

    /// Drive the retry state machine until it completes or gives up.
    async fn run(&self) -> Result<SyncReport, ClientError> {
        let policy = &self.config.retry;
        let (mut state, mut actions) = SyncState::new().on_event(Event::SyncRequested, policy);
        let mut report: Option<SyncReport> = None;
        let mut last_error: Option<TransportError> = None;

        loop {
            let mut next = None;

            for action in actions {
                match action {
                    Action::CheckHealth => {
                        next = Some(self.check_health(&mut last_error).await);
                    }
                    Action::SendSync => match self.round().await {
                        Ok(round) => {
                            report = Some(round);
                            next = Some(Event::SyncSucceeded);
                        }
                        Err(ClientError::Transport(e)) => {
                            next = Some(transport_event(e, &mut last_error)?);
                        }
                        Err(e) => return Err(e),
                    },
                    Action::StartRetryTimer { delay } => {
                        tokio::time::sleep(delay).await;
                        next = Some(Event::RetryTimer);
                    }
                    Action::EmitEvent(event) => {
                        if let Some(done) = self.finish(event, &mut report, &mut last_error) {
                            return done;
                        }
                    }
                }
            }

            let event = next
                .ok_or_else(|| ClientError::Protocol(format!("sync stalled in {state:?}")))?;
            (state, actions) = state.on_event(event, policy);
        }
    }

    async fn check_health(&self, last_error: &mut Option<TransportError>) -> Event {
        match self.transport.health().await {
            Ok(report) if report.is_healthy() => Event::HealthOk,
            Ok(report) => {
                let error = TransportError::Unhealthy {
                    service_ok: report.service_ok(),
                    store_ok: report.store_ok(),
                };
                let event = Event::HealthFailed {
                    error: error.to_string(),
                };
                *last_error = Some(error);
                event
            }
            Err(TransportError::RateLimited { retry_after }) => {
                *last_error = Some(TransportError::RateLimited { retry_after });
                Event::RateLimited { retry_after }
            }
            Err(TransportError::VersionRejected { message }) => Event::VersionRejected { message },
            Err(e) => {
                let event = Event::HealthFailed {
                    error: e.to_string(),
                };
                *last_error = Some(e);
                event
            }
        }
    }

    /// Handle an emitted event. `Some` ends the run.
    fn finish(
        &self,
        event: SyncEvent,
        report: &mut Option<SyncReport>,
        last_error: &mut Option<TransportError>,
    ) -> Option<Result<SyncReport, ClientError>> {
        match event {
            SyncEvent::Completed { attempts } => {
                let mut done = report.take()?;
                done.attempts = attempts;
                tracing::info!(
                    sent = done.sent,
                    received = done.received,
                    updated = done.updated,
                    conflicts = done.conflicts.len(),
                    skipped = done.skipped.len(),
                    pruned = done.pruned,
                    attempts,
                    "sync completed"
                );
                Some(Ok(done))
            }
            SyncEvent::AttemptFailed {
                attempt,
                error,
                retry_in,
            } => {
                tracing::warn!(
                    attempt,
                    retry_in_ms = retry_in.as_millis() as u64,
                    "sync attempt failed: {}",
                    error
                );
                None
            }
            SyncEvent::GaveUp { attempts, error } => {
                tracing::warn!(attempts, "sync gave up: {}", error);
                let last = last_error
                    .take()
                    .unwrap_or(TransportError::Unreachable(error));
                Some(Err(ClientError::RetriesExhausted {
                    attempts,
                    phase: Phase::Transmit,
                    last,
                }))
            }
            SyncEvent::UpgradeRequired { message } => {
                tracing::warn!("server requires a newer client: {}", message);
                Some(Err(ClientError::VersionRejected(message)))
            }
        }
    }

    /// One request/response cycle: seal, send, open, merge, prune.
    async fn round(&self) -> Result<SyncReport, ClientError> {
        let now = now_ms();
        let retention = self.config.retention_ms();
        let local = self.notes.snapshot().await?;

        let mut outcome = RoundOutcome::default();
        let mut skipped = Vec::new();
        let mut outgoing = Vec::with_capacity(local.len());

        for note in local
            .iter()
            .filter(|n| !is_expired_tombstone(n, now, retention))
        {
            match signer::seal(&self.keys, note, &self.config.encrypt_policy) {
                Ok(envelope) => {
                    outcome.record_sent(note, EncryptionType::from(envelope.scheme));
                    outgoing.push(envelope.to_wire());
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    skipped.push(e);
                }
            }
        }

        let request = SyncRequest {
            public_key: self.keys.owner_id().to_string(),
            notes: outgoing,
            client_version: self.config.client_version.clone(),
            pq_public_key: self.keys.pq_public_key_base64(),
        };
        let response = self.transport.sync(&request).await?;

        let mut remote = Vec::with_capacity(response.notes.len());
        for wire in &response.notes {
            let envelope = match Envelope::try_from(wire) {
                Ok(envelope) => envelope,
                Err(e) => {
                    let error = SealError::new(wire.id.clone(), Phase::Decode, e.into());
                    tracing::warn!("{}", error);
                    skipped.push(error);
                    continue;
                }
            };
            match signer::open(&self.keys, &envelope) {
                Ok(note) => {
                    tracing::debug!(id = %envelope.id, "opened remote note");
                    remote.push(note);
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    skipped.push(e);
                }
            }
        }

        outcome.updated = parse_ids(&response.updated);
        outcome.conflicts = parse_ids(&response.conflicts);

        let (conflicts, pruned) = self
            .notes
            .update(|notes| {
                let merged = merge(notes, &remote, &outcome);
                *notes = merged.notes;
                let pruned = prune_tombstones(notes, now, retention);
                Ok::<_, StoreError>((merged.conflicts, pruned))
            })
            .await?;

        for id in &conflicts {
            tracing::warn!(id = %id, "conflict: server holds a different version at the same time");
        }

        Ok(SyncReport {
            sent: request.notes.len(),
            received: response.notes.len(),
            updated: outcome.updated.len(),
            conflicts,
            skipped,
            pruned,
            attempts: 0,
        })
    }
}

/// Map a failed sync request onto a state machine event, or a fatal error.
fn transport_event(
    error: TransportError,
    last_error: &mut Option<TransportError>,
) -> Result<Event, ClientError> {
    let event = match &error {
        TransportError::RateLimited { retry_after } => Some(Event::RateLimited {
            retry_after: *retry_after,
        }),
        TransportError::VersionRejected { message } => {
            return Ok(Event::VersionRejected {
                message: message.clone(),
            })
        }
        e if e.is_transient() => Some(Event::TransportFailed {
            error: e.to_string(),
        }),
        _ => None,
    };
    let Some(event) = event else {
        return Err(ClientError::Transport(error));
    };
    *last_error = Some(error);
    Ok(event)
}

fn parse_ids(ids: &[String]) -> HashSet<i64> {
    ids.iter()
        .filter_map(|s| match NoteId::from_hex(s) {
            Some(id) => Some(id.value()),
            None => {
                tracing::debug!(id = %s, "ignoring unparseable id from server");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::test_support::test_bundle;
    use crate::store::MemoryNoteStore;
    use crate::transport::MockTransport;
    use sync_core::Note;
    use sync_types::{HealthReport, SyncResponse, WireEnvelope};

    type TestClient = SyncClient<MockTransport, MemoryNoteStore>;

    fn test_config() -> ClientConfig {
        ClientConfig::default()
            .with_retry(RetryPolicy::immediate(3))
            .with_min_sync_interval(Duration::ZERO)
    }

    fn client(keys: Arc<KeyBundle>, notes: Vec<Note>, transport: MockTransport) -> TestClient {
        client_with_config(keys, notes, transport, test_config())
    }

    fn client_with_config(
        keys: Arc<KeyBundle>,
        notes: Vec<Note>,
        transport: MockTransport,
        config: ClientConfig,
    ) -> TestClient {
        let store = MemoryNoteStore::with_notes(notes);
        SyncClient::new(keys, transport, Arc::new(LocalNotes::new(store)), config)
    }

    fn seal_wire(keys: &KeyBundle, note: &Note) -> WireEnvelope {
        signer::seal(keys, note, &EncryptPolicy::default())
            .unwrap()
            .to_wire()
    }

    // ===========================================
    // Configuration Tests
    // ===========================================

    #[test]
    fn config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, "http://localhost:3222");
        assert_eq!(config.min_sync_interval, Duration::from_secs(2));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retention_ms(), DEFAULT_TOMBSTONE_RETENTION_MS);
        assert_eq!(config.client_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn config_builder_pattern() {
        let config = ClientConfig::default()
            .with_server_url("https://notes.example")
            .with_client_version("9.9.9")
            .with_min_sync_interval(Duration::from_secs(5))
            .with_tombstone_retention(Duration::from_secs(60));

        assert_eq!(config.server_url, "https://notes.example");
        assert_eq!(config.client_version, "9.9.9");
        assert_eq!(config.min_sync_interval, Duration::from_secs(5));
        assert_eq!(config.retention_ms(), 60_000);
    }

    // ===========================================
    // Round Tests
    // ===========================================

    #[tokio::test]
    async fn sync_sends_sealed_notes_and_clears_pending() {
        let keys = Arc::new(test_bundle(false));
        let transport = MockTransport::new();
        let note = Note::new(now_ms(), "Groceries", "eggs");
        let client = client(keys.clone(), vec![note.clone()], transport.clone());

        let report = client.sync().await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.attempts, 1);
        assert!(report.skipped.is_empty());

        let request = transport.last_request().unwrap();
        assert_eq!(request.public_key, keys.owner_id().to_string());
        assert_eq!(request.client_version, env!("CARGO_PKG_VERSION"));
        assert!(request.pq_public_key.is_none());
        assert_eq!(request.notes[0].id, note.note_id().to_hex());
        assert!(!request.notes[0].data.contains("Groceries"));

        let stored = client.notes().snapshot().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].pending_sync);
        assert_eq!(stored[0].encryption_type, EncryptionType::Classical);
    }

    #[tokio::test]
    async fn post_quantum_bundle_sends_pq_key() {
        let keys = Arc::new(test_bundle(true));
        let transport = MockTransport::new();
        let client = client(keys, vec![Note::new(now_ms(), "a", "b")], transport.clone());

        client.sync().await.unwrap();

        let request = transport.last_request().unwrap();
        assert!(request.pq_public_key.is_some());
        assert_eq!(request.notes[0].version, 2);
        let stored = client.notes().snapshot().await.unwrap();
        assert_eq!(stored[0].encryption_type, EncryptionType::PostQuantum);
    }

    #[tokio::test]
    async fn second_device_recovers_notes() {
        let keys = Arc::new(test_bundle(false));
        let first = MockTransport::new();
        let device_a = client(keys.clone(), vec![Note::new(now_ms(), "shared", "body")], first.clone());
        device_a.sync().await.unwrap();
        let uploaded = first.last_request().unwrap().notes;

        let second = MockTransport::new();
        second.queue_response(SyncResponse {
            notes: uploaded,
            updated: Vec::new(),
            conflicts: Vec::new(),
        });
        let device_b = client(keys, Vec::new(), second);
        let report = device_b.sync().await.unwrap();

        assert_eq!(report.received, 1);
        let stored = device_b.notes().snapshot().await.unwrap();
        assert_eq!(stored[0].title, "shared");
        assert!(!stored[0].pending_sync);
    }

    #[tokio::test]
    async fn bad_remote_envelopes_are_skipped_and_reported() {
        let keys = Arc::new(test_bundle(false));
        let good = Note::new(1_000, "good", "body");
        let mut tampered = seal_wire(&keys, &Note::new(2_000, "bad", "body"));
        tampered.timestamp += 1;
        let mut unknown_version = seal_wire(&keys, &Note::new(3_000, "v9", "body"));
        unknown_version.version = 9;
        unknown_version.signature_version = 9;

        let transport = MockTransport::new();
        transport.queue_response(SyncResponse {
            notes: vec![seal_wire(&keys, &good), tampered, unknown_version],
            updated: Vec::new(),
            conflicts: Vec::new(),
        });
        let client = client(keys, Vec::new(), transport);

        let report = client.sync().await.unwrap();
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.skipped[0].phase, Phase::Verify);
        assert_eq!(report.skipped[0].id, NoteId::new(2_000).to_hex());
        assert_eq!(report.skipped[1].phase, Phase::Decode);

        let stored = client.notes().snapshot().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "good");
    }

    #[tokio::test]
    async fn conflict_keeps_local_note_pending() {
        let keys = Arc::new(test_bundle(false));
        let local = Note::new(5_000, "mine", "local text");
        let mut theirs = local.clone();
        theirs.content = "their text".into();

        let transport = MockTransport::new();
        transport.queue_response(SyncResponse {
            notes: vec![seal_wire(&keys, &theirs)],
            updated: Vec::new(),
            conflicts: vec![local.note_id().to_hex()],
        });
        let client = client(keys, vec![local.clone()], transport);

        let report = client.sync().await.unwrap();
        assert_eq!(report.conflicts, vec![local.note_id()]);

        let stored = client.notes().snapshot().await.unwrap();
        assert_eq!(stored[0].content, "local text");
        assert!(stored[0].pending_sync);
    }

    #[tokio::test]
    async fn remote_tombstone_removes_synced_note() {
        let keys = Arc::new(test_bundle(false));
        let mut local = Note::new(now_ms(), "doomed", "x");
        local.pending_sync = false;
        let mut deleted = local.clone();
        deleted.tombstone(local.updated_at + 1);

        let transport = MockTransport::new();
        transport.queue_response(SyncResponse {
            notes: vec![seal_wire(&keys, &deleted)],
            updated: Vec::new(),
            conflicts: Vec::new(),
        });
        let client = client(keys, vec![local], transport);

        client.sync().await.unwrap();
        assert!(client.notes().snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_tombstones_are_pruned_and_not_sent() {
        let keys = Arc::new(test_bundle(false));
        let mut old = Note::new(1_000, "old", "x");
        old.tombstone(1_001);
        let fresh = Note::new(now_ms(), "fresh", "y");

        let transport = MockTransport::new();
        let client = client(keys, vec![old, fresh], transport.clone());

        let report = client.sync().await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(report.pruned, 1);
        assert_eq!(transport.last_request().unwrap().notes.len(), 1);
        assert_eq!(client.notes().snapshot().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repeated_sync_is_idempotent() {
        let keys = Arc::new(test_bundle(false));
        let transport = MockTransport::new();
        let client = client(keys, vec![Note::new(now_ms(), "a", "b")], transport);

        client.sync().await.unwrap();
        let first = client.notes().snapshot().await.unwrap();
        client.sync().await.unwrap();
        assert_eq!(client.notes().snapshot().await.unwrap(), first);
    }

    // ===========================================
    // Retry Tests
    // ===========================================

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let transport = MockTransport::new();
        transport.fail_next_sync(TransportError::Unreachable("connection reset".into()));
        let client = client(Arc::new(test_bundle(false)), Vec::new(), transport.clone());

        let report = client.sync().await.unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(transport.health_calls(), 2);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn unhealthy_server_is_retried_without_sending() {
        let transport = MockTransport::new();
        transport.queue_health(Ok(HealthReport::new(true, false)));
        let client = client(Arc::new(test_bundle(false)), Vec::new(), transport.clone());

        let report = client.sync().await.unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn gives_up_with_last_error() {
        let transport = MockTransport::new();
        for _ in 0..3 {
            transport.fail_next_sync(TransportError::Rejected {
                status: 503,
                message: "busy".into(),
            });
        }
        let client = client(Arc::new(test_bundle(false)), Vec::new(), transport.clone());

        let err = client.sync().await.unwrap_err();
        match err {
            ClientError::RetriesExhausted {
                attempts,
                phase,
                last,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(phase, Phase::Transmit);
                assert!(matches!(last, TransportError::Rejected { status: 503, .. }));
            }
            other => panic!("Expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_name_the_transmit_phase() {
        let transport = MockTransport::new();
        for _ in 0..3 {
            transport.fail_next_sync(TransportError::Unreachable("connection refused".into()));
        }
        let client = client(Arc::new(test_bundle(false)), Vec::new(), transport);

        let err = client.sync().await.unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Transmit));
        assert!(err.to_string().starts_with("transmit failed after 3 attempts"));
    }

    #[tokio::test]
    async fn unreachable_health_check_is_retried() {
        let transport = MockTransport::new();
        transport.fail_next_health(TransportError::Unreachable("timed out".into()));
        let client = client(Arc::new(test_bundle(false)), Vec::new(), transport.clone());

        let report = client.sync().await.unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(transport.health_calls(), 2);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn failing_health_checks_never_send() {
        let transport = MockTransport::new();
        for _ in 0..3 {
            transport.fail_next_health(TransportError::Unreachable("timed out".into()));
        }
        let client = client(Arc::new(test_bundle(false)), Vec::new(), transport.clone());

        let err = client.sync().await.unwrap_err();
        match err {
            ClientError::RetriesExhausted { phase, last, .. } => {
                assert_eq!(phase, Phase::Transmit);
                assert!(matches!(last, TransportError::Unreachable(_)));
            }
            other => panic!("Expected RetriesExhausted, got {:?}", other),
        }
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn version_rejection_is_not_retried() {
        let transport = MockTransport::new();
        transport.fail_next_sync(TransportError::VersionRejected {
            message: "Please update your client to the latest version".into(),
        });
        let client = client(Arc::new(test_bundle(false)), Vec::new(), transport.clone());

        let err = client.sync().await.unwrap_err();
        assert!(matches!(err, ClientError::VersionRejected(_)));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let transport = MockTransport::new();
        transport.fail_next_sync(TransportError::Rejected {
            status: 400,
            message: "public_key is required".into(),
        });
        let client = client(Arc::new(test_bundle(false)), Vec::new(), transport.clone());

        let err = client.sync().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::Rejected { status: 400, .. })
        ));
        assert_eq!(err.phase(), Some(Phase::Transmit));
        assert!(err.to_string().starts_with("transmit failed"));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_uses_longer_backoff() {
        let retry = RetryPolicy {
            max_jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        let config = test_config().with_retry(retry);

        let limited = MockTransport::new();
        limited.fail_next_sync(TransportError::RateLimited { retry_after: None });
        let client = client_with_config(Arc::new(test_bundle(false)), Vec::new(), limited, config.clone());
        let start = Instant::now();
        client.sync().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(10));

        let flaky = MockTransport::new();
        flaky.fail_next_sync(TransportError::Unreachable("reset".into()));
        let client = client_with_config(Arc::new(test_bundle(false)), Vec::new(), flaky, config);
        let start = Instant::now();
        client.sync().await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_header_wins_when_larger() {
        let config = test_config().with_retry(RetryPolicy {
            max_jitter: Duration::ZERO,
            ..RetryPolicy::default()
        });
        let transport = MockTransport::new();
        transport.fail_next_sync(TransportError::RateLimited {
            retry_after: Some(Duration::from_secs(45)),
        });
        let client = client_with_config(Arc::new(test_bundle(false)), Vec::new(), transport, config);

        let start = Instant::now();
        client.sync().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(45));
    }

    // ===========================================
    // Throttle Gate Tests
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn throttle_delays_second_call() {
        let config = test_config().with_min_sync_interval(Duration::from_secs(2));
        let client = client_with_config(
            Arc::new(test_bundle(false)),
            Vec::new(),
            MockTransport::new(),
            config,
        );

        client.sync().await.unwrap();
        let start = Instant::now();
        client.sync().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn sync_if_idle_skips_while_busy() {
        let transport = MockTransport::new();
        let client = client(Arc::new(test_bundle(false)), Vec::new(), transport.clone());

        {
            let _running = client.gate.lock().await;
            assert!(client.sync_if_idle().await.unwrap().is_none());
        }
        assert!(transport.requests().is_empty());

        assert!(client.sync_if_idle().await.unwrap().is_some());
        assert_eq!(transport.requests().len(), 1);
    }
}
