//! Main SyncRelay server coordination.
//!
//! SyncRelay owns the store, rate limiters and metrics, and applies one sync
//! request at a time per call. The HTTP layer only translates to and from it.

use crate::config::Config;
use crate::error::ApiError;
use crate::limits::RateLimits;
use crate::storage::ReplicaStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use sync_types::{
    ClientVersion, Envelope, HealthReport, OwnerId, SyncRequest, SyncResponse,
};

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
/// Thread-safe via `AtomicU64`, no locks needed for incrementing.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total sync requests received.
    pub sync_requests_total: AtomicU64,
    /// Total envelopes received in accepted requests.
    pub envelopes_received: AtomicU64,
    /// Total envelopes that became current.
    pub updates_total: AtomicU64,
    /// Total conflicts reported.
    pub conflicts_total: AtomicU64,
    /// Total requests refused for an old client version.
    pub version_rejections: AtomicU64,
    /// Total rate limit rejections (owner + global).
    pub rate_limit_hits: AtomicU64,
    /// Total failed requests (malformed input, storage failures).
    pub errors_total: AtomicU64,
}

/// Main relay server.
pub struct SyncRelay {
    config: Config,
    storage: Arc<dyn ReplicaStore>,
    /// Rate limiters for sync requests.
    rate_limits: RateLimits,
    /// Operational metrics (counters).
    metrics: RelayMetrics,
    version_floor: ClientVersion,
    started: Instant,
}

impl std::fmt::Debug for SyncRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRelay")
            .field("config", &self.config)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl SyncRelay {
    /// Create a new SyncRelay with the given config and storage.
    pub fn new(config: Config, storage: Arc<dyn ReplicaStore>) -> Self {
        let rate_limits = RateLimits::new(&config.limits);
        let version_floor = config.server.version_floor();
        Self {
            config,
            storage,
            rate_limits,
            metrics: RelayMetrics::default(),
            version_floor,
            started: Instant::now(),
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get access to the storage layer.
    pub fn storage(&self) -> &dyn ReplicaStore {
        self.storage.as_ref()
    }

    /// Get a clone of the storage Arc for background tasks.
    pub fn storage_arc(&self) -> Arc<dyn ReplicaStore> {
        self.storage.clone()
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Seconds since this relay was created.
    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Probe the store and describe the service.
    pub async fn health(&self) -> HealthReport {
        let store_ok = match self.storage.health().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Health check failed: {}", e);
                false
            }
        };

        HealthReport {
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            uptime_seconds: Some(self.uptime_seconds()),
            ..HealthReport::new(true, store_ok)
        }
    }

    /// Apply one sync request and build the response.
    pub async fn handle_sync(&self, request: SyncRequest) -> Result<SyncResponse, ApiError> {
        self.metrics
            .sync_requests_total
            .fetch_add(1, Ordering::Relaxed);

        let result = self.apply(request).await;
        if let Err(ref e) = result {
            let counter = match e {
                ApiError::VersionRejected => &self.metrics.version_rejections,
                ApiError::RateLimited { .. } => &self.metrics.rate_limit_hits,
                _ => &self.metrics.errors_total,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn apply(&self, request: SyncRequest) -> Result<SyncResponse, ApiError> {
        if request.public_key.is_empty() {
            return Err(ApiError::BadRequest("Invalid request format".into()));
        }
        let owner = OwnerId::from_hex(&request.public_key).ok_or_else(|| {
            ApiError::BadRequest("Invalid request format: public_key is not an owner id".into())
        })?;

        self.rate_limits.check_sync(&owner).map_err(|e| {
            tracing::warn!("Rate limited {}: {}", owner, e);
            ApiError::RateLimited {
                retry_after: e.retry_after(),
            }
        })?;

        let accepted = ClientVersion::parse(&request.client_version)
            .is_some_and(|version| version >= self.version_floor);
        if !accepted {
            tracing::info!(
                "Rejected client version {:?} (floor {})",
                request.client_version,
                self.version_floor
            );
            return Err(ApiError::VersionRejected);
        }

        // Shape only: the relay cannot check signatures it has no keys for.
        for wire in &request.notes {
            Envelope::try_from(wire)
                .map_err(|e| ApiError::BadRequest(format!("Invalid note {}: {}", wire.id, e)))?;
        }

        let pq_public_key = request
            .pq_public_key
            .as_deref()
            .filter(|key| !key.is_empty());
        let outcome = self
            .storage
            .reconcile(&owner, &request.notes, pq_public_key)
            .await?;

        self.metrics
            .envelopes_received
            .fetch_add(request.notes.len() as u64, Ordering::Relaxed);
        self.metrics
            .updates_total
            .fetch_add(outcome.updated.len() as u64, Ordering::Relaxed);
        self.metrics
            .conflicts_total
            .fetch_add(outcome.conflicts.len() as u64, Ordering::Relaxed);

        tracing::info!(
            "Synced {}: received {}, updated {}, conflicts {}, returning {}",
            owner,
            request.notes.len(),
            outcome.updated.len(),
            outcome.conflicts.len(),
            outcome.snapshot.len()
        );

        Ok(SyncResponse {
            notes: outcome.snapshot,
            updated: outcome.updated,
            conflicts: outcome.conflicts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteReplicaStore;
    use sync_types::WireEnvelope;

    async fn test_relay(config: Config) -> SyncRelay {
        let storage = SqliteReplicaStore::in_memory().await.unwrap();
        SyncRelay::new(config, Arc::new(storage))
    }

    fn owner_hex() -> String {
        "ab".repeat(32)
    }

    fn envelope(id: u64, timestamp: i64) -> WireEnvelope {
        WireEnvelope {
            id: format!("{id:016x}"),
            data: "ZGF0YQ==".into(),
            nonce: "bm9uY2U=".into(),
            timestamp,
            signature: "c2ln".into(),
            version: 1,
            signature_version: 1,
            deleted: None,
        }
    }

    fn request(notes: Vec<WireEnvelope>) -> SyncRequest {
        SyncRequest {
            public_key: owner_hex(),
            notes,
            client_version: "0.1.0".into(),
            pq_public_key: None,
        }
    }

    // ===========================================
    // Sync
    // ===========================================

    #[tokio::test]
    async fn sync_stores_and_echoes() {
        let relay = test_relay(Config::default()).await;
        let response = relay
            .handle_sync(request(vec![envelope(1, 100)]))
            .await
            .unwrap();

        assert_eq!(response.notes, vec![envelope(1, 100)]);
        assert_eq!(response.updated, vec![format!("{:016x}", 1)]);
        assert!(response.conflicts.is_empty());

        let m = relay.metrics();
        assert_eq!(m.sync_requests_total.load(Ordering::Relaxed), 1);
        assert_eq!(m.envelopes_received.load(Ordering::Relaxed), 1);
        assert_eq!(m.updates_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn empty_public_key_is_bad_request() {
        let relay = test_relay(Config::default()).await;
        let mut req = request(Vec::new());
        req.public_key = String::new();

        let err = relay.handle_sync(req).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m == "Invalid request format"));
        assert_eq!(relay.metrics().errors_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn non_hex_public_key_is_bad_request() {
        let relay = test_relay(Config::default()).await;
        let mut req = request(Vec::new());
        req.public_key = "not-an-owner".into();
        assert!(matches!(
            relay.handle_sync(req).await,
            Err(ApiError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn version_gate() {
        let relay = test_relay(Config::default()).await;

        for version in ["0.0.9", "garbage", ""] {
            let mut req = request(Vec::new());
            req.client_version = version.into();
            assert!(matches!(
                relay.handle_sync(req).await,
                Err(ApiError::VersionRejected)
            ));
        }
        assert_eq!(
            relay.metrics().version_rejections.load(Ordering::Relaxed),
            3
        );

        for version in ["0.1.0", "0.10.0", "1.0.0-beta"] {
            let mut req = request(Vec::new());
            req.client_version = version.into();
            relay.handle_sync(req).await.unwrap();
        }
    }

    #[tokio::test]
    async fn malformed_envelope_rejects_whole_request() {
        let relay = test_relay(Config::default()).await;
        let mut bad = envelope(2, 100);
        bad.signature_version = 2;

        let err = relay
            .handle_sync(request(vec![envelope(1, 100), bad]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m.contains("0000000000000002")));

        // Nothing from the rejected request was stored
        let owner = OwnerId::from_hex(&owner_hex()).unwrap();
        assert!(relay.storage().snapshot(&owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pq_key_recorded_on_account() {
        let relay = test_relay(Config::default()).await;
        let mut req = request(Vec::new());
        req.pq_public_key = Some("a2V5".into());
        relay.handle_sync(req).await.unwrap();

        let owner = OwnerId::from_hex(&owner_hex()).unwrap();
        let account = relay.storage().account(&owner).await.unwrap().unwrap();
        assert!(account.upgradeable);
    }

    #[tokio::test]
    async fn rate_limit_is_per_owner() {
        let mut config = Config::default();
        config.limits.syncs_per_minute = 1;
        let relay = test_relay(config).await;

        relay.handle_sync(request(Vec::new())).await.unwrap();
        let err = relay.handle_sync(request(Vec::new())).await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { .. }));
        assert_eq!(relay.metrics().rate_limit_hits.load(Ordering::Relaxed), 1);

        let mut other = request(Vec::new());
        other.public_key = "cd".repeat(32);
        relay.handle_sync(other).await.unwrap();
    }

    // ===========================================
    // Health
    // ===========================================

    #[tokio::test]
    async fn health_reports_store() {
        let relay = test_relay(Config::default()).await;
        let report = relay.health().await;
        assert!(report.is_healthy());
        assert_eq!(report.version.as_deref(), Some(env!("CARGO_PKG_VERSION")));
        assert!(report.uptime_seconds.is_some());
    }
}
