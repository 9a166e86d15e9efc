//! HTTP endpoints for sync-relay.
//!
//! - `POST /api/sync`: reconcile a client's envelopes and return the snapshot
//! - `GET /api/health`: service and store health
//! - `GET /metrics`: Prometheus text

pub mod health;
mod metrics;
mod sync;

use crate::server::SyncRelay;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Extension, Router};
use std::sync::Arc;

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<SyncRelay>) -> Router {
    let max_body_bytes = relay.config().server.max_body_bytes;
    Router::new()
        .route("/api/sync", post(sync::sync_handler))
        .route("/api/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(Extension(relay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::StorageError;
    use crate::storage::{
        AccountRecord, ReconcileOutcome, ReplicaStore, SqliteReplicaStore, StoreStats,
        SyncLogEntry,
    };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use sync_types::{
        ErrorBody, HealthReport, OwnerId, SyncRequest, SyncResponse, WireEnvelope,
        VERSION_REJECTED_CODE,
    };
    use tower::util::ServiceExt;

    async fn test_relay(config: Config) -> Arc<SyncRelay> {
        let storage = SqliteReplicaStore::in_memory().await.unwrap();
        Arc::new(SyncRelay::new(config, Arc::new(storage)))
    }

    /// A store whose database is gone.
    struct BrokenStore;

    fn gone() -> StorageError {
        StorageError::Database(sqlx::Error::PoolClosed)
    }

    #[async_trait]
    impl ReplicaStore for BrokenStore {
        async fn reconcile(
            &self,
            _owner: &OwnerId,
            _incoming: &[WireEnvelope],
            _pq_public_key: Option<&str>,
        ) -> Result<ReconcileOutcome, StorageError> {
            Err(gone())
        }
        async fn snapshot(&self, _owner: &OwnerId) -> Result<Vec<WireEnvelope>, StorageError> {
            Err(gone())
        }
        async fn account(&self, _owner: &OwnerId) -> Result<Option<AccountRecord>, StorageError> {
            Err(gone())
        }
        async fn recent_syncs(
            &self,
            _owner: &OwnerId,
            _limit: u32,
        ) -> Result<Vec<SyncLogEntry>, StorageError> {
            Err(gone())
        }
        async fn health(&self) -> Result<(), StorageError> {
            Err(gone())
        }
        async fn stats(&self) -> Result<StoreStats, StorageError> {
            Err(gone())
        }
        async fn purge_inactive_accounts(&self, _cutoff_ms: i64) -> Result<u64, StorageError> {
            Err(gone())
        }
        async fn purge_sync_log(&self, _cutoff_ms: i64) -> Result<u64, StorageError> {
            Err(gone())
        }
    }

    fn broken_relay() -> Arc<SyncRelay> {
        Arc::new(SyncRelay::new(Config::default(), Arc::new(BrokenStore)))
    }

    fn sync_request(client_version: &str) -> SyncRequest {
        SyncRequest {
            public_key: "ab".repeat(32),
            notes: vec![WireEnvelope {
                id: "0000000000000001".into(),
                data: "ZGF0YQ==".into(),
                nonce: "bm9uY2U=".into(),
                timestamp: 100,
                signature: "c2ln".into(),
                version: 1,
                signature_version: 1,
                deleted: None,
            }],
            client_version: client_version.into(),
            pq_public_key: None,
        }
    }

    fn post_json(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/sync")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    fn post_sync(request: &SyncRequest) -> Request<Body> {
        post_json(serde_json::to_vec(request).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ===========================================
    // POST /api/sync
    // ===========================================

    #[tokio::test]
    async fn sync_endpoint_returns_snapshot() {
        let app = build_router(test_relay(Config::default()).await);
        let request = sync_request("0.1.0");

        let response = app.oneshot(post_sync(&request)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: SyncResponse = body_json(response).await;
        assert_eq!(body.notes, request.notes);
        assert_eq!(body.updated, vec!["0000000000000001".to_string()]);
    }

    #[tokio::test]
    async fn old_client_gets_version_rejected() {
        let app = build_router(test_relay(Config::default()).await);

        let response = app.oneshot(post_sync(&sync_request("0.0.9"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: ErrorBody = body_json(response).await;
        assert_eq!(body.code.as_deref(), Some(VERSION_REJECTED_CODE));
        assert_eq!(body.error, "Please update your client to the latest version");
    }

    #[tokio::test]
    async fn missing_public_key_is_bad_request() {
        let app = build_router(test_relay(Config::default()).await);
        let mut request = sync_request("0.1.0");
        request.public_key = String::new();

        let response = app.oneshot(post_sync(&request)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = body_json(response).await;
        assert_eq!(body.error, "Invalid request format");
        assert_eq!(body.code.as_deref(), Some("bad_request"));
    }

    #[tokio::test]
    async fn unparseable_body_is_bad_request() {
        let relay = test_relay(Config::default()).await;
        let app = build_router(relay.clone());

        let response = app.oneshot(post_json("{\"notes\": 5}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = body_json(response).await;
        assert!(body.error.starts_with("Invalid request format"));
        assert_eq!(
            relay
                .metrics()
                .errors_total
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let mut config = Config::default();
        config.server.max_body_bytes = 64;
        let app = build_router(test_relay(config).await);

        let response = app
            .oneshot(post_sync(&sync_request("0.1.0")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body: ErrorBody = body_json(response).await;
        assert_eq!(body.code.as_deref(), Some("payload_too_large"));
    }

    #[tokio::test]
    async fn rate_limited_sets_retry_after() {
        let mut config = Config::default();
        config.limits.syncs_per_minute = 1;
        let app = build_router(test_relay(config).await);

        let first = app
            .clone()
            .oneshot(post_sync(&sync_request("0.1.0")))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(post_sync(&sync_request("0.1.0")))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = second.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry_after));
    }

    #[tokio::test]
    async fn storage_failure_is_internal_error() {
        let app = build_router(broken_relay());

        let response = app
            .oneshot(post_sync(&sync_request("0.1.0")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorBody = body_json(response).await;
        assert_eq!(body.error, "Internal server error");
    }

    #[tokio::test]
    async fn sync_requires_post() {
        let app = build_router(test_relay(Config::default()).await);
        let response = app.oneshot(get("/api/sync")).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    // ===========================================
    // GET /api/health and /metrics
    // ===========================================

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = build_router(test_relay(Config::default()).await);

        let response = app.oneshot(get("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let report: HealthReport = body_json(response).await;
        assert_eq!(report.status, "healthy");
        assert_eq!(report.database, "connected");
    }

    #[tokio::test]
    async fn health_endpoint_reports_broken_store() {
        let app = build_router(broken_relay());

        let response = app.oneshot(get("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let report: HealthReport = body_json(response).await;
        assert_eq!(report.status, "unhealthy");
        assert_eq!(report.database, "disconnected");
        assert!(!report.service_ok() && !report.store_ok());
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_ok() {
        let relay = test_relay(Config::default()).await;
        let app = build_router(relay.clone());

        app.clone()
            .oneshot(post_sync(&sync_request("0.1.0")))
            .await
            .unwrap();
        let response = app.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("notesync_relay_sync_requests_total 1"));
        assert!(text.contains("notesync_relay_storage_envelopes 1"));
    }
}
