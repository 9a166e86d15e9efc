//! Health check endpoint.

use crate::server::SyncRelay;
use axum::http::StatusCode;
use axum::{Extension, Json};
use std::sync::Arc;
use sync_types::HealthReport;

/// Health check handler.
///
/// Answers 503 with the same body shape when the store is unreachable, so
/// clients can tell which half is down.
pub async fn health_handler(
    Extension(relay): Extension<Arc<SyncRelay>>,
) -> (StatusCode, Json<HealthReport>) {
    let report = relay.health().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
