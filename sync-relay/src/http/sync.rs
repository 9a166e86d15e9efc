//! Sync endpoint.

use crate::error::ApiError;
use crate::server::SyncRelay;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::{Extension, Json};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use sync_types::{SyncRequest, SyncResponse};

/// `POST /api/sync` handler.
pub async fn sync_handler(
    Extension(relay): Extension<Arc<SyncRelay>>,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        relay.metrics().errors_total.fetch_add(1, Ordering::Relaxed);
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            tracing::debug!("Rejected sync body: {}", rejection.body_text());
            ApiError::BadRequest(format!(
                "Invalid request format: {}",
                rejection.body_text()
            ))
        }
    })?;

    relay.handle_sync(request).await.map(Json)
}
