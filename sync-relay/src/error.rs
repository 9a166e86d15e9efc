//! Error types for sync-relay.

use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sync_types::{ErrorBody, VERSION_REJECTED_CODE};

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row no longer decodes as an envelope.
    #[error("corrupt row for note {note_id}: {reason}")]
    Corrupt {
        /// Note id of the row.
        note_id: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Error returned by an HTTP handler, rendered as an [`ErrorBody`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request is malformed.
    #[error("{0}")]
    BadRequest(String),

    /// Client is older than the configured floor.
    #[error("Please update your client to the latest version")]
    VersionRejected,

    /// Too many requests; the client should wait.
    #[error("Too many requests, please try again later")]
    RateLimited {
        /// How long until a retry can succeed.
        retry_after: Duration,
    },

    /// Request body exceeds the configured limit.
    #[error("Request body too large")]
    PayloadTooLarge,

    /// Storage failed while serving the request.
    #[error("Internal server error")]
    Storage(#[from] StorageError),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::VersionRejected => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code for the body.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::VersionRejected => VERSION_REJECTED_CODE,
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::PayloadTooLarge => "payload_too_large",
            ApiError::Storage(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Storage detail stays in the log, never in the body.
        if let ApiError::Storage(ref e) = self {
            tracing::error!("Sync failed: {}", e);
        }
        let body = Json(ErrorBody {
            error: self.to_string(),
            code: Some(self.code().to_string()),
        });

        match self {
            ApiError::RateLimited { retry_after } => {
                // Round up so a client never retries early.
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                (
                    status,
                    [(header::RETRY_AFTER, secs.max(1).to_string())],
                    body,
                )
                    .into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}
