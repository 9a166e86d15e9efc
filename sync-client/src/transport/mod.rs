//! Transport abstraction for notesync.
//!
//! A transport carries one [`SyncRequest`] to the server and brings back its
//! [`SyncResponse`], and can probe the server's health. It never sees
//! plaintext: everything it moves is already sealed.
//!
//! - [`HttpTransport`]: JSON over HTTP(S) via reqwest
//! - [`MockTransport`]: queued responses for tests

mod http;
mod mock;

pub use http::HttpTransport;
pub use mock::MockTransport;

use std::time::Duration;

use async_trait::async_trait;
use sync_types::{HealthReport, SyncRequest, SyncResponse};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Server could not be reached (DNS, connect, timeout).
    #[error("server unreachable: {0}")]
    Unreachable(String),

    /// Server answered but reported itself or its store unhealthy.
    #[error("server unhealthy (service: {service_ok}, store: {store_ok})")]
    Unhealthy {
        /// Service half of the health report.
        service_ok: bool,
        /// Store half of the health report.
        store_ok: bool,
    },

    /// Server is rate limiting this client.
    #[error("rate limited")]
    RateLimited {
        /// Server's `Retry-After`, when given.
        retry_after: Option<Duration>,
    },

    /// Server refuses this client version.
    #[error("client version rejected: {message}")]
    VersionRejected {
        /// Server's message.
        message: String,
    },

    /// Any other non-success status.
    #[error("request rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server's error message.
        message: String,
    },

    /// Response body did not parse.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Unreachable(_)
            | TransportError::Unhealthy { .. }
            | TransportError::RateLimited { .. } => true,
            TransportError::Rejected { status, .. } => *status >= 500,
            TransportError::VersionRejected { .. } | TransportError::InvalidResponse(_) => false,
        }
    }
}

/// Moves sealed sync traffic to and from the server.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Probe the server. An answer that is not healthy is returned as-is;
    /// errors are reserved for failing to get an answer.
    async fn health(&self) -> Result<HealthReport, TransportError>;

    /// Send one sync request.
    async fn sync(&self, request: &SyncRequest) -> Result<SyncResponse, TransportError>;
}
