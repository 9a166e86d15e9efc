//! HTTP request and response bodies.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::WireEnvelope;

/// Client → server, one per sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Owner id (hex)
    pub public_key: String,
    /// Every local envelope
    pub notes: Vec<WireEnvelope>,
    /// Client semver, checked against the server's floor
    pub client_version: String,
    /// Base64 ML-KEM encapsulation key, when the client has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pq_public_key: Option<String>,
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Full current snapshot for the owner
    pub notes: Vec<WireEnvelope>,
    /// Ids whose incoming envelope became current
    #[serde(default)]
    pub updated: Vec<String>,
    /// Ids with an equal timestamp but a different signature
    #[serde(default)]
    pub conflicts: Vec<String>,
}

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// `healthy` or `unhealthy`
    pub status: String,
    /// `connected` or `disconnected`
    pub database: String,
    /// Server version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Uptime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
}

impl HealthReport {
    /// Status string for a healthy service.
    pub const HEALTHY: &'static str = "healthy";
    /// Database string for a reachable store.
    pub const CONNECTED: &'static str = "connected";

    /// Build a report from the service/store pair.
    pub fn new(service_ok: bool, store_ok: bool) -> Self {
        Self {
            status: if service_ok && store_ok { Self::HEALTHY } else { "unhealthy" }.to_string(),
            database: if store_ok { Self::CONNECTED } else { "disconnected" }.to_string(),
            version: None,
            uptime_seconds: None,
        }
    }

    /// Service is up.
    pub fn service_ok(&self) -> bool {
        self.status == Self::HEALTHY
    }

    /// Store is reachable.
    pub fn store_ok(&self) -> bool {
        self.database == Self::CONNECTED
    }

    /// Both halves of the pair are healthy.
    pub fn is_healthy(&self) -> bool {
        self.service_ok() && self.store_ok()
    }
}

/// Error body returned with any non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message
    pub error: String,
    /// Machine-readable code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Error code for a client below the version floor.
pub const VERSION_REJECTED_CODE: &str = "version_rejected";

/// A `major.minor.patch` client version.
///
/// Pre-release and build suffixes (`-beta`, `+abc`) are ignored for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientVersion {
    /// Major
    pub major: u64,
    /// Minor
    pub minor: u64,
    /// Patch
    pub patch: u64,
}

impl ClientVersion {
    /// Parse `x.y.z` (missing minor/patch default to zero).
    pub fn parse(s: &str) -> Option<Self> {
        let core = s.trim().trim_start_matches('v');
        let core = core.split(['-', '+']).next()?;
        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
        let patch = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
        if parts.next().is_some() {
            return None;
        }
        Some(Self { major, minor, patch })
    }
}

impl PartialOrd for ClientVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClientVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl fmt::Display for ClientVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
