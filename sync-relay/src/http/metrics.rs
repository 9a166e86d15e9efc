//! Prometheus metrics endpoint.

use crate::server::SyncRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(relay): Extension<Arc<SyncRelay>>) -> impl IntoResponse {
    let m = relay.metrics();

    // Counters, monotonic since startup
    let syncs = m.sync_requests_total.load(Ordering::Relaxed);
    let envelopes = m.envelopes_received.load(Ordering::Relaxed);
    let updates = m.updates_total.load(Ordering::Relaxed);
    let conflicts = m.conflicts_total.load(Ordering::Relaxed);
    let version_rejections = m.version_rejections.load(Ordering::Relaxed);
    let rate_limits = m.rate_limit_hits.load(Ordering::Relaxed);
    let errors = m.errors_total.load(Ordering::Relaxed);

    // Gauges
    let tracked_owners = relay.rate_limits().owner_keys_count();
    let uptime = relay.uptime_seconds();

    // Storage stats, zero when the query fails
    let stats = relay.storage().stats().await.unwrap_or_default();

    let body = format!(
        r#"# HELP notesync_relay_info Server information
# TYPE notesync_relay_info gauge
notesync_relay_info{{version="{version}"}} 1

# HELP notesync_relay_uptime_seconds Seconds since startup
# TYPE notesync_relay_uptime_seconds gauge
notesync_relay_uptime_seconds {uptime}

# HELP notesync_relay_sync_requests_total Total sync requests received
# TYPE notesync_relay_sync_requests_total counter
notesync_relay_sync_requests_total {syncs}

# HELP notesync_relay_envelopes_received_total Total envelopes received in accepted requests
# TYPE notesync_relay_envelopes_received_total counter
notesync_relay_envelopes_received_total {envelopes}

# HELP notesync_relay_updates_total Total envelopes that became current
# TYPE notesync_relay_updates_total counter
notesync_relay_updates_total {updates}

# HELP notesync_relay_conflicts_total Total conflicts reported
# TYPE notesync_relay_conflicts_total counter
notesync_relay_conflicts_total {conflicts}

# HELP notesync_relay_version_rejections_total Total requests from clients below the version floor
# TYPE notesync_relay_version_rejections_total counter
notesync_relay_version_rejections_total {version_rejections}

# HELP notesync_relay_rate_limit_hits_total Total rate limit rejections
# TYPE notesync_relay_rate_limit_hits_total counter
notesync_relay_rate_limit_hits_total {rate_limits}

# HELP notesync_relay_errors_total Total failed requests
# TYPE notesync_relay_errors_total counter
notesync_relay_errors_total {errors}

# HELP notesync_relay_rate_limited_owners Owners tracked by the rate limiter
# TYPE notesync_relay_rate_limited_owners gauge
notesync_relay_rate_limited_owners {tracked_owners}

# HELP notesync_relay_storage_accounts Number of known accounts
# TYPE notesync_relay_storage_accounts gauge
notesync_relay_storage_accounts {accounts}

# HELP notesync_relay_storage_envelopes Number of envelopes currently in database
# TYPE notesync_relay_storage_envelopes gauge
notesync_relay_storage_envelopes {stored}
"#,
        version = env!("CARGO_PKG_VERSION"),
        accounts = stats.accounts,
        stored = stats.envelopes,
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
