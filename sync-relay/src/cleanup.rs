//! Background cleanup task.
//!
//! Runs periodically to forget inactive accounts, drop old sync log rows and
//! evict idle rate limiter entries.

use crate::config::CleanupConfig;
use crate::error::StorageError;
use crate::limits::RateLimits;
use crate::storage::ReplicaStore;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::interval;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Rows removed by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Inactive accounts forgotten.
    pub accounts: u64,
    /// Sync log rows dropped.
    pub sync_log: u64,
}

/// Run one cleanup pass as of `now_ms`.
pub async fn run_cleanup(
    storage: &dyn ReplicaStore,
    rate_limits: &RateLimits,
    config: &CleanupConfig,
    now_ms: i64,
) -> Result<CleanupReport, StorageError> {
    let account_cutoff = now_ms - config.account_retention_days as i64 * DAY_MS;
    let log_cutoff = now_ms - config.sync_log_retention_days as i64 * DAY_MS;

    let accounts = storage.purge_inactive_accounts(account_cutoff).await?;
    let sync_log = storage.purge_sync_log(log_cutoff).await?;
    rate_limits.shrink();

    Ok(CleanupReport { accounts, sync_log })
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Spawn a background cleanup task.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_task(
    storage: Arc<dyn ReplicaStore>,
    rate_limits: RateLimits,
    config: CleanupConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Cleanup task disabled");
            return;
        }

        let interval_secs = config.interval_secs;
        tracing::info!("Cleanup task started (interval: {}s)", interval_secs);

        let mut timer = interval(Duration::from_secs(interval_secs));

        loop {
            timer.tick().await;

            match run_cleanup(storage.as_ref(), &rate_limits, &config, now_ms()).await {
                Ok(report) if report == CleanupReport::default() => {
                    tracing::debug!("Cleanup: nothing to remove");
                }
                Ok(report) => {
                    tracing::info!(
                        "Cleanup: forgot {} inactive accounts, dropped {} sync log rows",
                        report.accounts,
                        report.sync_log
                    );
                }
                Err(e) => {
                    tracing::error!("Cleanup error: {}", e);
                }
            }
        }
    })
}
