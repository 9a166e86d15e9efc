//! Run one sync against the relay.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use sync_client::{
    ClientConfig, ClientError, EncryptPolicy, KdfParams, SecretPhrase, SyncClient, SyncReport,
};

use super::{local_notes, unlock};
use crate::config::Settings;

/// Run the sync command.
pub async fn run(data_dir: &Path, phrase: &SecretPhrase, kdf: KdfParams) -> Result<SyncReport> {
    let settings = Settings::load(data_dir).await?;
    let keys = unlock(&settings, phrase, kdf)?;
    tracing::info!("Syncing {} with {}", data_dir.display(), settings.server_url);

    let config = ClientConfig::default()
        .with_server_url(&settings.server_url)
        .with_encrypt_policy(EncryptPolicy {
            prefer_post_quantum: settings.post_quantum,
            ..EncryptPolicy::default()
        });
    let client = SyncClient::with_http(keys, Arc::new(local_notes(data_dir)), config)?;

    let report = match client.sync().await {
        Ok(report) => report,
        Err(ClientError::VersionRejected(message)) => {
            anyhow::bail!("The server refused this client: {message}");
        }
        Err(e) => return Err(e).context("Sync failed"),
    };

    println!(
        "Synced with {}: sent {}, received {}, updated {}",
        settings.server_url, report.sent, report.received, report.updated
    );
    if report.attempts > 1 {
        println!("  (took {} attempts)", report.attempts);
    }
    if report.pruned > 0 {
        println!("  Pruned {} old deletions", report.pruned);
    }
    for id in &report.conflicts {
        println!("  Conflict on {id}: the server copy was kept");
    }
    for error in &report.skipped {
        println!("  Skipped {error}");
    }

    Ok(report)
}
