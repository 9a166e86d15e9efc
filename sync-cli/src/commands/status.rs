//! Show local and server status.

use anyhow::Result;
use std::path::Path;
use sync_client::{HttpTransport, SyncTransport};

use super::{format_age, local_notes};
use crate::config::Settings;

/// Run the status command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let settings = match Settings::load(data_dir).await {
        Ok(settings) => settings,
        Err(_) => {
            println!("Not initialized. Run 'notesync init' first.");
            return Ok(());
        }
    };

    println!("Owner");
    println!("  ID:      {}", &settings.owner_id[..16.min(settings.owner_id.len())]);
    println!(
        "  Scheme:  {}",
        if settings.post_quantum { "post-quantum" } else { "classical" }
    );
    println!("  Since:   {}", format_age(settings.created_at as i64 * 1000));
    println!();

    let notes = local_notes(data_dir).snapshot().await?;
    let live = notes.iter().filter(|n| !n.deleted).count();
    let pending = notes.iter().filter(|n| n.pending_sync).count();
    let tombstones = notes.len() - live;
    println!("Notes");
    println!("  Live:       {live}");
    println!("  Pending:    {pending}");
    println!("  Deleted:    {tombstones}");
    if let Some(latest) = notes.iter().map(|n| n.updated_at).max() {
        println!("  Last edit:  {}", format_age(latest));
    }
    println!();

    println!("Server");
    println!("  URL:     {}", settings.server_url);
    let health = match HttpTransport::new(&settings.server_url) {
        Ok(transport) => match transport.health().await {
            Ok(report) if report.is_healthy() => {
                let version = report.version.unwrap_or_else(|| "unknown".into());
                format!("online (v{version})")
            }
            Ok(report) => format!("unhealthy (database: {})", report.database),
            Err(e) => format!("unreachable ({e})"),
        },
        Err(e) => format!("invalid URL ({e})"),
    };
    println!("  Status:  {health}");

    Ok(())
}
