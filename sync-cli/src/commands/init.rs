//! Initialize a data directory for a phrase.

use anyhow::Result;
use std::path::Path;
use sync_client::{DeriveOptions, KdfParams, KeyBundle, SecretPhrase};

use crate::config::Settings;

/// Run the init command.
pub async fn run(
    data_dir: &Path,
    phrase: &SecretPhrase,
    server_url: &str,
    post_quantum: bool,
    kdf: KdfParams,
) -> Result<()> {
    // Check if already initialized
    if Settings::exists(data_dir).await {
        anyhow::bail!(
            "Already initialized. Delete {} to reinitialize.",
            data_dir.join("settings.json").display()
        );
    }

    let keys = KeyBundle::derive(phrase, &DeriveOptions { kdf, post_quantum })?;
    tracing::debug!("Derived keys, post-quantum: {}", keys.has_post_quantum());
    if post_quantum && !keys.has_post_quantum() {
        println!("Warning: post-quantum keys unavailable, using classical only.");
    }

    let settings = Settings::new(server_url, keys.has_post_quantum(), &keys.owner_id().to_string());
    settings.save(data_dir).await?;

    println!("Initialized!");
    println!();
    println!("  Owner ID: {}", &settings.owner_id[..16]);
    println!("  Server:   {}", settings.server_url);
    println!(
        "  Scheme:   {}",
        if settings.post_quantum { "post-quantum" } else { "classical" }
    );
    println!("  Data dir: {}", data_dir.display());
    println!();
    println!("Next steps:");
    println!("  1. Add a note: notesync add \"Title\" \"Body\"");
    println!("  2. Sync:       notesync sync");

    Ok(())
}
