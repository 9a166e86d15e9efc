//! Generate a new secret phrase.

use anyhow::{Context, Result};
use sync_client::SecretPhrase;

/// Run the phrase command.
pub fn run() -> Result<()> {
    let phrase = SecretPhrase::generate().context("Failed to generate phrase")?;

    println!("Your new secret phrase ({} words):", phrase.word_count());
    println!();
    println!("  {}", phrase.expose());
    println!();
    println!("Write it down. It is the only way to read your notes on another");
    println!("device, and it is never stored or sent anywhere.");
    println!();
    println!("Next: notesync init");

    Ok(())
}
