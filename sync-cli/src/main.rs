//! # notesync
//!
//! Command-line client for notesync end-to-end encrypted notes.
//!
//! ## Commands
//!
//! - `phrase`: Generate a new secret phrase
//! - `init`: Set up a data directory for a phrase
//! - `add`, `edit`, `delete`, `list`: Work with local notes
//! - `sync`: Exchange notes with the relay
//! - `status`: Show local and server status
//!
//! ## Example
//!
//! ```bash
//! # Generate a phrase and set up this machine
//! notesync phrase
//! notesync init --server https://notes.example.com
//!
//! # Write and sync
//! notesync add "Groceries" "milk, eggs"
//! notesync sync
//!
//! # On another machine, the same phrase sees the same notes
//! NOTESYNC_PHRASE="..." notesync init --server https://notes.example.com
//! notesync sync && notesync list
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use sync_client::KdfParams;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

use commands::{init, notes, phrase, status, sync};

/// Command-line client for notesync.
#[derive(Parser, Debug)]
#[command(name = "notesync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for settings and local notes
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log sync activity to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new secret phrase
    Phrase,

    /// Set up this data directory for a phrase
    Init {
        /// Relay URL
        #[arg(long, short, default_value = "http://localhost:3222")]
        server: String,

        /// Use classical keys only
        #[arg(long)]
        classical: bool,
    },

    /// Add a note
    Add {
        /// Title
        title: String,

        /// Body (or use --file)
        content: Option<String>,

        /// Read the body from a file
        #[arg(long, short, conflicts_with = "content")]
        file: Option<PathBuf>,
    },

    /// Edit a note
    Edit {
        /// Note id as shown by `list`
        id: String,

        /// New title
        #[arg(long, short)]
        title: Option<String>,

        /// New body
        #[arg(long, short)]
        content: Option<String>,
    },

    /// Delete a note
    Delete {
        /// Note id as shown by `list`
        id: String,
    },

    /// List notes
    List {
        /// Include deleted notes
        #[arg(long, short)]
        all: bool,
    },

    /// Sync with the relay
    Sync,

    /// Show status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Phrase => phrase::run(),
        command => {
            let data_dir = prepare_data_dir(cli.data_dir).await?;
            run(command, &data_dir).await
        }
    }
}

async fn run(command: Commands, data_dir: &Path) -> Result<()> {
    match command {
        Commands::Phrase => phrase::run()?,
        Commands::Init { server, classical } => {
            let phrase = commands::read_phrase("Secret phrase: ")?;
            init::run(data_dir, &phrase, &server, !classical, KdfParams::default()).await?;
        }
        Commands::Add {
            title,
            content,
            file,
        } => {
            let content = if let Some(path) = file {
                tokio::fs::read_to_string(&path)
                    .await
                    .context("Failed to read file")?
            } else {
                content.unwrap_or_default()
            };
            notes::add(data_dir, &title, &content).await?;
        }
        Commands::Edit { id, title, content } => {
            notes::edit(data_dir, &id, title, content).await?;
        }
        Commands::Delete { id } => {
            notes::delete(data_dir, &id).await?;
        }
        Commands::List { all } => {
            notes::list(data_dir, all).await?;
        }
        Commands::Sync => {
            let phrase = commands::read_phrase("Secret phrase: ")?;
            sync::run(data_dir, &phrase, KdfParams::default()).await?;
        }
        Commands::Status => {
            status::run(data_dir).await?;
        }
    }

    Ok(())
}

/// Resolve the data directory and make sure it exists, owner-only.
async fn prepare_data_dir(data_dir: Option<PathBuf>) -> Result<PathBuf> {
    let data_dir = match data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(&data_dir).await?;
    Ok(data_dir)
}

/// Get the default data directory for notesync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "notesync", "notesync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
