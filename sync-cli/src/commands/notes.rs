//! Local note commands: add, edit, delete, list.
//!
//! These only touch the local store. Changes are marked pending and go out
//! on the next `notesync sync`.

use anyhow::{Context, Result};
use std::path::Path;
use sync_client::now_ms;
use sync_core::Note;
use sync_types::NoteId;

use super::{format_age, local_notes};
use crate::config::Settings;

fn parse_id(id: &str) -> Result<NoteId> {
    NoteId::from_hex(id).with_context(|| format!("Invalid note id: {id}"))
}

/// Create a note and return its id.
pub async fn add(data_dir: &Path, title: &str, content: &str) -> Result<NoteId> {
    Settings::load(data_dir).await?;
    let notes = local_notes(data_dir);

    let id = notes
        .update(|notes: &mut Vec<Note>| {
            // Ids are creation times; keep them unique within this store
            let mut now = now_ms();
            if let Some(max) = notes.iter().map(|n| n.id).max() {
                now = now.max(max + 1);
            }
            let note = Note::new(now, title, content);
            let id = note.note_id();
            notes.push(note);
            Ok::<_, anyhow::Error>(id)
        })
        .await?;

    println!("Added note {id}");
    Ok(id)
}

/// Edit a note's title and/or content.
pub async fn edit(
    data_dir: &Path,
    id: &str,
    title: Option<String>,
    content: Option<String>,
) -> Result<()> {
    Settings::load(data_dir).await?;
    let id = parse_id(id)?;
    if title.is_none() && content.is_none() {
        anyhow::bail!("Nothing to change. Pass --title and/or --content.");
    }

    local_notes(data_dir)
        .update(|notes: &mut Vec<Note>| {
            let note = find_live(notes, id)?;
            let title = title.unwrap_or_else(|| note.title.clone());
            let content = content.unwrap_or_else(|| note.content.clone());
            note.edit(title, content, now_ms());
            Ok::<_, anyhow::Error>(())
        })
        .await?;

    println!("Updated note {id}");
    Ok(())
}

/// Mark a note deleted. The tombstone syncs like any other change.
pub async fn delete(data_dir: &Path, id: &str) -> Result<()> {
    Settings::load(data_dir).await?;
    let id = parse_id(id)?;

    local_notes(data_dir)
        .update(|notes: &mut Vec<Note>| {
            find_live(notes, id)?.tombstone(now_ms());
            Ok::<_, anyhow::Error>(())
        })
        .await?;

    println!("Deleted note {id}");
    Ok(())
}

/// Print notes, newest first. Deleted notes only with `all`.
pub async fn list(data_dir: &Path, all: bool) -> Result<Vec<Note>> {
    Settings::load(data_dir).await?;
    let mut notes: Vec<Note> = local_notes(data_dir)
        .snapshot()
        .await?
        .into_iter()
        .filter(|n| all || !n.deleted)
        .collect();
    notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    if notes.is_empty() {
        println!("No notes.");
        return Ok(notes);
    }

    for note in &notes {
        let mut flags = Vec::new();
        if note.pending_sync {
            flags.push("pending");
        }
        if note.deleted {
            flags.push("deleted");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };

        println!(
            "{}  {}{}  ({})",
            note.note_id(),
            note.title,
            flags,
            format_age(note.updated_at)
        );
        if !note.deleted && !note.content.is_empty() {
            for line in note.content.lines().take(3) {
                println!("    {line}");
            }
        }
    }

    Ok(notes)
}

fn find_live(notes: &mut [Note], id: NoteId) -> Result<&mut Note> {
    notes
        .iter_mut()
        .find(|n| n.note_id() == id && !n.deleted)
        .with_context(|| format!("No note {id}"))
}
