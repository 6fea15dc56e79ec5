//! JSON import/export module for practice decks.
//! A deck export carries the deck settings, the bookmarks it wraps and the full
//! entry and action history, so an imported deck schedules exactly like the original.

use crate::database::{db, decks, practice};
use crate::error::{PracticeError, Result};
use crate::models::{
    BookmarkEntry, Deck, DeckCache, DeckConfig, PracticeAction, PracticeEntry, clock,
};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedDeck {
    pub name: String,
    #[serde(flatten)]
    pub config: DeckConfig,
}

/// Self-contained deck snapshot. Records keep their original ids so that
/// references between them resolve; import assigns fresh ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckExport {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub deck: ExportedDeck,
    pub bookmark_entries: Vec<BookmarkEntry>,
    pub practice_entries: Vec<PracticeEntry>,
    pub practice_actions: Vec<PracticeAction>,
}

/// Collects a deck and its whole history
pub fn export_deck(
    conn: &Connection,
    user_id: i64,
    deck_id: i64,
    now: DateTime<Utc>,
) -> Result<DeckExport> {
    let deck = decks::get_deck(conn, user_id, deck_id)?;
    let practice_entries = practice::list_entries(conn, user_id, deck_id)?;
    let practice_actions = practice::list_actions(conn, user_id, deck_id)?;

    let bookmark_entries = practice_entries
        .iter()
        .map(|entry| db::get_bookmark(conn, user_id, entry.bookmark_entry_id))
        .collect::<Result<Vec<_>>>()?;

    Ok(DeckExport {
        version: EXPORT_VERSION,
        exported_at: clock::truncate_millis(now),
        deck: ExportedDeck {
            name: deck.name,
            config: deck.config,
        },
        bookmark_entries,
        practice_entries,
        practice_actions,
    })
}

/// Rejects instants finer than the millisecond precision of the store.
fn check_millis(record: &str, id: i64, at: DateTime<Utc>) -> Result<()> {
    if clock::truncate_millis(at) != at {
        return Err(PracticeError::InvalidExport(format!(
            "{record} {id} has sub-millisecond timestamp {at}"
        )));
    }
    Ok(())
}

fn validate(export: &DeckExport) -> Result<()> {
    if export.version != EXPORT_VERSION {
        return Err(PracticeError::UnsupportedExportVersion(export.version));
    }
    export.deck.config.validate()?;

    let mut bookmark_ids = HashSet::new();
    for bookmark in &export.bookmark_entries {
        if !bookmark_ids.insert(bookmark.id) {
            return Err(PracticeError::InvalidExport(format!(
                "duplicate bookmark id {}",
                bookmark.id
            )));
        }
        check_millis("bookmark", bookmark.id, bookmark.created_at)?;
    }

    let mut entry_ids = HashSet::new();
    let mut wrapped = HashSet::new();
    for entry in &export.practice_entries {
        if !entry_ids.insert(entry.id) {
            return Err(PracticeError::InvalidExport(format!(
                "duplicate practice entry id {}",
                entry.id
            )));
        }
        if !bookmark_ids.contains(&entry.bookmark_entry_id) {
            return Err(PracticeError::InvalidExport(format!(
                "practice entry {} references missing bookmark {}",
                entry.id, entry.bookmark_entry_id
            )));
        }
        if !wrapped.insert(entry.bookmark_entry_id) {
            return Err(PracticeError::InvalidExport(format!(
                "bookmark {} appears in more than one practice entry",
                entry.bookmark_entry_id
            )));
        }
        if !entry.ease_factor.is_finite() || entry.ease_factor <= 0.0 {
            return Err(PracticeError::InvalidExport(format!(
                "practice entry {} has invalid ease factor {}",
                entry.id, entry.ease_factor
            )));
        }
        for at in [entry.scheduled_at, entry.created_at, entry.updated_at] {
            check_millis("practice entry", entry.id, at)?;
        }
    }

    for action in &export.practice_actions {
        if !entry_ids.contains(&action.practice_entry_id) {
            return Err(PracticeError::InvalidExport(format!(
                "practice action {} references missing entry {}",
                action.id, action.practice_entry_id
            )));
        }
        check_millis("practice action", action.id, action.created_at)?;
    }

    Ok(())
}

/// Recreates an exported deck for `user_id` in one transaction.
///
/// Scheduling state (queue type, ease factor, interval, scheduled-at) and the
/// action log are kept as exported; only ids and ownership change. The deck
/// cache is rebuilt from the imported entries.
pub fn import_deck(
    conn: &Connection,
    user_id: i64,
    export: &DeckExport,
    now: DateTime<Utc>,
) -> Result<Deck> {
    validate(export)?;
    let now = clock::truncate_millis(now);
    let tx = conn.unchecked_transaction()?;
    db::get_user(&tx, user_id)?;

    let mut deck = Deck {
        id: 0,
        user_id,
        name: export.deck.name.clone(),
        config: export.deck.config.clone(),
        cache: DeckCache::from_queues(export.practice_entries.iter().map(|e| e.queue_type)),
        created_at: now,
        updated_at: now,
    };
    deck.id = decks::insert_deck(&tx, &deck)?;

    let mut bookmark_ids = HashMap::new();
    for bookmark in &export.bookmark_entries {
        let imported = BookmarkEntry {
            user_id,
            ..bookmark.clone()
        };
        bookmark_ids.insert(bookmark.id, db::insert_bookmark(&tx, &imported)?);
    }

    let mut entry_ids = HashMap::new();
    for entry in &export.practice_entries {
        let imported = PracticeEntry {
            deck_id: deck.id,
            bookmark_entry_id: bookmark_ids[&entry.bookmark_entry_id],
            ..entry.clone()
        };
        entry_ids.insert(entry.id, practice::insert_entry(&tx, &imported)?);
    }

    for action in &export.practice_actions {
        let imported = PracticeAction {
            user_id,
            deck_id: deck.id,
            practice_entry_id: entry_ids[&action.practice_entry_id],
            ..action.clone()
        };
        practice::insert_action(&tx, &imported)?;
    }

    tx.commit()?;
    info!(
        "Deck '{}' imported as {} ({} entries, {} actions)",
        deck.name,
        deck.id,
        export.practice_entries.len(),
        export.practice_actions.len()
    );
    Ok(deck)
}

/// Writes an export to a JSON file at the specified path.
pub fn export_json_to_path(export: &DeckExport, path: &Path) -> Result<()> {
    let json_string = serde_json::to_string_pretty(export)?;
    fs::write(path, json_string)?;
    info!("Deck '{}' exported to '{}'", export.deck.name, path.display());
    Ok(())
}

/// Reads an export from a JSON file.
/// Returns an error if the file doesn't exist or contains invalid JSON.
pub fn import_json(path: &Path) -> Result<DeckExport> {
    let contents = fs::read_to_string(path)?;
    let export: DeckExport = serde_json::from_str(&contents)?;
    Ok(export)
}
