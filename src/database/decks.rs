//! Deck queries and maintenance of the per-deck queue counts.

use super::db::{time_column, to_millis};
use crate::error::{PracticeError, Result};
use crate::models::{Deck, DeckCache, DeckConfig, QueueType, clock};
use chrono::{DateTime, Utc};
use log::{info, warn};
use rusqlite::{Connection, OptionalExtension, Row, params};

const DECK_COLUMNS: &str = "id, user_id, name, new_entries_per_day, reviews_per_day,
    ease_multiplier, ease_bonus, cache, created_at, updated_at";

fn deck_from_row(row: &Row<'_>) -> rusqlite::Result<Deck> {
    Ok(Deck {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        config: DeckConfig {
            new_entries_per_day: row.get(3)?,
            reviews_per_day: row.get(4)?,
            ease_multiplier: row.get(5)?,
            ease_bonus: row.get(6)?,
        },
        cache: row.get(7)?,
        created_at: time_column(row, 8)?,
        updated_at: time_column(row, 9)?,
    })
}

pub(crate) fn insert_deck(conn: &Connection, deck: &Deck) -> Result<i64> {
    conn.execute(
        "INSERT INTO decks (user_id, name, new_entries_per_day, reviews_per_day,
            ease_multiplier, ease_bonus, cache, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            deck.user_id,
            deck.name,
            deck.config.new_entries_per_day,
            deck.config.reviews_per_day,
            deck.config.ease_multiplier,
            deck.config.ease_bonus,
            deck.cache,
            to_millis(deck.created_at),
            to_millis(deck.updated_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Creates an empty deck owned by `user_id`
pub fn create_deck(
    conn: &Connection,
    user_id: i64,
    name: &str,
    config: &DeckConfig,
    now: DateTime<Utc>,
) -> Result<Deck> {
    config.validate()?;
    super::db::get_user(conn, user_id)?;
    let now = clock::truncate_millis(now);

    let mut deck = Deck {
        id: 0,
        user_id,
        name: name.to_string(),
        config: config.clone(),
        cache: DeckCache::default(),
        created_at: now,
        updated_at: now,
    };
    deck.id = insert_deck(conn, &deck)?;

    info!("Deck '{}' created (id {})", name, deck.id);
    Ok(deck)
}

pub fn get_deck(conn: &Connection, user_id: i64, deck_id: i64) -> Result<Deck> {
    conn.query_row(
        &format!("SELECT {DECK_COLUMNS} FROM decks WHERE id = ?1 AND user_id = ?2"),
        params![deck_id, user_id],
        deck_from_row,
    )
    .optional()?
    .ok_or(PracticeError::DeckNotFound(deck_id))
}

pub fn list_decks(conn: &Connection, user_id: i64) -> Result<Vec<Deck>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DECK_COLUMNS} FROM decks WHERE user_id = ?1 ORDER BY id"
    ))?;
    let decks = stmt
        .query_map(params![user_id], deck_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(decks)
}

/// Renames a deck and replaces its scheduling settings. Entries keep their state;
/// new settings apply from their next review.
pub fn update_deck(
    conn: &Connection,
    user_id: i64,
    deck_id: i64,
    name: &str,
    config: &DeckConfig,
    now: DateTime<Utc>,
) -> Result<Deck> {
    config.validate()?;
    let now = clock::truncate_millis(now);
    let mut deck = get_deck(conn, user_id, deck_id)?;

    conn.execute(
        "UPDATE decks
         SET name = ?1, new_entries_per_day = ?2, reviews_per_day = ?3,
             ease_multiplier = ?4, ease_bonus = ?5, updated_at = ?6
         WHERE id = ?7",
        params![
            name,
            config.new_entries_per_day,
            config.reviews_per_day,
            config.ease_multiplier,
            config.ease_bonus,
            to_millis(now),
            deck_id
        ],
    )?;

    deck.name = name.to_string();
    deck.config = config.clone();
    deck.updated_at = now;
    Ok(deck)
}

/// Deletes a deck; its entries and their actions go with it
pub fn delete_deck(conn: &Connection, user_id: i64, deck_id: i64) -> Result<()> {
    let deck = get_deck(conn, user_id, deck_id)?;
    conn.execute("DELETE FROM decks WHERE id = ?1", params![deck_id])?;
    info!("Deck '{}' deleted (id {})", deck.name, deck_id);
    Ok(())
}

pub(crate) fn save_deck_cache(
    conn: &Connection,
    deck_id: i64,
    cache: &DeckCache,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE decks SET cache = ?1, updated_at = ?2 WHERE id = ?3",
        params![cache, to_millis(now), deck_id],
    )?;
    Ok(())
}

/// Counts a deck's entries per queue type straight from the entries table
pub fn count_entries_by_queue(conn: &Connection, deck_id: i64) -> Result<DeckCache> {
    let mut stmt = conn.prepare(
        "SELECT queue_type, COUNT(*) FROM practice_entries WHERE deck_id = ?1 GROUP BY queue_type",
    )?;
    let counts = stmt
        .query_map(params![deck_id], |row| {
            Ok((row.get::<_, QueueType>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut cache = DeckCache::default();
    for (queue_type, count) in counts {
        let count = count.max(0) as u64;
        match queue_type {
            QueueType::New => cache.new_count = count,
            QueueType::Learn => cache.learn_count = count,
            QueueType::Review => cache.review_count = count,
        }
    }
    Ok(cache)
}

/// Recomputes the deck cache from its entries and stores it
pub fn repair_deck_cache(
    conn: &Connection,
    user_id: i64,
    deck_id: i64,
    now: DateTime<Utc>,
) -> Result<Deck> {
    let now = clock::truncate_millis(now);
    let tx = conn.unchecked_transaction()?;
    let mut deck = get_deck(&tx, user_id, deck_id)?;
    let actual = count_entries_by_queue(&tx, deck_id)?;

    if actual != deck.cache {
        warn!(
            "Deck {} cache drifted: stored {:?}, actual {:?}",
            deck_id, deck.cache, actual
        );
        save_deck_cache(&tx, deck_id, &actual, now)?;
        deck.cache = actual;
        deck.updated_at = now;
    } else {
        info!("Deck {} cache is consistent", deck_id);
    }

    tx.commit()?;
    Ok(deck)
}
