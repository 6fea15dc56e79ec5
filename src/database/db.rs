//! Database setup and shared helpers
//!
//! Handles SQLite initialization, column conversions for the model types, and
//! the user and bookmark tables. Deck and practice queries live in
//! [`super::decks`] and [`super::practice`].
//!
//! Instants are stored as INTEGER Unix milliseconds. Every query that reads or
//! writes user data filters on `user_id`; rows owned by someone else are
//! reported as not found.

use super::decks;
use crate::error::{PracticeError, Result};
use crate::models::{ActionType, BookmarkEntry, DeckCache, QueueType, User, clock};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params};
use std::path::Path;

/// Opens (or creates) the database file and makes sure all tables exist
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    info!("Opened practice database at {}", path.display());
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates tables for users, bookmarks, decks, practice entries and the action log.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            timezone TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        (),
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bookmark_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            video_id TEXT,
            text TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )",
        (),
    )?;

    // `cache` holds DeckCache as JSON
    conn.execute(
        "CREATE TABLE IF NOT EXISTS decks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            new_entries_per_day INTEGER NOT NULL,
            reviews_per_day INTEGER NOT NULL,
            ease_multiplier REAL NOT NULL,
            ease_bonus REAL NOT NULL,
            cache TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )",
        (),
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS practice_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            deck_id INTEGER NOT NULL,
            bookmark_entry_id INTEGER NOT NULL,
            queue_type TEXT NOT NULL,
            ease_factor REAL NOT NULL,
            interval_secs INTEGER NOT NULL,
            scheduled_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE,
            FOREIGN KEY (bookmark_entry_id) REFERENCES bookmark_entries(id) ON DELETE CASCADE,
            UNIQUE(deck_id, bookmark_entry_id)
        )",
        (),
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS practice_entries_deck_scheduled
         ON practice_entries (deck_id, scheduled_at)",
        (),
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS practice_actions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            deck_id INTEGER NOT NULL,
            practice_entry_id INTEGER NOT NULL,
            action_type TEXT NOT NULL,
            queue_type TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE,
            FOREIGN KEY (practice_entry_id) REFERENCES practice_entries(id) ON DELETE CASCADE
        )",
        (),
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS practice_actions_deck_created
         ON practice_actions (deck_id, created_at)",
        (),
    )?;

    Ok(())
}

// ==================== Column conversions ====================

pub(crate) fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub(crate) fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    clock::from_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

impl ToSql for QueueType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for QueueType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: PracticeError| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for ActionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ActionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: PracticeError| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for DeckCache {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let json = serde_json::to_string(self)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(json))
    }
}

impl FromSql for DeckCache {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        serde_json::from_str(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

// ==================== Users ====================

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        timezone: row.get(2)?,
        created_at: time_column(row, 3)?,
    })
}

/// Creates a user. `timezone` must be a UTC offset such as `+09:00`.
pub fn create_user(
    conn: &Connection,
    username: &str,
    timezone: &str,
    now: DateTime<Utc>,
) -> Result<User> {
    clock::parse_timezone(timezone)?;
    let now = clock::truncate_millis(now);

    conn.execute(
        "INSERT INTO users (username, timezone, created_at) VALUES (?1, ?2, ?3)",
        params![username, timezone, to_millis(now)],
    )?;
    info!("User '{}' created ({})", username, timezone);

    Ok(User {
        id: conn.last_insert_rowid(),
        username: username.to_string(),
        timezone: timezone.to_string(),
        created_at: now,
    })
}

pub fn get_user(conn: &Connection, user_id: i64) -> Result<User> {
    conn.query_row(
        "SELECT id, username, timezone, created_at FROM users WHERE id = ?1",
        params![user_id],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| PracticeError::UserNotFound(user_id.to_string()))
}

pub fn get_user_by_name(conn: &Connection, username: &str) -> Result<User> {
    conn.query_row(
        "SELECT id, username, timezone, created_at FROM users WHERE username = ?1",
        params![username],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| PracticeError::UserNotFound(username.to_string()))
}

// ==================== Bookmarks ====================

fn bookmark_from_row(row: &Row<'_>) -> rusqlite::Result<BookmarkEntry> {
    Ok(BookmarkEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        video_id: row.get(2)?,
        text: row.get(3)?,
        created_at: time_column(row, 4)?,
    })
}

pub(crate) fn insert_bookmark(conn: &Connection, bookmark: &BookmarkEntry) -> Result<i64> {
    conn.execute(
        "INSERT INTO bookmark_entries (user_id, video_id, text, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            bookmark.user_id,
            bookmark.video_id,
            bookmark.text,
            to_millis(bookmark.created_at)
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn create_bookmark(
    conn: &Connection,
    user_id: i64,
    video_id: Option<&str>,
    text: &str,
    now: DateTime<Utc>,
) -> Result<BookmarkEntry> {
    get_user(conn, user_id)?;

    let mut bookmark = BookmarkEntry {
        id: 0,
        user_id,
        video_id: video_id.map(str::to_string),
        text: text.to_string(),
        created_at: clock::truncate_millis(now),
    };
    bookmark.id = insert_bookmark(conn, &bookmark)?;
    Ok(bookmark)
}

pub fn get_bookmark(conn: &Connection, user_id: i64, bookmark_id: i64) -> Result<BookmarkEntry> {
    conn.query_row(
        "SELECT id, user_id, video_id, text, created_at
         FROM bookmark_entries WHERE id = ?1 AND user_id = ?2",
        params![bookmark_id, user_id],
        bookmark_from_row,
    )
    .optional()?
    .ok_or(PracticeError::BookmarkNotFound(bookmark_id))
}

pub fn list_bookmarks(conn: &Connection, user_id: i64) -> Result<Vec<BookmarkEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, video_id, text, created_at
         FROM bookmark_entries WHERE user_id = ?1 ORDER BY id",
    )?;
    let bookmarks = stmt
        .query_map(params![user_id], bookmark_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(bookmarks)
}

/// Deletes a bookmark together with its practice entries and their actions,
/// adjusting the cache of every deck that contained it.
pub fn delete_bookmark(
    conn: &Connection,
    user_id: i64,
    bookmark_id: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    let now = clock::truncate_millis(now);
    let tx = conn.unchecked_transaction()?;
    get_bookmark(&tx, user_id, bookmark_id)?;

    let affected = {
        let mut stmt = tx.prepare(
            "SELECT deck_id, queue_type FROM practice_entries WHERE bookmark_entry_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![bookmark_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, QueueType>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    for (deck_id, queue_type) in affected {
        let mut deck = decks::get_deck(&tx, user_id, deck_id)?;
        deck.cache.decrement(queue_type);
        decks::save_deck_cache(&tx, deck_id, &deck.cache, now)?;
    }

    tx.execute(
        "DELETE FROM bookmark_entries WHERE id = ?1",
        params![bookmark_id],
    )?;
    tx.commit()?;

    info!("Bookmark {} deleted", bookmark_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::practice;
    use crate::models::DeckConfig;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        assert!(init_schema(&conn).is_ok());
    }

    #[test]
    fn test_open_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("practice.sqlite3");
        {
            let conn = open_database(&path).unwrap();
            create_user(&conn, "alice", "+09:00", now()).unwrap();
        }

        let conn = open_database(&path).unwrap();
        let user = get_user_by_name(&conn, "alice").unwrap();
        assert_eq!(user.timezone, "+09:00");
        assert_eq!(user.created_at, now());
    }

    #[test]
    fn test_create_user_validates_timezone() {
        let conn = open_in_memory().unwrap();
        let result = create_user(&conn, "alice", "Asia/Tokyo", now());
        assert!(matches!(result, Err(PracticeError::InvalidTimezone(_))));
    }

    #[test]
    fn test_duplicate_username_fails() {
        let conn = open_in_memory().unwrap();
        create_user(&conn, "alice", "+00:00", now()).unwrap();
        assert!(create_user(&conn, "alice", "+00:00", now()).is_err());
    }

    #[test]
    fn test_unknown_user() {
        let conn = open_in_memory().unwrap();
        assert!(matches!(get_user(&conn, 42), Err(PracticeError::UserNotFound(_))));
    }

    #[test]
    fn test_bookmarks_are_scoped_by_user() {
        let conn = open_in_memory().unwrap();
        let alice = create_user(&conn, "alice", "+00:00", now()).unwrap();
        let bob = create_user(&conn, "bob", "+00:00", now()).unwrap();

        let bookmark = create_bookmark(&conn, alice.id, Some("dQw4w9WgXcQ"), "bonjour", now()).unwrap();
        assert_eq!(list_bookmarks(&conn, alice.id).unwrap(), vec![bookmark.clone()]);
        assert!(list_bookmarks(&conn, bob.id).unwrap().is_empty());

        let result = get_bookmark(&conn, bob.id, bookmark.id);
        assert!(matches!(result, Err(PracticeError::BookmarkNotFound(_))));
        let result = delete_bookmark(&conn, bob.id, bookmark.id, now());
        assert!(matches!(result, Err(PracticeError::BookmarkNotFound(_))));
        assert_eq!(list_bookmarks(&conn, alice.id).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_bookmark_cascades_and_adjusts_cache() {
        let conn = open_in_memory().unwrap();
        let user = create_user(&conn, "alice", "+00:00", now()).unwrap();
        let deck = decks::create_deck(&conn, user.id, "French", &DeckConfig::default(), now()).unwrap();
        let first = create_bookmark(&conn, user.id, None, "bonjour", now()).unwrap();
        let second = create_bookmark(&conn, user.id, None, "merci", now()).unwrap();

        let entry = practice::add_entry(&conn, user.id, deck.id, first.id, 2.5, now()).unwrap();
        practice::add_entry(&conn, user.id, deck.id, second.id, 2.5, now()).unwrap();
        practice::record_action(&conn, user.id, entry.id, ActionType::Good, now()).unwrap();

        delete_bookmark(&conn, user.id, first.id, now()).unwrap();

        let deck = decks::get_deck(&conn, user.id, deck.id).unwrap();
        assert_eq!(deck.cache.review_count, 0);
        assert_eq!(deck.cache.new_count, 1);
        assert_eq!(deck.cache, decks::count_entries_by_queue(&conn, deck.id).unwrap());
        assert!(practice::list_actions(&conn, user.id, deck.id).unwrap().is_empty());
        assert!(matches!(
            practice::get_entry(&conn, user.id, entry.id),
            Err(PracticeError::EntryNotFound(_))
        ));
    }
}
