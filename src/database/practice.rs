//! Practice entries and the action log.
//!
//! A review runs as one transaction: the action is appended to the log, the
//! scheduler computes the entry's next state, the entry is updated and the
//! deck cache is adjusted for the queue change.

use super::db::{get_bookmark, get_user, time_column, to_millis};
use super::decks::{get_deck, save_deck_cache};
use crate::error::{PracticeError, Result};
use crate::models::scheduler::{self, DailyUsage};
use crate::models::{
    ActionType, DailyHistory, PracticeAction, PracticeEntry, QueueType, User, clock,
};
use chrono::{DateTime, TimeDelta, Utc};
use log::info;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// Longest history `deck_history` will build
pub const MAX_HISTORY_DAYS: u32 = 3650;

const ENTRY_COLUMNS: &str = "e.id, e.deck_id, e.bookmark_entry_id, e.queue_type, e.ease_factor,
    e.interval_secs, e.scheduled_at, e.created_at, e.updated_at";

const ACTION_COLUMNS: &str =
    "id, action_type, queue_type, created_at, user_id, deck_id, practice_entry_id";

/// Result of applying one review action.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewOutcome {
    pub action: PracticeAction,
    pub entry: PracticeEntry,
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<PracticeEntry> {
    Ok(PracticeEntry {
        id: row.get(0)?,
        deck_id: row.get(1)?,
        bookmark_entry_id: row.get(2)?,
        queue_type: row.get(3)?,
        ease_factor: row.get(4)?,
        interval_secs: row.get(5)?,
        scheduled_at: time_column(row, 6)?,
        created_at: time_column(row, 7)?,
        updated_at: time_column(row, 8)?,
    })
}

fn action_from_row(row: &Row<'_>) -> rusqlite::Result<PracticeAction> {
    Ok(PracticeAction {
        id: row.get(0)?,
        action_type: row.get(1)?,
        queue_type: row.get(2)?,
        created_at: time_column(row, 3)?,
        user_id: row.get(4)?,
        deck_id: row.get(5)?,
        practice_entry_id: row.get(6)?,
    })
}

pub(crate) fn insert_entry(conn: &Connection, entry: &PracticeEntry) -> Result<i64> {
    conn.execute(
        "INSERT INTO practice_entries (deck_id, bookmark_entry_id, queue_type, ease_factor,
            interval_secs, scheduled_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.deck_id,
            entry.bookmark_entry_id,
            entry.queue_type,
            entry.ease_factor,
            entry.interval_secs,
            to_millis(entry.scheduled_at),
            to_millis(entry.created_at),
            to_millis(entry.updated_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn insert_action(conn: &Connection, action: &PracticeAction) -> Result<i64> {
    conn.execute(
        "INSERT INTO practice_actions (user_id, deck_id, practice_entry_id, action_type,
            queue_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            action.user_id,
            action.deck_id,
            action.practice_entry_id,
            action.action_type,
            action.queue_type,
            to_millis(action.created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Adds a bookmark to a deck as a NEW entry due immediately
pub fn add_entry(
    conn: &Connection,
    user_id: i64,
    deck_id: i64,
    bookmark_entry_id: i64,
    ease_factor: f64,
    now: DateTime<Utc>,
) -> Result<PracticeEntry> {
    if !ease_factor.is_finite() || ease_factor <= 0.0 {
        return Err(PracticeError::InvalidDeckConfig(format!(
            "initial ease factor must be positive, got {ease_factor}"
        )));
    }
    let now = clock::truncate_millis(now);
    let tx = conn.unchecked_transaction()?;

    let mut deck = get_deck(&tx, user_id, deck_id)?;
    get_bookmark(&tx, user_id, bookmark_entry_id)?;

    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM practice_entries WHERE deck_id = ?1 AND bookmark_entry_id = ?2",
            params![deck_id, bookmark_entry_id],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Err(PracticeError::DuplicateEntry {
            deck_id,
            bookmark_id: bookmark_entry_id,
        });
    }

    let mut entry = PracticeEntry {
        id: 0,
        deck_id,
        bookmark_entry_id,
        queue_type: QueueType::New,
        ease_factor,
        interval_secs: 0,
        scheduled_at: now,
        created_at: now,
        updated_at: now,
    };
    entry.id = insert_entry(&tx, &entry)?;

    deck.cache.increment(QueueType::New);
    save_deck_cache(&tx, deck_id, &deck.cache, now)?;
    tx.commit()?;

    info!(
        "Bookmark {} added to deck {} as entry {}",
        bookmark_entry_id, deck_id, entry.id
    );
    Ok(entry)
}

pub fn get_entry(conn: &Connection, user_id: i64, entry_id: i64) -> Result<PracticeEntry> {
    conn.query_row(
        &format!(
            "SELECT {ENTRY_COLUMNS} FROM practice_entries e
             JOIN decks d ON d.id = e.deck_id
             WHERE e.id = ?1 AND d.user_id = ?2"
        ),
        params![entry_id, user_id],
        entry_from_row,
    )
    .optional()?
    .ok_or(PracticeError::EntryNotFound(entry_id))
}

pub fn list_entries(conn: &Connection, user_id: i64, deck_id: i64) -> Result<Vec<PracticeEntry>> {
    get_deck(conn, user_id, deck_id)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM practice_entries e WHERE e.deck_id = ?1 ORDER BY e.id"
    ))?;
    let entries = stmt
        .query_map(params![deck_id], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

fn due_entries(conn: &Connection, deck_id: i64, now: DateTime<Utc>) -> Result<Vec<PracticeEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM practice_entries e
         WHERE e.deck_id = ?1 AND e.scheduled_at <= ?2
         ORDER BY e.scheduled_at ASC, e.id ASC"
    ))?;
    let entries = stmt
        .query_map(params![deck_id, to_millis(now)], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

/// Applies a review action to an entry
///
/// Appends the action to the log, moves the entry to the state computed by
/// the scheduler and adjusts the deck cache, all in one transaction.
pub fn record_action(
    conn: &Connection,
    user_id: i64,
    entry_id: i64,
    action_type: ActionType,
    now: DateTime<Utc>,
) -> Result<ReviewOutcome> {
    let now = clock::truncate_millis(now);
    let tx = conn.unchecked_transaction()?;

    let mut entry = get_entry(&tx, user_id, entry_id)?;
    let mut deck = get_deck(&tx, user_id, entry.deck_id)?;

    let mut action = PracticeAction {
        id: 0,
        action_type,
        queue_type: entry.queue_type,
        created_at: now,
        user_id,
        deck_id: deck.id,
        practice_entry_id: entry.id,
    };
    action.id = insert_action(&tx, &action)?;

    let next = scheduler::calculate_next_state(&entry, &deck.config, action_type, now);
    next.apply_to(&mut entry, now);

    tx.execute(
        "UPDATE practice_entries
         SET queue_type = ?1, ease_factor = ?2, interval_secs = ?3, scheduled_at = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            entry.queue_type,
            entry.ease_factor,
            entry.interval_secs,
            to_millis(entry.scheduled_at),
            to_millis(entry.updated_at),
            entry.id
        ],
    )?;

    deck.cache.transition(action.queue_type, entry.queue_type);
    save_deck_cache(&tx, deck.id, &deck.cache, now)?;
    tx.commit()?;

    info!(
        "Entry {} reviewed {}: {} -> {}, next at {}",
        entry.id, action_type, action.queue_type, entry.queue_type, entry.scheduled_at
    );
    Ok(ReviewOutcome { action, entry })
}

pub fn list_actions(conn: &Connection, user_id: i64, deck_id: i64) -> Result<Vec<PracticeAction>> {
    get_deck(conn, user_id, deck_id)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {ACTION_COLUMNS} FROM practice_actions WHERE deck_id = ?1 ORDER BY id"
    ))?;
    let actions = stmt
        .query_map(params![deck_id], action_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(actions)
}

fn user_offset(conn: &Connection, user_id: i64) -> Result<chrono::FixedOffset> {
    let user: User = get_user(conn, user_id)?;
    user.offset()
}

/// Counts the deck's actions taken during the user's current local day
pub fn daily_usage(
    conn: &Connection,
    user_id: i64,
    deck_id: i64,
    now: DateTime<Utc>,
) -> Result<DailyUsage> {
    get_deck(conn, user_id, deck_id)?;
    let offset = user_offset(conn, user_id)?;
    let (start, end) = clock::local_day_range(now, offset);

    let mut stmt = conn.prepare(
        "SELECT queue_type, COUNT(*) FROM practice_actions
         WHERE deck_id = ?1 AND created_at >= ?2 AND created_at < ?3
         GROUP BY queue_type",
    )?;
    let counts = stmt
        .query_map(params![deck_id, to_millis(start), to_millis(end)], |row| {
            Ok((row.get::<_, QueueType>(0)?, row.get::<_, u32>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut usage = DailyUsage::default();
    for (queue_type, count) in counts {
        match queue_type {
            QueueType::New => usage.new_count += count,
            QueueType::Learn | QueueType::Review => usage.review_count += count,
        }
    }
    Ok(usage)
}

/// Entries to present next, honoring the deck's daily caps
pub fn next_entries(
    conn: &Connection,
    user_id: i64,
    deck_id: i64,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<PracticeEntry>> {
    let deck = get_deck(conn, user_id, deck_id)?;
    let usage = daily_usage(conn, user_id, deck_id, now)?;
    let due = due_entries(conn, deck_id, now)?;

    let next = scheduler::next_entries(&due, &deck.config, usage, now, limit)
        .into_iter()
        .cloned()
        .collect();
    Ok(next)
}

/// Per-day action counts for the last `days` local days, oldest first, today last
pub fn deck_history(
    conn: &Connection,
    user_id: i64,
    deck_id: i64,
    now: DateTime<Utc>,
    days: u32,
) -> Result<Vec<DailyHistory>> {
    if days > MAX_HISTORY_DAYS {
        return Err(PracticeError::InvalidHistoryRange(days));
    }
    get_deck(conn, user_id, deck_id)?;
    if days == 0 {
        return Ok(Vec::new());
    }
    let offset = user_offset(conn, user_id)?;

    let today = clock::local_date(now, offset);
    let first = today
        .checked_sub_signed(TimeDelta::days(i64::from(days - 1)))
        .ok_or(PracticeError::InvalidHistoryRange(days))?;
    let start = clock::start_of_local_day(first, offset);
    let end = clock::start_of_local_day(today, offset)
        .checked_add_signed(TimeDelta::days(1))
        .ok_or(PracticeError::InvalidHistoryRange(days))?;

    let mut history: Vec<DailyHistory> = (0..days)
        .map(|i| DailyHistory::new(first + TimeDelta::days(i64::from(i))))
        .collect();

    let mut stmt = conn.prepare(
        "SELECT action_type, created_at FROM practice_actions
         WHERE deck_id = ?1 AND created_at >= ?2 AND created_at < ?3",
    )?;
    let actions = stmt
        .query_map(params![deck_id, to_millis(start), to_millis(end)], |row| {
            Ok((row.get::<_, ActionType>(0)?, time_column(row, 1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for (action_type, created_at) in actions {
        let day = (clock::local_date(created_at, offset) - first).num_days();
        if let Some(slot) = usize::try_from(day).ok().and_then(|i| history.get_mut(i)) {
            slot.record(action_type);
        }
    }
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::db::{create_bookmark, create_user, open_in_memory};
    use crate::database::decks::{count_entries_by_queue, create_deck};
    use crate::models::DeckConfig;
    use crate::models::scheduler::{AGAIN_INTERVAL_SECS, GRADUATING_INTERVAL_SECS};
    use chrono::NaiveDate;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn now() -> DateTime<Utc> {
        at("2024-03-01T12:00:00Z")
    }

    struct Fixture {
        conn: Connection,
        user_id: i64,
        deck_id: i64,
    }

    fn setup(timezone: &str, config: DeckConfig) -> Fixture {
        let conn = open_in_memory().unwrap();
        let user = create_user(&conn, "alice", timezone, now()).unwrap();
        let deck = create_deck(&conn, user.id, "French", &config, now()).unwrap();
        Fixture {
            conn,
            user_id: user.id,
            deck_id: deck.id,
        }
    }

    fn add(fx: &Fixture, text: &str, ease: f64) -> PracticeEntry {
        let bookmark = create_bookmark(&fx.conn, fx.user_id, Some("abc"), text, now()).unwrap();
        add_entry(&fx.conn, fx.user_id, fx.deck_id, bookmark.id, ease, now()).unwrap()
    }

    fn assert_cache_consistent(fx: &Fixture) {
        let deck = get_deck(&fx.conn, fx.user_id, fx.deck_id).unwrap();
        assert_eq!(deck.cache, count_entries_by_queue(&fx.conn, fx.deck_id).unwrap());
    }

    #[test]
    fn test_add_entry_starts_new() {
        let fx = setup("+00:00", DeckConfig::default());
        let entry = add(&fx, "bonjour", 2.5);

        assert_eq!(entry.queue_type, QueueType::New);
        assert_eq!(entry.ease_factor, 2.5);
        assert_eq!(entry.scheduled_at, now());
        assert_eq!(get_entry(&fx.conn, fx.user_id, entry.id).unwrap(), entry);

        let deck = get_deck(&fx.conn, fx.user_id, fx.deck_id).unwrap();
        assert_eq!(deck.cache.new_count, 1);
    }

    #[test]
    fn test_add_entry_twice_is_rejected() {
        let fx = setup("+00:00", DeckConfig::default());
        let entry = add(&fx, "bonjour", 2.5);

        let result = add_entry(&fx.conn, fx.user_id, fx.deck_id, entry.bookmark_entry_id, 2.5, now());
        assert!(matches!(result, Err(PracticeError::DuplicateEntry { .. })));
        assert_eq!(get_deck(&fx.conn, fx.user_id, fx.deck_id).unwrap().cache.new_count, 1);
    }

    #[test]
    fn test_add_entry_rejects_bad_ease() {
        let fx = setup("+00:00", DeckConfig::default());
        let bookmark = create_bookmark(&fx.conn, fx.user_id, None, "x", now()).unwrap();
        let result = add_entry(&fx.conn, fx.user_id, fx.deck_id, bookmark.id, 0.0, now());
        assert!(result.is_err());
    }

    #[test]
    fn test_record_action_scenario() {
        let fx = setup("+00:00", DeckConfig::default());
        let entry = add(&fx, "bonjour", 2.0);

        let outcome = record_action(&fx.conn, fx.user_id, entry.id, ActionType::Good, now()).unwrap();
        assert_eq!(outcome.entry.queue_type, QueueType::Review);
        assert_eq!(outcome.entry.ease_factor, 2.0);
        assert_eq!(outcome.entry.interval_secs, GRADUATING_INTERVAL_SECS);
        assert_eq!(outcome.action.queue_type, QueueType::New);
        assert_eq!(outcome.action.action_type, ActionType::Good);

        let later = now() + TimeDelta::days(1);
        let outcome = record_action(&fx.conn, fx.user_id, entry.id, ActionType::Again, later).unwrap();
        assert_eq!(outcome.entry.queue_type, QueueType::Learn);
        assert!(outcome.entry.ease_factor < 2.0);
        assert_eq!(
            outcome.entry.scheduled_at,
            later + TimeDelta::seconds(AGAIN_INTERVAL_SECS)
        );

        let stored = get_entry(&fx.conn, fx.user_id, entry.id).unwrap();
        assert_eq!(stored, outcome.entry);

        let actions = list_actions(&fx.conn, fx.user_id, fx.deck_id).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[1], outcome.action);

        let deck = get_deck(&fx.conn, fx.user_id, fx.deck_id).unwrap();
        assert_eq!(deck.cache.learn_count, 1);
        assert_eq!(deck.cache.new_count, 0);
        assert_eq!(deck.cache.review_count, 0);
    }

    #[test]
    fn test_record_action_on_foreign_entry_mutates_nothing() {
        let fx = setup("+00:00", DeckConfig::default());
        let entry = add(&fx, "bonjour", 2.5);
        let bob = create_user(&fx.conn, "bob", "+00:00", now()).unwrap();

        let result = record_action(&fx.conn, bob.id, entry.id, ActionType::Easy, now());
        assert!(matches!(result, Err(PracticeError::EntryNotFound(_))));

        assert_eq!(get_entry(&fx.conn, fx.user_id, entry.id).unwrap(), entry);
        assert!(list_actions(&fx.conn, fx.user_id, fx.deck_id).unwrap().is_empty());
    }

    #[test]
    fn test_cache_tracks_every_transition() {
        let fx = setup("+00:00", DeckConfig::default());
        let entries: Vec<PracticeEntry> =
            ["un", "deux", "trois", "quatre"].iter().map(|t| add(&fx, t, 2.5)).collect();

        let script = [
            (0, ActionType::Good),
            (1, ActionType::Hard),
            (0, ActionType::Again),
            (2, ActionType::Easy),
            (1, ActionType::Good),
            (0, ActionType::Hard),
            (2, ActionType::Again),
        ];
        for (i, (index, action)) in script.into_iter().enumerate() {
            let when = now() + TimeDelta::hours(i as i64);
            record_action(&fx.conn, fx.user_id, entries[index].id, action, when).unwrap();
            assert_cache_consistent(&fx);
        }

        let deck = get_deck(&fx.conn, fx.user_id, fx.deck_id).unwrap();
        assert_eq!(deck.cache.total(), 4);
        assert_eq!(deck.cache.new_count, 1);
    }

    #[test]
    fn test_new_admissions_capped_per_day() {
        let config = DeckConfig {
            new_entries_per_day: 2,
            ..DeckConfig::default()
        };
        let fx = setup("+00:00", config);
        for text in ["a", "b", "c", "d", "e"] {
            add(&fx, text, 2.5);
        }

        let mut reviewed_today = 0;
        loop {
            let next = next_entries(&fx.conn, fx.user_id, fx.deck_id, now(), 1).unwrap();
            let Some(entry) = next.first() else { break };
            record_action(&fx.conn, fx.user_id, entry.id, ActionType::Good, now()).unwrap();
            reviewed_today += 1;
            assert!(reviewed_today <= 2, "admitted more NEW entries than the cap");
        }
        assert_eq!(reviewed_today, 2);

        let usage = daily_usage(&fx.conn, fx.user_id, fx.deck_id, now()).unwrap();
        assert_eq!(usage.new_count, 2);
        assert_eq!(usage.review_count, 0);

        // next day: the two graduated entries are due, and two more NEW ones are admitted
        let tomorrow = now() + TimeDelta::days(1);
        let next = next_entries(&fx.conn, fx.user_id, fx.deck_id, tomorrow, 10).unwrap();
        let queues: Vec<QueueType> = next.iter().map(|e| e.queue_type).collect();
        assert_eq!(
            queues,
            vec![QueueType::Review, QueueType::Review, QueueType::New, QueueType::New]
        );
    }

    #[test]
    fn test_daily_usage_follows_user_timezone() {
        // 23:00 in Tokyo on March 1st
        let fx = setup("+09:00", DeckConfig::default());
        let entry = add(&fx, "konnichiwa", 2.5);
        record_action(&fx.conn, fx.user_id, entry.id, ActionType::Hard, at("2024-03-01T14:00:00Z"))
            .unwrap();

        // 00:30 on March 2nd in Tokyo: a new day has started
        let usage = daily_usage(&fx.conn, fx.user_id, fx.deck_id, at("2024-03-01T15:30:00Z")).unwrap();
        assert_eq!(usage, DailyUsage::default());

        // 08:00 on March 1st in Tokyo: same day
        let usage = daily_usage(&fx.conn, fx.user_id, fx.deck_id, at("2024-02-29T23:00:00Z")).unwrap();
        assert_eq!(usage.new_count, 1);
    }

    #[test]
    fn test_deck_history() {
        let fx = setup("+00:00", DeckConfig::default());
        let entry = add(&fx, "bonjour", 2.5);
        let yesterday = now() - TimeDelta::days(1);
        record_action(&fx.conn, fx.user_id, entry.id, ActionType::Again, yesterday).unwrap();
        record_action(&fx.conn, fx.user_id, entry.id, ActionType::Good, now()).unwrap();
        record_action(&fx.conn, fx.user_id, entry.id, ActionType::Good, now()).unwrap();

        let history = deck_history(&fx.conn, fx.user_id, fx.deck_id, now(), 3).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].date, NaiveDate::from_ymd_opt(2024, 2, 28).unwrap());
        assert_eq!(history[0].total(), 0);
        assert_eq!(history[1].again, 1);
        assert_eq!(history[2].date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(history[2].good, 2);

        assert!(deck_history(&fx.conn, fx.user_id, fx.deck_id, now(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_deck_history_rejects_huge_ranges() {
        let fx = setup("+00:00", DeckConfig::default());

        let longest = deck_history(&fx.conn, fx.user_id, fx.deck_id, now(), MAX_HISTORY_DAYS).unwrap();
        assert_eq!(longest.len(), MAX_HISTORY_DAYS as usize);

        for days in [MAX_HISTORY_DAYS + 1, 200_000_000, u32::MAX] {
            assert!(matches!(
                deck_history(&fx.conn, fx.user_id, fx.deck_id, now(), days),
                Err(PracticeError::InvalidHistoryRange(d)) if d == days
            ));
        }
    }

    #[test]
    fn test_list_entries_scoped_by_user() {
        let fx = setup("+00:00", DeckConfig::default());
        add(&fx, "bonjour", 2.5);
        let bob = create_user(&fx.conn, "bob", "+00:00", now()).unwrap();

        assert_eq!(list_entries(&fx.conn, fx.user_id, fx.deck_id).unwrap().len(), 1);
        assert!(matches!(
            list_entries(&fx.conn, bob.id, fx.deck_id),
            Err(PracticeError::DeckNotFound(_))
        ));
        assert!(next_entries(&fx.conn, bob.id, fx.deck_id, now(), 10).is_err());
    }
}
