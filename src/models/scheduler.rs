//! Practice scheduler: queue transitions, ease factor and due dates.
//!
//! Every entry sits in one of three queues and carries an ease factor:
//! - AGAIN sends the entry back to LEARN, shrinks the ease and retries in minutes
//! - HARD keeps the tier (NEW becomes LEARN), shrinks the ease slightly and grows the interval a little
//! - GOOD graduates NEW/LEARN entries to REVIEW; REVIEW intervals grow by ease × easeMultiplier
//! - EASY does what GOOD does, times the deck's easeBonus, and raises the ease
//!
//! The ease factor stays within `[MIN_EASE_FACTOR, MAX_EASE_FACTOR]` and
//! intervals within `[MIN_INTERVAL_SECS, MAX_INTERVAL_SECS]`. For any state the
//! resulting intervals are ordered AGAIN < HARD < GOOD <= EASY; HARD on REVIEW
//! stops a day short of the ceiling so it stays below GOOD there too.
//!
//! Nothing here touches the database; callers pass the deck settings and the
//! current time explicitly.

use super::{ActionType, DeckConfig, PracticeEntry, QueueType};
use chrono::{DateTime, TimeDelta, Utc};
use log::debug;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const MAX_EASE_FACTOR: f64 = 5.0;
pub const DEFAULT_EASE_FACTOR: f64 = 2.5;

const AGAIN_EASE_FACTOR: f64 = 0.8;
const HARD_EASE_FACTOR: f64 = 0.95;
const EASY_EASE_FACTOR: f64 = 1.15;

pub const AGAIN_INTERVAL_SECS: i64 = 10 * MINUTE;
pub const HARD_LEARN_INTERVAL_SECS: i64 = HOUR;
pub const GRADUATING_INTERVAL_SECS: i64 = DAY;
const HARD_INTERVAL_FACTOR: f64 = 1.2;
const MAX_HARD_INTERVAL_SECS: i64 = MAX_INTERVAL_SECS - DAY;

pub const MIN_INTERVAL_SECS: i64 = MINUTE;
pub const MIN_REVIEW_INTERVAL_SECS: i64 = DAY;
pub const MAX_INTERVAL_SECS: i64 = 36500 * DAY;

/// Fields of a practice entry that change when an action is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NextState {
    pub queue_type: QueueType,
    pub ease_factor: f64,
    pub interval_secs: i64,
    pub scheduled_at: DateTime<Utc>,
}

impl NextState {
    pub fn apply_to(self, entry: &mut PracticeEntry, now: DateTime<Utc>) {
        entry.queue_type = self.queue_type;
        entry.ease_factor = self.ease_factor;
        entry.interval_secs = self.interval_secs;
        entry.scheduled_at = self.scheduled_at;
        entry.updated_at = now;
    }
}

/// Computes the state an entry moves to when `action` is applied at `now`.
pub fn calculate_next_state(
    entry: &PracticeEntry,
    config: &DeckConfig,
    action: ActionType,
    now: DateTime<Utc>,
) -> NextState {
    let ease = clamp_ease(entry.ease_factor);
    let queue_type = next_queue(entry.queue_type, action);

    let ease_factor = clamp_ease(match action {
        ActionType::Again => ease * AGAIN_EASE_FACTOR,
        ActionType::Hard => ease * HARD_EASE_FACTOR,
        ActionType::Good => ease,
        ActionType::Easy => ease * EASY_EASE_FACTOR,
    });

    let interval_secs = next_interval_secs(entry, config, action, ease);
    let scheduled_at = now + TimeDelta::seconds(interval_secs);

    debug!(
        "entry {}: {} {} -> {} (ease {:.3} -> {:.3}, interval {}s)",
        entry.id, action, entry.queue_type, queue_type, ease, ease_factor, interval_secs
    );

    NextState {
        queue_type,
        ease_factor,
        interval_secs,
        scheduled_at,
    }
}

fn next_queue(current: QueueType, action: ActionType) -> QueueType {
    match (action, current) {
        (ActionType::Again, _) => QueueType::Learn,
        (ActionType::Hard, QueueType::Review) => QueueType::Review,
        (ActionType::Hard, _) => QueueType::Learn,
        (ActionType::Good | ActionType::Easy, _) => QueueType::Review,
    }
}

fn next_interval_secs(
    entry: &PracticeEntry,
    config: &DeckConfig,
    action: ActionType,
    ease: f64,
) -> i64 {
    let reviewing = entry.queue_type == QueueType::Review;
    let current = entry.interval_secs.max(MIN_REVIEW_INTERVAL_SECS) as f64;

    let secs = match action {
        ActionType::Again => AGAIN_INTERVAL_SECS as f64,
        ActionType::Hard if reviewing => {
            (current * HARD_INTERVAL_FACTOR).min(MAX_HARD_INTERVAL_SECS as f64)
        }
        ActionType::Hard => HARD_LEARN_INTERVAL_SECS as f64,
        ActionType::Good if reviewing => current * ease * config.ease_multiplier,
        ActionType::Good => GRADUATING_INTERVAL_SECS as f64,
        ActionType::Easy if reviewing => {
            current * ease * config.ease_multiplier * config.ease_bonus
        }
        ActionType::Easy => GRADUATING_INTERVAL_SECS as f64 * config.ease_bonus,
    };

    clamp_interval(secs)
}

fn clamp_ease(ease: f64) -> f64 {
    if ease.is_nan() {
        return MIN_EASE_FACTOR;
    }
    ease.clamp(MIN_EASE_FACTOR, MAX_EASE_FACTOR)
}

fn clamp_interval(secs: f64) -> i64 {
    if secs.is_nan() {
        return MIN_INTERVAL_SECS;
    }
    secs.round()
        .clamp(MIN_INTERVAL_SECS as f64, MAX_INTERVAL_SECS as f64) as i64
}

/// Interval in seconds each action would produce, in `ActionType::ALL` order.
pub fn preview_intervals(entry: &PracticeEntry, config: &DeckConfig) -> [i64; 4] {
    let ease = clamp_ease(entry.ease_factor);
    ActionType::ALL.map(|action| next_interval_secs(entry, config, action, ease))
}

/// Actions already taken in a deck during the current local day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyUsage {
    /// Actions applied to entries that were NEW at the time
    pub new_count: u32,
    /// Actions applied to LEARN and REVIEW entries
    pub review_count: u32,
}

/// Picks the entries to present next.
///
/// Due REVIEW entries come first, then due LEARN entries, both oldest
/// `scheduled_at` first and together limited by what is left of
/// `reviews_per_day`. NEW entries follow, limited by what is left of
/// `new_entries_per_day`.
pub fn next_entries<'a>(
    entries: &'a [PracticeEntry],
    config: &DeckConfig,
    usage: DailyUsage,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<&'a PracticeEntry> {
    let review_quota = config.reviews_per_day.saturating_sub(usage.review_count) as usize;
    let new_quota = config.new_entries_per_day.saturating_sub(usage.new_count) as usize;

    let mut reviews: Vec<&PracticeEntry> = entries
        .iter()
        .filter(|e| e.queue_type != QueueType::New && e.is_due(now))
        .collect();
    reviews.sort_by_key(|e| (queue_rank(e.queue_type), e.scheduled_at, e.id));

    let mut new: Vec<&PracticeEntry> = entries
        .iter()
        .filter(|e| e.queue_type == QueueType::New && e.is_due(now))
        .collect();
    new.sort_by_key(|e| (e.scheduled_at, e.id));

    reviews
        .into_iter()
        .take(review_quota)
        .chain(new.into_iter().take(new_quota))
        .take(limit)
        .collect()
}

fn queue_rank(queue: QueueType) -> u8 {
    match queue {
        QueueType::Review => 0,
        QueueType::Learn => 1,
        QueueType::New => 2,
    }
}
