//! Deck is a user's collection of practice entries plus the settings that drive scheduling
use super::QueueType;
use crate::error::{PracticeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-deck scheduling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeckConfig {
    /// Cap on NEW entries admitted per local calendar day
    #[serde(alias = "new_entries_per_day")]
    pub new_entries_per_day: u32,
    /// Cap on LEARN and REVIEW reviews per local calendar day
    #[serde(alias = "reviews_per_day")]
    pub reviews_per_day: u32,
    /// Scales REVIEW interval growth on GOOD and EASY
    #[serde(alias = "ease_multiplier")]
    pub ease_multiplier: f64,
    /// Extra multiplier applied on EASY
    #[serde(alias = "ease_bonus")]
    pub ease_bonus: f64,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            new_entries_per_day: 50,
            reviews_per_day: 200,
            ease_multiplier: 1.0,
            ease_bonus: 1.5,
        }
    }
}

impl DeckConfig {
    /// Multipliers below 1 would let GOOD shrink an interval below HARD's.
    pub fn validate(&self) -> Result<()> {
        if !self.ease_multiplier.is_finite() || self.ease_multiplier < 1.0 {
            return Err(PracticeError::InvalidDeckConfig(format!(
                "easeMultiplier must be at least 1, got {}",
                self.ease_multiplier
            )));
        }
        if !self.ease_bonus.is_finite() || self.ease_bonus < 1.0 {
            return Err(PracticeError::InvalidDeckConfig(format!(
                "easeBonus must be at least 1, got {}",
                self.ease_bonus
            )));
        }
        Ok(())
    }
}

/// Denormalized count of a deck's entries per queue type.
///
/// Adjusted in the same transaction as every entry insert, transition and
/// delete. `database::decks::repair_deck_cache` recomputes it from the
/// entries table when it has drifted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckCache {
    pub new_count: u64,
    pub learn_count: u64,
    pub review_count: u64,
}

impl DeckCache {
    pub fn count(&self, queue: QueueType) -> u64 {
        match queue {
            QueueType::New => self.new_count,
            QueueType::Learn => self.learn_count,
            QueueType::Review => self.review_count,
        }
    }

    fn slot(&mut self, queue: QueueType) -> &mut u64 {
        match queue {
            QueueType::New => &mut self.new_count,
            QueueType::Learn => &mut self.learn_count,
            QueueType::Review => &mut self.review_count,
        }
    }

    pub fn increment(&mut self, queue: QueueType) {
        *self.slot(queue) += 1;
    }

    pub fn decrement(&mut self, queue: QueueType) {
        let slot = self.slot(queue);
        *slot = slot.saturating_sub(1);
    }

    pub fn transition(&mut self, from: QueueType, to: QueueType) {
        if from != to {
            self.decrement(from);
            self.increment(to);
        }
    }

    pub fn total(&self) -> u64 {
        self.new_count + self.learn_count + self.review_count
    }

    pub fn from_queues(queues: impl IntoIterator<Item = QueueType>) -> Self {
        let mut cache = Self::default();
        for queue in queues {
            cache.increment(queue);
        }
        cache
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    #[serde(flatten)]
    pub config: DeckConfig,
    pub cache: DeckCache,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
