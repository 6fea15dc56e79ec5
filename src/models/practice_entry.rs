//! Practice entry: one schedulable bookmark inside a deck.
use crate::error::PracticeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse scheduling tier of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueType {
    /// Never reviewed
    New,
    /// Failed or not yet graduated; short intervals
    Learn,
    /// Graduated; intervals grow with the ease factor
    Review,
}

impl QueueType {
    pub const ALL: [QueueType; 3] = [QueueType::New, QueueType::Learn, QueueType::Review];

    pub fn as_str(self) -> &'static str {
        match self {
            QueueType::New => "NEW",
            QueueType::Learn => "LEARN",
            QueueType::Review => "REVIEW",
        }
    }
}

impl fmt::Display for QueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueType {
    type Err = PracticeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NEW" => Ok(QueueType::New),
            "LEARN" => Ok(QueueType::Learn),
            "REVIEW" => Ok(QueueType::Review),
            _ => Err(PracticeError::InvalidQueueType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeEntry {
    pub id: i64,
    pub deck_id: i64,
    pub bookmark_entry_id: i64,
    pub queue_type: QueueType,
    pub ease_factor: f64,
    /// Length of the interval that produced `scheduled_at`, in seconds
    pub interval_secs: i64,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PracticeEntry {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at <= now
    }
}
