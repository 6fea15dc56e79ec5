//! Review events. Actions are append-only: they are inserted once and never updated.
use super::QueueType;
use crate::error::PracticeError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User's answer when reviewing an entry, from worst to best recall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Again,
    Hard,
    Good,
    Easy,
}

impl ActionType {
    pub const ALL: [ActionType; 4] = [
        ActionType::Again,
        ActionType::Hard,
        ActionType::Good,
        ActionType::Easy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Again => "AGAIN",
            ActionType::Hard => "HARD",
            ActionType::Good => "GOOD",
            ActionType::Easy => "EASY",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = PracticeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AGAIN" => Ok(ActionType::Again),
            "HARD" => Ok(ActionType::Hard),
            "GOOD" => Ok(ActionType::Good),
            "EASY" => Ok(ActionType::Easy),
            _ => Err(PracticeError::InvalidActionType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeAction {
    pub id: i64,
    pub action_type: ActionType,
    /// Queue of the entry before this action was applied
    pub queue_type: QueueType,
    pub created_at: DateTime<Utc>,
    pub user_id: i64,
    pub deck_id: i64,
    pub practice_entry_id: i64,
}

/// Number of actions of each type on one local calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyHistory {
    pub date: NaiveDate,
    pub again: u32,
    pub hard: u32,
    pub good: u32,
    pub easy: u32,
}

impl DailyHistory {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            again: 0,
            hard: 0,
            good: 0,
            easy: 0,
        }
    }

    pub fn record(&mut self, action: ActionType) {
        match action {
            ActionType::Again => self.again += 1,
            ActionType::Hard => self.hard += 1,
            ActionType::Good => self.good += 1,
            ActionType::Easy => self.easy += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.again + self.hard + self.good + self.easy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_parse() {
        for action in ActionType::ALL {
            assert_eq!(action.as_str().parse::<ActionType>().unwrap(), action);
        }
        assert_eq!("good".parse::<ActionType>().unwrap(), ActionType::Good);
    }

    #[test]
    fn test_invalid_action_type_rejected() {
        let result = "SKIP".parse::<ActionType>();
        assert!(matches!(result, Err(PracticeError::InvalidActionType(s)) if s == "SKIP"));
    }

    #[test]
    fn test_daily_history_record() {
        let mut day = DailyHistory::new(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        day.record(ActionType::Good);
        day.record(ActionType::Good);
        day.record(ActionType::Again);

        assert_eq!(day.good, 2);
        assert_eq!(day.again, 1);
        assert_eq!(day.total(), 3);
    }
}
