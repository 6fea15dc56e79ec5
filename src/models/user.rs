use super::clock;
use crate::error::Result;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    /// UTC offset such as `+09:00`; decides where a practice day starts
    pub timezone: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn offset(&self) -> Result<FixedOffset> {
        clock::parse_timezone(&self.timezone)
    }
}
