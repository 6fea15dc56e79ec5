//! Error type shared by the scheduler, the store and the JSON exporter.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PracticeError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("deck not found: {0}")]
    DeckNotFound(i64),

    #[error("practice entry not found: {0}")]
    EntryNotFound(i64),

    #[error("bookmark not found: {0}")]
    BookmarkNotFound(i64),

    #[error("bookmark {bookmark_id} is already in deck {deck_id}")]
    DuplicateEntry { deck_id: i64, bookmark_id: i64 },

    #[error("invalid action type: {0}")]
    InvalidActionType(String),

    #[error("invalid queue type: {0}")]
    InvalidQueueType(String),

    #[error("invalid deck config: {0}")]
    InvalidDeckConfig(String),

    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("history range of {0} days is out of range")]
    InvalidHistoryRange(u32),

    #[error("unsupported export version: {0}")]
    UnsupportedExportVersion(u32),

    #[error("invalid export: {0}")]
    InvalidExport(String),
}

pub type Result<T> = std::result::Result<T, PracticeError>;
