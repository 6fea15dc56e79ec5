pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod models;

pub use config::Config;
pub use error::{PracticeError, Result};
pub use models::{
    ActionType, BookmarkEntry, DailyHistory, DailyUsage, Deck, DeckCache, DeckConfig,
    PracticeAction, PracticeEntry, QueueType, User,
};
