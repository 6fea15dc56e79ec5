pub mod bookmark;
pub mod clock;
pub mod deck;
pub mod practice_action;
pub mod practice_entry;
pub mod scheduler;
pub mod user;

pub use bookmark::BookmarkEntry;
pub use deck::{Deck, DeckCache, DeckConfig};
pub use practice_action::{ActionType, DailyHistory, PracticeAction};
pub use practice_entry::{PracticeEntry, QueueType};
pub use scheduler::DailyUsage;
pub use user::User;
