pub mod db;
pub mod decks;
pub mod practice;

pub use practice::ReviewOutcome;
