//! Command-line driver over the practice library.
//! Each subcommand opens the database, runs one library operation and prints the result.

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use std::path::PathBuf;
use ytsub_practice::database::{db, decks, practice};
use ytsub_practice::export::json;
use ytsub_practice::models::scheduler;
use ytsub_practice::{ActionType, Config, Deck, DeckConfig, PracticeEntry, User};

#[derive(Parser)]
#[command(name = "ytsub-practice", about = "Spaced-repetition practice decks", version)]
pub struct Cli {
    /// Config file (default: ./ytsub.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Acting user
    #[arg(long, short, global = true)]
    user: Option<String>,

    /// Pretend the current time is this RFC 3339 instant
    #[arg(long, global = true)]
    now: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),

    /// Manage bookmarked text
    #[command(subcommand)]
    Bookmark(BookmarkCommand),

    /// Manage decks
    #[command(subcommand)]
    Deck(DeckCommand),

    /// Manage practice entries
    #[command(subcommand)]
    Entry(EntryCommand),

    /// Show the entries to practice next
    Next {
        deck: i64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Review an entry with AGAIN, HARD, GOOD or EASY
    Review { entry: i64, action: String },

    /// Per-day review counts
    History {
        deck: i64,
        #[arg(long, default_value_t = 7)]
        days: u32,
    },

    /// Recompute a deck's queue counts from its entries
    RepairCache { deck: i64 },

    /// Export a deck with its history to JSON
    Export { deck: i64, path: PathBuf },

    /// Import a deck exported with `export`
    Import { path: PathBuf },
}

#[derive(Subcommand)]
enum UserCommand {
    Add {
        name: String,
        /// UTC offset such as +09:00 (default from config)
        #[arg(long)]
        timezone: Option<String>,
    },
}

#[derive(Subcommand)]
enum BookmarkCommand {
    Add {
        text: String,
        #[arg(long)]
        video: Option<String>,
    },
    Ls,
    Rm { id: i64 },
}

#[derive(Args)]
struct DeckSettings {
    #[arg(long)]
    new_per_day: Option<u32>,
    #[arg(long)]
    reviews_per_day: Option<u32>,
    #[arg(long)]
    ease_multiplier: Option<f64>,
    #[arg(long)]
    ease_bonus: Option<f64>,
}

impl DeckSettings {
    fn apply(&self, base: &DeckConfig) -> DeckConfig {
        DeckConfig {
            new_entries_per_day: self.new_per_day.unwrap_or(base.new_entries_per_day),
            reviews_per_day: self.reviews_per_day.unwrap_or(base.reviews_per_day),
            ease_multiplier: self.ease_multiplier.unwrap_or(base.ease_multiplier),
            ease_bonus: self.ease_bonus.unwrap_or(base.ease_bonus),
        }
    }

    /// Name and settings for `deck update`, falling back to the deck's current values
    fn update(&self, deck: Deck, name: Option<String>) -> (String, DeckConfig) {
        let config = self.apply(&deck.config);
        (name.unwrap_or(deck.name), config)
    }
}

#[derive(Subcommand)]
enum DeckCommand {
    Create {
        name: String,
        #[command(flatten)]
        settings: DeckSettings,
    },
    Ls,
    Show { id: i64 },
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        settings: DeckSettings,
    },
    Rm { id: i64 },
}

#[derive(Subcommand)]
enum EntryCommand {
    /// Add a bookmark to a deck
    Add { deck: i64, bookmark: i64 },
    Ls { deck: i64 },
}

struct Session {
    conn: Connection,
    config: Config,
    user: Option<String>,
    now: DateTime<Utc>,
}

impl Session {
    fn user(&self) -> anyhow::Result<User> {
        let Some(name) = &self.user else {
            bail!("this command needs --user");
        };
        Ok(db::get_user_by_name(&self.conn, name)?)
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    let conn = db::open_database(&config.database_path).with_context(|| {
        format!("failed to open database {}", config.database_path.display())
    })?;

    let session = Session {
        conn,
        config,
        user: cli.user,
        now: cli.now.unwrap_or_else(Utc::now),
    };

    match cli.command {
        Command::User(UserCommand::Add { name, timezone }) => {
            let timezone = timezone.unwrap_or_else(|| session.config.default_timezone.clone());
            let user = db::create_user(&session.conn, &name, &timezone, session.now)?;
            println!("user {} ({}, {})", user.id, user.username, user.timezone);
        }
        Command::Bookmark(command) => run_bookmark(&session, command)?,
        Command::Deck(command) => run_deck(&session, command)?,
        Command::Entry(command) => run_entry(&session, command)?,
        Command::Next { deck, limit } => {
            let user = session.user()?;
            let deck = decks::get_deck(&session.conn, user.id, deck)?;
            let entries = practice::next_entries(&session.conn, user.id, deck.id, session.now, limit)?;
            if entries.is_empty() {
                println!("Nothing left to practice today in '{}'", deck.name);
            }
            for entry in &entries {
                let bookmark = db::get_bookmark(&session.conn, user.id, entry.bookmark_entry_id)?;
                let preview = scheduler::preview_intervals(entry, &deck.config)
                    .map(format_interval)
                    .join(" / ");
                println!(
                    "{:>5}  {:<6}  {}  [again/hard/good/easy: {}]",
                    entry.id, entry.queue_type, bookmark.text, preview
                );
            }
        }
        Command::Review { entry, action } => {
            let user = session.user()?;
            let action: ActionType = action.parse()?;
            let outcome = practice::record_action(&session.conn, user.id, entry, action, session.now)?;
            println!(
                "{} -> {}, ease {:.2}, next {} (in {})",
                outcome.action.queue_type,
                outcome.entry.queue_type,
                outcome.entry.ease_factor,
                outcome.entry.scheduled_at.format("%Y-%m-%d %H:%M"),
                format_interval(outcome.entry.interval_secs)
            );
        }
        Command::History { deck, days } => {
            let user = session.user()?;
            for day in practice::deck_history(&session.conn, user.id, deck, session.now, days)? {
                println!(
                    "{}  again {:>3}  hard {:>3}  good {:>3}  easy {:>3}",
                    day.date, day.again, day.hard, day.good, day.easy
                );
            }
        }
        Command::RepairCache { deck } => {
            let user = session.user()?;
            let deck = decks::repair_deck_cache(&session.conn, user.id, deck, session.now)?;
            print_deck(&deck);
        }
        Command::Export { deck, path } => {
            let user = session.user()?;
            let export = json::export_deck(&session.conn, user.id, deck, session.now)?;
            json::export_json_to_path(&export, &path)?;
            println!("Deck '{}' exported to '{}'", export.deck.name, path.display());
        }
        Command::Import { path } => {
            let user = session.user()?;
            let export = json::import_json(&path)?;
            let deck = json::import_deck(&session.conn, user.id, &export, session.now)?;
            print_deck(&deck);
        }
    }

    Ok(())
}

fn run_bookmark(session: &Session, command: BookmarkCommand) -> anyhow::Result<()> {
    let user = session.user()?;
    match command {
        BookmarkCommand::Add { text, video } => {
            let bookmark = db::create_bookmark(&session.conn, user.id, video.as_deref(), &text, session.now)?;
            println!("bookmark {}", bookmark.id);
        }
        BookmarkCommand::Ls => {
            for bookmark in db::list_bookmarks(&session.conn, user.id)? {
                println!(
                    "{:>5}  {:<12}  {}",
                    bookmark.id,
                    bookmark.video_id.as_deref().unwrap_or("-"),
                    bookmark.text
                );
            }
        }
        BookmarkCommand::Rm { id } => db::delete_bookmark(&session.conn, user.id, id, session.now)?,
    }
    Ok(())
}

fn run_deck(session: &Session, command: DeckCommand) -> anyhow::Result<()> {
    let user = session.user()?;
    match command {
        DeckCommand::Create { name, settings } => {
            let config = settings.apply(&session.config.deck_defaults);
            let deck = decks::create_deck(&session.conn, user.id, &name, &config, session.now)?;
            print_deck(&deck);
        }
        DeckCommand::Ls => {
            for deck in decks::list_decks(&session.conn, user.id)? {
                print_deck(&deck);
            }
        }
        DeckCommand::Show { id } => {
            let deck = decks::get_deck(&session.conn, user.id, id)?;
            let usage = practice::daily_usage(&session.conn, user.id, id, session.now)?;
            print_deck(&deck);
            println!(
                "       today: {}/{} new, {}/{} reviews",
                usage.new_count,
                deck.config.new_entries_per_day,
                usage.review_count,
                deck.config.reviews_per_day
            );
        }
        DeckCommand::Update { id, name, settings } => {
            let deck = decks::get_deck(&session.conn, user.id, id)?;
            let (name, config) = settings.update(deck, name);
            let deck = decks::update_deck(&session.conn, user.id, id, &name, &config, session.now)?;
            print_deck(&deck);
        }
        DeckCommand::Rm { id } => decks::delete_deck(&session.conn, user.id, id)?,
    }
    Ok(())
}

fn run_entry(session: &Session, command: EntryCommand) -> anyhow::Result<()> {
    let user = session.user()?;
    match command {
        EntryCommand::Add { deck, bookmark } => {
            let entry = practice::add_entry(
                &session.conn,
                user.id,
                deck,
                bookmark,
                session.config.initial_ease_factor,
                session.now,
            )?;
            print_entry(&entry);
        }
        EntryCommand::Ls { deck } => {
            for entry in practice::list_entries(&session.conn, user.id, deck)? {
                print_entry(&entry);
            }
        }
    }
    Ok(())
}

fn print_deck(deck: &Deck) {
    println!(
        "{:>5}  {}  (new {}, learn {}, review {}; {}/day new, {}/day reviews, multiplier {}, bonus {})",
        deck.id,
        deck.name,
        deck.cache.new_count,
        deck.cache.learn_count,
        deck.cache.review_count,
        deck.config.new_entries_per_day,
        deck.config.reviews_per_day,
        deck.config.ease_multiplier,
        deck.config.ease_bonus
    );
}

fn print_entry(entry: &PracticeEntry) {
    println!(
        "{:>5}  bookmark {:<5}  {:<6}  ease {:.2}  due {}",
        entry.id,
        entry.bookmark_entry_id,
        entry.queue_type,
        entry.ease_factor,
        entry.scheduled_at.format("%Y-%m-%d %H:%M")
    );
}

/// Formats an interval in seconds to a short human-readable string
fn format_interval(secs: i64) -> String {
    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;

    if secs < HOUR {
        format!("{}m", secs / MINUTE)
    } else if secs < DAY {
        format!("{}h", secs / HOUR)
    } else if secs < 30 * DAY {
        format!("{}d", secs / DAY)
    } else if secs < 365 * DAY {
        format!("{}mo", secs / (30 * DAY))
    } else {
        format!("{}y", secs / (365 * DAY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(600), "10m");
        assert_eq!(format_interval(3600), "1h");
        assert_eq!(format_interval(86400), "1d");
        assert_eq!(format_interval(129600), "1d");
        assert_eq!(format_interval(90 * 86400), "3mo");
        assert_eq!(format_interval(730 * 86400), "2y");
    }

    #[test]
    fn test_deck_settings_override_defaults() {
        let settings = DeckSettings {
            new_per_day: Some(5),
            reviews_per_day: None,
            ease_multiplier: None,
            ease_bonus: Some(2.0),
        };
        let config = settings.apply(&DeckConfig::default());
        assert_eq!(config.new_entries_per_day, 5);
        assert_eq!(config.reviews_per_day, 200);
        assert_eq!(config.ease_bonus, 2.0);
    }

    #[test]
    fn test_deck_update_keeps_unset_fields() {
        let deck = Deck {
            id: 1,
            user_id: 1,
            name: "French".to_string(),
            config: DeckConfig {
                reviews_per_day: 30,
                ..DeckConfig::default()
            },
            cache: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let settings = DeckSettings {
            new_per_day: Some(5),
            reviews_per_day: None,
            ease_multiplier: None,
            ease_bonus: None,
        };

        let (name, config) = settings.update(deck.clone(), None);
        assert_eq!(name, "French");
        assert_eq!(config.new_entries_per_day, 5);
        assert_eq!(config.reviews_per_day, 30);

        let (name, _) = settings.update(deck, Some("Spanish".to_string()));
        assert_eq!(name, "Spanish");
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "ytsub-practice",
            "--user",
            "alice",
            "--now",
            "2024-03-01T12:00:00Z",
            "review",
            "3",
            "good",
        ])
        .unwrap();
        assert_eq!(cli.user.as_deref(), Some("alice"));
        assert!(matches!(cli.command, Command::Review { entry: 3, .. }));
    }
}
