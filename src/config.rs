//! Runtime configuration: database location, default timezone and the settings
//! new decks start with. Loaded once by the binary and passed down explicitly.

use crate::error::{PracticeError, Result};
use crate::models::scheduler::{DEFAULT_EASE_FACTOR, MAX_EASE_FACTOR, MIN_EASE_FACTOR};
use crate::models::{DeckConfig, clock};
use log::{info, warn};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "ytsub.toml";
pub const DATABASE_ENV: &str = "YTSUB_DATABASE";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    /// Offset given to users created without one
    pub default_timezone: String,
    /// Ease factor of freshly added practice entries
    pub initial_ease_factor: f64,
    pub deck_defaults: DeckConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("practice.sqlite3"),
            default_timezone: "+00:00".to_string(),
            initial_ease_factor: DEFAULT_EASE_FACTOR,
            deck_defaults: DeckConfig::default(),
        }
    }
}

impl Config {
    /// Loads `path` if given, else `ytsub.toml` from the working directory if
    /// present, else the defaults. `YTSUB_DATABASE` overrides the database path.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_str(&fs::read_to_string(path)?)?,
            None if Path::new(CONFIG_FILE_NAME).exists() => {
                Self::from_toml_str(&fs::read_to_string(CONFIG_FILE_NAME)?)?
            }
            None => {
                info!("{CONFIG_FILE_NAME} not found, using default config");
                Self::default()
            }
        };

        if let Ok(database) = env::var(DATABASE_ENV) {
            info!("{DATABASE_ENV} set, using database {database}");
            config.database_path = PathBuf::from(database);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        clock::parse_timezone(&self.default_timezone)?;
        self.deck_defaults.validate()?;

        if !(MIN_EASE_FACTOR..=MAX_EASE_FACTOR).contains(&self.initial_ease_factor) {
            warn!("Rejecting initial ease factor {}", self.initial_ease_factor);
            return Err(PracticeError::InvalidDeckConfig(format!(
                "initial_ease_factor must be within {MIN_EASE_FACTOR}..={MAX_EASE_FACTOR}, got {}",
                self.initial_ease_factor
            )));
        }
        Ok(())
    }
}
