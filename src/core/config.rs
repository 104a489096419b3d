use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::model::{DisplayMode, PreferenceMode};

/// Which storage adapter to open at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Sqlite,
    Mysql,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub kind: StorageKind,
    /// Directory holding the embedded database file
    pub data_dir: PathBuf,
    /// Embedded database file name, without the `.db` extension
    pub filename: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Prepended to both table names: `<prefix>_players`, `<prefix>_ignores`
    pub table_prefix: String,
    pub pool_size: u32,
    pub max_lifetime_seconds: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            kind: StorageKind::Sqlite,
            data_dir: PathBuf::from("."),
            filename: "database".to_string(),
            host: "localhost".to_string(),
            port: 3306,
            database: "minecraft".to_string(),
            username: "root".to_string(),
            password: String::new(),
            table_prefix: "openmentions".to_string(),
            pool_size: 10,
            max_lifetime_seconds: 30,
        }
    }
}

impl StorageSettings {
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.db", self.filename))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MentionSettings {
    /// Defaults applied when a player is seen for the first time
    pub default_sound: String,
    pub default_display: DisplayMode,
    pub default_preference: PreferenceMode,
    pub volume: f32,
    pub pitch: f32,
    /// Seconds between notifications caused by the same mentioner; below 1 disables
    pub cooldown_seconds: i64,
    pub sweep_interval_seconds: u64,
    /// Upper bound on concurrent blocking storage calls
    pub storage_workers: usize,
}

impl Default for MentionSettings {
    fn default() -> Self {
        Self {
            default_sound: "ENTITY_PLAYER_LEVELUP".to_string(),
            default_display: DisplayMode::All,
            default_preference: PreferenceMode::Always,
            volume: 1.0,
            pitch: 1.0,
            cooldown_seconds: 3,
            sweep_interval_seconds: 60,
            storage_workers: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub capacity: usize,
    pub preference_ttl_seconds: u64,
    pub ignore_ttl_seconds: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 1000,
            preference_ttl_seconds: 15 * 60,
            ignore_ttl_seconds: 5 * 60,
        }
    }
}

/// Application settings, persisted as settings.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub mentions: MentionSettings,
    #[serde(default)]
    pub cache: CacheSettings,
}

const MAX_COOLDOWN_SECONDS: i64 = 24 * 60 * 60;
const MAX_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;

fn table_prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]{1,32}$").expect("static pattern"))
}

impl Settings {
    /// Reject values that would break SQL generation or make the caches useless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !table_prefix_pattern().is_match(&self.storage.table_prefix) {
            return Err(ConfigError::InvalidTablePrefix(
                self.storage.table_prefix.clone(),
            ));
        }
        if self.storage.kind == StorageKind::Mysql && self.storage.pool_size == 0 {
            return Err(invalid("storage.pool_size", "must be at least 1"));
        }
        if self.cache.capacity == 0 {
            return Err(invalid("cache.capacity", "must be at least 1"));
        }
        if self.cache.preference_ttl_seconds == 0 {
            return Err(invalid("cache.preference_ttl_seconds", "must be at least 1"));
        }
        if self.cache.ignore_ttl_seconds == 0 {
            return Err(invalid("cache.ignore_ttl_seconds", "must be at least 1"));
        }
        if self.cache.preference_ttl_seconds > MAX_TTL_SECONDS {
            return Err(invalid("cache.preference_ttl_seconds", "must be at most one week"));
        }
        if self.cache.ignore_ttl_seconds > MAX_TTL_SECONDS {
            return Err(invalid("cache.ignore_ttl_seconds", "must be at most one week"));
        }
        if self.mentions.cooldown_seconds > MAX_COOLDOWN_SECONDS {
            return Err(invalid("mentions.cooldown_seconds", "must be at most one day"));
        }
        if self.mentions.storage_workers == 0 {
            return Err(invalid("mentions.storage_workers", "must be at least 1"));
        }
        if self.mentions.sweep_interval_seconds == 0 {
            return Err(invalid("mentions.sweep_interval_seconds", "must be at least 1"));
        }
        if !self.mentions.volume.is_finite() || !self.mentions.pitch.is_finite() {
            return Err(invalid("mentions.volume/pitch", "must be finite"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    /// Missing or unreadable files fall back to defaults.
    pub fn load(&self) -> Settings {
        if self.config_path.exists() {
            match fs::read_to_string(&self.config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(settings) => return settings,
                    Err(e) => log::warn!(
                        "Ignoring malformed {}: {}",
                        self.config_path.display(),
                        e
                    ),
                },
                Err(e) => log::warn!("Could not read {}: {}", self.config_path.display(), e),
            }
        }
        Settings::default()
    }

    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        // Ensure directory exists
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)?;
        Ok(())
    }
}
