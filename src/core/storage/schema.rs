// SQL text shared by both backends. Both drivers accept `?` placeholders, so
// only the insert-or-ignore keyword differs between dialects.

use crate::core::model::RecordUpdate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

impl Dialect {
    fn insert_ignore(self) -> &'static str {
        match self {
            Self::Sqlite => "INSERT OR IGNORE",
            Self::MySql => "INSERT IGNORE",
        }
    }
}

/// Statement builder for one table prefix.
#[derive(Debug, Clone)]
pub struct Tables {
    players: String,
    ignores: String,
    dialect: Dialect,
}

impl Tables {
    /// `prefix` must already be validated; it is spliced into the statements.
    pub fn new(prefix: &str, dialect: Dialect) -> Self {
        Self {
            players: format!("{prefix}_players"),
            ignores: format!("{prefix}_ignores"),
            dialect,
        }
    }

    pub fn players(&self) -> &str {
        &self.players
    }

    pub fn ignores(&self) -> &str {
        &self.ignores
    }

    pub fn create_players(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             PlayerId VARCHAR(36) PRIMARY KEY, \
             Sound VARCHAR(200) NOT NULL, \
             Display VARCHAR(32) NOT NULL, \
             Preference VARCHAR(32) NOT NULL)",
            self.players
        )
    }

    pub fn create_ignores(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             PlayerId VARCHAR(36) NOT NULL, \
             IgnoredId VARCHAR(36) NOT NULL, \
             PRIMARY KEY (PlayerId, IgnoredId))",
            self.ignores
        )
    }

    pub fn insert_record(&self) -> String {
        format!(
            "INSERT INTO {} (PlayerId, Sound, Display, Preference) VALUES (?, ?, ?, ?)",
            self.players
        )
    }

    /// `UPDATE` for the given change; binds are the values of
    /// [`update_values`] followed by the player id.
    pub fn update_record(&self, update: &RecordUpdate) -> String {
        let assignments = match update {
            RecordUpdate::Sound(_) => "Sound = ?",
            RecordUpdate::Display(_) => "Display = ?",
            RecordUpdate::Preference(_) => "Preference = ?",
            RecordUpdate::All { .. } => "Sound = ?, Display = ?, Preference = ?",
        };
        format!("UPDATE {} SET {} WHERE PlayerId = ?", self.players, assignments)
    }

    pub fn delete_record(&self) -> String {
        format!("DELETE FROM {} WHERE PlayerId = ?", self.players)
    }

    pub fn select_record(&self) -> String {
        format!(
            "SELECT PlayerId, Sound, Display, Preference FROM {} WHERE PlayerId = ? LIMIT 1",
            self.players
        )
    }

    pub fn insert_ignore(&self) -> String {
        format!(
            "{} INTO {} (PlayerId, IgnoredId) VALUES (?, ?)",
            self.dialect.insert_ignore(),
            self.ignores
        )
    }

    pub fn delete_ignore(&self) -> String {
        format!(
            "DELETE FROM {} WHERE PlayerId = ? AND IgnoredId = ?",
            self.ignores
        )
    }

    pub fn exists_ignore(&self) -> String {
        format!(
            "SELECT 1 FROM {} WHERE PlayerId = ? AND IgnoredId = ? LIMIT 1",
            self.ignores
        )
    }

    pub fn select_ignores(&self) -> String {
        format!("SELECT IgnoredId FROM {} WHERE PlayerId = ?", self.ignores)
    }
}

/// String values bound before the trailing `PlayerId` of an update.
pub fn update_values(update: &RecordUpdate) -> Vec<String> {
    match update {
        RecordUpdate::Sound(sound) => vec![sound.clone()],
        RecordUpdate::Display(display) => vec![display.as_str().to_string()],
        RecordUpdate::Preference(preference) => vec![preference.as_str().to_string()],
        RecordUpdate::All {
            sound,
            display,
            preference,
        } => vec![
            sound.clone(),
            display.as_str().to_string(),
            preference.as_str().to_string(),
        ],
    }
}
