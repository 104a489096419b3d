//! Durable storage for preference records and ignore relations.
//!
//! Two adapters implement [`StorageBackend`]: an embedded SQLite file and a
//! pooled MySQL connection. Adapters only provide the fallible `try_*`
//! primitives. The contract operations are provided methods that log any
//! failure and report it as "did not happen": `false` for writes, `None` for
//! reads. Callers never see a storage error.
//!
//! All operations block on I/O. Keep them off async worker threads
//! (see [`crate::core::service::MentionService`]).

pub mod mysql;
pub mod schema;
pub mod sqlite;

#[cfg(test)]
pub mod memory;

use std::collections::HashSet;

use uuid::Uuid;

use super::config::{StorageKind, StorageSettings};
use super::error::{StorageError, StorageResult};
use super::model::{DisplayMode, PlayerId, PlayerRecord, PreferenceMode, RecordUpdate};

pub use mysql::MySqlBackend;
pub use sqlite::SqliteBackend;

pub trait StorageBackend: Send + Sync {
    /// Adapter name used in log lines
    fn name(&self) -> &'static str;

    fn try_load(&self) -> StorageResult<()>;
    fn try_unload(&self) -> StorageResult<()>;
    fn try_check_schema(&self) -> StorageResult<()>;
    fn try_add_record(&self, record: &PlayerRecord) -> StorageResult<()>;
    /// Updating a player with no row is a successful no-op.
    fn try_update_record(&self, player: PlayerId, update: &RecordUpdate) -> StorageResult<()>;
    fn try_remove_record(&self, player: PlayerId) -> StorageResult<()>;
    fn try_fetch_record(&self, player: PlayerId) -> StorageResult<Option<PlayerRecord>>;
    /// Inserting an existing pair is a successful no-op.
    fn try_add_ignore(&self, player: PlayerId, ignored: PlayerId) -> StorageResult<()>;
    fn try_remove_ignore(&self, player: PlayerId, ignored: PlayerId) -> StorageResult<()>;
    fn try_is_ignored(&self, player: PlayerId, ignored: PlayerId) -> StorageResult<bool>;
    fn try_fetch_ignores(&self, player: PlayerId) -> StorageResult<HashSet<PlayerId>>;

    /// Acquire connectivity. Called once at startup.
    fn load(&self) -> bool {
        match self.try_load() {
            Ok(()) => {
                log::info!("[{}] storage loaded", self.name());
                true
            }
            Err(e) => {
                log::error!("[{}] failed to load storage: {}", self.name(), e);
                false
            }
        }
    }

    /// Release pooled resources. Called once at shutdown.
    fn unload(&self) {
        match self.try_unload() {
            Ok(()) => log::info!("[{}] storage unloaded", self.name()),
            Err(e) => log::error!("[{}] failed to unload storage: {}", self.name(), e),
        }
    }

    /// Idempotently create `<prefix>_players` and `<prefix>_ignores`.
    fn check_schema(&self) -> bool {
        logged_write(self.name(), "create tables", self.try_check_schema())
    }

    fn add_record(&self, record: &PlayerRecord) -> bool {
        let op = format!("add record for {}", record.player_id);
        logged_write(self.name(), &op, self.try_add_record(record))
    }

    fn update_record(&self, player: PlayerId, update: &RecordUpdate) -> bool {
        let op = format!("update {} of {}", update.describe(), player);
        logged_write(self.name(), &op, self.try_update_record(player, update))
    }

    fn update_sound(&self, player: PlayerId, sound: &str) -> bool {
        self.update_record(player, &RecordUpdate::Sound(sound.to_string()))
    }

    fn update_display(&self, player: PlayerId, display: DisplayMode) -> bool {
        self.update_record(player, &RecordUpdate::Display(display))
    }

    fn update_preference(&self, player: PlayerId, preference: PreferenceMode) -> bool {
        self.update_record(player, &RecordUpdate::Preference(preference))
    }

    fn update_all(
        &self,
        player: PlayerId,
        sound: &str,
        display: DisplayMode,
        preference: PreferenceMode,
    ) -> bool {
        self.update_record(
            player,
            &RecordUpdate::All {
                sound: sound.to_string(),
                display,
                preference,
            },
        )
    }

    fn remove_record(&self, player: PlayerId) -> bool {
        let op = format!("remove record of {player}");
        logged_write(self.name(), &op, self.try_remove_record(player))
    }

    fn fetch_record(&self, player: PlayerId) -> Option<PlayerRecord> {
        match self.try_fetch_record(player) {
            Ok(record) => record,
            Err(e) => {
                log::error!("[{}] failed to fetch record of {}: {}", self.name(), player, e);
                None
            }
        }
    }

    fn add_ignore(&self, player: PlayerId, ignored: PlayerId) -> bool {
        let op = format!("add ignore {player} -> {ignored}");
        logged_write(self.name(), &op, self.try_add_ignore(player, ignored))
    }

    fn remove_ignore(&self, player: PlayerId, ignored: PlayerId) -> bool {
        let op = format!("remove ignore {player} -> {ignored}");
        logged_write(self.name(), &op, self.try_remove_ignore(player, ignored))
    }

    /// Single-pair existence check; failures read as "not ignored".
    fn is_ignored(&self, player: PlayerId, ignored: PlayerId) -> bool {
        match self.try_is_ignored(player, ignored) {
            Ok(found) => found,
            Err(e) => {
                log::error!(
                    "[{}] failed to check ignore {} -> {}: {}",
                    self.name(),
                    player,
                    ignored,
                    e
                );
                false
            }
        }
    }

    /// Whole ignore set of `player` in one query. `None` only on failure.
    fn fetch_ignores(&self, player: PlayerId) -> Option<HashSet<PlayerId>> {
        match self.try_fetch_ignores(player) {
            Ok(set) => Some(set),
            Err(e) => {
                log::error!("[{}] failed to fetch ignores of {}: {}", self.name(), player, e);
                None
            }
        }
    }
}

fn logged_write(backend: &str, op: &str, result: StorageResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            log::error!("[{}] failed to {}: {}", backend, op, e);
            false
        }
    }
}

/// Build the adapter selected by configuration. The backend still needs `load()`.
pub fn open_backend(settings: &StorageSettings) -> Box<dyn StorageBackend> {
    match settings.kind {
        StorageKind::Sqlite => Box::new(SqliteBackend::new(
            settings.sqlite_path(),
            &settings.table_prefix,
        )),
        StorageKind::Mysql => Box::new(MySqlBackend::new(settings)),
    }
}

pub(crate) fn parse_player_id(column: &'static str, value: &str) -> StorageResult<PlayerId> {
    Uuid::parse_str(value).map_err(|_| StorageError::Corrupt {
        column,
        value: value.to_string(),
    })
}

/// Rebuild a record from the four persisted string columns.
pub(crate) fn record_from_columns(
    player_id: &str,
    sound: String,
    display: &str,
    preference: &str,
) -> StorageResult<PlayerRecord> {
    let display = display.parse::<DisplayMode>().map_err(|_| StorageError::Corrupt {
        column: "Display",
        value: display.to_string(),
    })?;
    let preference = preference
        .parse::<PreferenceMode>()
        .map_err(|_| StorageError::Corrupt {
            column: "Preference",
            value: preference.to_string(),
        })?;
    Ok(PlayerRecord {
        player_id: parse_player_id("PlayerId", player_id)?,
        sound,
        display,
        preference,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_columns_rejects_unknown_display() {
        let id = Uuid::new_v4().to_string();
        let err = record_from_columns(&id, "S".to_string(), "BLINK", "ALWAYS").unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { column: "Display", .. }));

        let ok = record_from_columns(&id, "S".to_string(), "ONLY_CHAT", "NEVER").unwrap();
        assert_eq!(ok.display, DisplayMode::OnlyChat);
        assert_eq!(ok.preference, PreferenceMode::Never);
    }

    #[test]
    fn test_open_backend_follows_kind() {
        let mut settings = StorageSettings::default();
        assert_eq!(open_backend(&settings).name(), "sqlite");
        settings.kind = StorageKind::Mysql;
        assert_eq!(open_backend(&settings).name(), "mysql");
    }
}
