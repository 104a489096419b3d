//! Embedded single-file backend.
//!
//! One `rusqlite::Connection` opened by `load()` and shared behind a `Mutex`;
//! statements are short, so serializing them is cheaper than reopening the file
//! per call.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};

use super::schema::{update_values, Dialect, Tables};
use super::{parse_player_id, record_from_columns, StorageBackend};
use crate::core::error::{StorageError, StorageResult};
use crate::core::model::{PlayerId, PlayerRecord, RecordUpdate};

pub struct SqliteBackend {
    path: PathBuf,
    tables: Tables,
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .field("conn", &"<sqlite>")
            .finish()
    }
}

impl SqliteBackend {
    pub fn new(path: impl Into<PathBuf>, table_prefix: &str) -> Self {
        Self {
            path: path.into(),
            tables: Tables::new(table_prefix, Dialect::Sqlite),
            conn: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StorageResult<T>) -> StorageResult<T> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StorageError::NotLoaded)?;
        f(conn)
    }
}

impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn try_load(&self) -> StorageResult<()> {
        let mut guard = self.lock();
        if guard.is_some() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        *guard = Some(conn);
        Ok(())
    }

    fn try_unload(&self) -> StorageResult<()> {
        if let Some(conn) = self.lock().take() {
            conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
        }
        Ok(())
    }

    fn try_check_schema(&self) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute(&self.tables.create_players(), [])?;
            conn.execute(&self.tables.create_ignores(), [])?;
            Ok(())
        })
    }

    fn try_add_record(&self, record: &PlayerRecord) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                &self.tables.insert_record(),
                params![
                    record.player_id.to_string(),
                    record.sound,
                    record.display.as_str(),
                    record.preference.as_str(),
                ],
            )?;
            Ok(())
        })
    }

    fn try_update_record(&self, player: PlayerId, update: &RecordUpdate) -> StorageResult<()> {
        let mut values = update_values(update);
        values.push(player.to_string());
        self.with_conn(|conn| {
            conn.execute(
                &self.tables.update_record(update),
                rusqlite::params_from_iter(values.iter()),
            )?;
            Ok(())
        })
    }

    fn try_remove_record(&self, player: PlayerId) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute(&self.tables.delete_record(), params![player.to_string()])?;
            Ok(())
        })
    }

    fn try_fetch_record(&self, player: PlayerId) -> StorageResult<Option<PlayerRecord>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &self.tables.select_record(),
                    params![player.to_string()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?;
            row.map(|(id, sound, display, preference)| {
                record_from_columns(&id, sound, &display, &preference)
            })
            .transpose()
        })
    }

    fn try_add_ignore(&self, player: PlayerId, ignored: PlayerId) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                &self.tables.insert_ignore(),
                params![player.to_string(), ignored.to_string()],
            )?;
            Ok(())
        })
    }

    fn try_remove_ignore(&self, player: PlayerId, ignored: PlayerId) -> StorageResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                &self.tables.delete_ignore(),
                params![player.to_string(), ignored.to_string()],
            )?;
            Ok(())
        })
    }

    fn try_is_ignored(&self, player: PlayerId, ignored: PlayerId) -> StorageResult<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    &self.tables.exists_ignore(),
                    params![player.to_string(), ignored.to_string()],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    fn try_fetch_ignores(&self, player: PlayerId) -> StorageResult<HashSet<PlayerId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&self.tables.select_ignores())?;
            let ids = stmt
                .query_map(params![player.to_string()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids.iter()
                .map(|id| parse_player_id("IgnoredId", id))
                .collect()
        })
    }
}

impl Drop for SqliteBackend {
    fn drop(&mut self) {
        if self.lock().is_some() {
            self.unload();
        }
    }
}
