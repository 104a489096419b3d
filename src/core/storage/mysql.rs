//! Networked backend over a pooled MySQL connection.
//!
//! The pool lives on a small tokio runtime owned by this backend. Every call
//! drives its query with `block_on`, which keeps the contract synchronous but
//! means calls must come from a blocking thread, never from inside an async
//! task.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Row;
use tokio::runtime::Runtime;

use super::schema::{update_values, Dialect, Tables};
use super::{parse_player_id, record_from_columns, StorageBackend};
use crate::core::config::StorageSettings;
use crate::core::error::{StorageError, StorageResult};
use crate::core::model::{PlayerId, PlayerRecord, RecordUpdate};

struct Connected {
    runtime: Runtime,
    pool: MySqlPool,
}

pub struct MySqlBackend {
    options: MySqlConnectOptions,
    pool_size: u32,
    max_lifetime: Duration,
    tables: Tables,
    state: RwLock<Option<Connected>>,
}

impl std::fmt::Debug for MySqlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlBackend")
            .field("pool_size", &self.pool_size)
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}

impl MySqlBackend {
    pub fn new(settings: &StorageSettings) -> Self {
        Self {
            options: connect_options(settings),
            pool_size: settings.pool_size.max(1),
            max_lifetime: Duration::from_secs(settings.max_lifetime_seconds.max(1)),
            tables: Tables::new(&settings.table_prefix, Dialect::MySql),
            state: RwLock::new(None),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.read().is_some()
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Connected>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one async query against the pool on the owned runtime.
    fn run<T, F, Fut>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(MySqlPool) -> Fut,
        Fut: std::future::Future<Output = StorageResult<T>>,
    {
        let guard = self.read();
        let connected = guard.as_ref().ok_or(StorageError::NotLoaded)?;
        connected.runtime.block_on(f(connected.pool.clone()))
    }

    fn shutdown(connected: Connected) {
        let Connected { runtime, pool } = connected;
        runtime.block_on(pool.close());
        runtime.shutdown_background();
    }
}

fn connect_options(settings: &StorageSettings) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .database(&settings.database)
        .username(&settings.username)
        .password(&settings.password)
}

impl StorageBackend for MySqlBackend {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn try_load(&self) -> StorageResult<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.is_some() {
            return Ok(());
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("mysql-storage")
            .enable_all()
            .build()?;
        let pool = runtime.block_on(
            MySqlPoolOptions::new()
                .max_connections(self.pool_size)
                .max_lifetime(self.max_lifetime)
                .connect_with(self.options.clone()),
        );
        match pool {
            Ok(pool) => {
                *state = Some(Connected { runtime, pool });
                Ok(())
            }
            Err(e) => {
                runtime.shutdown_background();
                Err(e.into())
            }
        }
    }

    fn try_unload(&self) -> StorageResult<()> {
        let connected = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(connected) = connected {
            Self::shutdown(connected);
        }
        Ok(())
    }

    fn try_check_schema(&self) -> StorageResult<()> {
        let players = self.tables.create_players();
        let ignores = self.tables.create_ignores();
        self.run(|pool| async move {
            sqlx::query(&players).execute(&pool).await?;
            sqlx::query(&ignores).execute(&pool).await?;
            Ok(())
        })
    }

    fn try_add_record(&self, record: &PlayerRecord) -> StorageResult<()> {
        let sql = self.tables.insert_record();
        self.run(|pool| async move {
            sqlx::query(&sql)
                .bind(record.player_id.to_string())
                .bind(&record.sound)
                .bind(record.display.as_str())
                .bind(record.preference.as_str())
                .execute(&pool)
                .await?;
            Ok(())
        })
    }

    fn try_update_record(&self, player: PlayerId, update: &RecordUpdate) -> StorageResult<()> {
        let sql = self.tables.update_record(update);
        let values = update_values(update);
        self.run(|pool| async move {
            let mut query = sqlx::query::<sqlx::MySql>(&sql);
            for value in values {
                query = query.bind(value);
            }
            query.bind(player.to_string()).execute(&pool).await?;
            Ok(())
        })
    }

    fn try_remove_record(&self, player: PlayerId) -> StorageResult<()> {
        let sql = self.tables.delete_record();
        self.run(|pool| async move {
            sqlx::query(&sql)
                .bind(player.to_string())
                .execute(&pool)
                .await?;
            Ok(())
        })
    }

    fn try_fetch_record(&self, player: PlayerId) -> StorageResult<Option<PlayerRecord>> {
        let sql = self.tables.select_record();
        self.run(|pool| async move {
            let row = sqlx::query(&sql)
                .bind(player.to_string())
                .fetch_optional(&pool)
                .await?;
            let Some(row) = row else {
                return Ok(None);
            };
            let id: String = row.try_get("PlayerId")?;
            let sound: String = row.try_get("Sound")?;
            let display: String = row.try_get("Display")?;
            let preference: String = row.try_get("Preference")?;
            record_from_columns(&id, sound, &display, &preference).map(Some)
        })
    }

    fn try_add_ignore(&self, player: PlayerId, ignored: PlayerId) -> StorageResult<()> {
        let sql = self.tables.insert_ignore();
        self.run(|pool| async move {
            sqlx::query(&sql)
                .bind(player.to_string())
                .bind(ignored.to_string())
                .execute(&pool)
                .await?;
            Ok(())
        })
    }

    fn try_remove_ignore(&self, player: PlayerId, ignored: PlayerId) -> StorageResult<()> {
        let sql = self.tables.delete_ignore();
        self.run(|pool| async move {
            sqlx::query(&sql)
                .bind(player.to_string())
                .bind(ignored.to_string())
                .execute(&pool)
                .await?;
            Ok(())
        })
    }

    fn try_is_ignored(&self, player: PlayerId, ignored: PlayerId) -> StorageResult<bool> {
        let sql = self.tables.exists_ignore();
        self.run(|pool| async move {
            let row = sqlx::query(&sql)
                .bind(player.to_string())
                .bind(ignored.to_string())
                .fetch_optional(&pool)
                .await?;
            Ok(row.is_some())
        })
    }

    fn try_fetch_ignores(&self, player: PlayerId) -> StorageResult<HashSet<PlayerId>> {
        let sql = self.tables.select_ignores();
        self.run(|pool| async move {
            let rows = sqlx::query(&sql)
                .bind(player.to_string())
                .fetch_all(&pool)
                .await?;
            rows.iter()
                .map(|row| {
                    let id: String = row.try_get("IgnoredId")?;
                    parse_player_id("IgnoredId", &id)
                })
                .collect()
        })
    }
}

impl Drop for MySqlBackend {
    fn drop(&mut self) {
        let connected = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Connected { runtime, .. }) = connected {
            // unload() was skipped; don't block in drop
            runtime.shutdown_background();
        }
    }
}
