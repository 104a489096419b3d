// Error types. Storage errors stop at the backend boundary; they are logged and
// turned into empty results there and never reach the caches or the engine.

use std::io;

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend is not loaded")]
    NotLoaded,

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("mysql: {0}")]
    MySql(#[from] sqlx::Error),

    #[error("corrupt value '{value}' in column {column}")]
    Corrupt { column: &'static str, value: String },

    #[error("storage i/o: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read or write settings: {0}")]
    Io(#[from] io::Error),

    #[error("malformed settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("table prefix '{0}' must be 1-32 characters of A-Z, a-z, 0-9 or _")]
    InvalidTablePrefix(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0} storage failed to start, see log for details")]
    Storage(&'static str),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[from] io::Error),
}
