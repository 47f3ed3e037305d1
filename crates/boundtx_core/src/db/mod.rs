//! Connection source contract and SQLite-backed implementation.
//!
//! # Responsibility
//! - Define the external collaborator that hands out and takes back
//!   connections (`ConnectionSource`).
//! - Provide a SQLite source configured from `DataSourceConfig`.
//!
//! # Invariants
//! - A connection handed out by a source is owned by exactly one caller until
//!   it is passed back to `release_connection`.
//! - Source failures never panic; they surface as `SourceError`.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

mod open;

pub use open::SqliteConnectionSource;

/// Failure raised by a connection source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection limit reached: {open} of {max} connections open")]
    Exhausted { open: usize, max: usize },

    /// Free-form failure for sources not backed by `rusqlite` directly.
    #[error("connection source unavailable: {0}")]
    Unavailable(String),
}

/// Supplies connections on demand and takes them back when released.
///
/// Implementations are shared by every execution context, so they must be
/// safe to call from many threads. Any concurrency limit is theirs to enforce.
pub trait ConnectionSource: Send + Sync {
    fn get_connection(&self) -> Result<Connection, SourceError>;
    fn release_connection(&self, conn: Connection) -> Result<(), SourceError>;
}

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DbLocation {
    File { path: PathBuf },
    /// Named shared-cache in-memory database.
    Memory { name: String },
}

/// Settings applied to every connection opened by `SqliteConnectionSource`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct DataSourceConfig {
    pub location: DbLocation,
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
    /// `None` means unbounded.
    pub max_open_connections: Option<usize>,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            location: DbLocation::Memory {
                name: "boundtx".to_string(),
            },
            busy_timeout_ms: 5_000,
            foreign_keys: true,
            max_open_connections: None,
        }
    }
}

impl DataSourceConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: DbLocation::File { path: path.into() },
            ..Self::default()
        }
    }

    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            location: DbLocation::Memory { name: name.into() },
            ..Self::default()
        }
    }

    pub fn with_max_open_connections(mut self, max: usize) -> Self {
        self.max_open_connections = Some(max);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{DataSourceConfig, DbLocation};
    use std::path::PathBuf;

    #[test]
    fn config_deserializes_with_defaults() {
        let config: DataSourceConfig = serde_json::from_str(
            r#"{"location": {"kind": "file", "path": "/tmp/app.db"}, "max_open_connections": 4}"#,
        )
        .expect("config should parse");

        assert_eq!(
            config.location,
            DbLocation::File {
                path: PathBuf::from("/tmp/app.db")
            }
        );
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert!(config.foreign_keys);
        assert_eq!(config.max_open_connections, Some(4));
    }

    #[test]
    fn empty_config_is_default_memory_database() {
        let config: DataSourceConfig = serde_json::from_str("{}").expect("config should parse");
        assert_eq!(config, DataSourceConfig::default());
    }
}
