//! Schema bootstrap for the demo database.
//!
//! # Responsibility
//! - Bring a fresh or older database up to the schema the DAOs expect.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - DAOs must not run before `apply_migrations` succeeds.

use boundtx_core::DataAccessError;
use thiserror::Error;

pub mod migrations;

pub use migrations::{apply_migrations, latest_version};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    DataAccess(#[from] DataAccessError),

    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}
