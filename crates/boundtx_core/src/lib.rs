//! Core data-access toolkit.
//!
//! A query template that binds positional arguments and maps rows, plus
//! transaction demarcation that binds one connection to an explicit execution
//! context so several data-access calls share one unit of work.

pub mod context;
pub mod db;
pub mod error;
pub mod row;
pub mod statement;
pub mod template;
pub mod transaction;
pub mod transactional;

pub use context::{ConnectionRef, ExecutionContext};
pub use db::{
    ConnectionSource, DataSourceConfig, DbLocation, SourceError, SqliteConnectionSource,
};
pub use error::{translate, DataAccessError, DataAccessResult, FailureKind, TxPhase};
pub use statement::{count_placeholders, StatementSpec};
pub use template::SqlTemplate;
pub use transaction::{BeginMode, TransactionManager, UnitOfWork, UnitOfWorkState};
pub use transactional::Transactional;

/// Re-exported so callers can build argument slices without naming `rusqlite`.
pub use rusqlite::{params, Row, ToSql};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
