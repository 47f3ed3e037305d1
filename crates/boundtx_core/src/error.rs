//! Data-access error taxonomy and translation of SQLite failures.
//!
//! # Responsibility
//! - Define the closed set of failures visible to callers of the core.
//! - Translate every `rusqlite::Error` exactly once, at the executor and
//!   transaction boundaries.
//!
//! # Invariants
//! - No `rusqlite::Error` crosses the executor/transaction boundary unmapped.
//! - Translation is total: unknown failures become `QueryFailure`.

use crate::db::SourceError;
use rusqlite::ErrorCode;
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub type DataAccessResult<T> = Result<T, DataAccessError>;

/// Coarse classification of a failed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// UNIQUE / NOT NULL / FOREIGN KEY / CHECK violation.
    Constraint,
    /// Database was busy or locked by another connection.
    Busy,
    Other,
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constraint => write!(f, "constraint violation"),
            Self::Busy => write!(f, "database busy"),
            Self::Other => write!(f, "statement error"),
        }
    }
}

/// Transaction boundary step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPhase {
    Begin,
    Commit,
    Rollback,
}

impl Display for TxPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Begin => write!(f, "begin"),
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Failure raised by the query executor or the transaction manager.
#[derive(Debug, Error)]
pub enum DataAccessError {
    /// Placeholder count and argument count differ. Always a caller bug.
    #[error("statement expects {expected} positional argument(s) but {actual} were supplied")]
    ArgumentCountMismatch { expected: usize, actual: usize },

    #[error("{kind}: {source} (sql: {sql})")]
    QueryFailure {
        sql: String,
        kind: FailureKind,
        #[source]
        source: rusqlite::Error,
    },

    #[error("expected exactly one row but found none (sql: {sql})")]
    EmptyResult { sql: String },

    #[error("expected at most one row but found {actual} (sql: {sql})")]
    TooManyResults { sql: String, actual: usize },

    #[error("connection unavailable: {0}")]
    ConnectionUnavailable(#[from] SourceError),

    #[error("transaction {phase} failed: {source}")]
    TransactionFailure {
        phase: TxPhase,
        #[source]
        source: rusqlite::Error,
    },
}

impl DataAccessError {
    /// Stable identifier used in `error_code=` log fields.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ArgumentCountMismatch { .. } => "argument_count_mismatch",
            Self::QueryFailure { .. } => "query_failure",
            Self::EmptyResult { .. } => "empty_result",
            Self::TooManyResults { .. } => "too_many_results",
            Self::ConnectionUnavailable(_) => "connection_unavailable",
            Self::TransactionFailure { .. } => "transaction_failure",
        }
    }

    /// Returns whether this failure was caused by a violated constraint.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::QueryFailure {
                kind: FailureKind::Constraint,
                ..
            }
        )
    }
}

/// Maps a SQLite failure raised while running `sql` into the taxonomy.
pub fn translate(sql: &str, err: rusqlite::Error) -> DataAccessError {
    match err {
        rusqlite::Error::InvalidParameterCount(actual, expected) => {
            DataAccessError::ArgumentCountMismatch { expected, actual }
        }
        rusqlite::Error::QueryReturnedNoRows => DataAccessError::EmptyResult {
            sql: sql.to_string(),
        },
        other => match other.sqlite_error_code() {
            Some(ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::SystemIoFailure) => {
                DataAccessError::ConnectionUnavailable(SourceError::Sqlite(other))
            }
            Some(ErrorCode::ConstraintViolation) => {
                query_failure(sql, FailureKind::Constraint, other)
            }
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                query_failure(sql, FailureKind::Busy, other)
            }
            _ => query_failure(sql, FailureKind::Other, other),
        },
    }
}

/// Maps a failure of `BEGIN`/`COMMIT`/`ROLLBACK`.
pub(crate) fn translate_tx(phase: TxPhase, err: rusqlite::Error) -> DataAccessError {
    DataAccessError::TransactionFailure { phase, source: err }
}

fn query_failure(sql: &str, kind: FailureKind, source: rusqlite::Error) -> DataAccessError {
    DataAccessError::QueryFailure {
        sql: sql.to_string(),
        kind,
        source,
    }
}
