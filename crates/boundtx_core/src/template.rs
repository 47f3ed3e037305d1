//! Query executor: binds positional arguments, runs SQL and maps rows.
//!
//! # Responsibility
//! - Run one statement per call on the context's bound connection.
//! - Map rows through caller-supplied row mappers.
//! - Translate every SQLite failure before it reaches the caller.
//!
//! # Invariants
//! - Argument counts are checked before the connection is acquired.
//! - Statements are prepared and dropped inside one call; the connection is
//!   offered back via `release_if_idle` on every exit path.
//! - Single-row fetches scan the whole result, so extra rows are reported
//!   instead of silently dropped.

use crate::context::ExecutionContext;
use crate::error::{translate, DataAccessError, DataAccessResult};
use crate::statement::StatementSpec;
use log::{debug, error};
use rusqlite::{Connection, Row, Statement, ToSql};
use std::time::Instant;

/// Reusable, stateless query-execution template.
#[derive(Debug, Clone, Copy)]
pub struct SqlTemplate {
    validate_arguments: bool,
}

impl Default for SqlTemplate {
    fn default() -> Self {
        Self {
            validate_arguments: true,
        }
    }
}

impl SqlTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables the text-level placeholder check.
    ///
    /// With it disabled, a mismatch is still reported as
    /// `ArgumentCountMismatch`, but only after the statement is prepared.
    pub fn with_argument_validation(mut self, enabled: bool) -> Self {
        self.validate_arguments = enabled;
        self
    }

    /// Executes an insert/update/delete and returns the affected row count.
    pub fn execute(
        &self,
        ctx: &ExecutionContext,
        sql: &str,
        args: &[&dyn ToSql],
    ) -> DataAccessResult<usize> {
        let spec = self.spec(sql, args)?;
        self.with_statement(ctx, spec, "sql_execute", |_, stmt| {
            stmt.raw_execute().map_err(|err| translate(sql, err))
        })
    }

    /// Executes an insert and returns the rowid of the inserted row.
    pub fn insert(
        &self,
        ctx: &ExecutionContext,
        sql: &str,
        args: &[&dyn ToSql],
    ) -> DataAccessResult<i64> {
        let spec = self.spec(sql, args)?;
        self.with_statement(ctx, spec, "sql_insert", |conn, stmt| {
            stmt.raw_execute().map_err(|err| translate(sql, err))?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Fetches at most one row.
    ///
    /// # Errors
    /// - `TooManyResults` when the query yields more than one row.
    pub fn fetch_one<T, F>(
        &self,
        ctx: &ExecutionContext,
        sql: &str,
        mapper: F,
        args: &[&dyn ToSql],
    ) -> DataAccessResult<Option<T>>
    where
        F: Fn(&Row<'_>) -> rusqlite::Result<T>,
    {
        let spec = self.spec(sql, args)?;
        self.with_statement(ctx, spec, "sql_query", |_, stmt| {
            let mut rows = stmt.raw_query();
            let first = match rows.next().map_err(|err| translate(sql, err))? {
                Some(row) => Some(mapper(row).map_err(|err| translate(sql, err))?),
                None => None,
            };

            let mut actual = usize::from(first.is_some());
            while rows.next().map_err(|err| translate(sql, err))?.is_some() {
                actual += 1;
            }
            if actual > 1 {
                return Err(DataAccessError::TooManyResults {
                    sql: sql.to_string(),
                    actual,
                });
            }
            Ok(first)
        })
    }

    /// Fetches exactly one row.
    ///
    /// # Errors
    /// - `EmptyResult` when the query yields no row.
    /// - `TooManyResults` when it yields more than one.
    pub fn fetch_exactly_one<T, F>(
        &self,
        ctx: &ExecutionContext,
        sql: &str,
        mapper: F,
        args: &[&dyn ToSql],
    ) -> DataAccessResult<T>
    where
        F: Fn(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.fetch_one(ctx, sql, mapper, args)?
            .ok_or_else(|| DataAccessError::EmptyResult {
                sql: sql.to_string(),
            })
    }

    /// Fetches every row, in result order, fully materialized.
    pub fn fetch_many<T, F>(
        &self,
        ctx: &ExecutionContext,
        sql: &str,
        mapper: F,
        args: &[&dyn ToSql],
    ) -> DataAccessResult<Vec<T>>
    where
        F: Fn(&Row<'_>) -> rusqlite::Result<T>,
    {
        let spec = self.spec(sql, args)?;
        self.with_statement(ctx, spec, "sql_query", |_, stmt| {
            let mut rows = stmt.raw_query();
            let mut mapped = Vec::new();
            while let Some(row) = rows.next().map_err(|err| translate(sql, err))? {
                mapped.push(mapper(row).map_err(|err| translate(sql, err))?);
            }
            Ok(mapped)
        })
    }

    fn spec<'a>(
        &self,
        sql: &'a str,
        args: &'a [&'a dyn ToSql],
    ) -> DataAccessResult<StatementSpec<'a>> {
        if self.validate_arguments {
            StatementSpec::new(sql, args)
        } else {
            Ok(StatementSpec::unchecked(sql, args))
        }
    }

    fn with_statement<T>(
        &self,
        ctx: &ExecutionContext,
        spec: StatementSpec<'_>,
        event: &'static str,
        f: impl FnOnce(&Connection, &mut Statement<'_>) -> DataAccessResult<T>,
    ) -> DataAccessResult<T> {
        let started_at = Instant::now();
        let sql = spec.sql();

        let result = ctx.with_connection(|conn| {
            let mut stmt = conn.prepare(sql).map_err(|err| translate(sql, err))?;
            spec.bind(&mut stmt).map_err(|err| translate(sql, err))?;
            f(conn, &mut stmt)
        });

        match &result {
            Ok(_) => debug!(
                "event={} module=template status=ok ctx={} args={} duration_ms={} sql={}",
                event,
                ctx.id(),
                spec.args().len(),
                started_at.elapsed().as_millis(),
                sql
            ),
            Err(err) => error!(
                "event={} module=template status=error ctx={} args={} duration_ms={} error_code={} error={}",
                event,
                ctx.id(),
                spec.args().len(),
                started_at.elapsed().as_millis(),
                err.error_code(),
                err
            ),
        }
        result
    }
}
