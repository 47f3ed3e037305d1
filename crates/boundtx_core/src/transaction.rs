//! Transaction demarcation over the context-bound connection.
//!
//! # Responsibility
//! - Start a unit of work on the context's connection, commit it on success
//!   and roll it back on failure.
//! - Restore autocommit mode and release the connection once the unit of work
//!   is over, whatever the outcome.
//!
//! # Invariants
//! - Nesting is flattened: a unit of work started while another one is active
//!   on the same context joins it and never begins, commits or rolls back.
//! - The caller observes an operation failure only after rollback and release
//!   have run.
//! - A unit of work dropped without `close` (e.g. during a panic) rolls back
//!   and releases its connection.

use crate::context::ExecutionContext;
use crate::error::{translate_tx, DataAccessError, DataAccessResult, TxPhase};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// SQLite locking mode used when a unit of work begins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeginMode {
    /// Locks are taken on first read/write.
    #[default]
    Deferred,
    /// Takes the write lock up front; avoids upgrade deadlocks between writers.
    Immediate,
    Exclusive,
}

impl BeginMode {
    fn sql(self) -> &'static str {
        match self {
            Self::Deferred => "BEGIN DEFERRED;",
            Self::Immediate => "BEGIN IMMEDIATE;",
            Self::Exclusive => "BEGIN EXCLUSIVE;",
        }
    }
}

/// Lifecycle of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    NotStarted,
    Active,
    Committed,
    RolledBack,
}

/// One transaction on the connection bound to an `ExecutionContext`.
#[derive(Debug)]
pub struct UnitOfWork<'ctx> {
    ctx: &'ctx ExecutionContext,
    state: UnitOfWorkState,
    joined: bool,
    closed: bool,
    started_at: Instant,
}

impl<'ctx> UnitOfWork<'ctx> {
    fn begin(ctx: &'ctx ExecutionContext, mode: BeginMode) -> DataAccessResult<Self> {
        if ctx.in_unit_of_work() {
            debug!("event=tx_join module=transaction status=ok ctx={}", ctx.id());
            return Ok(Self {
                ctx,
                state: UnitOfWorkState::Active,
                joined: true,
                closed: false,
                started_at: Instant::now(),
            });
        }

        // From here on, dropping `unit` leaves the context and releases the connection.
        let mut unit = Self {
            ctx,
            state: UnitOfWorkState::NotStarted,
            joined: false,
            closed: false,
            started_at: Instant::now(),
        };
        let conn = ctx.acquire()?;
        ctx.enter_unit_of_work();
        if let Err(err) = conn.execute_batch(mode.sql()) {
            error!(
                "event=tx_begin module=transaction status=error ctx={} error_code=begin_failed error={}",
                ctx.id(),
                err
            );
            drop(conn);
            return Err(translate_tx(TxPhase::Begin, err));
        }
        drop(conn);

        unit.state = UnitOfWorkState::Active;
        debug!(
            "event=tx_begin module=transaction status=ok ctx={} mode={:?}",
            ctx.id(),
            mode
        );
        Ok(unit)
    }

    pub fn state(&self) -> UnitOfWorkState {
        self.state
    }

    /// Returns whether this unit of work joined an outer one on the same context.
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Commits the transaction. On failure, rolls back before returning
    /// `TransactionFailure { phase: Commit }`.
    pub fn commit(&mut self) -> DataAccessResult<()> {
        if self.joined || self.state != UnitOfWorkState::Active {
            return Ok(());
        }
        let Some(conn) = self.ctx.bound_connection() else {
            self.state = UnitOfWorkState::RolledBack;
            return Err(crate::db::SourceError::Unavailable(
                "unit of work lost its connection".to_string(),
            )
            .into());
        };

        match conn.execute_batch("COMMIT;") {
            Ok(()) => {
                self.state = UnitOfWorkState::Committed;
                debug!(
                    "event=tx_commit module=transaction status=ok ctx={} duration_ms={}",
                    self.ctx.id(),
                    self.started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=tx_commit module=transaction status=error ctx={} error_code=commit_failed error={}",
                    self.ctx.id(),
                    err
                );
                if !conn.is_autocommit() {
                    if let Err(rollback_err) = conn.execute_batch("ROLLBACK;") {
                        error!(
                            "event=tx_rollback module=transaction status=error ctx={} error_code=rollback_failed error={}",
                            self.ctx.id(),
                            rollback_err
                        );
                    }
                }
                self.state = UnitOfWorkState::RolledBack;
                Err(translate_tx(TxPhase::Commit, err))
            }
        }
    }

    /// Rolls the transaction back.
    pub fn rollback(&mut self) -> DataAccessResult<()> {
        if self.joined || self.state != UnitOfWorkState::Active {
            return Ok(());
        }
        self.state = UnitOfWorkState::RolledBack;
        let Some(conn) = self.ctx.bound_connection() else {
            return Ok(());
        };
        // SQLite may already have rolled back on its own (e.g. after SQLITE_FULL).
        if conn.is_autocommit() {
            return Ok(());
        }

        conn.execute_batch("ROLLBACK;")
            .map_err(|err| translate_tx(TxPhase::Rollback, err))?;
        debug!(
            "event=tx_rollback module=transaction status=ok ctx={} duration_ms={}",
            self.ctx.id(),
            self.started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Restores autocommit mode and releases the connection. Idempotent.
    pub fn close(&mut self) -> DataAccessResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.joined {
            return Ok(());
        }

        let mut restored = Ok(());
        if let Some(conn) = self.ctx.bound_connection() {
            if !conn.is_autocommit() {
                restored = conn
                    .execute_batch("ROLLBACK;")
                    .map_err(|err| translate_tx(TxPhase::Rollback, err));
                if self.state == UnitOfWorkState::Active {
                    self.state = UnitOfWorkState::RolledBack;
                }
            }
        }

        self.ctx.leave_unit_of_work();
        let released = self.ctx.release_if_idle();
        restored.and(released)
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if !self.joined && self.state == UnitOfWorkState::Active {
            warn!(
                "event=tx_abandon module=transaction status=start ctx={} panicking={}",
                self.ctx.id(),
                std::thread::panicking()
            );
            if let Err(err) = self.rollback() {
                error!(
                    "event=tx_abandon module=transaction status=error ctx={} error_code={} error={}",
                    self.ctx.id(),
                    err.error_code(),
                    err
                );
            }
        }
        if let Err(err) = self.close() {
            error!(
                "event=tx_close module=transaction status=error ctx={} error_code={} error={}",
                self.ctx.id(),
                err.error_code(),
                err
            );
        }
    }
}

/// Runs operations inside units of work on an `ExecutionContext`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionManager {
    mode: BeginMode,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: BeginMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> BeginMode {
        self.mode
    }

    /// Starts a unit of work for manual demarcation.
    ///
    /// Prefer `run`/`run_with_result`; a unit of work dropped without `commit`
    /// rolls back.
    pub fn begin<'ctx>(&self, ctx: &'ctx ExecutionContext) -> DataAccessResult<UnitOfWork<'ctx>> {
        UnitOfWork::begin(ctx, self.mode)
    }

    /// Runs `operation` in a unit of work.
    pub fn run<E, F>(&self, ctx: &ExecutionContext, operation: F) -> Result<(), E>
    where
        F: FnOnce(&ExecutionContext) -> Result<(), E>,
        E: From<DataAccessError>,
    {
        self.run_with_result(ctx, operation)
    }

    /// Runs `operation` in a unit of work and returns its value.
    ///
    /// Commits when `operation` returns `Ok`, rolls back when it returns `Err`,
    /// then restores autocommit and releases the connection. The operation's
    /// error is returned unchanged; a rollback failure on that path is logged.
    pub fn run_with_result<T, E, F>(&self, ctx: &ExecutionContext, operation: F) -> Result<T, E>
    where
        F: FnOnce(&ExecutionContext) -> Result<T, E>,
        E: From<DataAccessError>,
    {
        let mut unit = self.begin(ctx)?;

        let outcome = match operation(ctx) {
            Ok(value) => unit.commit().map(|()| value).map_err(E::from),
            Err(err) => {
                if let Err(rollback_err) = unit.rollback() {
                    error!(
                        "event=tx_rollback module=transaction status=error ctx={} error_code={} error={}",
                        ctx.id(),
                        rollback_err.error_code(),
                        rollback_err
                    );
                }
                Err(err)
            }
        };

        let closed = unit.close();
        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                error!(
                    "event=tx_close module=transaction status=error ctx={} error_code={} error={}",
                    ctx.id(),
                    close_err.error_code(),
                    close_err
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BeginMode, TransactionManager, UnitOfWorkState};
    use crate::context::ExecutionContext;
    use crate::db::{DataSourceConfig, SqliteConnectionSource};
    use crate::error::DataAccessError;
    use std::sync::Arc;

    fn context(name: &str) -> (Arc<SqliteConnectionSource>, ExecutionContext) {
        let source =
            Arc::new(SqliteConnectionSource::new(DataSourceConfig::memory(name)).expect("source"));
        let ctx = ExecutionContext::new(source.clone());
        (source, ctx)
    }

    #[test]
    fn begin_mode_sql_matches_sqlite_keywords() {
        assert_eq!(BeginMode::default().sql(), "BEGIN DEFERRED;");
        assert_eq!(BeginMode::Immediate.sql(), "BEGIN IMMEDIATE;");
        assert_eq!(BeginMode::Exclusive.sql(), "BEGIN EXCLUSIVE;");
    }

    #[test]
    fn manual_unit_of_work_walks_the_state_machine() {
        let (source, ctx) = context("uow_states");
        let manager = TransactionManager::new();

        let mut unit = manager.begin(&ctx).expect("begin");
        assert_eq!(unit.state(), UnitOfWorkState::Active);
        assert!(ctx.in_unit_of_work());
        assert!(!ctx.acquire().expect("acquire").is_autocommit());

        unit.commit().expect("commit");
        assert_eq!(unit.state(), UnitOfWorkState::Committed);
        unit.close().expect("close");

        assert!(!ctx.in_unit_of_work());
        assert!(!ctx.is_bound());
        assert_eq!(source.open_connections(), 0);
    }

    #[test]
    fn dropped_unit_of_work_rolls_back_and_releases() {
        let (source, ctx) = context("uow_dropped");
        let manager = TransactionManager::new();

        {
            let _unit = manager.begin(&ctx).expect("begin");
            assert_eq!(source.open_connections(), 1);
        }
        assert!(!ctx.in_unit_of_work());
        assert_eq!(source.open_connections(), 0);
    }

    #[test]
    fn nested_begin_joins_outer_unit_of_work() {
        let (_source, ctx) = context("uow_joined");
        let manager = TransactionManager::new();

        let mut outer = manager.begin(&ctx).expect("outer");
        {
            let mut inner = manager.begin(&ctx).expect("inner");
            assert!(inner.is_joined());
            inner.commit().expect("joined commit is a no-op");
            inner.close().expect("joined close is a no-op");
        }
        assert!(ctx.in_unit_of_work());
        assert!(!ctx.acquire().expect("acquire").is_autocommit());

        outer.rollback().expect("rollback");
        outer.close().expect("close");
        assert!(!ctx.is_bound());
    }

    #[test]
    fn run_returns_operation_error_unchanged() {
        let (source, ctx) = context("uow_error_passthrough");
        let manager = TransactionManager::new();

        let err = manager
            .run(&ctx, |_| {
                Err::<(), _>(DataAccessError::EmptyResult {
                    sql: "marker".to_string(),
                })
            })
            .expect_err("operation failure must surface");
        assert!(matches!(err, DataAccessError::EmptyResult { ref sql } if sql == "marker"));
        assert_eq!(source.open_connections(), 0);
    }
}
