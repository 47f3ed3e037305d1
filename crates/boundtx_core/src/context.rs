//! Execution context: binds at most one connection to a logical unit of
//! execution (one request, one thread).
//!
//! # Responsibility
//! - Hand out the context's connection, opening it from the source on demand.
//! - Give the connection back to the source as soon as nothing needs it.
//!
//! # Invariants
//! - A context holds zero or one connection, never two.
//! - A connection is never released while a unit of work owns it or while it
//!   is outside autocommit mode.
//! - A context is `Send` but not `Sync`: it may move between threads but is
//!   never observed by two at once.
//! - Dropping a context returns any still-bound connection to the source.

use crate::db::{ConnectionSource, SourceError};
use crate::error::DataAccessResult;
use log::{debug, error, warn};
use rusqlite::Connection;
use std::cell::{Cell, Ref, RefCell};
use std::sync::Arc;
use uuid::Uuid;

/// Shared borrow of the connection bound to an `ExecutionContext`.
pub type ConnectionRef<'ctx> = Ref<'ctx, Connection>;

/// Explicit per-execution handle carrying the bound connection.
pub struct ExecutionContext {
    id: Uuid,
    source: Arc<dyn ConnectionSource>,
    bound: RefCell<Option<Connection>>,
    unit_of_work: Cell<bool>,
}

impl ExecutionContext {
    pub fn new(source: Arc<dyn ConnectionSource>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            bound: RefCell::new(None),
            unit_of_work: Cell::new(false),
        }
    }

    /// Correlation id written to every log event of this context.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> &Arc<dyn ConnectionSource> {
        &self.source
    }

    /// Returns whether a connection is currently bound.
    pub fn is_bound(&self) -> bool {
        self.bound.try_borrow().map_or(true, |slot| slot.is_some())
    }

    /// Returns whether a unit of work currently owns the bound connection.
    pub fn in_unit_of_work(&self) -> bool {
        self.unit_of_work.get()
    }

    /// Returns the bound connection, opening and binding one if needed.
    ///
    /// # Errors
    /// - `ConnectionUnavailable` when the source cannot supply a connection.
    pub fn acquire(&self) -> DataAccessResult<ConnectionRef<'_>> {
        if !self.is_bound() {
            let conn = self.source.get_connection()?;
            let mut slot = self
                .bound
                .try_borrow_mut()
                .map_err(|_| SourceError::Unavailable("context slot is busy".to_string()))?;
            *slot = Some(conn);
            debug!("event=conn_bind module=context status=ok ctx={}", self.id);
        }

        Ref::filter_map(self.bound.borrow(), Option::as_ref).map_err(|_| {
            SourceError::Unavailable("no connection bound to context".to_string()).into()
        })
    }

    /// Returns the connection to the source unless something still needs it.
    ///
    /// No-op when no connection is bound, when a unit of work owns it, when it
    /// is inside a transaction (autocommit off), or when an outer call on this
    /// context still holds a borrow of it.
    pub fn release_if_idle(&self) -> DataAccessResult<()> {
        if self.unit_of_work.get() {
            return Ok(());
        }
        let Ok(mut slot) = self.bound.try_borrow_mut() else {
            return Ok(());
        };
        if !slot.as_ref().is_some_and(Connection::is_autocommit) {
            return Ok(());
        }
        let Some(conn) = slot.take() else {
            return Ok(());
        };
        drop(slot);

        self.source.release_connection(conn)?;
        debug!("event=conn_release module=context status=ok ctx={}", self.id);
        Ok(())
    }

    /// Runs `f` on the bound connection, then releases it if idle.
    ///
    /// The release runs on every exit path. When `f` fails, its error wins and
    /// a release failure is only logged.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> DataAccessResult<T>,
    ) -> DataAccessResult<T> {
        let result = match self.acquire() {
            Ok(conn) => f(&conn),
            Err(err) => Err(err),
        };
        let released = self.release_if_idle();

        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                error!(
                    "event=conn_release module=context status=error ctx={} error_code={} error={}",
                    self.id,
                    release_err.error_code(),
                    release_err
                );
                Err(err)
            }
        }
    }

    /// Returns the bound connection without opening a new one.
    pub(crate) fn bound_connection(&self) -> Option<ConnectionRef<'_>> {
        let slot = self.bound.try_borrow().ok()?;
        Ref::filter_map(slot, Option::as_ref).ok()
    }

    pub(crate) fn enter_unit_of_work(&self) {
        self.unit_of_work.set(true);
    }

    pub(crate) fn leave_unit_of_work(&self) {
        self.unit_of_work.set(false);
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        let Some(conn) = self.bound.get_mut().take() else {
            return;
        };
        warn!(
            "event=conn_reclaim module=context status=start ctx={} in_transaction={}",
            self.id,
            !conn.is_autocommit()
        );
        if !conn.is_autocommit() {
            if let Err(err) = conn.execute_batch("ROLLBACK;") {
                error!(
                    "event=conn_reclaim module=context status=error ctx={} error_code=rollback_failed error={}",
                    self.id, err
                );
            }
        }
        if let Err(err) = self.source.release_connection(conn) {
            error!(
                "event=conn_reclaim module=context status=error ctx={} error_code=release_failed error={}",
                self.id, err
            );
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("bound", &self.is_bound())
            .field("unit_of_work", &self.unit_of_work.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::ExecutionContext;
    use crate::db::{DataSourceConfig, SqliteConnectionSource};
    use crate::error::DataAccessError;
    use std::sync::Arc;

    fn memory_source(name: &str) -> Arc<SqliteConnectionSource> {
        Arc::new(SqliteConnectionSource::new(DataSourceConfig::memory(name)).expect("source"))
    }

    #[test]
    fn acquire_reuses_bound_connection() {
        let source = memory_source("ctx_reuse");
        let ctx = ExecutionContext::new(source.clone());

        {
            let first = ctx.acquire().expect("first acquire");
            let second = ctx.acquire().expect("second acquire");
            assert!(std::ptr::eq(&*first, &*second));
        }
        assert_eq!(source.open_connections(), 1);
        assert_eq!(source.total_opened(), 1);

        ctx.release_if_idle().expect("release");
        assert!(!ctx.is_bound());
        assert_eq!(source.open_connections(), 0);
    }

    #[test]
    fn release_is_noop_inside_transaction() {
        let source = memory_source("ctx_tx_noop");
        let ctx = ExecutionContext::new(source.clone());

        ctx.acquire()
            .expect("acquire")
            .execute_batch("BEGIN;")
            .expect("begin");
        ctx.release_if_idle().expect("release");
        assert!(ctx.is_bound());
        assert_eq!(source.open_connections(), 1);

        ctx.acquire()
            .expect("acquire")
            .execute_batch("COMMIT;")
            .expect("commit");
        ctx.release_if_idle().expect("release");
        assert!(!ctx.is_bound());
    }

    #[test]
    fn release_is_noop_while_outer_borrow_is_alive() {
        let source = memory_source("ctx_outer_borrow");
        let ctx = ExecutionContext::new(source.clone());

        let outer = ctx.acquire().expect("acquire");
        ctx.release_if_idle().expect("release");
        assert!(ctx.is_bound());
        drop(outer);

        ctx.release_if_idle().expect("release");
        assert_eq!(source.open_connections(), 0);
    }

    #[test]
    fn exhausted_source_maps_to_connection_unavailable() {
        let source = Arc::new(
            SqliteConnectionSource::new(
                DataSourceConfig::memory("ctx_exhausted").with_max_open_connections(1),
            )
            .expect("source"),
        );
        let holder = ExecutionContext::new(source.clone());
        let _held = holder.acquire().expect("first context binds");

        let other = ExecutionContext::new(source.clone());
        let err = other.acquire().map(|_| ()).expect_err("limit must apply");
        assert!(matches!(err, DataAccessError::ConnectionUnavailable(_)));
        assert!(!other.is_bound());
    }

    #[test]
    fn dropping_context_reclaims_open_transaction() {
        let source = memory_source("ctx_drop");
        {
            let ctx = ExecutionContext::new(source.clone());
            let conn = ctx.acquire().expect("acquire");
            conn.execute_batch("CREATE TABLE IF NOT EXISTS t (v INTEGER); BEGIN; INSERT INTO t VALUES (1);")
                .expect("write");
        }
        assert_eq!(source.open_connections(), 0);

        let ctx = ExecutionContext::new(source.clone());
        let count: i64 = ctx
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
                    .map_err(|err| crate::error::translate("SELECT COUNT(*) FROM t", err))
            })
            .expect("count");
        assert_eq!(count, 0);
        assert_eq!(source.open_connections(), 0);
    }
}
