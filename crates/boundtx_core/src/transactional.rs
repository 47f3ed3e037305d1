//! Declarative transaction decorator.
//!
//! `Transactional<S>` wraps a service and runs every call routed through
//! `invoke` in its own unit of work. A capability trait becomes transactional
//! by implementing it for `Transactional<S>` with one `invoke` per method:
//!
//! ```ignore
//! impl<S: AccountService> AccountService for Transactional<S> {
//!     fn transfer(&self, ctx: &ExecutionContext, from: i64, to: i64) -> Result<(), Error> {
//!         self.invoke(ctx, |service, ctx| service.transfer(ctx, from, to))
//!     }
//! }
//! ```
//!
//! The wrapped service never sees transactions; data-access objects it calls
//! share the unit of work through the context's bound connection.

use crate::context::ExecutionContext;
use crate::error::DataAccessError;
use crate::transaction::TransactionManager;

/// Service decorator running each call inside a unit of work.
#[derive(Debug, Clone)]
pub struct Transactional<S> {
    inner: S,
    manager: TransactionManager,
}

impl<S> Transactional<S> {
    pub fn new(inner: S, manager: TransactionManager) -> Self {
        Self { inner, manager }
    }

    /// Runs `call` against the wrapped service inside a unit of work.
    ///
    /// Commits only when `call` returns `Ok`; otherwise the error reaches the
    /// caller unchanged after rollback.
    pub fn invoke<T, E, F>(&self, ctx: &ExecutionContext, call: F) -> Result<T, E>
    where
        F: FnOnce(&S, &ExecutionContext) -> Result<T, E>,
        E: From<DataAccessError>,
    {
        self.manager
            .run_with_result(ctx, |ctx| call(&self.inner, ctx))
    }
}
