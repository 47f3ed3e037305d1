//! SQLite connection source.
//!
//! # Responsibility
//! - Open file or shared in-memory SQLite connections.
//! - Configure connection pragmas required by core behavior.
//! - Track how many handed-out connections are still open.
//!
//! # Invariants
//! - Returned connections have `foreign_keys` and `busy_timeout` applied.
//! - `open_connections()` never exceeds `max_open_connections` when set.
//! - The in-memory anchor connection is not counted as open.

use super::{ConnectionSource, DataSourceConfig, DbLocation, SourceError};
use log::{debug, error, info};
use rusqlite::{Connection, OpenFlags};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Connection source opening a fresh SQLite connection per request.
#[derive(Debug)]
pub struct SqliteConnectionSource {
    config: DataSourceConfig,
    open: AtomicUsize,
    opened_total: AtomicUsize,
    // Keeps a shared in-memory database alive while no caller holds a connection.
    _anchor: Option<Mutex<Connection>>,
}

impl SqliteConnectionSource {
    /// Creates a source for `config`.
    ///
    /// For in-memory locations this opens the anchor connection immediately,
    /// so an unusable configuration fails here rather than on first use.
    pub fn new(config: DataSourceConfig) -> Result<Self, SourceError> {
        let anchor = match &config.location {
            DbLocation::Memory { .. } => Some(Mutex::new(open_connection(&config)?)),
            DbLocation::File { .. } => None,
        };

        info!(
            "event=source_init module=db status=ok mode={} max_open={}",
            mode_label(&config.location),
            config
                .max_open_connections
                .map_or_else(|| "unbounded".to_string(), |max| max.to_string())
        );

        Ok(Self {
            config,
            open: AtomicUsize::new(0),
            opened_total: AtomicUsize::new(0),
            _anchor: anchor,
        })
    }

    pub fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    /// Number of handed-out connections not yet released.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Number of connections opened over the lifetime of this source.
    pub fn total_opened(&self) -> usize {
        self.opened_total.load(Ordering::SeqCst)
    }

    fn reserve_slot(&self) -> Result<(), SourceError> {
        match self.config.max_open_connections {
            Some(max) => self
                .open
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |open| {
                    (open < max).then_some(open + 1)
                })
                .map(|_| ())
                .map_err(|open| SourceError::Exhausted { open, max }),
            None => {
                self.open.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn free_slot(&self) {
        let _ = self
            .open
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |open| open.checked_sub(1));
    }
}

impl ConnectionSource for SqliteConnectionSource {
    fn get_connection(&self) -> Result<Connection, SourceError> {
        let started_at = Instant::now();
        if let Err(err) = self.reserve_slot() {
            error!(
                "event=conn_open module=db status=error error_code=source_exhausted error={}",
                err
            );
            return Err(err);
        }

        match open_connection(&self.config) {
            Ok(conn) => {
                self.opened_total.fetch_add(1, Ordering::SeqCst);
                debug!(
                    "event=conn_open module=db status=ok mode={} open={} duration_ms={}",
                    mode_label(&self.config.location),
                    self.open_connections(),
                    started_at.elapsed().as_millis()
                );
                Ok(conn)
            }
            Err(err) => {
                self.free_slot();
                error!(
                    "event=conn_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                    mode_label(&self.config.location),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn release_connection(&self, conn: Connection) -> Result<(), SourceError> {
        self.free_slot();
        match conn.close() {
            Ok(()) => {
                debug!(
                    "event=conn_close module=db status=ok open={}",
                    self.open_connections()
                );
                Ok(())
            }
            Err((_conn, err)) => {
                error!(
                    "event=conn_close module=db status=error error_code=db_close_failed error={}",
                    err
                );
                Err(err.into())
            }
        }
    }
}

fn open_connection(config: &DataSourceConfig) -> Result<Connection, SourceError> {
    let conn = match &config.location {
        DbLocation::File { path } => Connection::open(path)?,
        DbLocation::Memory { name } => Connection::open_with_flags(
            format!("file:{name}?mode=memory&cache=shared"),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?,
    };
    bootstrap_connection(&conn, config)?;
    Ok(conn)
}

fn bootstrap_connection(conn: &Connection, config: &DataSourceConfig) -> Result<(), SourceError> {
    if config.foreign_keys {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    }
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}

fn mode_label(location: &DbLocation) -> &'static str {
    match location {
        DbLocation::File { .. } => "file",
        DbLocation::Memory { .. } => "memory",
    }
}
