//! Migration registry and executor.
//!
//! # Invariants
//! - `version` values are strictly increasing.
//! - All pending migrations run in one unit of work; the applied version is
//!   written to `PRAGMA user_version` inside it.

use crate::db::{DbError, DbResult};
use boundtx_core::row::column;
use boundtx_core::{translate, ExecutionContext, SqlTemplate, TransactionManager};
use log::info;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("0001_users.sql"),
}];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations through the context's connection.
pub fn apply_migrations(ctx: &ExecutionContext) -> DbResult<()> {
    let template = SqlTemplate::new();
    let current = current_user_version(&template, ctx)?;
    let latest = latest_version();

    if current > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }
    if current == latest {
        return Ok(());
    }

    TransactionManager::new().run(ctx, |ctx| {
        let conn = ctx.acquire()?;
        for migration in MIGRATIONS {
            if migration.version <= current {
                continue;
            }
            conn.execute_batch(migration.sql)
                .map_err(|err| translate(migration.sql, err))?;
            let bump = format!("PRAGMA user_version = {};", migration.version);
            conn.execute_batch(&bump)
                .map_err(|err| translate(&bump, err))?;
        }
        Ok::<_, DbError>(())
    })?;

    info!(
        "event=db_migrate module=db status=ok ctx={} from={} to={}",
        ctx.id(),
        current,
        latest
    );
    Ok(())
}

fn current_user_version(template: &SqlTemplate, ctx: &ExecutionContext) -> DbResult<u32> {
    let version = template.fetch_exactly_one(ctx, "PRAGMA user_version;", column(0), &[])?;
    Ok(version)
}
