use boundtx_app::apply_migrations;
use boundtx_core::{DataSourceConfig, ExecutionContext, SqliteConnectionSource};
use std::sync::Arc;
use tempfile::TempDir;

/// Migrated throwaway database plus one context bound to it.
pub struct TestDb {
    pub ctx: ExecutionContext,
    pub source: Arc<SqliteConnectionSource>,
    pub _dir: TempDir,
}

pub fn migrated_db() -> TestDb {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(
        SqliteConnectionSource::new(DataSourceConfig::file(dir.path().join("app.db"))).unwrap(),
    );
    let ctx = ExecutionContext::new(source.clone());
    apply_migrations(&ctx).unwrap();
    TestDb {
        ctx,
        source,
        _dir: dir,
    }
}
