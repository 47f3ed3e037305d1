//! Console demo.
//!
//! Creates a user, changes its password through the transactional service and
//! prints the stored state.
//!
//! Environment:
//! - `BOUNDTX_DB_PATH`: database file (default: shared in-memory database).
//! - `BOUNDTX_LOG_LEVEL`: `trace|debug|info|warn|error`.
//! - `BOUNDTX_LOG_DIR`: absolute log directory; file logging is off when unset.

use boundtx_app::{
    apply_migrations, default_log_level, init_logging, transactional_user_service, User,
    UserHistoryDao, UserService,
};
use boundtx_core::{DataSourceConfig, ExecutionContext, SqlTemplate, SqliteConnectionSource};
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("boundtx: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = std::env::var("BOUNDTX_LOG_DIR") {
        let level =
            std::env::var("BOUNDTX_LOG_LEVEL").unwrap_or_else(|_| default_log_level().to_string());
        init_logging(&level, &log_dir)?;
    }

    let config = match std::env::var("BOUNDTX_DB_PATH") {
        Ok(path) => DataSourceConfig::file(path),
        Err(_) => DataSourceConfig::memory("boundtx_demo"),
    };
    let source = Arc::new(SqliteConnectionSource::new(config)?);
    let ctx = ExecutionContext::new(source.clone());
    apply_migrations(&ctx)?;

    let service = transactional_user_service(UserHistoryDao::new(SqlTemplate::new()));
    let id = service.insert(&ctx, &User::new("gugu", "password", "hkkang@woowahan.com"))?;
    service.change_password(&ctx, id, "qqqqq", "gugu")?;

    let user = service.find_by_id(&ctx, id)?;
    println!("boundtx_core version={}", boundtx_core::core_version());
    println!(
        "user id={} account={} password={} open_connections={}",
        id,
        user.account,
        user.password,
        source.open_connections()
    );
    Ok(())
}
