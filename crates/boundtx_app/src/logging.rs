//! Process-wide logging setup for the demo application.
//!
//! # Responsibility
//! - Route `log` events from the core and the app into rolling files.
//! - Capture panics as log events before the default hook runs.
//!
//! # Invariants
//! - Initialization happens at most once per process and never panics.
//! - Repeating `init_logging` with the same settings is a no-op; different
//!   settings are rejected.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use thiserror::Error;

const LOG_FILE_BASENAME: &str = "boundtx";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    level: &'static str,
    log_dir: PathBuf,
}

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoggingError {
    #[error("unsupported log level `{0}`; expected trace|debug|info|warn|error")]
    UnsupportedLevel(String),

    #[error("log_dir must be a non-empty absolute path, got `{0}`")]
    InvalidDirectory(String),

    #[error("logging already initialized with level `{active_level}` at `{active_dir}`")]
    AlreadyInitialized {
        active_level: &'static str,
        active_dir: String,
    },

    #[error("failed to start logger: {0}")]
    Backend(String),
}

/// Starts file logging at `level` under `log_dir`.
///
/// # Errors
/// - `UnsupportedLevel` / `InvalidDirectory` for bad input.
/// - `AlreadyInitialized` when a different configuration is already active.
/// - `Backend` when the directory or the logger cannot be created.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), LoggingError> {
    let requested = LogSettings {
        level: parse_level(level)?,
        log_dir: parse_log_dir(log_dir)?,
    };

    let active = ACTIVE.get_or_try_init(|| start(&requested))?;
    if active.settings != requested {
        return Err(LoggingError::AlreadyInitialized {
            active_level: active.settings.level,
            active_dir: active.settings.log_dir.display().to_string(),
        });
    }
    Ok(())
}

/// Returns `(level, log_dir)` of the active logger, if any.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE
        .get()
        .map(|active| (active.settings.level, active.settings.log_dir.clone()))
}

/// `debug` for debug builds, `info` for release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start(settings: &LogSettings) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&settings.log_dir).map_err(|err| {
        LoggingError::Backend(format!(
            "cannot create `{}`: {err}",
            settings.log_dir.display()
        ))
    })?;

    let handle = Logger::try_with_str(settings.level)
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(
            FileSpec::default()
                .directory(settings.log_dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    install_panic_hook();
    info!(
        "event=app_start module=app status=ok platform={} core_version={} level={} log_dir={}",
        std::env::consts::OS,
        boundtx_core::core_version(),
        settings.level,
        settings.log_dir.display()
    );

    Ok(ActiveLogger {
        settings: settings.clone(),
        _handle: handle,
    })
}

fn parse_level(level: &str) -> Result<&'static str, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(LoggingError::UnsupportedLevel(other.to_string())),
    }
}

fn parse_log_dir(log_dir: &str) -> Result<PathBuf, LoggingError> {
    let trimmed = log_dir.trim();
    let path = Path::new(trimmed);
    if trimmed.is_empty() || !path.is_absolute() {
        return Err(LoggingError::InvalidDirectory(trimmed.to_string()));
    }
    Ok(path.to_path_buf())
}

// Only called from `start`, which `OnceCell` runs at most once.
fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic_captured module=app status=error location={} payload={}",
            location,
            sanitize(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous(panic_info);
    }));
}

fn sanitize(value: &str, max_chars: usize) -> String {
    let flattened = value.replace(['\n', '\r'], " ");
    let mut capped: String = flattened.chars().take(max_chars).collect();
    if flattened.chars().count() > max_chars {
        capped.push_str("...");
    }
    capped
}

#[cfg(test)]
mod tests {
    use super::{init_logging, logging_status, parse_level, parse_log_dir, sanitize, LoggingError};

    #[test]
    fn parse_level_normalizes_case_and_aliases() {
        assert_eq!(parse_level(" INFO "), Ok("info"));
        assert_eq!(parse_level("warning"), Ok("warn"));
        assert!(matches!(
            parse_level("verbose"),
            Err(LoggingError::UnsupportedLevel(_))
        ));
    }

    #[test]
    fn parse_log_dir_rejects_relative_and_empty_paths() {
        assert!(matches!(
            parse_log_dir("logs/dev"),
            Err(LoggingError::InvalidDirectory(_))
        ));
        assert!(matches!(
            parse_log_dir("   "),
            Err(LoggingError::InvalidDirectory(_))
        ));
    }

    #[test]
    fn sanitize_flattens_and_caps() {
        let value = sanitize("line1\nline2\rline3", 8);
        assert!(!value.contains('\n'));
        assert!(!value.contains('\r'));
        assert!(value.ends_with("..."));
    }

    #[test]
    fn init_is_idempotent_and_rejects_reconfiguration() {
        let dir = tempfile::tempdir().expect("temp dir");
        let other = tempfile::tempdir().expect("temp dir");
        let dir_str = dir.path().to_str().expect("utf-8 path").to_string();
        let other_str = other.path().to_str().expect("utf-8 path").to_string();

        init_logging("info", &dir_str).expect("first init");
        init_logging("INFO", &dir_str).expect("same settings are idempotent");

        let level_err = init_logging("debug", &dir_str).expect_err("level change must fail");
        assert!(matches!(level_err, LoggingError::AlreadyInitialized { .. }));
        let dir_err = init_logging("info", &other_str).expect_err("dir change must fail");
        assert!(matches!(dir_err, LoggingError::AlreadyInitialized { .. }));

        let (level, active_dir) = logging_status().expect("logging should be active");
        assert_eq!(level, "info");
        assert_eq!(active_dir, dir.path());
    }
}
