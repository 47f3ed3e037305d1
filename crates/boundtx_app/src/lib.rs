//! Demo application built on `boundtx_core`.
//!
//! User accounts with a password-change history, where a password change and
//! its history row are written in one unit of work.

pub mod dao;
pub mod db;
pub mod domain;
pub mod logging;
pub mod service;

pub use dao::user_dao::UserDao;
pub use dao::user_history_dao::{UserHistoryDao, UserHistoryRepository};
pub use db::{apply_migrations, latest_version, DbError, DbResult};
pub use domain::user::{User, UserHistory};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use service::user_service::{AppUserService, ServiceError, ServiceResult, UserService};

use boundtx_core::{SqlTemplate, TransactionManager, Transactional};

/// Builds the user service with every call wrapped in a unit of work.
pub fn transactional_user_service<H: UserHistoryRepository>(
    history: H,
) -> Transactional<AppUserService<H>> {
    Transactional::new(
        AppUserService::new(UserDao::new(SqlTemplate::new()), history),
        TransactionManager::new(),
    )
}
