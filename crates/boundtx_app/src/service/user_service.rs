//! User account use-cases.
//!
//! # Responsibility
//! - Orchestrate user and history DAOs for account changes.
//!
//! # Invariants
//! - `AppUserService` knows nothing about transactions; wrap it in
//!   `Transactional` to make `change_password` atomic across both tables.
//! - Every password change leaves exactly one history snapshot when committed.

use crate::dao::user_dao::UserDao;
use crate::dao::user_history_dao::UserHistoryRepository;
use crate::domain::user::{User, UserHistory};
use boundtx_core::{DataAccessError, ExecutionContext, Transactional};
use log::info;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("user not found: {0}")]
    UserNotFound(i64),

    #[error(transparent)]
    DataAccess(#[from] DataAccessError),
}

/// Capability set exposed to callers; implemented by the plain service and by
/// its transactional decorator.
pub trait UserService {
    fn find_by_id(&self, ctx: &ExecutionContext, id: i64) -> ServiceResult<User>;
    fn insert(&self, ctx: &ExecutionContext, user: &User) -> ServiceResult<i64>;
    fn change_password(
        &self,
        ctx: &ExecutionContext,
        id: i64,
        new_password: &str,
        created_by: &str,
    ) -> ServiceResult<()>;
}

/// Plain user service.
#[derive(Debug, Clone)]
pub struct AppUserService<H> {
    user_dao: UserDao,
    history: H,
}

impl<H: UserHistoryRepository> AppUserService<H> {
    pub fn new(user_dao: UserDao, history: H) -> Self {
        Self { user_dao, history }
    }
}

impl<H: UserHistoryRepository> UserService for AppUserService<H> {
    fn find_by_id(&self, ctx: &ExecutionContext, id: i64) -> ServiceResult<User> {
        self.user_dao
            .find_by_id(ctx, id)?
            .ok_or(ServiceError::UserNotFound(id))
    }

    fn insert(&self, ctx: &ExecutionContext, user: &User) -> ServiceResult<i64> {
        Ok(self.user_dao.insert(ctx, user)?)
    }

    fn change_password(
        &self,
        ctx: &ExecutionContext,
        id: i64,
        new_password: &str,
        created_by: &str,
    ) -> ServiceResult<()> {
        let mut user = self.find_by_id(ctx, id)?;
        user.change_password(new_password);
        if self.user_dao.update(ctx, &user)? == 0 {
            return Err(ServiceError::UserNotFound(id));
        }

        let history =
            UserHistory::snapshot(&user, created_by).ok_or(ServiceError::UserNotFound(id))?;
        self.history.log(ctx, &history)?;

        info!(
            "event=password_change module=service status=ok ctx={} user_id={}",
            ctx.id(),
            id
        );
        Ok(())
    }
}

impl<S: UserService> UserService for Transactional<S> {
    fn find_by_id(&self, ctx: &ExecutionContext, id: i64) -> ServiceResult<User> {
        self.invoke(ctx, |service, ctx| service.find_by_id(ctx, id))
    }

    fn insert(&self, ctx: &ExecutionContext, user: &User) -> ServiceResult<i64> {
        self.invoke(ctx, |service, ctx| service.insert(ctx, user))
    }

    fn change_password(
        &self,
        ctx: &ExecutionContext,
        id: i64,
        new_password: &str,
        created_by: &str,
    ) -> ServiceResult<()> {
        self.invoke(ctx, |service, ctx| {
            service.change_password(ctx, id, new_password, created_by)
        })
    }
}
