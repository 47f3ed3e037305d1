//! `user_history` table access.

use crate::domain::user::UserHistory;
use boundtx_core::{params, DataAccessResult, ExecutionContext, SqlTemplate};
use rusqlite::Row;

/// Sink for user change snapshots.
///
/// A trait so services can be exercised against failing or recording
/// implementations.
pub trait UserHistoryRepository {
    fn log(&self, ctx: &ExecutionContext, history: &UserHistory) -> DataAccessResult<i64>;
}

/// SQLite-backed history log.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserHistoryDao {
    template: SqlTemplate,
}

impl UserHistoryDao {
    pub fn new(template: SqlTemplate) -> Self {
        Self { template }
    }

    /// Lists snapshots of one user, oldest first.
    pub fn find_by_user_id(
        &self,
        ctx: &ExecutionContext,
        user_id: i64,
    ) -> DataAccessResult<Vec<UserHistory>> {
        self.template.fetch_many(
            ctx,
            "SELECT id, user_id, account, password, email, created_at, created_by
             FROM user_history
             WHERE user_id = ?
             ORDER BY id",
            map_history,
            params![user_id],
        )
    }
}

impl UserHistoryRepository for UserHistoryDao {
    fn log(&self, ctx: &ExecutionContext, history: &UserHistory) -> DataAccessResult<i64> {
        self.template.insert(
            ctx,
            "INSERT INTO user_history (user_id, account, password, email, created_at, created_by)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                history.user_id,
                history.account,
                history.password,
                history.email,
                history.created_at,
                history.created_by,
            ],
        )
    }
}

fn map_history(row: &Row<'_>) -> rusqlite::Result<UserHistory> {
    Ok(UserHistory {
        id: Some(row.get("id")?),
        user_id: row.get("user_id")?,
        account: row.get("account")?,
        password: row.get("password")?,
        email: row.get("email")?,
        created_at: row.get("created_at")?,
        created_by: row.get("created_by")?,
    })
}
