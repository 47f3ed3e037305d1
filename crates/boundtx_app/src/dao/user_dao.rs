//! `users` table access.

use crate::domain::user::User;
use boundtx_core::{params, DataAccessResult, ExecutionContext, SqlTemplate};
use rusqlite::Row;

const USER_SELECT_SQL: &str = "SELECT id, account, password, email FROM users";

/// DAO for user accounts.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserDao {
    template: SqlTemplate,
}

impl UserDao {
    pub fn new(template: SqlTemplate) -> Self {
        Self { template }
    }

    /// Inserts `user` and returns its generated id.
    pub fn insert(&self, ctx: &ExecutionContext, user: &User) -> DataAccessResult<i64> {
        self.template.insert(
            ctx,
            "INSERT INTO users (account, password, email) VALUES (?, ?, ?)",
            params![user.account, user.password, user.email],
        )
    }

    /// Rewrites every column of the row identified by `user.id`.
    ///
    /// Returns the number of updated rows: 0 when no such user exists.
    pub fn update(&self, ctx: &ExecutionContext, user: &User) -> DataAccessResult<usize> {
        self.template.execute(
            ctx,
            "UPDATE users SET account = ?, password = ?, email = ? WHERE id = ?",
            params![user.account, user.password, user.email, user.id],
        )
    }

    pub fn find_all(&self, ctx: &ExecutionContext) -> DataAccessResult<Vec<User>> {
        self.template.fetch_many(
            ctx,
            &format!("{USER_SELECT_SQL} ORDER BY id"),
            map_user,
            &[],
        )
    }

    pub fn find_by_id(&self, ctx: &ExecutionContext, id: i64) -> DataAccessResult<Option<User>> {
        self.template.fetch_one(
            ctx,
            &format!("{USER_SELECT_SQL} WHERE id = ?"),
            map_user,
            params![id],
        )
    }

    pub fn find_by_account(
        &self,
        ctx: &ExecutionContext,
        account: &str,
    ) -> DataAccessResult<Option<User>> {
        self.template.fetch_one(
            ctx,
            &format!("{USER_SELECT_SQL} WHERE account = ?"),
            map_user,
            params![account],
        )
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: Some(row.get("id")?),
        account: row.get("account")?,
        password: row.get("password")?,
        email: row.get("email")?,
    })
}
