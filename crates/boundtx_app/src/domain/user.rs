//! User account and password-change audit records.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// User account. `id` is `None` until the row is inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<i64>,
    pub account: String,
    pub password: String,
    pub email: String,
}

impl User {
    pub fn new(
        account: impl Into<String>,
        password: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            account: account.into(),
            password: password.into(),
            email: email.into(),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn change_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
    }
}

/// Snapshot of a user taken when it was changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserHistory {
    pub id: Option<i64>,
    pub user_id: i64,
    pub account: String,
    pub password: String,
    pub email: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    pub created_by: String,
}

impl UserHistory {
    /// Captures `user` as changed by `created_by`, stamped with the current time.
    ///
    /// Returns `None` for a user that was never persisted.
    pub fn snapshot(user: &User, created_by: impl Into<String>) -> Option<Self> {
        Some(Self {
            id: None,
            user_id: user.id?,
            account: user.account.clone(),
            password: user.password.clone(),
            email: user.email.clone(),
            created_at: now_epoch_ms(),
            created_by: created_by.into(),
        })
    }
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}
