mod support;

use boundtx_app::{User, UserDao, UserHistory, UserHistoryDao, UserHistoryRepository};
use boundtx_core::{DataAccessError, SqlTemplate};
use support::migrated_db;

fn dao() -> UserDao {
    UserDao::new(SqlTemplate::new())
}

#[test]
fn insert_then_find_by_account() {
    let db = migrated_db();
    let dao = dao();
    let id = dao
        .insert(&db.ctx, &User::new("gugu", "password", "hkkang@woowahan.com"))
        .unwrap();

    let user = dao.find_by_account(&db.ctx, "gugu").unwrap().unwrap();
    assert_eq!(user.id, Some(id));
    assert_eq!(user.account, "gugu");
    assert_eq!(user.password, "password");
    assert_eq!(db.source.open_connections(), 0);
}

#[test]
fn update_then_find_by_id_returns_new_password() {
    let db = migrated_db();
    let dao = dao();
    let id = dao
        .insert(&db.ctx, &User::new("gugu", "password", "hkkang@woowahan.com"))
        .unwrap();

    let mut user = dao.find_by_id(&db.ctx, id).unwrap().unwrap();
    user.change_password("password99");
    assert_eq!(dao.update(&db.ctx, &user).unwrap(), 1);

    let actual = dao.find_by_id(&db.ctx, id).unwrap().unwrap();
    assert_eq!(actual.password, "password99");
}

#[test]
fn update_of_unknown_user_changes_nothing() {
    let db = migrated_db();
    let ghost = User::new("ghost", "pw", "ghost@example.com").with_id(404);
    assert_eq!(dao().update(&db.ctx, &ghost).unwrap(), 0);
}

#[test]
fn find_all_lists_users_in_insert_order() {
    let db = migrated_db();
    let dao = dao();
    for account in ["gugu", "insert-gugu"] {
        dao.insert(&db.ctx, &User::new(account, "password", "hkkang@woowahan.com"))
            .unwrap();
    }

    let users = dao.find_all(&db.ctx).unwrap();
    let accounts: Vec<_> = users.iter().map(|user| user.account.as_str()).collect();
    assert_eq!(accounts, vec!["gugu", "insert-gugu"]);
}

#[test]
fn duplicate_account_is_a_constraint_violation() {
    let db = migrated_db();
    let dao = dao();
    dao.insert(&db.ctx, &User::new("gugu", "a", "a@example.com"))
        .unwrap();

    let err = dao
        .insert(&db.ctx, &User::new("gugu", "b", "b@example.com"))
        .unwrap_err();
    assert!(err.is_constraint_violation());
}

#[test]
fn history_log_round_trips_snapshot() {
    let db = migrated_db();
    let user_id = dao()
        .insert(&db.ctx, &User::new("gugu", "password", "hkkang@woowahan.com"))
        .unwrap();
    let history_dao = UserHistoryDao::new(SqlTemplate::new());
    let user = User::new("gugu", "password", "hkkang@woowahan.com").with_id(user_id);
    let snapshot = UserHistory::snapshot(&user, "gugu").unwrap();

    history_dao.log(&db.ctx, &snapshot).unwrap();

    let logged = history_dao.find_by_user_id(&db.ctx, user_id).unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].created_by, "gugu");
    assert_eq!(logged[0].created_at, snapshot.created_at);
}

#[test]
fn history_for_missing_user_violates_foreign_key() {
    let db = migrated_db();
    let user = User::new("nobody", "pw", "nobody@example.com").with_id(999);
    let snapshot = UserHistory::snapshot(&user, "admin").unwrap();

    let err = UserHistoryDao::new(SqlTemplate::new())
        .log(&db.ctx, &snapshot)
        .unwrap_err();
    assert!(matches!(err, DataAccessError::QueryFailure { .. }));
    assert!(err.is_constraint_violation());
}
