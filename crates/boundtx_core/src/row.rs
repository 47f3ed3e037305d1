//! Row mapper helpers.
//!
//! A row mapper is any `Fn(&Row<'_>) -> rusqlite::Result<T>`. It is called once
//! per fetched row, in result order, and cannot keep the row past the call.

use rusqlite::types::FromSql;
use rusqlite::Row;

/// Maps a row to the value of one column, by zero-based index.
pub fn column<T: FromSql>(index: usize) -> impl Fn(&Row<'_>) -> rusqlite::Result<T> {
    move |row| row.get(index)
}

/// Maps a row to the value of one column, by name.
pub fn named_column<T: FromSql>(name: &'static str) -> impl Fn(&Row<'_>) -> rusqlite::Result<T> {
    move |row| row.get(name)
}
