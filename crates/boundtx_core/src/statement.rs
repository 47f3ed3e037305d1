//! Statement spec: SQL text plus ordered arguments, bound by parameter index.
//!
//! # Invariants
//! - A validated spec has exactly as many arguments as SQL parameters,
//!   checked without touching any connection.
//! - Arguments bind 1-indexed, in slice order.

use crate::error::{DataAccessError, DataAccessResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Statement, ToSql};
use std::collections::HashSet;
use std::fmt::{Debug, Formatter};

/// Highest parameter index SQLite accepts (`SQLITE_MAX_VARIABLE_NUMBER`).
pub const MAX_PARAMETER_INDEX: usize = 32_766;

// Literals, quoted identifiers and comments are matched first so that any
// placeholder inside them is skipped; only the last two alternatives capture.
static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)'(?:[^']|'')*'|"(?:[^"]|"")*"|`[^`]*`|\[[^\]]*\]|--[^\n]*|/\*.*?\*/|\?(\d*)|([:@$][A-Za-z_][A-Za-z0-9_]*)"#,
    )
    .expect("valid placeholder regex")
});

/// Counts parameters the way SQLite numbers them.
///
/// A bare `?` takes the index after the largest one seen so far and `?NNN`
/// sets it explicitly. A named parameter (`:name`, `@name`, `$name`) takes the
/// next index on its first occurrence and reuses it afterwards. The count is
/// the largest index.
///
/// An index above `MAX_PARAMETER_INDEX` makes the count `usize::MAX`, which no
/// argument slice can match.
pub fn count_placeholders(sql: &str) -> usize {
    let mut largest = 0usize;
    let mut names = HashSet::new();
    for caps in PLACEHOLDER_RE.captures_iter(sql) {
        if let Some(digits) = caps.get(1) {
            largest = if digits.as_str().is_empty() {
                largest + 1
            } else {
                match digits.as_str().parse::<usize>() {
                    Ok(index) => largest.max(index),
                    Err(_) => return usize::MAX,
                }
            };
        } else if let Some(name) = caps.get(2) {
            if names.insert(name.as_str()) {
                largest += 1;
            }
        }
        if largest > MAX_PARAMETER_INDEX {
            return usize::MAX;
        }
    }
    largest
}

/// Immutable (sql, args) pair handed to the query executor.
#[derive(Clone, Copy)]
pub struct StatementSpec<'a> {
    sql: &'a str,
    args: &'a [&'a dyn ToSql],
}

impl<'a> StatementSpec<'a> {
    /// Builds a spec, failing with `ArgumentCountMismatch` when the counts differ.
    pub fn new(sql: &'a str, args: &'a [&'a dyn ToSql]) -> DataAccessResult<Self> {
        let expected = count_placeholders(sql);
        if expected != args.len() {
            return Err(DataAccessError::ArgumentCountMismatch {
                expected,
                actual: args.len(),
            });
        }
        Ok(Self { sql, args })
    }

    /// Builds a spec without the text-level check. The prepared statement's own
    /// parameter count is still enforced at bind time.
    pub fn unchecked(sql: &'a str, args: &'a [&'a dyn ToSql]) -> Self {
        Self { sql, args }
    }

    pub fn sql(&self) -> &'a str {
        self.sql
    }

    pub fn args(&self) -> &'a [&'a dyn ToSql] {
        self.args
    }

    pub(crate) fn bind(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<()> {
        let expected = stmt.parameter_count();
        if expected != self.args.len() {
            return Err(rusqlite::Error::InvalidParameterCount(
                self.args.len(),
                expected,
            ));
        }
        for (index, arg) in self.args.iter().enumerate() {
            stmt.raw_bind_parameter(index + 1, *arg)?;
        }
        Ok(())
    }
}

impl Debug for StatementSpec<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementSpec")
            .field("sql", &self.sql)
            .field("args", &self.args.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{count_placeholders, StatementSpec, MAX_PARAMETER_INDEX};
    use crate::error::DataAccessError;
    use rusqlite::params;

    #[test]
    fn counts_bare_placeholders() {
        assert_eq!(count_placeholders("SELECT 1"), 0);
        assert_eq!(
            count_placeholders("INSERT INTO users (account, password, email) VALUES (?, ?, ?)"),
            3
        );
    }

    #[test]
    fn ignores_placeholders_in_literals_identifiers_and_comments() {
        let sql = "SELECT '?', \"a?b\", [c?] -- why?\n FROM t /* ? ? */ WHERE x = ? AND y = 'it''s ?'";
        assert_eq!(count_placeholders(sql), 1);
    }

    #[test]
    fn numbered_placeholders_use_largest_index() {
        assert_eq!(count_placeholders("SELECT ?1, ?2, ?1"), 2);
        assert_eq!(count_placeholders("SELECT ?3"), 3);
        assert_eq!(count_placeholders("SELECT ?2, ?"), 3);
    }

    #[test]
    fn named_parameters_count_once_per_name() {
        assert_eq!(count_placeholders("INSERT INTO t VALUES (:label)"), 1);
        assert_eq!(count_placeholders("SELECT :a, @b, $c, :a"), 3);
        assert_eq!(count_placeholders("SELECT ?, :name, ?"), 3);
        assert_eq!(count_placeholders("SELECT ':not_a_param', x FROM t"), 0);
    }

    #[test]
    fn out_of_range_index_never_matches_an_argument_slice() {
        assert_eq!(count_placeholders("SELECT ?18446744073709551615, ?"), usize::MAX);
        assert_eq!(count_placeholders("SELECT ?99999999999999999999999"), usize::MAX);
        assert_eq!(count_placeholders("SELECT ?32767"), usize::MAX);
        assert_eq!(
            count_placeholders("SELECT ?32766"),
            MAX_PARAMETER_INDEX
        );

        let err = StatementSpec::new("SELECT ?18446744073709551615, ?", params![1, 2])
            .expect_err("unbindable index must be rejected");
        assert!(matches!(
            err,
            DataAccessError::ArgumentCountMismatch {
                expected: usize::MAX,
                actual: 2
            }
        ));
    }

    #[test]
    fn new_accepts_named_parameters() {
        let args = params!["x"];
        let spec = StatementSpec::new("INSERT INTO t (label) VALUES (:label)", args)
            .expect("one named parameter, one argument");
        assert_eq!(spec.args().len(), 1);
    }

    #[test]
    fn new_rejects_missing_arguments() {
        let err = StatementSpec::new("INSERT INTO t VALUES (?, ?, ?)", params!["a", "b"])
            .expect_err("two args for three placeholders must fail");
        assert!(matches!(
            err,
            DataAccessError::ArgumentCountMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn new_accepts_matching_arguments() {
        let args = params![1, 2];
        let spec = StatementSpec::new("SELECT ? + ?", args).expect("counts match");
        assert_eq!(spec.args().len(), 2);
        assert_eq!(format!("{spec:?}"), r#"StatementSpec { sql: "SELECT ? + ?", args: 2 }"#);
    }
}
