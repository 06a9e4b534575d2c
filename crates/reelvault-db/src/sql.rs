//! Statement helpers: retrying execution, typed binds, pattern sanitizing.
//!
//! Every statement goes through rusqlite's per-connection prepared
//! statement cache. Transient backend errors (busy, locked, read-only,
//! I/O, out-of-memory, full) are retried up to [`MAX_RETRIES`] times
//! when no transaction is in progress, or when the failing statement is
//! the `COMMIT` itself; anything else propagates as a typed error.

use std::time::Duration;

use rusqlite::types::ToSqlOutput;
use rusqlite::{Connection, Params, Row, ToSql};

use reelvault_core::{DatabaseError, Error, Result};

use crate::pool::transaction_in_progress;

/// Application-level retries on top of the 500 ms busy timeout.
pub const MAX_RETRIES: u32 = 10;

const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Foreign-key bind wrapper: binds NULL when the id is zero.
#[derive(Debug, Clone, Copy)]
pub struct Fk(pub i64);

impl ToSql for Fk {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        if self.0 == 0 {
            Ok(ToSqlOutput::from(rusqlite::types::Null))
        } else {
            Ok(ToSqlOutput::from(self.0))
        }
    }
}

fn retryable(sql_text: &str, err: &DatabaseError, attempt: u32) -> bool {
    if !err.is_innocuous() || attempt + 1 >= MAX_RETRIES {
        return false;
    }
    let is_commit = sql_text.trim_start().get(..6).is_some_and(|p| p.eq_ignore_ascii_case("COMMIT"));
    !transaction_in_progress() || is_commit
}

fn run<T>(sql_text: &str, mut attempt_fn: impl FnMut() -> rusqlite::Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        match attempt_fn() {
            Ok(value) => return Ok(value),
            Err(e) => {
                let err = DatabaseError::from(e);
                if retryable(sql_text, &err, attempt) {
                    attempt += 1;
                    tracing::debug!("retrying statement ({attempt}/{MAX_RETRIES}): {err}");
                    std::thread::sleep(RETRY_DELAY);
                    continue;
                }
                return Err(Error::Database(err));
            }
        }
    }
}

/// Execute a statement, returning the number of affected rows.
pub fn execute<P: Params + Clone>(conn: &Connection, sql_text: &str, params: P) -> Result<usize> {
    run(sql_text, || {
        let mut stmt = conn.prepare_cached(sql_text)?;
        stmt.execute(params.clone())
    })
}

/// Execute an INSERT, returning the new rowid.
pub fn insert<P: Params + Clone>(conn: &Connection, sql_text: &str, params: P) -> Result<i64> {
    run(sql_text, || {
        let mut stmt = conn.prepare_cached(sql_text)?;
        stmt.insert(params.clone())
    })
}

/// Execute an INSERT that may hit a UNIQUE constraint the caller knows
/// is idempotent; `Ok(None)` on such a collision.
pub fn insert_or_ignore<P: Params + Clone>(
    conn: &Connection,
    sql_text: &str,
    params: P,
) -> Result<Option<i64>> {
    match insert(conn, sql_text, params) {
        Ok(id) => Ok(Some(id)),
        Err(Error::Database(e)) if e.is_unique_violation() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Fetch a single row, `Ok(None)` when the query matches nothing.
pub fn query_row_opt<T, P, F>(conn: &Connection, sql_text: &str, params: P, f: F) -> Result<Option<T>>
where
    P: Params + Clone,
    F: Fn(&Row<'_>) -> rusqlite::Result<T>,
{
    run(sql_text, || {
        let mut stmt = conn.prepare_cached(sql_text)?;
        match stmt.query_row(params.clone(), &f) {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    })
}

/// Fetch a single scalar value; the query must match a row.
pub fn query_value<T, P>(conn: &Connection, sql_text: &str, params: P) -> Result<T>
where
    T: rusqlite::types::FromSql,
    P: Params + Clone,
{
    run(sql_text, || {
        let mut stmt = conn.prepare_cached(sql_text)?;
        stmt.query_row(params.clone(), |row| row.get(0))
    })
}

/// Load every matching row through `f`.
pub fn load_all<T, P, F>(conn: &Connection, sql_text: &str, params: P, f: F) -> Result<Vec<T>>
where
    P: Params + Clone,
    F: Fn(&Row<'_>) -> rusqlite::Result<T>,
{
    run(sql_text, || {
        let mut stmt = conn.prepare_cached(sql_text)?;
        let rows = stmt.query_map(params.clone(), &f)?;
        rows.collect()
    })
}

/// Sanitize a user search pattern for an FTS MATCH query.
///
/// Doubles any quote, wraps the pattern in double quotes, and appends a
/// `*` after the closing quote so the last token matches by prefix.
/// Patterns shorter than three characters are rejected and yield `None`
/// (the query layer then returns nothing).
pub fn sanitize_pattern(pattern: &str) -> Option<String> {
    if pattern.chars().count() < 3 {
        return None;
    }
    let mut res = String::with_capacity(pattern.len() + 4);
    res.push('"');
    for c in pattern.chars() {
        if c == '"' || c == '\'' {
            res.push(c);
        }
        res.push(c);
    }
    res.push_str("\"*");
    Some(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT, fk INTEGER)")
            .unwrap();
        conn
    }

    #[test]
    fn insert_returns_rowid() {
        let c = conn();
        let id = insert(&c, "INSERT INTO t(v) VALUES(?1)", params!["a"]).unwrap();
        assert_eq!(id, 1);
        let id = insert(&c, "INSERT INTO t(v) VALUES(?1)", params!["b"]).unwrap();
        assert_eq!(id, 2);
    }

    #[test]
    fn fk_binds_null_on_zero() {
        let c = conn();
        insert(&c, "INSERT INTO t(v, fk) VALUES(?1, ?2)", params!["a", Fk(0)]).unwrap();
        insert(&c, "INSERT INTO t(v, fk) VALUES(?1, ?2)", params!["b", Fk(9)]).unwrap();
        let nulls: i64 =
            query_value(&c, "SELECT COUNT(*) FROM t WHERE fk IS NULL", []).unwrap();
        assert_eq!(nulls, 1);
        let nine: i64 = query_value(&c, "SELECT fk FROM t WHERE v = 'b'", []).unwrap();
        assert_eq!(nine, 9);
    }

    #[test]
    fn query_row_opt_none_on_no_rows() {
        let c = conn();
        let got: Option<String> =
            query_row_opt(&c, "SELECT v FROM t WHERE id = 99", [], |row| row.get(0)).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn insert_or_ignore_absorbs_unique() {
        let c = conn();
        c.execute_batch("CREATE UNIQUE INDEX t_v ON t(v)").unwrap();
        let first = insert_or_ignore(&c, "INSERT INTO t(v) VALUES('x')", []).unwrap();
        assert!(first.is_some());
        let second = insert_or_ignore(&c, "INSERT INTO t(v) VALUES('x')", []).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn sanitize_pattern_quotes_and_wildcards() {
        assert_eq!(sanitize_pattern("otters"), Some("\"otters\"*".into()));
        assert_eq!(sanitize_pattern("o\"tt"), Some("\"o\"\"tt\"*".into()));
        assert_eq!(sanitize_pattern("o'tt"), Some("\"o''tt\"*".into()));
        assert_eq!(sanitize_pattern("ab"), None);
        assert_eq!(sanitize_pattern(""), None);
    }

    #[test]
    fn load_all_collects() {
        let c = conn();
        for v in ["a", "b", "c"] {
            insert(&c, "INSERT INTO t(v) VALUES(?1)", params![v]).unwrap();
        }
        let all: Vec<String> =
            load_all(&c, "SELECT v FROM t ORDER BY id", [], |row| row.get(0)).unwrap();
        assert_eq!(all, vec!["a", "b", "c"]);
    }
}
