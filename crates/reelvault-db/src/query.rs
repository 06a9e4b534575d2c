//! Lazy, countable, paginated result sets.
//!
//! A [`PagedQuery`] captures its SQL and parameters at construction and
//! rebinds them on every execution, so `count()` and several `items()`
//! pages can be served from the same handle. Two flavors exist: the
//! template-composed one derives its counting query from the listing
//! base, the explicit-counted one takes an independent counting request
//! for listings whose joins would make the derived count wrong or slow.

use rusqlite::{Row, ToSql};

use reelvault_core::Result;

use crate::pool::Database;
use crate::sql;

type Mapper<T> = Box<dyn Fn(&Row<'_>) -> rusqlite::Result<T> + Send + Sync>;
type BoxedParam = Box<dyn ToSql + Send + Sync>;

enum Shape {
    Template {
        fields: String,
        base: String,
        /// GROUP BY / ORDER BY tail; must not carry bind parameters.
        tail: String,
        primary_key: String,
        public_only: bool,
    },
    Explicit {
        count_sql: String,
        list_sql: String,
    },
    /// A query known to match nothing (e.g. a rejected search pattern).
    Empty,
}

pub struct PagedQuery<'db, T> {
    db: &'db Database,
    shape: Shape,
    params: Vec<BoxedParam>,
    mapper: Mapper<T>,
}

impl<'db, T> PagedQuery<'db, T> {
    /// Template-composed query: `SELECT <fields> FROM <base> <tail>`,
    /// counted as `SELECT COUNT(DISTINCT <primary_key>) FROM <base>`.
    pub fn new(
        db: &'db Database,
        fields: impl Into<String>,
        base: impl Into<String>,
        tail: impl Into<String>,
        primary_key: impl Into<String>,
        mapper: impl Fn(&Row<'_>) -> rusqlite::Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            db,
            shape: Shape::Template {
                fields: fields.into(),
                base: base.into(),
                tail: tail.into(),
                primary_key: primary_key.into(),
                public_only: false,
            },
            params: Vec::new(),
            mapper: Box::new(mapper),
        }
    }

    /// Explicit-counted query.
    pub fn with_count(
        db: &'db Database,
        count_sql: impl Into<String>,
        list_sql: impl Into<String>,
        mapper: impl Fn(&Row<'_>) -> rusqlite::Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            db,
            shape: Shape::Explicit {
                count_sql: count_sql.into(),
                list_sql: list_sql.into(),
            },
            params: Vec::new(),
            mapper: Box::new(mapper),
        }
    }

    /// A query that matches nothing.
    pub fn empty(db: &'db Database) -> Self {
        Self {
            db,
            shape: Shape::Empty,
            params: Vec::new(),
            mapper: Box::new(|_| {
                Err(rusqlite::Error::QueryReturnedNoRows)
            }),
        }
    }

    /// Append a bind parameter.
    pub fn param(mut self, p: impl ToSql + Send + Sync + 'static) -> Self {
        self.params.push(Box::new(p));
        self
    }

    /// Mark the query as restricted to the public surface: a TRUE column
    /// is appended so row constructors know to expose only public data.
    pub fn public_only(mut self) -> Self {
        if let Shape::Template { public_only, .. } = &mut self.shape {
            *public_only = true;
        }
        self
    }

    fn count_sql(&self) -> Option<String> {
        match &self.shape {
            Shape::Template {
                base, primary_key, ..
            } => Some(format!("SELECT COUNT(DISTINCT {primary_key}) FROM {base}")),
            Shape::Explicit { count_sql, .. } => Some(count_sql.clone()),
            Shape::Empty => None,
        }
    }

    fn list_sql(&self) -> Option<String> {
        match &self.shape {
            Shape::Template {
                fields,
                base,
                tail,
                public_only,
                ..
            } => {
                let fields = if *public_only {
                    format!("{fields}, TRUE")
                } else {
                    fields.clone()
                };
                Some(format!("SELECT {fields} FROM {base} {tail}"))
            }
            Shape::Explicit { list_sql, .. } => Some(list_sql.clone()),
            Shape::Empty => None,
        }
    }

    /// Total number of matching rows, ignoring pagination.
    pub fn count(&self) -> Result<i64> {
        let Some(count_sql) = self.count_sql() else {
            return Ok(0);
        };
        let ctx = self.db.read()?;
        let refs: Vec<&dyn ToSql> = self.params.iter().map(|p| p.as_ref() as &dyn ToSql).collect();
        sql::query_value(&ctx, &count_sql, refs.as_slice())
    }

    /// One page of results; `(0, 0)` returns everything.
    pub fn items(&self, limit: u32, offset: u32) -> Result<Vec<T>> {
        let Some(mut list_sql) = self.list_sql() else {
            return Ok(Vec::new());
        };
        let mut refs: Vec<&dyn ToSql> =
            self.params.iter().map(|p| p.as_ref() as &dyn ToSql).collect();
        let limit = i64::from(limit);
        let offset = i64::from(offset);
        if limit > 0 || offset > 0 {
            list_sql.push_str(" LIMIT ?");
            list_sql.push_str(&(refs.len() + 1).to_string());
            list_sql.push_str(" OFFSET ?");
            list_sql.push_str(&(refs.len() + 2).to_string());
            refs.push(&limit);
            refs.push(&offset);
            let ctx = self.db.read()?;
            return sql::load_all(&ctx, &list_sql, refs.as_slice(), &self.mapper);
        }
        let ctx = self.db.read()?;
        sql::load_all(&ctx, &list_sql, refs.as_slice(), &self.mapper)
    }

    /// Every matching row.
    pub fn all(&self) -> Result<Vec<T>> {
        self.items(0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Database;
    use rusqlite::params;

    fn db_with_rows() -> Database {
        let db = Database::open_in_memory().unwrap();
        {
            let ctx = db.write().unwrap();
            ctx.execute_batch("CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT)")
                .unwrap();
            for v in ["a", "b", "c", "d", "e"] {
                ctx.execute("INSERT INTO t(v) VALUES(?1)", params![v]).unwrap();
            }
        }
        db
    }

    #[test]
    fn template_count_and_pages() {
        let db = db_with_rows();
        let q = PagedQuery::new(&db, "v", "t", "ORDER BY id", "id", |row| {
            row.get::<_, String>(0)
        });
        assert_eq!(q.count().unwrap(), 5);
        assert_eq!(q.items(2, 0).unwrap(), vec!["a", "b"]);
        assert_eq!(q.items(2, 2).unwrap(), vec!["c", "d"]);
        assert_eq!(q.items(2, 4).unwrap(), vec!["e"]);
        assert_eq!(q.all().unwrap().len(), 5);
    }

    #[test]
    fn params_rebound_on_each_execution() {
        let db = db_with_rows();
        let q = PagedQuery::new(&db, "v", "t WHERE v > ?1", "ORDER BY id", "id", |row| {
            row.get::<_, String>(0)
        })
        .param("c");
        assert_eq!(q.count().unwrap(), 2);
        assert_eq!(q.all().unwrap(), vec!["d", "e"]);
        // Same handle again: parameters are still bound.
        assert_eq!(q.count().unwrap(), 2);
    }

    #[test]
    fn explicit_count_flavor() {
        let db = db_with_rows();
        let q = PagedQuery::with_count(
            &db,
            "SELECT COUNT(*) FROM t WHERE id <= 3",
            "SELECT v FROM t WHERE id <= 3 ORDER BY id DESC",
            |row| row.get::<_, String>(0),
        );
        assert_eq!(q.count().unwrap(), 3);
        assert_eq!(q.all().unwrap(), vec!["c", "b", "a"]);
    }

    #[test]
    fn empty_query() {
        let db = db_with_rows();
        let q: PagedQuery<'_, String> = PagedQuery::empty(&db);
        assert_eq!(q.count().unwrap(), 0);
        assert!(q.all().unwrap().is_empty());
    }

    #[test]
    fn public_only_appends_marker_column() {
        let db = db_with_rows();
        let q = PagedQuery::new(&db, "v", "t", "ORDER BY id", "id", |row| {
            let v: String = row.get(0)?;
            let public: bool = row.get(1)?;
            Ok((v, public))
        })
        .public_only();
        let rows = q.items(1, 0).unwrap();
        assert_eq!(rows[0], ("a".to_string(), true));
    }
}
