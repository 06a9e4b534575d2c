//! Genres, counted per track and garbage-collected when empty.

use rusqlite::{params, Connection, Row};

use reelvault_core::{Error, QueryParameters, Result, SortingCriteria};

use crate::pool::Database;
use crate::query::PagedQuery;
use crate::sql;

#[derive(Debug, Clone)]
pub struct Genre {
    pub id: i64,
    pub name: String,
    pub nb_tracks: i64,
    pub nb_present_tracks: i64,
}

const COLS: &str = "id, name, nb_tracks, nb_present_tracks";

impl Genre {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            nb_tracks: row.get(2)?,
            nb_present_tracks: row.get(3)?,
        })
    }
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

pub fn schema(_version: u32) -> String {
    "CREATE TABLE genre(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        name TEXT UNIQUE COLLATE NOCASE,\
        nb_tracks INTEGER NOT NULL DEFAULT 0,\
        nb_present_tracks INTEGER NOT NULL DEFAULT 0)"
        .to_owned()
}

pub fn fts_schema(_version: u32) -> String {
    "CREATE VIRTUAL TABLE genre_fts USING fts5(name)".to_owned()
}

pub fn triggers(version: u32) -> Vec<(&'static str, String)> {
    let mut triggers = vec![
        (
            "genre_fts_insert",
            "CREATE TRIGGER genre_fts_insert AFTER INSERT ON genre \
             BEGIN \
                 INSERT INTO genre_fts(rowid, name) VALUES(new.id, new.name);\
             END"
                .to_owned(),
        ),
        (
            "genre_fts_delete",
            "CREATE TRIGGER genre_fts_delete AFTER DELETE ON genre \
             BEGIN \
                 DELETE FROM genre_fts WHERE rowid = old.id;\
             END"
                .to_owned(),
        ),
        (
            "genre_delete_empty",
            "CREATE TRIGGER genre_delete_empty AFTER UPDATE ON genre \
             WHEN old.nb_tracks > 0 AND new.nb_tracks = 0 \
             BEGIN \
                 DELETE FROM genre WHERE id = new.id;\
             END"
                .to_owned(),
        ),
    ];
    if version >= 3 {
        triggers.push((
            "genre_update_on_media_change",
            "CREATE TRIGGER genre_update_on_media_change AFTER UPDATE ON media \
             WHEN IFNULL(old.genre_id, 0) != IFNULL(new.genre_id, 0) \
                  OR old.is_present != new.is_present \
             BEGIN \
                 UPDATE genre SET \
                     nb_tracks = nb_tracks - 1,\
                     nb_present_tracks = nb_present_tracks - (old.is_present != 0) \
                 WHERE IFNULL(old.genre_id, 0) != IFNULL(new.genre_id, 0) \
                       AND id = old.genre_id;\
                 UPDATE genre SET \
                     nb_tracks = nb_tracks + 1,\
                     nb_present_tracks = nb_present_tracks + (new.is_present != 0) \
                 WHERE IFNULL(old.genre_id, 0) != IFNULL(new.genre_id, 0) \
                       AND id = new.genre_id;\
                 UPDATE genre SET \
                     nb_present_tracks = nb_present_tracks + \
                         (CASE WHEN new.is_present != 0 THEN 1 ELSE -1 END) \
                 WHERE IFNULL(old.genre_id, 0) = IFNULL(new.genre_id, 0) \
                       AND old.is_present != new.is_present AND id = new.genre_id;\
             END"
                .to_owned(),
        ));
        triggers.push((
            "genre_update_on_media_delete",
            "CREATE TRIGGER genre_update_on_media_delete AFTER DELETE ON media \
             WHEN old.genre_id IS NOT NULL \
             BEGIN \
                 UPDATE genre SET \
                     nb_tracks = nb_tracks - 1,\
                     nb_present_tracks = nb_present_tracks - (old.is_present != 0) \
                 WHERE id = old.genre_id;\
             END"
                .to_owned(),
        ));
    } else {
        triggers.push((
            "genre_update_on_track_insert",
            "CREATE TRIGGER genre_update_on_track_insert AFTER INSERT ON album_track \
             WHEN new.genre_id IS NOT NULL \
             BEGIN \
                 UPDATE genre SET \
                     nb_tracks = nb_tracks + 1,\
                     nb_present_tracks = nb_present_tracks + 1 \
                 WHERE id = new.genre_id;\
             END"
                .to_owned(),
        ));
        triggers.push((
            "genre_update_on_track_delete",
            "CREATE TRIGGER genre_update_on_track_delete AFTER DELETE ON album_track \
             WHEN old.genre_id IS NOT NULL \
             BEGIN \
                 UPDATE genre SET \
                     nb_tracks = nb_tracks - 1,\
                     nb_present_tracks = nb_present_tracks - 1 \
                 WHERE id = old.genre_id;\
             END"
                .to_owned(),
        ));
    }
    triggers
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    Vec::new()
}

// ---------------------------------------------------------------------------
// operations
// ---------------------------------------------------------------------------

pub fn create(conn: &Connection, name: &str) -> Result<Genre> {
    let id = sql::insert(conn, "INSERT INTO genre(name) VALUES(?1)", params![name])?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("genre", id))
}

/// Fetch by case-insensitive name, creating the genre on first use.
pub fn fetch_or_create(conn: &Connection, name: &str) -> Result<Genre> {
    if let Some(existing) = fetch_by_name(conn, name)? {
        return Ok(existing);
    }
    create(conn, name)
}

pub fn fetch(conn: &Connection, id: i64) -> Result<Option<Genre>> {
    let q = format!("SELECT {COLS} FROM genre WHERE id = ?1");
    sql::query_row_opt(conn, &q, params![id], Genre::from_row)
}

pub fn fetch_by_name(conn: &Connection, name: &str) -> Result<Option<Genre>> {
    let q = format!("SELECT {COLS} FROM genre WHERE name = ?1");
    sql::query_row_opt(conn, &q, params![name], Genre::from_row)
}

/// Manual counter adjustment for callers that bypass the media
/// triggers; the delete-empty trigger still reacts to a zero crossing.
pub fn update_nb_tracks(conn: &Connection, id: i64, delta: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE genre SET nb_tracks = nb_tracks + ?2,
                nb_present_tracks = nb_present_tracks + ?2
         WHERE id = ?1",
        params![id, delta],
    )?;
    Ok(n > 0)
}

// ---------------------------------------------------------------------------
// queries
// ---------------------------------------------------------------------------

fn order_by(params: &QueryParameters) -> String {
    let (column, swap) = match params.sort {
        SortingCriteria::Default | SortingCriteria::Alpha => ("name", false),
        SortingCriteria::NbMedia => ("nb_tracks", true),
        other => {
            tracing::warn!("unsupported sort criterion {other:?} for genres, using name");
            ("name", false)
        }
    };
    let desc = params.desc ^ swap;
    format!("ORDER BY {column}{}", if desc { " DESC" } else { "" })
}

pub fn list_all<'db>(db: &'db Database, params: &QueryParameters) -> PagedQuery<'db, Genre> {
    PagedQuery::new(db, COLS, "genre", order_by(params), "id", Genre::from_row)
}

pub fn search<'db>(
    db: &'db Database,
    pattern: &str,
    params: &QueryParameters,
) -> PagedQuery<'db, Genre> {
    let Some(pattern) = sql::sanitize_pattern(pattern) else {
        return PagedQuery::empty(db);
    };
    let base = "genre WHERE id IN (SELECT rowid FROM genre_fts WHERE genre_fts MATCH ?1)";
    PagedQuery::new(db, COLS, base, order_by(params), "id", Genre::from_row).param(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn name_is_unique_case_insensitive() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        let g = fetch_or_create(&ctx, "Jazz").unwrap();
        let again = fetch_or_create(&ctx, "JAZZ").unwrap();
        assert_eq!(g.id, again.id);
        assert!(create(&ctx, "jazz").is_err());
    }

    #[test]
    fn delete_empty_reacts_to_manual_counters() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        let g = create(&ctx, "Ambient").unwrap();
        assert!(update_nb_tracks(&ctx, g.id, 2).unwrap());
        assert_eq!(fetch(&ctx, g.id).unwrap().unwrap().nb_tracks, 2);

        assert!(update_nb_tracks(&ctx, g.id, -2).unwrap());
        assert!(fetch(&ctx, g.id).unwrap().is_none());
    }

    #[test]
    fn fts_mirror_follows_rows() {
        let db = testing::db();
        {
            let ctx = db.write().unwrap();
            create(&ctx, "Electronic").unwrap();
        }
        assert_eq!(
            search(&db, "elec", &QueryParameters::default()).count().unwrap(),
            1
        );
        {
            let ctx = db.write().unwrap();
            let g = fetch_by_name(&ctx, "Electronic").unwrap().unwrap();
            sql::execute(&ctx, "DELETE FROM genre WHERE id = ?1", params![g.id]).unwrap();
        }
        assert_eq!(
            search(&db, "elec", &QueryParameters::default()).count().unwrap(),
            0
        );
    }
}
