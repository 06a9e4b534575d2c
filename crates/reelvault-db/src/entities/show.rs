//! Shows and their episodes.

use rusqlite::{params, Connection, Row};

use reelvault_core::{Error, MediaSubtype, QueryParameters, Result, SortingCriteria};

use crate::pool::Database;
use crate::query::PagedQuery;
use crate::sql;

#[derive(Debug, Clone)]
pub struct Show {
    pub id: i64,
    pub title: Option<String>,
    pub release_date: Option<i64>,
    pub short_summary: Option<String>,
    pub artwork_mrl: Option<String>,
    pub tvdb_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ShowEpisode {
    pub id: i64,
    pub media_id: i64,
    pub episode_number: i64,
    pub season_number: i64,
    pub episode_title: Option<String>,
    pub episode_summary: Option<String>,
    pub tvdb_id: Option<String>,
    pub show_id: i64,
}

const COLS: &str = "id, title, release_date, short_summary, artwork_mrl, tvdb_id";
const EPISODE_COLS: &str = "id, media_id, episode_number, season_number, episode_title, \
    episode_summary, tvdb_id, show_id";

impl Show {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            release_date: row.get(2)?,
            short_summary: row.get(3)?,
            artwork_mrl: row.get(4)?,
            tvdb_id: row.get(5)?,
        })
    }
}

impl ShowEpisode {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            media_id: row.get(1)?,
            episode_number: row.get(2)?,
            season_number: row.get(3)?,
            episode_title: row.get(4)?,
            episode_summary: row.get(5)?,
            tvdb_id: row.get(6)?,
            show_id: row.get(7)?,
        })
    }
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

pub fn schema(_version: u32) -> String {
    "CREATE TABLE show(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        title TEXT COLLATE NOCASE,\
        release_date INTEGER,\
        short_summary TEXT,\
        artwork_mrl TEXT,\
        tvdb_id TEXT)"
        .to_owned()
}

pub fn episode_schema(_version: u32) -> String {
    "CREATE TABLE show_episode(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        media_id INTEGER NOT NULL REFERENCES media(id) ON DELETE CASCADE,\
        episode_number INTEGER NOT NULL,\
        season_number INTEGER NOT NULL,\
        episode_title TEXT,\
        episode_summary TEXT,\
        tvdb_id TEXT,\
        show_id INTEGER NOT NULL REFERENCES show(id) ON DELETE CASCADE)"
        .to_owned()
}

pub fn fts_schema(_version: u32) -> String {
    "CREATE VIRTUAL TABLE show_fts USING fts5(title)".to_owned()
}

pub fn triggers(_version: u32) -> Vec<(&'static str, String)> {
    vec![
        (
            "show_fts_insert",
            "CREATE TRIGGER show_fts_insert AFTER INSERT ON show \
             WHEN new.title IS NOT NULL \
             BEGIN \
                 INSERT INTO show_fts(rowid, title) VALUES(new.id, new.title);\
             END"
                .to_owned(),
        ),
        (
            "show_fts_delete",
            "CREATE TRIGGER show_fts_delete AFTER DELETE ON show \
             BEGIN \
                 DELETE FROM show_fts WHERE rowid = old.id;\
             END"
                .to_owned(),
        ),
        (
            "show_fts_update",
            "CREATE TRIGGER show_fts_update AFTER UPDATE OF title ON show \
             BEGIN \
                 UPDATE show_fts SET title = new.title WHERE rowid = new.id;\
             END"
                .to_owned(),
        ),
    ]
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    vec![(
        "show_episode_media_idx",
        "CREATE INDEX show_episode_media_idx ON show_episode(media_id)".to_owned(),
    )]
}

// ---------------------------------------------------------------------------
// operations
// ---------------------------------------------------------------------------

pub fn create(conn: &Connection, title: &str) -> Result<Show> {
    let id = sql::insert(conn, "INSERT INTO show(title) VALUES(?1)", params![title])?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("show", id))
}

pub fn fetch(conn: &Connection, id: i64) -> Result<Option<Show>> {
    let q = format!("SELECT {COLS} FROM show WHERE id = ?1");
    sql::query_row_opt(conn, &q, params![id], Show::from_row)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let n = sql::execute(conn, "DELETE FROM show WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

pub fn set_release_date(conn: &Connection, id: i64, date: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE show SET release_date = ?2 WHERE id = ?1",
        params![id, date],
    )?;
    Ok(n > 0)
}

pub fn set_short_summary(conn: &Connection, id: i64, summary: &str) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE show SET short_summary = ?2 WHERE id = ?1",
        params![id, summary],
    )?;
    Ok(n > 0)
}

pub fn set_tvdb_id(conn: &Connection, id: i64, tvdb_id: &str) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE show SET tvdb_id = ?2 WHERE id = ?1",
        params![id, tvdb_id],
    )?;
    Ok(n > 0)
}

/// Attach a media as an episode of this show.
pub fn add_episode(
    conn: &Connection,
    show_id: i64,
    media_id: i64,
    season_number: u32,
    episode_number: u32,
) -> Result<ShowEpisode> {
    let id = sql::insert(
        conn,
        "INSERT INTO show_episode(media_id, episode_number, season_number, show_id)
         VALUES(?1, ?2, ?3, ?4)",
        params![media_id, episode_number, season_number, show_id],
    )?;
    sql::execute(
        conn,
        "UPDATE media SET subtype = ?2 WHERE id = ?1",
        params![media_id, MediaSubtype::ShowEpisode],
    )?;
    let q = format!("SELECT {EPISODE_COLS} FROM show_episode WHERE id = ?1");
    sql::query_row_opt(conn, &q, params![id], ShowEpisode::from_row)?
        .ok_or_else(|| Error::not_found("show_episode", id))
}

pub fn episode_of_media(conn: &Connection, media_id: i64) -> Result<Option<ShowEpisode>> {
    let q = format!("SELECT {EPISODE_COLS} FROM show_episode WHERE media_id = ?1");
    sql::query_row_opt(conn, &q, params![media_id], ShowEpisode::from_row)
}

// ---------------------------------------------------------------------------
// queries
// ---------------------------------------------------------------------------

fn order_by(params: &QueryParameters) -> String {
    let (column, swap) = match params.sort {
        SortingCriteria::Default | SortingCriteria::Alpha => ("title", false),
        SortingCriteria::ReleaseDate => ("release_date", false),
        other => {
            tracing::warn!("unsupported sort criterion {other:?} for shows, using title");
            ("title", false)
        }
    };
    let desc = params.desc ^ swap;
    format!("ORDER BY {column}{}", if desc { " DESC" } else { "" })
}

pub fn list_all<'db>(db: &'db Database, params: &QueryParameters) -> PagedQuery<'db, Show> {
    PagedQuery::new(db, COLS, "show", order_by(params), "id", Show::from_row)
}

/// Episodes of a show; the default order is (season, episode).
pub fn episodes<'db>(
    db: &'db Database,
    show_id: i64,
    params: &QueryParameters,
) -> PagedQuery<'db, ShowEpisode> {
    let order = match params.sort {
        SortingCriteria::Default | SortingCriteria::TrackNumber | SortingCriteria::Alpha => {
            if params.desc {
                "ORDER BY season_number DESC, episode_number DESC"
            } else {
                "ORDER BY season_number, episode_number"
            }
        }
        other => {
            tracing::warn!("unsupported sort criterion {other:?} for episodes, using default");
            "ORDER BY season_number, episode_number"
        }
    };
    PagedQuery::new(
        db,
        EPISODE_COLS,
        "show_episode WHERE show_id = ?1",
        order,
        "id",
        ShowEpisode::from_row,
    )
    .param(show_id)
}

pub fn search<'db>(
    db: &'db Database,
    pattern: &str,
    params: &QueryParameters,
) -> PagedQuery<'db, Show> {
    let Some(pattern) = sql::sanitize_pattern(pattern) else {
        return PagedQuery::empty(db);
    };
    let base = "show WHERE id IN (SELECT rowid FROM show_fts WHERE show_fts MATCH ?1)";
    PagedQuery::new(db, COLS, base, order_by(params), "id", Show::from_row).param(pattern)
}
