//! Per-media bookmarks, unique per (media, timestamp).

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use reelvault_core::{BookmarkType, Error, Result};

use crate::sql;

#[derive(Debug, Clone)]
pub struct Bookmark {
    pub id: i64,
    pub time: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub media_id: i64,
    pub creation_date: i64,
    pub bookmark_type: BookmarkType,
}

const COLS: &str = "id, time, name, description, media_id, creation_date, type";

impl Bookmark {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            time: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            media_id: row.get(4)?,
            creation_date: row.get(5)?,
            bookmark_type: row.get(6)?,
        })
    }
}

pub fn schema(_version: u32) -> String {
    "CREATE TABLE bookmark(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        time INTEGER NOT NULL,\
        name TEXT,\
        description TEXT,\
        media_id INTEGER NOT NULL REFERENCES media(id) ON DELETE CASCADE,\
        creation_date INTEGER NOT NULL,\
        type INTEGER NOT NULL DEFAULT 0,\
        UNIQUE(media_id, time))"
        .to_owned()
}

pub fn triggers(_version: u32) -> Vec<(&'static str, String)> {
    Vec::new()
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    Vec::new()
}

/// Add a bookmark; `Ok(None)` when one already exists at that time.
pub fn create(
    conn: &Connection,
    media_id: i64,
    time: i64,
    name: Option<&str>,
) -> Result<Option<Bookmark>> {
    let id = sql::insert_or_ignore(
        conn,
        "INSERT INTO bookmark(time, name, media_id, creation_date, type)
         VALUES(?1, ?2, ?3, ?4, ?5)",
        params![
            time,
            name,
            media_id,
            Utc::now().timestamp(),
            BookmarkType::Simple,
        ],
    )?;
    match id {
        Some(id) => Ok(Some(
            fetch(conn, id)?.ok_or_else(|| Error::not_found("bookmark", id))?,
        )),
        None => Ok(None),
    }
}

pub fn fetch(conn: &Connection, id: i64) -> Result<Option<Bookmark>> {
    let q = format!("SELECT {COLS} FROM bookmark WHERE id = ?1");
    sql::query_row_opt(conn, &q, params![id], Bookmark::from_row)
}

pub fn of_media(conn: &Connection, media_id: i64) -> Result<Vec<Bookmark>> {
    let q = format!("SELECT {COLS} FROM bookmark WHERE media_id = ?1 ORDER BY time");
    sql::load_all(conn, &q, params![media_id], Bookmark::from_row)
}

pub fn set_name(conn: &Connection, id: i64, name: &str) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE bookmark SET name = ?2 WHERE id = ?1",
        params![id, name],
    )?;
    Ok(n > 0)
}

pub fn set_description(conn: &Connection, id: i64, description: &str) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE bookmark SET description = ?2 WHERE id = ?1",
        params![id, description],
    )?;
    Ok(n > 0)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let n = sql::execute(conn, "DELETE FROM bookmark WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

pub fn delete_all_for_media(conn: &Connection, media_id: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "DELETE FROM bookmark WHERE media_id = ?1",
        params![media_id],
    )?;
    Ok(n > 0)
}
