//! Chapters extracted from a media container.

use rusqlite::{params, Connection, Row};

use reelvault_core::{Error, Result};

use crate::sql;

#[derive(Debug, Clone)]
pub struct Chapter {
    pub id: i64,
    pub offset: i64,
    pub duration: i64,
    pub name: Option<String>,
    pub media_id: i64,
}

const COLS: &str = "id, offset, duration, name, media_id";

impl Chapter {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            offset: row.get(1)?,
            duration: row.get(2)?,
            name: row.get(3)?,
            media_id: row.get(4)?,
        })
    }
}

pub fn schema(_version: u32) -> String {
    "CREATE TABLE chapter(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        offset INTEGER NOT NULL,\
        duration INTEGER NOT NULL,\
        name TEXT,\
        media_id INTEGER NOT NULL REFERENCES media(id) ON DELETE CASCADE)"
        .to_owned()
}

pub fn triggers(_version: u32) -> Vec<(&'static str, String)> {
    Vec::new()
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    vec![(
        "chapter_media_idx",
        "CREATE INDEX chapter_media_idx ON chapter(media_id)".to_owned(),
    )]
}

pub fn create(
    conn: &Connection,
    media_id: i64,
    offset: i64,
    duration: i64,
    name: Option<&str>,
) -> Result<Chapter> {
    let id = sql::insert(
        conn,
        "INSERT INTO chapter(offset, duration, name, media_id) VALUES(?1, ?2, ?3, ?4)",
        params![offset, duration, name, media_id],
    )?;
    let q = format!("SELECT {COLS} FROM chapter WHERE id = ?1");
    sql::query_row_opt(conn, &q, params![id], Chapter::from_row)?
        .ok_or_else(|| Error::not_found("chapter", id))
}

pub fn of_media(conn: &Connection, media_id: i64) -> Result<Vec<Chapter>> {
    let q = format!("SELECT {COLS} FROM chapter WHERE media_id = ?1 ORDER BY offset");
    sql::load_all(conn, &q, params![media_id], Chapter::from_row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{device, folder, media};
    use crate::testing;
    use reelvault_core::MediaType;

    #[test]
    fn chapters_ordered_by_offset() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        let dev = device::create(&ctx, "d", "file://", false, false).unwrap();
        let dir = folder::create(&ctx, "/m/", "m", 0, dev.id, false).unwrap();
        let m = media::create(&ctx, MediaType::Video, dev.id, dir.id, "m.mkv", 100).unwrap();

        create(&ctx, m.id, 60_000, 30_000, Some("two")).unwrap();
        create(&ctx, m.id, 0, 60_000, Some("one")).unwrap();

        let chapters = of_media(&ctx, m.id).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].name.as_deref(), Some("one"));

        media::delete(&ctx, m.id).unwrap();
        assert!(of_media(&ctx, m.id).unwrap().is_empty());
    }
}
