//! Movies: a thin per-media record for long-form video.

use rusqlite::{params, Connection, Row};

use reelvault_core::{Error, MediaSubtype, Result};

use crate::sql;

#[derive(Debug, Clone)]
pub struct Movie {
    pub id: i64,
    pub media_id: i64,
    pub summary: Option<String>,
    pub imdb_id: Option<String>,
}

const COLS: &str = "id, media_id, summary, imdb_id";

impl Movie {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            media_id: row.get(1)?,
            summary: row.get(2)?,
            imdb_id: row.get(3)?,
        })
    }
}

pub fn schema(_version: u32) -> String {
    "CREATE TABLE movie(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        media_id INTEGER NOT NULL UNIQUE REFERENCES media(id) ON DELETE CASCADE,\
        summary TEXT,\
        imdb_id TEXT)"
        .to_owned()
}

pub fn triggers(_version: u32) -> Vec<(&'static str, String)> {
    Vec::new()
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    Vec::new()
}

pub fn create(conn: &Connection, media_id: i64) -> Result<Movie> {
    let id = sql::insert(
        conn,
        "INSERT INTO movie(media_id) VALUES(?1)",
        params![media_id],
    )?;
    sql::execute(
        conn,
        "UPDATE media SET subtype = ?2 WHERE id = ?1",
        params![media_id, MediaSubtype::Movie],
    )?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("movie", id))
}

pub fn fetch(conn: &Connection, id: i64) -> Result<Option<Movie>> {
    let q = format!("SELECT {COLS} FROM movie WHERE id = ?1");
    sql::query_row_opt(conn, &q, params![id], Movie::from_row)
}

pub fn of_media(conn: &Connection, media_id: i64) -> Result<Option<Movie>> {
    let q = format!("SELECT {COLS} FROM movie WHERE media_id = ?1");
    sql::query_row_opt(conn, &q, params![media_id], Movie::from_row)
}

pub fn set_summary(conn: &Connection, id: i64, summary: &str) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE movie SET summary = ?2 WHERE id = ?1",
        params![id, summary],
    )?;
    Ok(n > 0)
}

pub fn set_imdb_id(conn: &Connection, id: i64, imdb_id: &str) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE movie SET imdb_id = ?2 WHERE id = ?1",
        params![id, imdb_id],
    )?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{device, folder, media};
    use crate::testing;
    use reelvault_core::MediaType;

    #[test]
    fn create_marks_media_and_cascades() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        let dev = device::create(&ctx, "d", "file://", false, false).unwrap();
        let dir = folder::create(&ctx, "/v/", "v", 0, dev.id, false).unwrap();
        let m = media::create(&ctx, MediaType::Video, dev.id, dir.id, "m.mkv", 100).unwrap();

        let movie = create(&ctx, m.id).unwrap();
        assert_eq!(
            media::fetch(&ctx, m.id).unwrap().unwrap().subtype,
            MediaSubtype::Movie
        );
        set_summary(&ctx, movie.id, "plot").unwrap();
        set_imdb_id(&ctx, movie.id, "tt0000001").unwrap();
        let reloaded = of_media(&ctx, m.id).unwrap().unwrap();
        assert_eq!(reloaded.summary.as_deref(), Some("plot"));

        // One movie record per media.
        assert!(create(&ctx, m.id).is_err());

        media::delete(&ctx, m.id).unwrap();
        assert!(fetch(&ctx, movie.id).unwrap().is_none());
    }
}
