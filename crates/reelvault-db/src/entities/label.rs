//! User labels, M:N with media.

use rusqlite::{params, Connection, Row};

use reelvault_core::{Error, Result};

use crate::sql;

#[derive(Debug, Clone)]
pub struct Label {
    pub id: i64,
    pub name: String,
}

impl Label {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    }
}

pub fn schema(_version: u32) -> String {
    "CREATE TABLE label(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        name TEXT UNIQUE COLLATE NOCASE)"
        .to_owned()
}

pub fn relation_schema(_version: u32) -> String {
    "CREATE TABLE label_media(\
        label_id INTEGER NOT NULL REFERENCES label(id) ON DELETE CASCADE,\
        media_id INTEGER NOT NULL REFERENCES media(id) ON DELETE CASCADE,\
        PRIMARY KEY(label_id, media_id))"
        .to_owned()
}

pub fn triggers(_version: u32) -> Vec<(&'static str, String)> {
    Vec::new()
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    Vec::new()
}

pub fn create(conn: &Connection, name: &str) -> Result<Label> {
    let id = sql::insert(conn, "INSERT INTO label(name) VALUES(?1)", params![name])?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("label", id))
}

pub fn fetch(conn: &Connection, id: i64) -> Result<Option<Label>> {
    sql::query_row_opt(
        conn,
        "SELECT id, name FROM label WHERE id = ?1",
        params![id],
        Label::from_row,
    )
}

pub fn fetch_by_name(conn: &Connection, name: &str) -> Result<Option<Label>> {
    sql::query_row_opt(
        conn,
        "SELECT id, name FROM label WHERE name = ?1",
        params![name],
        Label::from_row,
    )
}

/// Attach a label to a media; re-attaching is a harmless no-op.
pub fn attach(conn: &Connection, label_id: i64, media_id: i64) -> Result<bool> {
    let inserted = sql::insert_or_ignore(
        conn,
        "INSERT INTO label_media(label_id, media_id) VALUES(?1, ?2)",
        params![label_id, media_id],
    )?;
    Ok(inserted.is_some())
}

pub fn detach(conn: &Connection, label_id: i64, media_id: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "DELETE FROM label_media WHERE label_id = ?1 AND media_id = ?2",
        params![label_id, media_id],
    )?;
    Ok(n > 0)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let n = sql::execute(conn, "DELETE FROM label WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

pub fn labels_of_media(conn: &Connection, media_id: i64) -> Result<Vec<Label>> {
    sql::load_all(
        conn,
        "SELECT l.id, l.name FROM label l
         INNER JOIN label_media lm ON lm.label_id = l.id
         WHERE lm.media_id = ?1 ORDER BY l.name",
        params![media_id],
        Label::from_row,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{device, folder, media};
    use crate::testing;
    use reelvault_core::MediaType;

    #[test]
    fn attach_is_idempotent() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        let dev = device::create(&ctx, "d", "file://", false, false).unwrap();
        let dir = folder::create(&ctx, "/m/", "m", 0, dev.id, false).unwrap();
        let m = media::create(&ctx, MediaType::Audio, dev.id, dir.id, "a.mp3", 10).unwrap();
        let l = create(&ctx, "favorites").unwrap();

        assert!(attach(&ctx, l.id, m.id).unwrap());
        // The second attach hits the unique constraint and is absorbed.
        assert!(!attach(&ctx, l.id, m.id).unwrap());
        assert_eq!(labels_of_media(&ctx, m.id).unwrap().len(), 1);

        assert!(detach(&ctx, l.id, m.id).unwrap());
        assert!(labels_of_media(&ctx, m.id).unwrap().is_empty());
    }

    #[test]
    fn media_deletion_clears_relations() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        let dev = device::create(&ctx, "d", "file://", false, false).unwrap();
        let dir = folder::create(&ctx, "/m/", "m", 0, dev.id, false).unwrap();
        let m = media::create(&ctx, MediaType::Audio, dev.id, dir.id, "a.mp3", 10).unwrap();
        let l = create(&ctx, "keep").unwrap();
        attach(&ctx, l.id, m.id).unwrap();

        media::delete(&ctx, m.id).unwrap();
        let relations: i64 = sql::query_value(
            &ctx,
            "SELECT COUNT(*) FROM label_media WHERE label_id = ?1",
            params![l.id],
        )
        .unwrap();
        assert_eq!(relations, 0);
        // The label itself survives; only explicit deletion removes it.
        assert!(fetch(&ctx, l.id).unwrap().is_some());
    }
}
