//! Per-media metadata slots, loaded lazily as a full map.

use std::collections::HashMap;

use rusqlite::{params, Connection};

use reelvault_core::{MetadataType, Result};

use crate::sql;

pub fn schema(_version: u32) -> String {
    "CREATE TABLE metadata(\
        media_id INTEGER NOT NULL REFERENCES media(id) ON DELETE CASCADE,\
        type INTEGER NOT NULL,\
        value TEXT NOT NULL,\
        PRIMARY KEY(media_id, type))"
        .to_owned()
}

pub fn triggers(_version: u32) -> Vec<(&'static str, String)> {
    Vec::new()
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    Vec::new()
}

pub fn get(conn: &Connection, media_id: i64, meta: MetadataType) -> Result<Option<String>> {
    sql::query_row_opt(
        conn,
        "SELECT value FROM metadata WHERE media_id = ?1 AND type = ?2",
        params![media_id, meta],
        |row| row.get(0),
    )
}

/// The full metadata map of one media.
pub fn all(conn: &Connection, media_id: i64) -> Result<HashMap<MetadataType, String>> {
    let rows: Vec<(MetadataType, String)> = sql::load_all(
        conn,
        "SELECT type, value FROM metadata WHERE media_id = ?1",
        params![media_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(rows.into_iter().collect())
}

pub fn set(conn: &Connection, media_id: i64, meta: MetadataType, value: &str) -> Result<bool> {
    let n = sql::execute(
        conn,
        "INSERT INTO metadata(media_id, type, value) VALUES(?1, ?2, ?3)
         ON CONFLICT(media_id, type) DO UPDATE SET value = excluded.value",
        params![media_id, meta, value],
    )?;
    Ok(n > 0)
}

pub fn set_int(conn: &Connection, media_id: i64, meta: MetadataType, value: i64) -> Result<bool> {
    set(conn, media_id, meta, &value.to_string())
}

pub fn unset(conn: &Connection, media_id: i64, meta: MetadataType) -> Result<bool> {
    let n = sql::execute(
        conn,
        "DELETE FROM metadata WHERE media_id = ?1 AND type = ?2",
        params![media_id, meta],
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
    fn set_get_overwrite_unset() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        let dev = device::create(&ctx, "d", "file://", false, false).unwrap();
        let dir = folder::create(&ctx, "/m/", "m", 0, dev.id, false).unwrap();
        let m = media::create(&ctx, MediaType::Video, dev.id, dir.id, "m.mkv", 100).unwrap();

        assert!(set(&ctx, m.id, MetadataType::Rating, "5").unwrap());
        assert_eq!(get(&ctx, m.id, MetadataType::Rating).unwrap().as_deref(), Some("5"));

        // Overwrite through the conflict clause.
        assert!(set_int(&ctx, m.id, MetadataType::Rating, 3).unwrap());
        assert_eq!(get(&ctx, m.id, MetadataType::Rating).unwrap().as_deref(), Some("3"));

        set(&ctx, m.id, MetadataType::Speed, "1.5").unwrap();
        let map = all(&ctx, m.id).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&MetadataType::Speed).map(String::as_str), Some("1.5"));

        assert!(unset(&ctx, m.id, MetadataType::Rating).unwrap());
        assert!(get(&ctx, m.id, MetadataType::Rating).unwrap().is_none());

        media::delete(&ctx, m.id).unwrap();
        assert!(all(&ctx, m.id).unwrap().is_empty());
    }
}
