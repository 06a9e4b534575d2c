//! Devices: the storage roots media live on.
//!
//! A device's presence drives `media.is_present` through a trigger, and
//! from there every present-counter in the catalog (recursive triggers
//! propagate the media-level change into albums, artists, genres,
//! groups, and folders).

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use reelvault_core::Result;

use crate::sql;

#[derive(Debug, Clone)]
pub struct Device {
    pub id: i64,
    pub uuid: String,
    pub scheme: String,
    pub is_removable: bool,
    pub is_network: bool,
    pub is_present: bool,
    pub last_seen: Option<i64>,
    pub cached_mountpoint: Option<String>,
}

const COLS: &str = "id, uuid, scheme, is_removable, is_network, is_present, last_seen, cached_mountpoint";

impl Device {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            uuid: row.get(1)?,
            scheme: row.get(2)?,
            is_removable: row.get(3)?,
            is_network: row.get(4)?,
            is_present: row.get(5)?,
            last_seen: row.get(6)?,
            cached_mountpoint: row.get(7)?,
        })
    }
}

pub fn schema(_version: u32) -> String {
    "CREATE TABLE device(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        uuid TEXT UNIQUE COLLATE NOCASE,\
        scheme TEXT,\
        is_removable BOOLEAN NOT NULL,\
        is_network BOOLEAN NOT NULL,\
        is_present BOOLEAN NOT NULL DEFAULT 1,\
        last_seen INTEGER,\
        cached_mountpoint TEXT)"
        .to_owned()
}

pub fn triggers(_version: u32) -> Vec<(&'static str, String)> {
    vec![(
        "device_presence_propagate",
        "CREATE TRIGGER device_presence_propagate \
         AFTER UPDATE OF is_present ON device \
         WHEN old.is_present != new.is_present \
         BEGIN \
             UPDATE media SET is_present = new.is_present WHERE device_id = new.id;\
         END"
            .to_owned(),
    )]
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    Vec::new()
}

pub fn create(
    conn: &Connection,
    uuid: &str,
    scheme: &str,
    is_removable: bool,
    is_network: bool,
) -> Result<Device> {
    let now = Utc::now().timestamp();
    let id = sql::insert(
        conn,
        "INSERT INTO device(uuid, scheme, is_removable, is_network, is_present, last_seen)
         VALUES(?1, ?2, ?3, ?4, 1, ?5)",
        params![uuid, scheme, is_removable, is_network, now],
    )?;
    Ok(Device {
        id,
        uuid: uuid.to_owned(),
        scheme: scheme.to_owned(),
        is_removable,
        is_network,
        is_present: true,
        last_seen: Some(now),
        cached_mountpoint: None,
    })
}

pub fn fetch(conn: &Connection, id: i64) -> Result<Option<Device>> {
    let q = format!("SELECT {COLS} FROM device WHERE id = ?1");
    sql::query_row_opt(conn, &q, params![id], Device::from_row)
}

pub fn fetch_by_uuid(conn: &Connection, uuid: &str, scheme: &str) -> Result<Option<Device>> {
    let q = format!("SELECT {COLS} FROM device WHERE uuid = ?1 AND scheme = ?2");
    sql::query_row_opt(conn, &q, params![uuid, scheme], Device::from_row)
}

/// Flip a device's presence; refreshes `last_seen` when it comes back.
pub fn set_present(conn: &Connection, id: i64, present: bool) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE device SET is_present = ?2,
                last_seen = CASE WHEN ?2 THEN ?3 ELSE last_seen END
         WHERE id = ?1",
        params![id, present, Utc::now().timestamp()],
    )?;
    Ok(n > 0)
}

pub fn set_mountpoint(conn: &Connection, id: i64, mountpoint: &str) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE device SET cached_mountpoint = ?2 WHERE id = ?1",
        params![id, mountpoint],
    )?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn create_and_fetch_by_uuid() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        let dev = create(&ctx, "a1b2", "file://", false, false).unwrap();
        assert!(dev.is_present);

        let found = fetch_by_uuid(&ctx, "A1B2", "file://").unwrap().unwrap();
        assert_eq!(found.id, dev.id);
        assert!(fetch_by_uuid(&ctx, "a1b2", "smb://").unwrap().is_none());
    }

    #[test]
    fn duplicate_uuid_rejected() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        create(&ctx, "dup", "file://", false, false).unwrap();
        assert!(create(&ctx, "dup", "file://", false, false).is_err());
    }

    #[test]
    fn presence_flip_updates_last_seen() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        let dev = create(&ctx, "u1", "file://", true, false).unwrap();
        assert!(set_present(&ctx, dev.id, false).unwrap());
        let reloaded = fetch(&ctx, dev.id).unwrap().unwrap();
        assert!(!reloaded.is_present);
        assert_eq!(reloaded.last_seen, dev.last_seen);
        assert!(set_present(&ctx, dev.id, true).unwrap());
        assert!(fetch(&ctx, dev.id).unwrap().unwrap().is_present);
    }
}
