//! Folders: the on-device directory tree media were discovered in.
//!
//! `nb_audio`/`nb_video` count the *present* media directly inside the
//! folder and are maintained by triggers on the media table. Banned
//! folders stay in the table as tombstones so a later rescan skips them.

use rusqlite::{params, Connection, Row};

use reelvault_core::{
    Error, FolderRemovalBehavior, MediaType, QueryParameters, Result, SortingCriteria,
};

use crate::entities::{device, media};
use crate::pool::Database;
use crate::query::PagedQuery;
use crate::sql::{self, Fk};

#[derive(Debug, Clone)]
pub struct Folder {
    pub id: i64,
    pub path: String,
    pub name: String,
    pub parent_id: Option<i64>,
    pub is_banned: bool,
    pub device_id: Option<i64>,
    pub is_removable: bool,
    pub nb_audio: i64,
    pub nb_video: i64,
}

const COLS: &str = "id, path, name, parent_id, is_banned, device_id, is_removable, nb_audio, nb_video";

impl Folder {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            path: row.get(1)?,
            name: row.get(2)?,
            parent_id: row.get(3)?,
            is_banned: row.get(4)?,
            device_id: row.get(5)?,
            is_removable: row.get(6)?,
            nb_audio: row.get(7)?,
            nb_video: row.get(8)?,
        })
    }
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

pub fn schema(_version: u32) -> String {
    "CREATE TABLE folder(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        path TEXT,\
        name TEXT COLLATE NOCASE,\
        parent_id INTEGER REFERENCES folder(id) ON DELETE CASCADE,\
        is_banned BOOLEAN NOT NULL DEFAULT 0,\
        device_id INTEGER REFERENCES device(id) ON DELETE CASCADE,\
        is_removable BOOLEAN NOT NULL,\
        nb_audio INTEGER NOT NULL DEFAULT 0,\
        nb_video INTEGER NOT NULL DEFAULT 0,\
        UNIQUE(path, device_id))"
        .to_owned()
}

pub fn fts_schema(_version: u32) -> String {
    "CREATE VIRTUAL TABLE folder_fts USING fts5(name)".to_owned()
}

pub fn triggers(_version: u32) -> Vec<(&'static str, String)> {
    vec![
        (
            "folder_update_nb_media_on_insert",
            "CREATE TRIGGER folder_update_nb_media_on_insert \
             AFTER INSERT ON media \
             WHEN new.folder_id IS NOT NULL AND new.is_present != 0 \
             BEGIN \
                 UPDATE folder SET \
                     nb_audio = nb_audio + (new.type = 1),\
                     nb_video = nb_video + (new.type = 2) \
                 WHERE id = new.folder_id;\
             END"
                .to_owned(),
        ),
        (
            "folder_update_nb_media_on_update",
            "CREATE TRIGGER folder_update_nb_media_on_update \
             AFTER UPDATE ON media \
             WHEN IFNULL(old.folder_id, 0) != IFNULL(new.folder_id, 0) \
                  OR old.type != new.type \
                  OR old.is_present != new.is_present \
             BEGIN \
                 UPDATE folder SET \
                     nb_audio = nb_audio - (old.type = 1 AND old.is_present != 0),\
                     nb_video = nb_video - (old.type = 2 AND old.is_present != 0) \
                 WHERE id = old.folder_id;\
                 UPDATE folder SET \
                     nb_audio = nb_audio + (new.type = 1 AND new.is_present != 0),\
                     nb_video = nb_video + (new.type = 2 AND new.is_present != 0) \
                 WHERE id = new.folder_id;\
             END"
                .to_owned(),
        ),
        (
            "folder_update_nb_media_on_delete",
            "CREATE TRIGGER folder_update_nb_media_on_delete \
             AFTER DELETE ON media \
             WHEN old.folder_id IS NOT NULL AND old.is_present != 0 \
             BEGIN \
                 UPDATE folder SET \
                     nb_audio = nb_audio - (old.type = 1),\
                     nb_video = nb_video - (old.type = 2) \
                 WHERE id = old.folder_id;\
             END"
                .to_owned(),
        ),
        (
            "folder_fts_insert",
            "CREATE TRIGGER folder_fts_insert AFTER INSERT ON folder \
             WHEN new.is_banned = 0 \
             BEGIN \
                 INSERT INTO folder_fts(rowid, name) VALUES(new.id, new.name);\
             END"
                .to_owned(),
        ),
        (
            "folder_fts_delete",
            "CREATE TRIGGER folder_fts_delete AFTER DELETE ON folder \
             BEGIN \
                 DELETE FROM folder_fts WHERE rowid = old.id;\
             END"
                .to_owned(),
        ),
        (
            "folder_fts_on_ban",
            "CREATE TRIGGER folder_fts_on_ban AFTER UPDATE OF is_banned ON folder \
             WHEN old.is_banned = 0 AND new.is_banned != 0 \
             BEGIN \
                 DELETE FROM folder_fts WHERE rowid = new.id;\
             END"
                .to_owned(),
        ),
        (
            "folder_fts_on_unban",
            "CREATE TRIGGER folder_fts_on_unban AFTER UPDATE OF is_banned ON folder \
             WHEN old.is_banned != 0 AND new.is_banned = 0 \
             BEGIN \
                 INSERT INTO folder_fts(rowid, name) VALUES(new.id, new.name);\
             END"
                .to_owned(),
        ),
    ]
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    vec![
        (
            "folder_device_idx",
            "CREATE INDEX folder_device_idx ON folder(device_id)".to_owned(),
        ),
        (
            "folder_parent_idx",
            "CREATE INDEX folder_parent_idx ON folder(parent_id)".to_owned(),
        ),
    ]
}

// ---------------------------------------------------------------------------
// operations
// ---------------------------------------------------------------------------

/// Insert a folder; `parent_id` 0 marks a discovery root.
pub fn create(
    conn: &Connection,
    path: &str,
    name: &str,
    parent_id: i64,
    device_id: i64,
    is_removable: bool,
) -> Result<Folder> {
    let id = sql::insert(
        conn,
        "INSERT INTO folder(path, name, parent_id, device_id, is_removable)
         VALUES(?1, ?2, ?3, ?4, ?5)",
        params![path, name, Fk(parent_id), Fk(device_id), is_removable],
    )?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("folder", id))
}

pub fn fetch(conn: &Connection, id: i64) -> Result<Option<Folder>> {
    let q = format!("SELECT {COLS} FROM folder WHERE id = ?1");
    sql::query_row_opt(conn, &q, params![id], Folder::from_row)
}

pub fn fetch_by_path(conn: &Connection, path: &str) -> Result<Option<Folder>> {
    let q = format!("SELECT {COLS} FROM folder WHERE path = ?1");
    sql::query_row_opt(conn, &q, params![path], Folder::from_row)
}

/// Direct children, banned excluded.
pub fn children(conn: &Connection, parent_id: i64) -> Result<Vec<Folder>> {
    let q = format!(
        "SELECT {COLS} FROM folder WHERE parent_id = ?1 AND is_banned = 0 ORDER BY name"
    );
    sql::load_all(conn, &q, params![parent_id], Folder::from_row)
}

/// The folder and every descendant, walked breadth-first.
pub fn subtree_ids(conn: &Connection, folder_id: i64) -> Result<Vec<i64>> {
    let mut queue = std::collections::VecDeque::from([folder_id]);
    let mut ids = Vec::new();
    while let Some(current) = queue.pop_front() {
        ids.push(current);
        let child_ids: Vec<i64> = sql::load_all(
            conn,
            "SELECT id FROM folder WHERE parent_id = ?1",
            params![current],
            |row| row.get(0),
        )?;
        queue.extend(child_ids);
    }
    Ok(ids)
}

/// Remove a folder.
///
/// `RemovedFromDisk` lets the foreign keys cascade through the subtree.
/// `Banned` walks the subtree, converts every contained media to
/// external, destroys playlists imported from files below the folder,
/// drops the child rows, and marks the folder itself banned.
pub fn remove(conn: &Connection, folder_id: i64, behavior: FolderRemovalBehavior) -> Result<bool> {
    match behavior {
        FolderRemovalBehavior::RemovedFromDisk => {
            let n = sql::execute(conn, "DELETE FROM folder WHERE id = ?1", params![folder_id])?;
            Ok(n > 0)
        }
        FolderRemovalBehavior::Banned => {
            let subtree = subtree_ids(conn, folder_id)?;
            for id in &subtree {
                let media_ids: Vec<i64> = sql::load_all(
                    conn,
                    "SELECT id FROM media WHERE folder_id = ?1",
                    params![id],
                    |row| row.get(0),
                )?;
                for media_id in media_ids {
                    media::convert_to_external(conn, media_id)?;
                }
                sql::execute(
                    conn,
                    "DELETE FROM playlist WHERE file_id IN \
                     (SELECT id FROM file WHERE folder_id = ?1)",
                    params![id],
                )?;
            }
            sql::execute(
                conn,
                "DELETE FROM folder WHERE parent_id = ?1",
                params![folder_id],
            )?;
            let n = sql::execute(
                conn,
                "UPDATE folder SET is_banned = 1 WHERE id = ?1",
                params![folder_id],
            )?;
            Ok(n > 0)
        }
    }
}

/// Ban the folder at `mrl`; idempotent.
///
/// An existing non-banned folder is first removed as if it disappeared
/// from disk (cascading its subtree), then a banned tombstone is
/// inserted; a device is created for the scheme when none exists.
pub fn ban(conn: &Connection, mrl: &str) -> Result<bool> {
    let device_id = match fetch_by_path(conn, mrl)? {
        Some(existing) if existing.is_banned => return Ok(true),
        Some(existing) => {
            remove(conn, existing.id, FolderRemovalBehavior::RemovedFromDisk)?;
            existing.device_id.unwrap_or(0)
        }
        None => 0,
    };
    let device_id = if device_id != 0 {
        device_id
    } else {
        let scheme = mrl.split("://").next().unwrap_or("file");
        match device::fetch_by_uuid(conn, scheme, scheme)? {
            Some(dev) => dev.id,
            None => device::create(conn, scheme, scheme, false, scheme != "file")?.id,
        }
    };
    let name = mrl.trim_end_matches('/').rsplit('/').next().unwrap_or(mrl);
    sql::insert(
        conn,
        "INSERT INTO folder(path, name, device_id, is_removable, is_banned)
         VALUES(?1, ?2, ?3, 0, 1)",
        params![mrl, name, device_id],
    )?;
    Ok(true)
}

/// Lift a ban; the folder tombstone is dropped entirely so the next
/// discovery recreates it.
pub fn unban(conn: &Connection, mrl: &str) -> Result<bool> {
    let n = sql::execute(
        conn,
        "DELETE FROM folder WHERE path = ?1 AND is_banned != 0",
        params![mrl],
    )?;
    Ok(n > 0)
}

pub fn banned_folders(conn: &Connection) -> Result<Vec<Folder>> {
    let q = format!("SELECT {COLS} FROM folder WHERE is_banned != 0 ORDER BY path");
    sql::load_all(conn, &q, [], Folder::from_row)
}

// ---------------------------------------------------------------------------
// queries
// ---------------------------------------------------------------------------

fn order_by(params: &QueryParameters) -> String {
    let (column, swap) = match params.sort {
        SortingCriteria::Default | SortingCriteria::Alpha => ("name", false),
        SortingCriteria::NbMedia => ("nb_audio + nb_video", true),
        SortingCriteria::NbAudio => ("nb_audio", true),
        SortingCriteria::NbVideo => ("nb_video", true),
        other => {
            tracing::warn!("unsupported sort criterion {other:?} for folders, using name");
            ("name", false)
        }
    };
    let desc = params.desc ^ swap;
    format!("ORDER BY {column}{}", if desc { " DESC" } else { "" })
}

/// Folders directly containing media of the given type.
pub fn with_media<'db>(
    db: &'db Database,
    media_type: Option<MediaType>,
    params: &QueryParameters,
) -> PagedQuery<'db, Folder> {
    let filter = match media_type {
        Some(MediaType::Audio) => "nb_audio > 0",
        Some(MediaType::Video) => "nb_video > 0",
        _ => "nb_audio + nb_video > 0",
    };
    let base = format!("folder WHERE is_banned = 0 AND {filter}");
    PagedQuery::new(db, COLS, base, order_by(params), "id", Folder::from_row)
}

pub fn search<'db>(
    db: &'db Database,
    pattern: &str,
    params: &QueryParameters,
) -> PagedQuery<'db, Folder> {
    let Some(pattern) = sql::sanitize_pattern(pattern) else {
        return PagedQuery::empty(db);
    };
    let base = "folder WHERE id IN (SELECT rowid FROM folder_fts WHERE folder_fts MATCH ?1) \
                AND is_banned = 0";
    PagedQuery::new(db, COLS, base, order_by(params), "id", Folder::from_row).param(pattern)
}
