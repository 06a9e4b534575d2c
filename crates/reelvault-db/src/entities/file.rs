//! Files backing media and playlists.
//!
//! A discovered media owns exactly one `Main` file; deleting it deletes
//! the media through a trigger, and deleting a `Playlist` file deletes
//! the playlist it was imported into.

use rusqlite::{params, Connection, Row};

use reelvault_core::{Error, FileType, Result};

use crate::sql::{self, Fk};

#[derive(Debug, Clone)]
pub struct File {
    pub id: i64,
    pub media_id: Option<i64>,
    pub playlist_id: Option<i64>,
    pub mrl: String,
    pub file_type: FileType,
    pub last_modification_date: i64,
    pub size: i64,
    pub folder_id: Option<i64>,
    pub is_removable: bool,
    pub is_external: bool,
    pub is_network: bool,
}

const COLS: &str = "id, media_id, playlist_id, mrl, type, last_modification_date, size, \
    folder_id, is_removable, is_external, is_network";

impl File {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            media_id: row.get(1)?,
            playlist_id: row.get(2)?,
            mrl: row.get(3)?,
            file_type: row.get(4)?,
            last_modification_date: row.get(5)?,
            size: row.get(6)?,
            folder_id: row.get(7)?,
            is_removable: row.get(8)?,
            is_external: row.get(9)?,
            is_network: row.get(10)?,
        })
    }
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

pub fn schema(_version: u32) -> String {
    "CREATE TABLE file(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        media_id INTEGER REFERENCES media(id) ON DELETE CASCADE,\
        playlist_id INTEGER REFERENCES playlist(id) ON DELETE CASCADE,\
        mrl TEXT,\
        type INTEGER NOT NULL,\
        last_modification_date INTEGER,\
        size INTEGER NOT NULL DEFAULT 0,\
        folder_id INTEGER REFERENCES folder(id) ON DELETE CASCADE,\
        is_removable BOOLEAN NOT NULL,\
        is_external BOOLEAN NOT NULL,\
        is_network BOOLEAN NOT NULL,\
        UNIQUE(mrl, folder_id))"
        .to_owned()
}

pub fn triggers(_version: u32) -> Vec<(&'static str, String)> {
    vec![
        (
            "file_cascade_media_deletion",
            "CREATE TRIGGER file_cascade_media_deletion \
             AFTER DELETE ON file \
             WHEN old.type = 0 AND old.media_id IS NOT NULL \
             BEGIN \
                 DELETE FROM media WHERE id = old.media_id;\
             END"
                .to_owned(),
        ),
        (
            "file_cascade_playlist_deletion",
            "CREATE TRIGGER file_cascade_playlist_deletion \
             AFTER DELETE ON file \
             WHEN old.type = 4 \
             BEGIN \
                 DELETE FROM playlist WHERE file_id = old.id;\
             END"
                .to_owned(),
        ),
    ]
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    vec![
        (
            "file_media_idx",
            "CREATE INDEX file_media_idx ON file(media_id)".to_owned(),
        ),
        (
            "file_folder_idx",
            "CREATE INDEX file_folder_idx ON file(folder_id)".to_owned(),
        ),
        // The table constraint only covers folder-backed files: NULL
        // folder ids compare distinct, so external mrls need their own
        // uniqueness.
        (
            "file_mrl_external_idx",
            "CREATE UNIQUE INDEX file_mrl_external_idx ON file(mrl) WHERE folder_id IS NULL"
                .to_owned(),
        ),
    ]
}

// ---------------------------------------------------------------------------
// operations
// ---------------------------------------------------------------------------

/// Attach a discovered file to a media.
#[allow(clippy::too_many_arguments)]
pub fn add_to_media(
    conn: &Connection,
    media_id: i64,
    mrl: &str,
    file_type: FileType,
    folder_id: i64,
    size: i64,
    last_modification_date: i64,
    is_removable: bool,
) -> Result<File> {
    let id = sql::insert(
        conn,
        "INSERT INTO file(media_id, mrl, type, last_modification_date, size,
                folder_id, is_removable, is_external, is_network)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0)",
        params![
            media_id,
            mrl,
            file_type,
            last_modification_date,
            size,
            Fk(folder_id),
            is_removable,
        ],
    )?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("file", id))
}

/// Attach an external file (no folder, no device) to a media.
///
/// `Ok(None)` when a file with this mrl already exists.
pub fn add_external(
    conn: &Connection,
    media_id: i64,
    mrl: &str,
    file_type: FileType,
) -> Result<Option<File>> {
    let is_network = mrl.contains("://") && !mrl.starts_with("file://");
    let id = sql::insert_or_ignore(
        conn,
        "INSERT INTO file(media_id, mrl, type, is_removable, is_external, is_network)
         VALUES(?1, ?2, ?3, 0, 1, ?4)",
        params![media_id, mrl, file_type, is_network],
    )?;
    match id {
        Some(id) => Ok(Some(
            fetch(conn, id)?.ok_or_else(|| Error::not_found("file", id))?,
        )),
        None => Ok(None),
    }
}

/// Record a playlist file.
pub fn add_playlist_file(
    conn: &Connection,
    playlist_id: i64,
    mrl: &str,
    folder_id: i64,
    last_modification_date: i64,
) -> Result<File> {
    let id = sql::insert(
        conn,
        "INSERT INTO file(playlist_id, mrl, type, last_modification_date,
                folder_id, is_removable, is_external, is_network)
         VALUES(?1, ?2, ?3, ?4, ?5, 0, 0, 0)",
        params![
            playlist_id,
            mrl,
            FileType::Playlist,
            last_modification_date,
            Fk(folder_id),
        ],
    )?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("file", id))
}

pub fn fetch(conn: &Connection, id: i64) -> Result<Option<File>> {
    let q = format!("SELECT {COLS} FROM file WHERE id = ?1");
    sql::query_row_opt(conn, &q, params![id], File::from_row)
}

pub fn fetch_by_mrl(conn: &Connection, mrl: &str) -> Result<Option<File>> {
    let q = format!("SELECT {COLS} FROM file WHERE mrl = ?1");
    sql::query_row_opt(conn, &q, params![mrl], File::from_row)
}

pub fn files_of_media(conn: &Connection, media_id: i64) -> Result<Vec<File>> {
    let q = format!("SELECT {COLS} FROM file WHERE media_id = ?1 ORDER BY type, id");
    sql::load_all(conn, &q, params![media_id], File::from_row)
}

/// The main file of a media, when it has one.
pub fn main_file(conn: &Connection, media_id: i64) -> Result<Option<File>> {
    let q = format!("SELECT {COLS} FROM file WHERE media_id = ?1 AND type = 0");
    sql::query_row_opt(conn, &q, params![media_id], File::from_row)
}

/// Refresh size and mtime after the filesystem reported a change.
pub fn update_fs_info(
    conn: &Connection,
    id: i64,
    size: i64,
    last_modification_date: i64,
) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE file SET size = ?2, last_modification_date = ?3 WHERE id = ?1",
        params![id, size, last_modification_date],
    )?;
    Ok(n > 0)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let n = sql::execute(conn, "DELETE FROM file WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{device, folder, media};
    use crate::testing;
    use reelvault_core::MediaType;

    fn setup(db: &crate::pool::Database) -> (i64, i64, i64) {
        let ctx = db.write().unwrap();
        let dev = device::create(&ctx, "d", "file://", false, false).unwrap();
        let dir = folder::create(&ctx, "/d/", "d", 0, dev.id, false).unwrap();
        let m = media::create(&ctx, MediaType::Video, dev.id, dir.id, "m.mkv", 100).unwrap();
        (dev.id, dir.id, m.id)
    }

    #[test]
    fn main_file_deletion_cascades_to_media() {
        let db = testing::db();
        let (_, dir, media_id) = setup(&db);
        let ctx = db.write().unwrap();
        let f = add_to_media(&ctx, media_id, "/d/m.mkv", FileType::Main, dir, 1234, 0, false)
            .unwrap();
        assert_eq!(files_of_media(&ctx, media_id).unwrap().len(), 1);
        assert_ne!(f.size, 0);

        assert!(delete(&ctx, f.id).unwrap());
        assert!(media::fetch(&ctx, media_id).unwrap().is_none());
    }

    #[test]
    fn subtitle_file_deletion_keeps_media() {
        let db = testing::db();
        let (_, dir, media_id) = setup(&db);
        let ctx = db.write().unwrap();
        let f = add_to_media(
            &ctx,
            media_id,
            "/d/m.srt",
            FileType::Subtitles,
            dir,
            10,
            0,
            false,
        )
        .unwrap();
        assert!(delete(&ctx, f.id).unwrap());
        assert!(media::fetch(&ctx, media_id).unwrap().is_some());
    }

    #[test]
    fn add_external_absorbs_duplicate_mrl() {
        let db = testing::db();
        let (_, _, media_id) = setup(&db);
        let ctx = db.write().unwrap();
        let f = add_external(&ctx, media_id, "http://x/sub.srt", FileType::Subtitles).unwrap();
        assert!(f.is_some());
        assert!(f.unwrap().is_network);

        let dup = add_external(&ctx, media_id, "http://x/sub.srt", FileType::Subtitles).unwrap();
        assert!(dup.is_none());
    }

    #[test]
    fn media_deletion_cascades_to_files() {
        let db = testing::db();
        let (_, dir, media_id) = setup(&db);
        let ctx = db.write().unwrap();
        add_to_media(&ctx, media_id, "/d/m.mkv", FileType::Main, dir, 1, 0, false).unwrap();
        media::delete(&ctx, media_id).unwrap();
        assert!(fetch_by_mrl(&ctx, "/d/m.mkv").unwrap().is_none());
    }

    #[test]
    fn update_fs_info_refreshes() {
        let db = testing::db();
        let (_, dir, media_id) = setup(&db);
        let ctx = db.write().unwrap();
        let f = add_to_media(&ctx, media_id, "/d/m.mkv", FileType::Main, dir, 1, 5, false)
            .unwrap();
        assert!(update_fs_info(&ctx, f.id, 2048, 99).unwrap());
        let f = fetch(&ctx, f.id).unwrap().unwrap();
        assert_eq!(f.size, 2048);
        assert_eq!(f.last_modification_date, 99);
    }
}
