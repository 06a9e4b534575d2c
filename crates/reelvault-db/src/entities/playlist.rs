//! Playlists and their ordered membership.
//!
//! Membership rows carry an explicit 0-based position, shifted by
//! triggers on insert and delete, plus the mrl the media had when it
//! was added: when the media row later disappears, the membership row
//! survives with a NULL media id and is re-linked (or dropped) lazily
//! by [`curate_null_media_id`] the next time the playlist is read.

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use reelvault_core::{Error, QueryParameters, Result, SortingCriteria};

use crate::entities::{file, media};
use crate::pool::{transaction_in_progress, Database, Transaction};
use crate::query::PagedQuery;
use crate::sql::{self, Fk};

#[derive(Debug, Clone)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub file_id: Option<i64>,
    pub creation_date: i64,
    pub artwork_mrl: Option<String>,
}

const COLS: &str = "id, name, file_id, creation_date, artwork_mrl";

impl Playlist {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            file_id: row.get(2)?,
            creation_date: row.get(3)?,
            artwork_mrl: row.get(4)?,
        })
    }
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

pub fn schema(_version: u32) -> String {
    "CREATE TABLE playlist(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        name TEXT COLLATE NOCASE,\
        file_id INTEGER,\
        creation_date INTEGER NOT NULL,\
        artwork_mrl TEXT)"
        .to_owned()
}

pub fn relation_schema(version: u32) -> String {
    let mut sql = String::from(
        "CREATE TABLE playlist_media(\
            playlist_id INTEGER NOT NULL REFERENCES playlist(id) ON DELETE CASCADE,\
            media_id INTEGER REFERENCES media(id) ON DELETE SET NULL,",
    );
    if version >= 2 {
        sql.push_str("mrl TEXT,");
    }
    sql.push_str("position INTEGER NOT NULL)");
    sql
}

pub fn fts_schema(_version: u32) -> String {
    "CREATE VIRTUAL TABLE playlist_fts USING fts5(name)".to_owned()
}

pub fn triggers(_version: u32) -> Vec<(&'static str, String)> {
    vec![
        (
            "playlist_fts_insert",
            "CREATE TRIGGER playlist_fts_insert AFTER INSERT ON playlist \
             BEGIN \
                 INSERT INTO playlist_fts(rowid, name) VALUES(new.id, new.name);\
             END"
                .to_owned(),
        ),
        (
            "playlist_fts_delete",
            "CREATE TRIGGER playlist_fts_delete AFTER DELETE ON playlist \
             BEGIN \
                 DELETE FROM playlist_fts WHERE rowid = old.id;\
             END"
                .to_owned(),
        ),
        (
            "playlist_fts_update",
            "CREATE TRIGGER playlist_fts_update AFTER UPDATE OF name ON playlist \
             BEGIN \
                 UPDATE playlist_fts SET name = new.name WHERE rowid = new.id;\
             END"
                .to_owned(),
        ),
        (
            "playlist_shift_position_on_insert",
            "CREATE TRIGGER playlist_shift_position_on_insert \
             AFTER INSERT ON playlist_media \
             BEGIN \
                 UPDATE playlist_media SET position = position + 1 \
                 WHERE playlist_id = new.playlist_id AND position >= new.position \
                       AND rowid != new.rowid;\
             END"
                .to_owned(),
        ),
        (
            "playlist_shift_position_on_delete",
            "CREATE TRIGGER playlist_shift_position_on_delete \
             AFTER DELETE ON playlist_media \
             BEGIN \
                 UPDATE playlist_media SET position = position - 1 \
                 WHERE playlist_id = old.playlist_id AND position > old.position;\
             END"
                .to_owned(),
        ),
        (
            "playlist_increment_nb_playlists",
            "CREATE TRIGGER playlist_increment_nb_playlists \
             AFTER INSERT ON playlist_media \
             WHEN new.media_id IS NOT NULL \
             BEGIN \
                 UPDATE media SET nb_playlists = nb_playlists + 1 WHERE id = new.media_id;\
             END"
                .to_owned(),
        ),
        (
            "playlist_decrement_nb_playlists",
            "CREATE TRIGGER playlist_decrement_nb_playlists \
             AFTER DELETE ON playlist_media \
             WHEN old.media_id IS NOT NULL \
             BEGIN \
                 UPDATE media SET nb_playlists = nb_playlists - 1 WHERE id = old.media_id;\
             END"
                .to_owned(),
        ),
        (
            "playlist_relink_nb_playlists",
            "CREATE TRIGGER playlist_relink_nb_playlists \
             AFTER UPDATE OF media_id ON playlist_media \
             WHEN IFNULL(old.media_id, 0) != IFNULL(new.media_id, 0) \
             BEGIN \
                 UPDATE media SET nb_playlists = nb_playlists - 1 WHERE id = old.media_id;\
                 UPDATE media SET nb_playlists = nb_playlists + 1 WHERE id = new.media_id;\
             END"
                .to_owned(),
        ),
    ]
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    vec![(
        "playlist_media_idx",
        "CREATE INDEX playlist_media_idx ON playlist_media(playlist_id, position)".to_owned(),
    )]
}

// ---------------------------------------------------------------------------
// operations
// ---------------------------------------------------------------------------

pub fn create(conn: &Connection, name: &str) -> Result<Playlist> {
    let id = sql::insert(
        conn,
        "INSERT INTO playlist(name, creation_date) VALUES(?1, ?2)",
        params![name, Utc::now().timestamp()],
    )?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("playlist", id))
}

/// A playlist imported from a playlist file.
pub fn create_from_file(conn: &Connection, name: &str, file_id: i64) -> Result<Playlist> {
    let id = sql::insert(
        conn,
        "INSERT INTO playlist(name, file_id, creation_date) VALUES(?1, ?2, ?3)",
        params![name, Fk(file_id), Utc::now().timestamp()],
    )?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("playlist", id))
}

pub fn fetch(conn: &Connection, id: i64) -> Result<Option<Playlist>> {
    let q = format!("SELECT {COLS} FROM playlist WHERE id = ?1");
    sql::query_row_opt(conn, &q, params![id], Playlist::from_row)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let n = sql::execute(conn, "DELETE FROM playlist WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

pub fn set_name(conn: &Connection, id: i64, name: &str) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE playlist SET name = ?2 WHERE id = ?1",
        params![id, name],
    )?;
    Ok(n > 0)
}

pub fn media_count(conn: &Connection, playlist_id: i64) -> Result<i64> {
    sql::query_value(
        conn,
        "SELECT COUNT(*) FROM playlist_media WHERE playlist_id = ?1",
        params![playlist_id],
    )
}

/// Append or insert a media.
///
/// `None` appends; an explicit position is clamped to the current count
/// and the maintenance trigger shifts later rows right.
pub fn add(
    conn: &Connection,
    playlist_id: i64,
    media_id: i64,
    position: Option<u32>,
) -> Result<bool> {
    let mrl = file::main_file(conn, media_id)?.map(|f| f.mrl);
    let count = media_count(conn, playlist_id)?;
    let position = match position {
        Some(p) => (i64::from(p)).min(count),
        None => count,
    };
    sql::insert(
        conn,
        "INSERT INTO playlist_media(playlist_id, media_id, mrl, position)
         VALUES(?1, ?2, ?3, ?4)",
        params![playlist_id, media_id, mrl, position],
    )?;
    Ok(true)
}

/// Append a media at the end.
pub fn append(conn: &Connection, playlist_id: i64, media_id: i64) -> Result<bool> {
    add(conn, playlist_id, media_id, None)
}

/// Remove the row at `position`; later rows shift left by trigger.
pub fn remove(conn: &Connection, playlist_id: i64, position: u32) -> Result<bool> {
    let n = sql::execute(
        conn,
        "DELETE FROM playlist_media WHERE playlist_id = ?1 AND position = ?2",
        params![playlist_id, position],
    )?;
    Ok(n > 0)
}

pub fn contains(conn: &Connection, playlist_id: i64, media_id: i64) -> Result<bool> {
    let count: i64 = sql::query_value(
        conn,
        "SELECT COUNT(*) FROM playlist_media WHERE playlist_id = ?1 AND media_id = ?2",
        params![playlist_id, media_id],
    )?;
    Ok(count > 0)
}

/// Move the item at `from` to `to`, as an atomic delete + re-add.
pub fn move_item(conn: &Connection, playlist_id: i64, from: u32, to: u32) -> Result<bool> {
    let tx = if transaction_in_progress() {
        None
    } else {
        Some(Transaction::new(conn)?)
    };
    let media_id: Option<Option<i64>> = sql::query_row_opt(
        conn,
        "SELECT media_id FROM playlist_media WHERE playlist_id = ?1 AND position = ?2",
        params![playlist_id, from],
        |row| row.get(0),
    )?;
    let Some(media_id) = media_id else {
        tracing::error!("no playlist item at position {from}");
        return Ok(false);
    };
    let mrl: Option<String> = sql::query_row_opt(
        conn,
        "SELECT mrl FROM playlist_media WHERE playlist_id = ?1 AND position = ?2",
        params![playlist_id, from],
        |row| row.get(0),
    )?
    .flatten();
    sql::execute(
        conn,
        "DELETE FROM playlist_media WHERE playlist_id = ?1 AND position = ?2",
        params![playlist_id, from],
    )?;
    let count = media_count(conn, playlist_id)?;
    let to = i64::from(to).min(count);
    sql::insert(
        conn,
        "INSERT INTO playlist_media(playlist_id, media_id, mrl, position)
         VALUES(?1, ?2, ?3, ?4)",
        params![playlist_id, media_id, mrl, to],
    )?;
    if let Some(tx) = tx {
        tx.commit()?;
    }
    Ok(true)
}

/// Re-link membership rows whose media was deleted.
///
/// Rows with a NULL media id are matched against the catalog by their
/// stored mrl; unresolvable rows are dropped in one batch. Idempotent.
pub fn curate_null_media_id(conn: &Connection) -> Result<()> {
    let orphans: Vec<(i64, Option<String>)> = sql::load_all(
        conn,
        "SELECT rowid, mrl FROM playlist_media WHERE media_id IS NULL",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    if orphans.is_empty() {
        return Ok(());
    }
    let mut unresolved = false;
    for (rowid, mrl) in orphans {
        let restored = match mrl.as_deref() {
            Some(mrl) => media::fetch_by_mrl(conn, mrl)?,
            None => None,
        };
        match restored {
            Some(m) => {
                tracing::info!("re-linking playlist item {rowid} to media {}", m.id);
                sql::execute(
                    conn,
                    "UPDATE playlist_media SET media_id = ?1 WHERE rowid = ?2",
                    params![m.id, rowid],
                )?;
            }
            None => unresolved = true,
        }
    }
    if unresolved {
        // Batch all deletions instead of removing rows mid-loop.
        sql::execute(
            conn,
            "DELETE FROM playlist_media WHERE media_id IS NULL",
            [],
        )?;
    }
    Ok(())
}

/// The playlist's media, in order. Curation runs first so deleted media
/// are re-linked or dropped.
pub fn media_of(conn: &Connection, playlist_id: i64) -> Result<Vec<media::Media>> {
    curate_null_media_id(conn)?;
    let q = format!(
        "SELECT m.{} FROM media m \
         INNER JOIN playlist_media pm ON pm.media_id = m.id \
         WHERE pm.playlist_id = ?1 ORDER BY pm.position",
        media::COLS.replace(", ", ", m.")
    );
    sql::load_all(conn, &q, params![playlist_id], media::Media::from_row)
}

/// Positions of a playlist, for invariant checks and tests.
pub fn positions(conn: &Connection, playlist_id: i64) -> Result<Vec<i64>> {
    sql::load_all(
        conn,
        "SELECT position FROM playlist_media WHERE playlist_id = ?1 ORDER BY position",
        params![playlist_id],
        |row| row.get(0),
    )
}

// ---------------------------------------------------------------------------
// queries
// ---------------------------------------------------------------------------

fn order_by(params: &QueryParameters) -> String {
    let (column, swap) = match params.sort {
        SortingCriteria::Default | SortingCriteria::Alpha => ("name", false),
        SortingCriteria::InsertionDate => ("creation_date", false),
        other => {
            tracing::warn!("unsupported sort criterion {other:?} for playlists, using name");
            ("name", false)
        }
    };
    let desc = params.desc ^ swap;
    format!("ORDER BY {column}{}", if desc { " DESC" } else { "" })
}

pub fn list_all<'db>(db: &'db Database, params: &QueryParameters) -> PagedQuery<'db, Playlist> {
    PagedQuery::new(db, COLS, "playlist", order_by(params), "id", Playlist::from_row)
}

pub fn search<'db>(
    db: &'db Database,
    pattern: &str,
    params: &QueryParameters,
) -> PagedQuery<'db, Playlist> {
    let Some(pattern) = sql::sanitize_pattern(pattern) else {
        return PagedQuery::empty(db);
    };
    let base = "playlist WHERE id IN (SELECT rowid FROM playlist_fts WHERE playlist_fts MATCH ?1)";
    PagedQuery::new(db, COLS, base, order_by(params), "id", Playlist::from_row).param(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{device, folder};
    use crate::testing;
    use reelvault_core::{FileType, MediaType};

    fn setup(db: &Database) -> (i64, i64) {
        let ctx = db.write().unwrap();
        let dev = device::create(&ctx, "d", "file://", false, false).unwrap();
        let dir = folder::create(&ctx, "/m/", "m", 0, dev.id, false).unwrap();
        (dev.id, dir.id)
    }

    fn make_media(ctx: &Connection, dev: i64, dir: i64, name: &str) -> media::Media {
        let m = media::create(ctx, MediaType::Audio, dev, dir, name, 100).unwrap();
        file::add_to_media(
            ctx,
            m.id,
            &format!("/m/{name}"),
            FileType::Main,
            dir,
            100,
            0,
            false,
        )
        .unwrap();
        m
    }

    #[test]
    fn positions_stay_contiguous() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        let ctx = db.write().unwrap();
        let p = create(&ctx, "P").unwrap();
        let m1 = make_media(&ctx, dev, dir, "1.mp3");
        let m2 = make_media(&ctx, dev, dir, "2.mp3");
        let m3 = make_media(&ctx, dev, dir, "3.mp3");
        append(&ctx, p.id, m1.id).unwrap();
        append(&ctx, p.id, m2.id).unwrap();
        append(&ctx, p.id, m3.id).unwrap();
        assert_eq!(positions(&ctx, p.id).unwrap(), vec![0, 1, 2]);

        // Insert in the middle shifts later rows right.
        let m4 = make_media(&ctx, dev, dir, "4.mp3");
        add(&ctx, p.id, m4.id, Some(1)).unwrap();
        let order: Vec<i64> = media_of(&ctx, p.id).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(order, vec![m1.id, m4.id, m2.id, m3.id]);
        assert_eq!(positions(&ctx, p.id).unwrap(), vec![0, 1, 2, 3]);

        // Removal shifts them left again.
        remove(&ctx, p.id, 1).unwrap();
        assert_eq!(positions(&ctx, p.id).unwrap(), vec![0, 1, 2]);

        // An out-of-range insert clamps to an append.
        let m5 = make_media(&ctx, dev, dir, "5.mp3");
        add(&ctx, p.id, m5.id, Some(99)).unwrap();
        assert_eq!(positions(&ctx, p.id).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn add_then_remove_is_a_noop() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        let ctx = db.write().unwrap();
        let p = create(&ctx, "P").unwrap();
        let m1 = make_media(&ctx, dev, dir, "1.mp3");
        let m2 = make_media(&ctx, dev, dir, "2.mp3");
        append(&ctx, p.id, m1.id).unwrap();

        add(&ctx, p.id, m2.id, Some(0)).unwrap();
        assert_eq!(media::fetch(&ctx, m2.id).unwrap().unwrap().nb_playlists, 1);
        remove(&ctx, p.id, 0).unwrap();

        assert_eq!(positions(&ctx, p.id).unwrap(), vec![0]);
        assert_eq!(media::fetch(&ctx, m2.id).unwrap().unwrap().nb_playlists, 0);
        let order: Vec<i64> = media_of(&ctx, p.id).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(order, vec![m1.id]);
    }

    #[test]
    fn move_item_reorders() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        let ctx = db.write().unwrap();
        let p = create(&ctx, "P").unwrap();
        let m1 = make_media(&ctx, dev, dir, "1.mp3");
        let m2 = make_media(&ctx, dev, dir, "2.mp3");
        let m3 = make_media(&ctx, dev, dir, "3.mp3");
        for m in [&m1, &m2, &m3] {
            append(&ctx, p.id, m.id).unwrap();
        }

        assert!(move_item(&ctx, p.id, 0, 2).unwrap());
        let order: Vec<i64> = media_of(&ctx, p.id).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(order, vec![m2.id, m3.id, m1.id]);

        assert!(!move_item(&ctx, p.id, 9, 0).unwrap());
    }

    #[test]
    fn curation_drops_unresolvable_rows() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        let ctx = db.write().unwrap();
        let p = create(&ctx, "P").unwrap();
        let m1 = make_media(&ctx, dev, dir, "1.mp3");
        let m2 = make_media(&ctx, dev, dir, "2.mp3");
        let m3 = make_media(&ctx, dev, dir, "3.mp3");
        for m in [&m1, &m2, &m3] {
            append(&ctx, p.id, m.id).unwrap();
        }

        // Deleting the media nulls its membership row; the file is gone
        // too, so the row cannot be re-linked and gets dropped.
        media::delete(&ctx, m2.id).unwrap();
        let order: Vec<i64> = media_of(&ctx, p.id).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(order, vec![m1.id, m3.id]);
        assert_eq!(positions(&ctx, p.id).unwrap(), vec![0, 1]);

        // Idempotent.
        curate_null_media_id(&ctx).unwrap();
        assert_eq!(media_of(&ctx, p.id).unwrap().len(), 2);
    }

    #[test]
    fn curation_relinks_by_mrl() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        let ctx = db.write().unwrap();
        let p = create(&ctx, "P").unwrap();
        let m1 = make_media(&ctx, dev, dir, "1.mp3");
        append(&ctx, p.id, m1.id).unwrap();

        // Simulate a media that vanished and came back at the same mrl.
        sql::execute(
            &ctx,
            "UPDATE playlist_media SET media_id = NULL WHERE playlist_id = ?1",
            params![p.id],
        )
        .unwrap();
        let order: Vec<i64> = media_of(&ctx, p.id).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(order, vec![m1.id]);
        assert_eq!(media::fetch(&ctx, m1.id).unwrap().unwrap().nb_playlists, 1);
    }

    #[test]
    fn playlist_file_deletion_deletes_playlist() {
        let db = testing::db();
        let (_, dir) = setup(&db);
        let ctx = db.write().unwrap();
        let p = create(&ctx, "imported").unwrap();
        let f = file::add_playlist_file(&ctx, p.id, "/m/list.m3u", dir, 0).unwrap();
        sql::execute(
            &ctx,
            "UPDATE playlist SET file_id = ?2 WHERE id = ?1",
            params![p.id, f.id],
        )
        .unwrap();

        file::delete(&ctx, f.id).unwrap();
        assert!(fetch(&ctx, p.id).unwrap().is_none());
    }
}
