//! Artists, including the two sentinel rows.
//!
//! UnknownArtist and VariousArtists are inserted at table creation with
//! fixed ids and are excluded from the empty-artist garbage collection.

use rusqlite::{params, Connection, Row};

use reelvault_core::{Error, QueryParameters, Result, SortingCriteria};

use crate::pool::Database;
use crate::query::PagedQuery;
use crate::sql;

pub const UNKNOWN_ARTIST_ID: i64 = 1;
pub const VARIOUS_ARTISTS_ID: i64 = 2;

#[derive(Debug, Clone)]
pub struct Artist {
    pub id: i64,
    pub name: Option<String>,
    pub shortbio: Option<String>,
    pub nb_albums: i64,
    pub nb_tracks: i64,
    pub nb_present_tracks: i64,
    pub mb_id: Option<String>,
    pub is_favorite: bool,
}

const COLS: &str = "id, name, shortbio, nb_albums, nb_tracks, nb_present_tracks, mb_id, is_favorite";

impl Artist {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            shortbio: row.get(2)?,
            nb_albums: row.get(3)?,
            nb_tracks: row.get(4)?,
            nb_present_tracks: row.get(5)?,
            mb_id: row.get(6)?,
            is_favorite: row.get(7)?,
        })
    }

    pub fn is_sentinel(&self) -> bool {
        self.id == UNKNOWN_ARTIST_ID || self.id == VARIOUS_ARTISTS_ID
    }
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

pub fn schema(version: u32) -> String {
    let mut sql = String::from(
        "CREATE TABLE artist(\
            id INTEGER PRIMARY KEY AUTOINCREMENT,\
            name TEXT UNIQUE COLLATE NOCASE,\
            shortbio TEXT,\
            nb_albums INTEGER NOT NULL DEFAULT 0,\
            nb_tracks INTEGER NOT NULL DEFAULT 0,\
            nb_present_tracks INTEGER NOT NULL DEFAULT 0,\
            mb_id TEXT",
    );
    if version >= 2 {
        sql.push_str(",is_favorite BOOLEAN NOT NULL DEFAULT 0");
    }
    sql.push(')');
    sql
}

pub fn fts_schema(_version: u32) -> String {
    "CREATE VIRTUAL TABLE artist_fts USING fts5(name)".to_owned()
}

pub fn triggers(version: u32) -> Vec<(&'static str, String)> {
    let mut triggers = vec![
        (
            "artist_fts_insert",
            "CREATE TRIGGER artist_fts_insert AFTER INSERT ON artist \
             WHEN new.name IS NOT NULL \
             BEGIN \
                 INSERT INTO artist_fts(rowid, name) VALUES(new.id, new.name);\
             END"
                .to_owned(),
        ),
        (
            "artist_fts_delete",
            "CREATE TRIGGER artist_fts_delete AFTER DELETE ON artist \
             BEGIN \
                 DELETE FROM artist_fts WHERE rowid = old.id;\
             END"
                .to_owned(),
        ),
        (
            "artist_update_nb_albums_on_insert",
            "CREATE TRIGGER artist_update_nb_albums_on_insert AFTER INSERT ON album \
             WHEN new.artist_id IS NOT NULL \
             BEGIN \
                 UPDATE artist SET nb_albums = nb_albums + 1 WHERE id = new.artist_id;\
             END"
                .to_owned(),
        ),
        (
            "artist_update_nb_albums_on_delete",
            "CREATE TRIGGER artist_update_nb_albums_on_delete AFTER DELETE ON album \
             WHEN old.artist_id IS NOT NULL \
             BEGIN \
                 UPDATE artist SET nb_albums = nb_albums - 1 WHERE id = old.artist_id;\
             END"
                .to_owned(),
        ),
        (
            "artist_update_nb_albums_on_update",
            "CREATE TRIGGER artist_update_nb_albums_on_update \
             AFTER UPDATE OF artist_id ON album \
             WHEN IFNULL(old.artist_id, 0) != IFNULL(new.artist_id, 0) \
             BEGIN \
                 UPDATE artist SET nb_albums = nb_albums - 1 WHERE id = old.artist_id;\
                 UPDATE artist SET nb_albums = nb_albums + 1 WHERE id = new.artist_id;\
             END"
                .to_owned(),
        ),
        (
            "artist_delete_empty",
            "CREATE TRIGGER artist_delete_empty AFTER UPDATE ON artist \
             WHEN (old.nb_tracks > 0 OR old.nb_albums > 0) \
                  AND new.nb_tracks = 0 AND new.nb_albums = 0 AND new.id > 2 \
             BEGIN \
                 DELETE FROM artist WHERE id = new.id;\
             END"
                .to_owned(),
        ),
    ];
    if version >= 3 {
        triggers.push((
            "artist_update_on_media_change",
            "CREATE TRIGGER artist_update_on_media_change AFTER UPDATE ON media \
             WHEN IFNULL(old.artist_id, 0) != IFNULL(new.artist_id, 0) \
                  OR old.is_present != new.is_present \
             BEGIN \
                 UPDATE artist SET \
                     nb_tracks = nb_tracks - 1,\
                     nb_present_tracks = nb_present_tracks - (old.is_present != 0) \
                 WHERE IFNULL(old.artist_id, 0) != IFNULL(new.artist_id, 0) \
                       AND id = old.artist_id;\
                 UPDATE artist SET \
                     nb_tracks = nb_tracks + 1,\
                     nb_present_tracks = nb_present_tracks + (new.is_present != 0) \
                 WHERE IFNULL(old.artist_id, 0) != IFNULL(new.artist_id, 0) \
                       AND id = new.artist_id;\
                 UPDATE artist SET \
                     nb_present_tracks = nb_present_tracks + \
                         (CASE WHEN new.is_present != 0 THEN 1 ELSE -1 END) \
                 WHERE IFNULL(old.artist_id, 0) = IFNULL(new.artist_id, 0) \
                       AND old.is_present != new.is_present AND id = new.artist_id;\
             END"
                .to_owned(),
        ));
        triggers.push((
            "artist_update_on_media_delete",
            "CREATE TRIGGER artist_update_on_media_delete AFTER DELETE ON media \
             WHEN old.artist_id IS NOT NULL \
             BEGIN \
                 UPDATE artist SET \
                     nb_tracks = nb_tracks - 1,\
                     nb_present_tracks = nb_present_tracks - (old.is_present != 0) \
                 WHERE id = old.artist_id;\
             END"
                .to_owned(),
        ));
    } else {
        triggers.push((
            "artist_update_on_track_insert",
            "CREATE TRIGGER artist_update_on_track_insert AFTER INSERT ON album_track \
             WHEN new.artist_id IS NOT NULL \
             BEGIN \
                 UPDATE artist SET \
                     nb_tracks = nb_tracks + 1,\
                     nb_present_tracks = nb_present_tracks + 1 \
                 WHERE id = new.artist_id;\
             END"
                .to_owned(),
        ));
        triggers.push((
            "artist_update_on_track_delete",
            "CREATE TRIGGER artist_update_on_track_delete AFTER DELETE ON album_track \
             WHEN old.artist_id IS NOT NULL \
             BEGIN \
                 UPDATE artist SET \
                     nb_tracks = nb_tracks - 1,\
                     nb_present_tracks = nb_present_tracks - 1 \
                 WHERE id = old.artist_id;\
             END"
                .to_owned(),
        ));
    }
    triggers
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    Vec::new()
}

/// Insert the UnknownArtist and VariousArtists rows; part of table
/// creation, never repeated afterwards.
pub fn create_sentinels(conn: &Connection) -> Result<()> {
    sql::execute(
        conn,
        "INSERT INTO artist(id, name) VALUES(?1, NULL)",
        params![UNKNOWN_ARTIST_ID],
    )?;
    sql::execute(
        conn,
        "INSERT INTO artist(id, name) VALUES(?1, NULL)",
        params![VARIOUS_ARTISTS_ID],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// operations
// ---------------------------------------------------------------------------

pub fn create(conn: &Connection, name: &str) -> Result<Artist> {
    let id = sql::insert(conn, "INSERT INTO artist(name) VALUES(?1)", params![name])?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("artist", id))
}

pub fn fetch_or_create(conn: &Connection, name: &str) -> Result<Artist> {
    if let Some(existing) = fetch_by_name(conn, name)? {
        return Ok(existing);
    }
    create(conn, name)
}

pub fn fetch(conn: &Connection, id: i64) -> Result<Option<Artist>> {
    let q = format!("SELECT {COLS} FROM artist WHERE id = ?1");
    sql::query_row_opt(conn, &q, params![id], Artist::from_row)
}

pub fn fetch_by_name(conn: &Connection, name: &str) -> Result<Option<Artist>> {
    let q = format!("SELECT {COLS} FROM artist WHERE name = ?1");
    sql::query_row_opt(conn, &q, params![name], Artist::from_row)
}

pub fn set_shortbio(conn: &Connection, id: i64, shortbio: &str) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE artist SET shortbio = ?2 WHERE id = ?1",
        params![id, shortbio],
    )?;
    Ok(n > 0)
}

pub fn set_mb_id(conn: &Connection, id: i64, mb_id: &str) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE artist SET mb_id = ?2 WHERE id = ?1",
        params![id, mb_id],
    )?;
    Ok(n > 0)
}

pub fn set_favorite(conn: &Connection, id: i64, favorite: bool) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE artist SET is_favorite = ?2 WHERE id = ?1",
        params![id, favorite],
    )?;
    Ok(n > 0)
}

/// Install artist artwork. A thumbnail shared with another entity is
/// never mutated in place; a new row is inserted instead.
pub fn set_thumbnail(
    conn: &Connection,
    id: i64,
    mrl: &str,
    origin: reelvault_core::ThumbnailOrigin,
    is_owned: bool,
) -> Result<bool> {
    crate::entities::thumbnail::update_or_replace(
        conn,
        reelvault_core::ThumbnailEntity::Artist,
        id,
        reelvault_core::ThumbnailSizeType::Thumbnail,
        mrl,
        origin,
        is_owned,
        crate::entities::thumbnail::artist_should_update,
    )
    .map(|_| true)
}

// ---------------------------------------------------------------------------
// queries
// ---------------------------------------------------------------------------

fn order_by(params: &QueryParameters) -> String {
    let (column, swap) = match params.sort {
        SortingCriteria::Default | SortingCriteria::Alpha => ("name", false),
        SortingCriteria::NbAlbum => ("nb_albums", true),
        SortingCriteria::NbMedia => ("nb_tracks", true),
        other => {
            tracing::warn!("unsupported sort criterion {other:?} for artists, using name");
            ("name", false)
        }
    };
    let desc = params.desc ^ swap;
    format!("ORDER BY {column}{}", if desc { " DESC" } else { "" })
}

/// Every named artist with at least one track or album; sentinels are
/// not listed.
pub fn list_all<'db>(db: &'db Database, params: &QueryParameters) -> PagedQuery<'db, Artist> {
    let mut base = String::from("artist WHERE id > 2 AND (nb_tracks > 0 OR nb_albums > 0)");
    if params.favorite_only {
        base.push_str(" AND is_favorite != 0");
    }
    PagedQuery::new(db, COLS, base, order_by(params), "id", Artist::from_row)
}

pub fn search<'db>(
    db: &'db Database,
    pattern: &str,
    params: &QueryParameters,
) -> PagedQuery<'db, Artist> {
    let Some(pattern) = sql::sanitize_pattern(pattern) else {
        return PagedQuery::empty(db);
    };
    let base = "artist WHERE id IN (SELECT rowid FROM artist_fts WHERE artist_fts MATCH ?1)";
    PagedQuery::new(db, COLS, base, order_by(params), "id", Artist::from_row).param(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn sentinels_exist_after_creation() {
        let db = testing::db();
        let ctx = db.read().unwrap();
        let unknown = fetch(&ctx, UNKNOWN_ARTIST_ID).unwrap().unwrap();
        let various = fetch(&ctx, VARIOUS_ARTISTS_ID).unwrap().unwrap();
        assert!(unknown.is_sentinel());
        assert!(various.is_sentinel());
        assert!(unknown.name.is_none());
    }

    #[test]
    fn sentinels_survive_counter_zeroing() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        // Force a counter transition through zero on a sentinel.
        sql::execute(
            &ctx,
            "UPDATE artist SET nb_tracks = 1 WHERE id = ?1",
            params![UNKNOWN_ARTIST_ID],
        )
        .unwrap();
        sql::execute(
            &ctx,
            "UPDATE artist SET nb_tracks = 0 WHERE id = ?1",
            params![UNKNOWN_ARTIST_ID],
        )
        .unwrap();
        assert!(fetch(&ctx, UNKNOWN_ARTIST_ID).unwrap().is_some());
    }

    #[test]
    fn empty_regular_artist_is_deleted() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        let artist = create(&ctx, "Disposable").unwrap();
        sql::execute(
            &ctx,
            "UPDATE artist SET nb_tracks = 1 WHERE id = ?1",
            params![artist.id],
        )
        .unwrap();
        sql::execute(
            &ctx,
            "UPDATE artist SET nb_tracks = 0 WHERE id = ?1",
            params![artist.id],
        )
        .unwrap();
        assert!(fetch(&ctx, artist.id).unwrap().is_none());
    }

    #[test]
    fn fetch_or_create_dedups() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        let a = fetch_or_create(&ctx, "Nina Simone").unwrap();
        let b = fetch_or_create(&ctx, "nina simone").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn search_matches_prefix() {
        let db = testing::db();
        {
            let ctx = db.write().unwrap();
            create(&ctx, "Radiohead").unwrap();
            create(&ctx, "Portishead").unwrap();
        }
        let found = search(&db, "radio", &QueryParameters::default()).all().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name.as_deref(), Some("Radiohead"));
    }
}
