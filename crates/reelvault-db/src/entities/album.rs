//! Albums and their track/duration/presence counters.
//!
//! A NULL title marks the per-artist "unknown album" container. All
//! counters are maintained by triggers on the media table; an album
//! whose last track goes away deletes itself.

use rusqlite::{params, Connection, Row};

use reelvault_core::{Error, QueryParameters, Result, SortingCriteria};

use crate::entities::media::{self, Media};
use crate::pool::Database;
use crate::query::PagedQuery;
use crate::sql::{self, Fk};

#[derive(Debug, Clone)]
pub struct Album {
    pub id: i64,
    pub title: Option<String>,
    pub artist_id: Option<i64>,
    pub release_year: Option<i64>,
    pub short_summary: Option<String>,
    pub nb_tracks: i64,
    pub nb_present_tracks: i64,
    pub duration: i64,
    pub nb_discs: i64,
    pub is_favorite: bool,
}

const COLS: &str = "id, title, artist_id, release_year, short_summary, nb_tracks, \
    nb_present_tracks, duration, nb_discs, is_favorite";

/// Conflicting track release years collapse to this sentinel.
const RELEASE_YEAR_CONFLICT: i64 = -1;

impl Album {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            artist_id: row.get(2)?,
            release_year: row.get(3)?,
            short_summary: row.get(4)?,
            nb_tracks: row.get(5)?,
            nb_present_tracks: row.get(6)?,
            duration: row.get(7)?,
            nb_discs: row.get(8)?,
            is_favorite: row.get(9)?,
        })
    }
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

pub fn schema(version: u32) -> String {
    let mut sql = String::from(
        "CREATE TABLE album(\
            id INTEGER PRIMARY KEY AUTOINCREMENT,\
            title TEXT COLLATE NOCASE,\
            artist_id INTEGER REFERENCES artist(id),\
            release_year INTEGER,\
            short_summary TEXT,\
            nb_tracks INTEGER NOT NULL DEFAULT 0,\
            nb_present_tracks INTEGER NOT NULL DEFAULT 0,\
            duration INTEGER NOT NULL DEFAULT 0,\
            nb_discs INTEGER NOT NULL DEFAULT 1",
    );
    if version >= 2 {
        sql.push_str(",is_favorite BOOLEAN NOT NULL DEFAULT 0");
    }
    sql.push(')');
    sql
}

pub fn fts_schema(_version: u32) -> String {
    "CREATE VIRTUAL TABLE album_fts USING fts5(title)".to_owned()
}

pub fn triggers(version: u32) -> Vec<(&'static str, String)> {
    let mut triggers = vec![
        (
            "album_fts_insert",
            "CREATE TRIGGER album_fts_insert AFTER INSERT ON album \
             WHEN new.title IS NOT NULL \
             BEGIN \
                 INSERT INTO album_fts(rowid, title) VALUES(new.id, new.title);\
             END"
                .to_owned(),
        ),
        (
            "album_fts_delete",
            "CREATE TRIGGER album_fts_delete AFTER DELETE ON album \
             BEGIN \
                 DELETE FROM album_fts WHERE rowid = old.id;\
             END"
                .to_owned(),
        ),
        (
            "album_delete_empty",
            "CREATE TRIGGER album_delete_empty AFTER UPDATE ON album \
             WHEN old.nb_tracks > 0 AND new.nb_tracks = 0 \
             BEGIN \
                 DELETE FROM album WHERE id = new.id;\
             END"
                .to_owned(),
        ),
    ];
    if version >= 3 {
        triggers.push((
            "album_update_on_media_change",
            "CREATE TRIGGER album_update_on_media_change AFTER UPDATE ON media \
             WHEN IFNULL(old.album_id, 0) != IFNULL(new.album_id, 0) \
                  OR old.is_present != new.is_present \
                  OR old.duration != new.duration \
             BEGIN \
                 UPDATE album SET \
                     nb_tracks = nb_tracks - 1,\
                     nb_present_tracks = nb_present_tracks - (old.is_present != 0),\
                     duration = duration - MAX(old.duration, 0) \
                 WHERE IFNULL(old.album_id, 0) != IFNULL(new.album_id, 0) \
                       AND id = old.album_id;\
                 UPDATE album SET \
                     nb_tracks = nb_tracks + 1,\
                     nb_present_tracks = nb_present_tracks + (new.is_present != 0),\
                     duration = duration + MAX(new.duration, 0) \
                 WHERE IFNULL(old.album_id, 0) != IFNULL(new.album_id, 0) \
                       AND id = new.album_id;\
                 UPDATE album SET \
                     nb_present_tracks = nb_present_tracks + \
                         (CASE WHEN new.is_present != 0 THEN 1 ELSE -1 END) \
                 WHERE IFNULL(old.album_id, 0) = IFNULL(new.album_id, 0) \
                       AND old.is_present != new.is_present AND id = new.album_id;\
                 UPDATE album SET \
                     duration = duration + MAX(new.duration, 0) - MAX(old.duration, 0) \
                 WHERE IFNULL(old.album_id, 0) = IFNULL(new.album_id, 0) \
                       AND old.duration != new.duration AND id = new.album_id;\
             END"
                .to_owned(),
        ));
        triggers.push((
            "album_update_on_media_delete",
            "CREATE TRIGGER album_update_on_media_delete AFTER DELETE ON media \
             WHEN old.album_id IS NOT NULL \
             BEGIN \
                 UPDATE album SET \
                     nb_tracks = nb_tracks - 1,\
                     nb_present_tracks = nb_present_tracks - (old.is_present != 0),\
                     duration = duration - MAX(old.duration, 0) \
                 WHERE id = old.album_id;\
             END"
                .to_owned(),
        ));
    } else {
        triggers.push((
            "album_update_on_track_insert",
            "CREATE TRIGGER album_update_on_track_insert AFTER INSERT ON album_track \
             BEGIN \
                 UPDATE album SET \
                     nb_tracks = nb_tracks + 1,\
                     nb_present_tracks = nb_present_tracks + 1,\
                     duration = duration + MAX(new.duration, 0) \
                 WHERE id = new.album_id;\
             END"
                .to_owned(),
        ));
        triggers.push((
            "album_update_on_track_delete",
            "CREATE TRIGGER album_update_on_track_delete AFTER DELETE ON album_track \
             BEGIN \
                 UPDATE album SET \
                     nb_tracks = nb_tracks - 1,\
                     nb_present_tracks = nb_present_tracks - 1,\
                     duration = duration - MAX(old.duration, 0) \
                 WHERE id = old.album_id;\
             END"
                .to_owned(),
        ));
    }
    triggers
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    vec![(
        "album_artist_idx",
        "CREATE INDEX album_artist_idx ON album(artist_id)".to_owned(),
    )]
}

// ---------------------------------------------------------------------------
// operations
// ---------------------------------------------------------------------------

pub fn create(conn: &Connection, title: &str, artist_id: i64) -> Result<Album> {
    let id = sql::insert(
        conn,
        "INSERT INTO album(title, artist_id) VALUES(?1, ?2)",
        params![title, Fk(artist_id)],
    )?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("album", id))
}

/// The per-artist container for tracks without album information.
pub fn unknown_album(conn: &Connection, artist_id: i64) -> Result<Album> {
    let q = format!("SELECT {COLS} FROM album WHERE title IS NULL AND artist_id = ?1");
    if let Some(existing) = sql::query_row_opt(conn, &q, params![artist_id], Album::from_row)? {
        return Ok(existing);
    }
    let id = sql::insert(
        conn,
        "INSERT INTO album(title, artist_id) VALUES(NULL, ?1)",
        params![Fk(artist_id)],
    )?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("album", id))
}

pub fn fetch(conn: &Connection, id: i64) -> Result<Option<Album>> {
    let q = format!("SELECT {COLS} FROM album WHERE id = ?1");
    sql::query_row_opt(conn, &q, params![id], Album::from_row)
}

/// Attach a media as a track of this album.
///
/// The media row is re-pointed (subtype, album/artist/genre ids, track
/// and disc numbers); every counter adjustment happens in the triggers.
/// The album's disc count grows with the highest disc seen.
pub fn add_track(
    conn: &Connection,
    album: &Album,
    media: &Media,
    track_number: u32,
    disc_number: u32,
    artist_id: i64,
    genre_id: i64,
) -> Result<bool> {
    if !media::mark_as_album_track(
        conn,
        media.id,
        album.id,
        track_number,
        disc_number,
        artist_id,
        genre_id,
    )? {
        return Ok(false);
    }
    sql::execute(
        conn,
        "UPDATE album SET nb_discs = MAX(nb_discs, ?2) WHERE id = ?1",
        params![album.id, disc_number],
    )?;
    Ok(true)
}

/// Record a track's release year; disagreeing tracks collapse the album
/// year to the conflict sentinel.
pub fn set_release_year(conn: &Connection, id: i64, year: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE album SET release_year = CASE
                WHEN release_year IS NULL THEN ?2
                WHEN release_year = ?2 THEN release_year
                ELSE ?3 END
         WHERE id = ?1",
        params![id, year, RELEASE_YEAR_CONFLICT],
    )?;
    Ok(n > 0)
}

pub fn set_short_summary(conn: &Connection, id: i64, summary: &str) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE album SET short_summary = ?2 WHERE id = ?1",
        params![id, summary],
    )?;
    Ok(n > 0)
}

pub fn set_favorite(conn: &Connection, id: i64, favorite: bool) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE album SET is_favorite = ?2 WHERE id = ?1",
        params![id, favorite],
    )?;
    Ok(n > 0)
}

/// Install album artwork. Only cover-file artwork is overwritten in
/// place; other origins keep their row and a new one is linked.
pub fn set_thumbnail(
    conn: &Connection,
    id: i64,
    mrl: &str,
    origin: reelvault_core::ThumbnailOrigin,
    is_owned: bool,
) -> Result<bool> {
    crate::entities::thumbnail::update_or_replace(
        conn,
        reelvault_core::ThumbnailEntity::Album,
        id,
        reelvault_core::ThumbnailSizeType::Thumbnail,
        mrl,
        origin,
        is_owned,
        crate::entities::thumbnail::album_should_update,
    )
    .map(|_| true)
}

// ---------------------------------------------------------------------------
// queries
// ---------------------------------------------------------------------------

fn order_by(params: &QueryParameters) -> String {
    let (column, swap) = match params.sort {
        SortingCriteria::Default | SortingCriteria::Alpha => ("title", false),
        SortingCriteria::ReleaseDate => ("release_year", false),
        SortingCriteria::Duration => ("duration", false),
        SortingCriteria::NbMedia => ("nb_tracks", true),
        other => {
            tracing::warn!("unsupported sort criterion {other:?} for albums, using title");
            ("title", false)
        }
    };
    let desc = params.desc ^ swap;
    format!("ORDER BY {column}{}", if desc { " DESC" } else { "" })
}

pub fn list_all<'db>(db: &'db Database, params: &QueryParameters) -> PagedQuery<'db, Album> {
    let mut base = String::from("album WHERE nb_tracks > 0");
    if !params.include_missing {
        base.push_str(" AND nb_present_tracks > 0");
    }
    if params.favorite_only {
        base.push_str(" AND is_favorite != 0");
    }
    PagedQuery::new(db, COLS, base, order_by(params), "id", Album::from_row)
}

pub fn from_artist<'db>(
    db: &'db Database,
    artist_id: i64,
    params: &QueryParameters,
) -> PagedQuery<'db, Album> {
    let base = "album WHERE artist_id = ?1 AND nb_tracks > 0";
    PagedQuery::new(db, COLS, base, order_by(params), "id", Album::from_row).param(artist_id)
}

pub fn search<'db>(
    db: &'db Database,
    pattern: &str,
    params: &QueryParameters,
) -> PagedQuery<'db, Album> {
    let Some(pattern) = sql::sanitize_pattern(pattern) else {
        return PagedQuery::empty(db);
    };
    let base = "album WHERE id IN (SELECT rowid FROM album_fts WHERE album_fts MATCH ?1)";
    PagedQuery::new(db, COLS, base, order_by(params), "id", Album::from_row).param(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{artist, device, folder, genre};
    use crate::pool::Database;
    use crate::testing;
    use reelvault_core::MediaType;

    fn track(ctx: &Connection, dev: i64, dir: i64, name: &str, duration: i64) -> Media {
        media::create(ctx, MediaType::Audio, dev, dir, name, duration).unwrap()
    }

    fn setup(db: &Database) -> (i64, i64) {
        let ctx = db.write().unwrap();
        let dev = device::create(&ctx, "d", "file://", false, false).unwrap();
        let dir = folder::create(&ctx, "/m/", "m", 0, dev.id, false).unwrap();
        (dev.id, dir.id)
    }

    #[test]
    fn counters_and_duration_follow_tracks() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        let ctx = db.write().unwrap();
        let x = artist::create(&ctx, "X").unwrap();
        let album = create(&ctx, "A", x.id).unwrap();

        let t1 = track(&ctx, dev, dir, "01.flac", 100);
        let t2 = track(&ctx, dev, dir, "02.flac", 200);
        let t3 = track(&ctx, dev, dir, "03.flac", 300);
        for (i, t) in [&t1, &t2, &t3].iter().enumerate() {
            assert!(add_track(&ctx, &album, t, i as u32 + 1, 1, x.id, 0).unwrap());
        }

        let album = fetch(&ctx, album.id).unwrap().unwrap();
        assert_eq!(album.nb_tracks, 3);
        assert_eq!(album.nb_present_tracks, 3);
        assert_eq!(album.duration, 600);

        media::delete(&ctx, t2.id).unwrap();
        let album = fetch(&ctx, album.id).unwrap().unwrap();
        assert_eq!(album.nb_tracks, 2);
        assert_eq!(album.duration, 400);
    }

    #[test]
    fn album_deleted_with_last_track() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        let ctx = db.write().unwrap();
        let x = artist::create(&ctx, "X").unwrap();
        let album = create(&ctx, "A", x.id).unwrap();
        let t = track(&ctx, dev, dir, "only.flac", 100);
        add_track(&ctx, &album, &t, 1, 1, x.id, 0).unwrap();

        media::delete(&ctx, t.id).unwrap();
        assert!(fetch(&ctx, album.id).unwrap().is_none());
        // The artist lost its only album and track and is collected too.
        assert!(artist::fetch(&ctx, x.id).unwrap().is_none());
    }

    #[test]
    fn genre_counts_follow_album_tracks() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        let ctx = db.write().unwrap();
        let x = artist::create(&ctx, "X").unwrap();
        let g = genre::create(&ctx, "Jazz").unwrap();
        let album = create(&ctx, "A", x.id).unwrap();
        let t = track(&ctx, dev, dir, "t.flac", 100);
        add_track(&ctx, &album, &t, 1, 1, x.id, g.id).unwrap();

        let g = genre::fetch(&ctx, g.id).unwrap().unwrap();
        assert_eq!(g.nb_tracks, 1);

        media::delete(&ctx, t.id).unwrap();
        assert!(genre::fetch(&ctx, g.id).unwrap().is_none());
    }

    #[test]
    fn presence_counters_track_device() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        let ctx = db.write().unwrap();
        let x = artist::create(&ctx, "X").unwrap();
        let album = create(&ctx, "A", x.id).unwrap();
        let t = track(&ctx, dev, dir, "t.flac", 100);
        add_track(&ctx, &album, &t, 1, 1, x.id, 0).unwrap();

        device::set_present(&ctx, dev, false).unwrap();
        let album = fetch(&ctx, album.id).unwrap().unwrap();
        assert_eq!(album.nb_tracks, 1);
        assert_eq!(album.nb_present_tracks, 0);

        let x = artist::fetch(&ctx, x.id).unwrap().unwrap();
        assert_eq!(x.nb_present_tracks, 0);
        assert_eq!(x.nb_tracks, 1);
    }

    #[test]
    fn release_year_conflict_collapses() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        let album = create(&ctx, "A", 0).unwrap();
        set_release_year(&ctx, album.id, 1999).unwrap();
        assert_eq!(fetch(&ctx, album.id).unwrap().unwrap().release_year, Some(1999));
        set_release_year(&ctx, album.id, 1999).unwrap();
        assert_eq!(fetch(&ctx, album.id).unwrap().unwrap().release_year, Some(1999));
        set_release_year(&ctx, album.id, 2001).unwrap();
        assert_eq!(
            fetch(&ctx, album.id).unwrap().unwrap().release_year,
            Some(RELEASE_YEAR_CONFLICT)
        );
    }

    #[test]
    fn disc_count_follows_highest_disc() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        let ctx = db.write().unwrap();
        let x = artist::create(&ctx, "X").unwrap();
        let album = create(&ctx, "A", x.id).unwrap();
        let t1 = track(&ctx, dev, dir, "1.flac", 10);
        let t2 = track(&ctx, dev, dir, "2.flac", 10);
        add_track(&ctx, &album, &t1, 1, 1, x.id, 0).unwrap();
        add_track(&ctx, &album, &t2, 1, 2, x.id, 0).unwrap();
        assert_eq!(fetch(&ctx, album.id).unwrap().unwrap().nb_discs, 2);
    }

    #[test]
    fn from_artist_and_search() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        {
            let ctx = db.write().unwrap();
            let x = artist::create(&ctx, "X").unwrap();
            let album = create(&ctx, "Blue Lines", x.id).unwrap();
            let t = track(&ctx, dev, dir, "t.flac", 10);
            add_track(&ctx, &album, &t, 1, 1, x.id, 0).unwrap();
        }
        let ctx = db.read().unwrap();
        let x = artist::fetch_by_name(&ctx, "X").unwrap().unwrap();
        drop(ctx);

        let albums = from_artist(&db, x.id, &QueryParameters::default()).all().unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(x.nb_albums, 1);

        let found = search(&db, "blue", &QueryParameters::default()).all().unwrap();
        assert_eq!(found.len(), 1);
    }
}
