//! Media items: the central entity of the catalog.
//!
//! Every derived counter in the schema (album/artist/genre track counts,
//! group counters, folder counters) is keyed on columns of this table
//! and maintained by triggers owned by the respective entity modules;
//! the operations here only flip the driving columns.

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use reelvault_core::{
    Error, ImportType, MediaSubtype, MediaType, ProgressResult, QueryParameters, Result,
    SortingCriteria,
};

use crate::pool::Database;
use crate::query::PagedQuery;
use crate::sql::{self, Fk};

/// Playback positions closer than this to either end are discarded.
const PROGRESS_MARGIN: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct Media {
    pub id: i64,
    pub media_type: MediaType,
    pub subtype: MediaSubtype,
    pub duration: i64,
    pub last_position: f64,
    pub last_time: i64,
    pub play_count: i64,
    pub last_played_date: Option<i64>,
    pub insertion_date: i64,
    pub release_date: Option<i64>,
    pub title: Option<String>,
    pub filename: Option<String>,
    pub is_favorite: bool,
    pub is_present: bool,
    pub device_id: Option<i64>,
    pub nb_playlists: i64,
    pub folder_id: Option<i64>,
    pub import_type: ImportType,
    pub forced_title: bool,
    pub artist_id: Option<i64>,
    pub genre_id: Option<i64>,
    pub track_number: Option<i64>,
    pub album_id: Option<i64>,
    pub disc_number: Option<i64>,
    pub group_id: Option<i64>,
}

pub(crate) const COLS: &str = "id, type, subtype, duration, last_position, last_time, \
    play_count, last_played_date, insertion_date, release_date, title, filename, \
    is_favorite, is_present, device_id, nb_playlists, folder_id, import_type, \
    forced_title, artist_id, genre_id, track_number, album_id, disc_number, group_id";

impl Media {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            media_type: row.get(1)?,
            subtype: row.get(2)?,
            duration: row.get(3)?,
            last_position: row.get(4)?,
            last_time: row.get(5)?,
            play_count: row.get(6)?,
            last_played_date: row.get(7)?,
            insertion_date: row.get(8)?,
            release_date: row.get(9)?,
            title: row.get(10)?,
            filename: row.get(11)?,
            is_favorite: row.get(12)?,
            is_present: row.get(13)?,
            device_id: row.get(14)?,
            nb_playlists: row.get(15)?,
            folder_id: row.get(16)?,
            import_type: row.get(17)?,
            forced_title: row.get(18)?,
            artist_id: row.get(19)?,
            genre_id: row.get(20)?,
            track_number: row.get(21)?,
            album_id: row.get(22)?,
            disc_number: row.get(23)?,
            group_id: row.get(24)?,
        })
    }

    /// A media discovered by the library, as opposed to user-provided.
    pub fn is_discovered(&self) -> bool {
        self.import_type == ImportType::Internal
    }
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

pub fn schema(version: u32) -> String {
    let mut sql = String::from(
        "CREATE TABLE media(\
            id INTEGER PRIMARY KEY AUTOINCREMENT,\
            type INTEGER NOT NULL,\
            subtype INTEGER NOT NULL DEFAULT 0,\
            duration INTEGER NOT NULL DEFAULT -1,\
            last_position REAL NOT NULL DEFAULT -1,\
            last_time INTEGER NOT NULL DEFAULT -1,\
            play_count INTEGER NOT NULL DEFAULT 0,\
            last_played_date INTEGER,\
            insertion_date INTEGER NOT NULL,\
            release_date INTEGER,\
            title TEXT COLLATE NOCASE,\
            filename TEXT COLLATE NOCASE,",
    );
    if version >= 2 {
        sql.push_str("is_favorite BOOLEAN NOT NULL DEFAULT 0,");
    }
    sql.push_str(
        "is_present BOOLEAN NOT NULL DEFAULT 1 CHECK(is_present IN (0, 1)),\
         device_id INTEGER REFERENCES device(id) ON DELETE CASCADE,\
         nb_playlists INTEGER NOT NULL DEFAULT 0,\
         folder_id INTEGER REFERENCES folder(id) ON DELETE CASCADE,\
         import_type INTEGER NOT NULL DEFAULT 0,\
         forced_title BOOLEAN NOT NULL DEFAULT 0",
    );
    if version >= 3 {
        sql.push_str(
            ",artist_id INTEGER REFERENCES artist(id),\
             genre_id INTEGER REFERENCES genre(id),\
             track_number INTEGER,\
             album_id INTEGER REFERENCES album(id),\
             disc_number INTEGER",
        );
    }
    if version >= 4 {
        sql.push_str(",group_id INTEGER REFERENCES media_group(id)");
    }
    sql.push(')');
    sql
}

pub fn fts_schema(_version: u32) -> String {
    "CREATE VIRTUAL TABLE media_fts USING fts5(title, filename)".to_owned()
}

pub fn triggers(_version: u32) -> Vec<(&'static str, String)> {
    vec![
        (
            "media_fts_insert",
            "CREATE TRIGGER media_fts_insert AFTER INSERT ON media \
             BEGIN \
                 INSERT INTO media_fts(rowid, title, filename) \
                 VALUES(new.id, new.title, new.filename);\
             END"
                .to_owned(),
        ),
        (
            "media_fts_delete",
            "CREATE TRIGGER media_fts_delete AFTER DELETE ON media \
             BEGIN \
                 DELETE FROM media_fts WHERE rowid = old.id;\
             END"
                .to_owned(),
        ),
        (
            "media_fts_update",
            "CREATE TRIGGER media_fts_update AFTER UPDATE OF title, filename ON media \
             BEGIN \
                 UPDATE media_fts SET title = new.title, filename = new.filename \
                 WHERE rowid = new.id;\
             END"
                .to_owned(),
        ),
    ]
}

pub fn indexes(version: u32) -> Vec<(&'static str, String)> {
    let mut indexes = vec![
        (
            "media_last_played_date_idx",
            "CREATE INDEX media_last_played_date_idx ON media(last_played_date)".to_owned(),
        ),
        (
            "media_types_idx",
            "CREATE INDEX media_types_idx ON media(type, subtype)".to_owned(),
        ),
        (
            "media_folder_idx",
            "CREATE INDEX media_folder_idx ON media(folder_id)".to_owned(),
        ),
        (
            "media_presence_idx",
            "CREATE INDEX media_presence_idx ON media(is_present)".to_owned(),
        ),
    ];
    if version >= 3 {
        indexes.push((
            "media_album_track_idx",
            "CREATE INDEX media_album_track_idx ON media(album_id, genre_id, artist_id)"
                .to_owned(),
        ));
    }
    if version >= 4 {
        indexes.push((
            "media_group_idx",
            "CREATE INDEX media_group_idx ON media(group_id)".to_owned(),
        ));
    }
    indexes
}

// ---------------------------------------------------------------------------
// creation
// ---------------------------------------------------------------------------

/// Insert a discovered media, present iff its device is.
pub fn create(
    conn: &Connection,
    media_type: MediaType,
    device_id: i64,
    folder_id: i64,
    filename: &str,
    duration: i64,
) -> Result<Media> {
    let present: bool = sql::query_row_opt(
        conn,
        "SELECT is_present FROM device WHERE id = ?1",
        params![device_id],
        |row| row.get(0),
    )?
    .unwrap_or(true);
    let now = Utc::now().timestamp();
    let id = sql::insert(
        conn,
        "INSERT INTO media(type, insertion_date, title, filename, duration,
                device_id, folder_id, import_type, is_present)
         VALUES(?1, ?2, ?3, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            media_type,
            now,
            filename,
            duration,
            Fk(device_id),
            Fk(folder_id),
            ImportType::Internal,
            present,
        ],
    )?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("media", id))
}

/// Insert an external media: no device, no folder, never analyzed.
pub fn create_external(conn: &Connection, title: &str, duration: i64) -> Result<Media> {
    create_import(conn, title, duration, ImportType::External)
}

/// Insert a stream, a specific kind of external media.
pub fn create_stream(conn: &Connection, mrl: &str) -> Result<Media> {
    create_import(conn, mrl, -1, ImportType::Stream)
}

fn create_import(
    conn: &Connection,
    title: &str,
    duration: i64,
    import_type: ImportType,
) -> Result<Media> {
    let id = sql::insert(
        conn,
        "INSERT INTO media(type, insertion_date, title, filename, duration, import_type)
         VALUES(?1, ?2, ?3, ?3, ?4, ?5)",
        params![
            MediaType::Unknown,
            Utc::now().timestamp(),
            title,
            duration,
            import_type,
        ],
    )?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("media", id))
}

// ---------------------------------------------------------------------------
// lookups
// ---------------------------------------------------------------------------

pub fn fetch(conn: &Connection, id: i64) -> Result<Option<Media>> {
    let q = format!("SELECT {COLS} FROM media WHERE id = ?1");
    sql::query_row_opt(conn, &q, params![id], Media::from_row)
}

/// Resolve a media through its main file's mrl.
pub fn fetch_by_mrl(conn: &Connection, mrl: &str) -> Result<Option<Media>> {
    let q = format!(
        "SELECT {COLS} FROM media WHERE id = \
         (SELECT media_id FROM file WHERE mrl = ?1 AND type = 0)"
    );
    sql::query_row_opt(conn, &q, params![mrl], Media::from_row)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let n = sql::execute(conn, "DELETE FROM media WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

// ---------------------------------------------------------------------------
// mutations
// ---------------------------------------------------------------------------

pub fn set_type(conn: &Connection, id: i64, media_type: MediaType) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE media SET type = ?2 WHERE id = ?1",
        params![id, media_type],
    )?;
    Ok(n > 0)
}

pub fn set_duration(conn: &Connection, id: i64, duration: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE media SET duration = ?2 WHERE id = ?1",
        params![id, duration],
    )?;
    Ok(n > 0)
}

pub fn set_release_date(conn: &Connection, id: i64, date: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE media SET release_date = ?2 WHERE id = ?1",
        params![id, date],
    )?;
    Ok(n > 0)
}

pub fn set_favorite(conn: &Connection, id: i64, favorite: bool) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE media SET is_favorite = ?2 WHERE id = ?1",
        params![id, favorite],
    )?;
    Ok(n > 0)
}

/// Set the title. A user-forced title wins over later analyzer updates:
/// a non-forced write against a forced title is a no-op.
pub fn set_title(conn: &Connection, id: i64, title: &str, forced: bool) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE media SET title = ?2, forced_title = ?3
         WHERE id = ?1 AND (forced_title = 0 OR ?3 != 0)",
        params![id, title, forced],
    )?;
    Ok(n > 0)
}

/// Denormalized album-track linkage; counter triggers react to the
/// column flips.
pub fn mark_as_album_track(
    conn: &Connection,
    id: i64,
    album_id: i64,
    track_number: u32,
    disc_number: u32,
    artist_id: i64,
    genre_id: i64,
) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE media SET subtype = ?2, album_id = ?3, track_number = ?4,
                disc_number = ?5, artist_id = ?6, genre_id = ?7
         WHERE id = ?1",
        params![
            id,
            MediaSubtype::AlbumTrack,
            album_id,
            track_number,
            disc_number,
            Fk(artist_id),
            Fk(genre_id),
        ],
    )?;
    Ok(n > 0)
}

/// Detach the media from its device and folder and from every derived
/// holder, making it an external media. Counter decrements happen in
/// the album/artist/genre/group/folder triggers.
pub fn convert_to_external(conn: &Connection, id: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE media SET import_type = ?2, device_id = NULL, folder_id = NULL,
                subtype = 0, album_id = NULL, artist_id = NULL, genre_id = NULL,
                track_number = NULL, disc_number = NULL, group_id = NULL,
                is_present = 1
         WHERE id = ?1",
        params![id, ImportType::External],
    )?;
    Ok(n > 0)
}

/// Classify and store a playback position in `[0, 1]`.
pub fn set_last_position(conn: &Connection, media: &Media, position: f64) -> Result<ProgressResult> {
    if !(0.0..=1.0).contains(&position) {
        return Ok(ProgressResult::Error);
    }
    // Without a duration the position cannot be classified.
    if media.duration <= 0 {
        let updated = sql::execute(
            conn,
            "UPDATE media SET last_position = ?2, last_time = -1, last_played_date = ?3
             WHERE id = ?1",
            params![media.id, position, Utc::now().timestamp()],
        )?;
        return Ok(if updated > 0 {
            ProgressResult::AsIs
        } else {
            ProgressResult::Error
        });
    }
    if position < PROGRESS_MARGIN {
        sql::execute(
            conn,
            "UPDATE media SET last_position = -1, last_time = -1 WHERE id = ?1",
            params![media.id],
        )?;
        return Ok(ProgressResult::Begin);
    }
    if position > 1.0 - PROGRESS_MARGIN {
        sql::execute(
            conn,
            "UPDATE media SET last_position = -1, last_time = -1,
                    play_count = play_count + 1, last_played_date = ?2
             WHERE id = ?1",
            params![media.id, Utc::now().timestamp()],
        )?;
        return Ok(ProgressResult::End);
    }
    let last_time = (position * media.duration as f64) as i64;
    sql::execute(
        conn,
        "UPDATE media SET last_position = ?2, last_time = ?3, last_played_date = ?4
         WHERE id = ?1",
        params![media.id, position, last_time, Utc::now().timestamp()],
    )?;
    Ok(ProgressResult::AsIs)
}

/// Store a playback time in milliseconds, classified against the
/// duration when one is known.
pub fn set_last_time(conn: &Connection, media: &Media, last_time: i64) -> Result<ProgressResult> {
    if media.duration > 0 {
        return set_last_position(conn, media, last_time as f64 / media.duration as f64);
    }
    let updated = sql::execute(
        conn,
        "UPDATE media SET last_time = ?2, last_position = -1, last_played_date = ?3
         WHERE id = ?1",
        params![media.id, last_time, Utc::now().timestamp()],
    )?;
    Ok(if updated > 0 {
        ProgressResult::AsIs
    } else {
        ProgressResult::Error
    })
}

/// Install media artwork; user-provided artwork always wins.
pub fn set_thumbnail(
    conn: &Connection,
    id: i64,
    size_type: reelvault_core::ThumbnailSizeType,
    mrl: &str,
    origin: reelvault_core::ThumbnailOrigin,
    is_owned: bool,
) -> Result<bool> {
    crate::entities::thumbnail::update_or_replace(
        conn,
        reelvault_core::ThumbnailEntity::Media,
        id,
        size_type,
        mrl,
        origin,
        is_owned,
        |_| true,
    )
    .map(|_| true)
}

pub fn set_play_count(conn: &Connection, id: i64, play_count: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE media SET play_count = ?2 WHERE id = ?1",
        params![id, play_count],
    )?;
    Ok(n > 0)
}

/// Erase the playback state of one media.
pub fn remove_from_history(conn: &Connection, id: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE media SET play_count = 0, last_played_date = NULL,
                last_position = -1, last_time = -1
         WHERE id = ?1",
        params![id],
    )?;
    Ok(n > 0)
}

/// Erase the playback state of every media of a type (or all).
pub fn clear_history(conn: &Connection, media_type: Option<MediaType>) -> Result<()> {
    match media_type {
        Some(t) => sql::execute(
            conn,
            "UPDATE media SET play_count = 0, last_played_date = NULL,
                    last_position = -1, last_time = -1
             WHERE last_played_date IS NOT NULL AND type = ?1",
            params![t],
        )?,
        None => sql::execute(
            conn,
            "UPDATE media SET play_count = 0, last_played_date = NULL,
                    last_position = -1, last_time = -1
             WHERE last_played_date IS NOT NULL",
            [],
        )?,
    };
    Ok(())
}

// ---------------------------------------------------------------------------
// queries
// ---------------------------------------------------------------------------

fn order_by(params: &QueryParameters, default_col: &str) -> String {
    let (column, swap) = match params.sort {
        SortingCriteria::Default | SortingCriteria::Alpha => (default_col, false),
        SortingCriteria::Duration => ("duration", false),
        SortingCriteria::InsertionDate => ("insertion_date", false),
        SortingCriteria::ReleaseDate => ("release_date", false),
        SortingCriteria::PlayCount => ("play_count", true),
        SortingCriteria::Filename => ("filename", false),
        SortingCriteria::LastPlaybackDate => ("last_played_date", true),
        SortingCriteria::TrackNumber => ("disc_number, track_number", false),
        other => {
            tracing::warn!("unsupported sort criterion {other:?} for media, using title");
            (default_col, false)
        }
    };
    let desc = params.desc ^ swap;
    format!("ORDER BY {column}{}", if desc { " DESC" } else { "" })
}

fn common_filters(base: &mut String, params: &QueryParameters) {
    if !params.include_missing {
        base.push_str(" AND is_present != 0");
    }
    if params.favorite_only {
        base.push_str(" AND is_favorite != 0");
    }
}

/// Every discovered media, optionally restricted to one type.
pub fn list_all<'db>(
    db: &'db Database,
    media_type: Option<MediaType>,
    params: &QueryParameters,
) -> PagedQuery<'db, Media> {
    let mut base = String::from("media WHERE import_type = 0");
    common_filters(&mut base, params);
    let order = order_by(params, "title");
    match media_type {
        Some(t) => {
            base.push_str(" AND type = ?1");
            PagedQuery::new(db, COLS, base, order, "id", Media::from_row).param(t)
        }
        None => PagedQuery::new(db, COLS, base, order, "id", Media::from_row),
    }
}

/// FTS search over titles and filenames.
pub fn search<'db>(
    db: &'db Database,
    pattern: &str,
    media_type: Option<MediaType>,
    params: &QueryParameters,
) -> PagedQuery<'db, Media> {
    let Some(pattern) = sql::sanitize_pattern(pattern) else {
        return PagedQuery::empty(db);
    };
    let mut base = String::from(
        "media WHERE id IN (SELECT rowid FROM media_fts WHERE media_fts MATCH ?1)",
    );
    common_filters(&mut base, params);
    let order = order_by(params, "title");
    match media_type {
        Some(t) => {
            base.push_str(" AND type = ?2");
            PagedQuery::new(db, COLS, base, order, "id", Media::from_row)
                .param(pattern)
                .param(t)
        }
        None => PagedQuery::new(db, COLS, base, order, "id", Media::from_row).param(pattern),
    }
}

/// Tracks of one album, optionally restricted to a genre.
pub fn from_album<'db>(
    db: &'db Database,
    album_id: i64,
    genre_id: Option<i64>,
    params: &QueryParameters,
) -> PagedQuery<'db, Media> {
    let mut base = String::from("media WHERE album_id = ?1");
    common_filters(&mut base, params);
    let order = if params.sort == SortingCriteria::Default {
        order_by(&QueryParameters::sorted(SortingCriteria::TrackNumber, params.desc), "title")
    } else {
        order_by(params, "title")
    };
    let q = PagedQuery::new(db, COLS, base.clone(), order.clone(), "id", Media::from_row)
        .param(album_id);
    match genre_id {
        Some(g) => {
            let mut base = base;
            base.push_str(" AND genre_id = ?2");
            PagedQuery::new(db, COLS, base, order, "id", Media::from_row)
                .param(album_id)
                .param(g)
        }
        None => q,
    }
}

pub fn from_artist<'db>(
    db: &'db Database,
    artist_id: i64,
    params: &QueryParameters,
) -> PagedQuery<'db, Media> {
    let mut base = String::from("media WHERE artist_id = ?1");
    common_filters(&mut base, params);
    let order = order_by(params, "title");
    PagedQuery::new(db, COLS, base, order, "id", Media::from_row).param(artist_id)
}

pub fn from_genre<'db>(
    db: &'db Database,
    genre_id: i64,
    params: &QueryParameters,
) -> PagedQuery<'db, Media> {
    let mut base = String::from("media WHERE genre_id = ?1");
    common_filters(&mut base, params);
    let order = order_by(params, "title");
    PagedQuery::new(db, COLS, base, order, "id", Media::from_row).param(genre_id)
}

pub fn from_group<'db>(
    db: &'db Database,
    group_id: i64,
    params: &QueryParameters,
) -> PagedQuery<'db, Media> {
    let mut base = String::from("media WHERE group_id = ?1");
    common_filters(&mut base, params);
    let order = order_by(params, "title");
    PagedQuery::new(db, COLS, base, order, "id", Media::from_row).param(group_id)
}

pub fn from_folder<'db>(
    db: &'db Database,
    folder_id: i64,
    media_type: Option<MediaType>,
    params: &QueryParameters,
) -> PagedQuery<'db, Media> {
    let mut base = String::from("media WHERE folder_id = ?1");
    common_filters(&mut base, params);
    let order = order_by(params, "title");
    match media_type {
        Some(t) => {
            base.push_str(" AND type = ?2");
            PagedQuery::new(db, COLS, base, order, "id", Media::from_row)
                .param(folder_id)
                .param(t)
        }
        None => PagedQuery::new(db, COLS, base, order, "id", Media::from_row).param(folder_id),
    }
}

/// Present video media whose title, minus a leading "The ", starts with
/// the given prefix (the video-group view's key).
pub fn from_video_group<'db>(
    db: &'db Database,
    prefix: &str,
    params: &QueryParameters,
) -> PagedQuery<'db, Media> {
    let base = "media WHERE type = 2 AND is_present != 0 AND \
        LOWER(SUBSTR(CASE WHEN title LIKE 'The %' THEN SUBSTR(title, 5) ELSE title END, \
        1, LENGTH(?1))) = LOWER(?1)";
    let order = order_by(params, "title");
    PagedQuery::new(db, COLS, base, order, "id", Media::from_row).param(prefix.to_owned())
}

/// Playback history, most recent first.
pub fn history<'db>(db: &'db Database, media_type: Option<MediaType>) -> PagedQuery<'db, Media> {
    let mut base = String::from("media WHERE last_played_date IS NOT NULL");
    let order = "ORDER BY last_played_date DESC";
    match media_type {
        Some(t) => {
            base.push_str(" AND type = ?1");
            PagedQuery::new(db, COLS, base, order, "id", Media::from_row).param(t)
        }
        None => PagedQuery::new(db, COLS, base, order, "id", Media::from_row),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::device;
    use crate::entities::folder;
    use crate::testing;

    fn setup(db: &Database) -> (i64, i64) {
        let ctx = db.write().unwrap();
        let dev = device::create(&ctx, "uuid-1", "file://", false, false).unwrap();
        let root = folder::create(&ctx, "/videos/", "videos", 0, dev.id, false).unwrap();
        (dev.id, root.id)
    }

    #[test]
    fn create_discovered_media() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        let ctx = db.write().unwrap();
        let m = create(&ctx, MediaType::Video, dev, dir, "clip.mkv", 5000).unwrap();
        assert!(m.is_present);
        assert!(m.is_discovered());
        assert_eq!(m.title.as_deref(), Some("clip.mkv"));
        assert_eq!(m.duration, 5000);
        assert_eq!(m.folder_id, Some(dir));
    }

    #[test]
    fn create_external_and_stream() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        let ext = create_external(&ctx, "http://example.org/a.mp3", 1000).unwrap();
        assert_eq!(ext.import_type, ImportType::External);
        assert!(ext.device_id.is_none());
        assert!(ext.folder_id.is_none());

        let stream = create_stream(&ctx, "rtsp://example.org/live").unwrap();
        assert_eq!(stream.import_type, ImportType::Stream);
        assert_eq!(stream.duration, -1);
    }

    #[test]
    fn last_position_boundaries() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        let ctx = db.write().unwrap();
        let m = create(&ctx, MediaType::Video, dev, dir, "m.mkv", 10_000).unwrap();

        assert_eq!(set_last_position(&ctx, &m, 0.0).unwrap(), ProgressResult::Begin);
        let r = fetch(&ctx, m.id).unwrap().unwrap();
        assert_eq!(r.last_position, -1.0);
        assert_eq!(r.play_count, 0);

        assert_eq!(set_last_position(&ctx, &m, 1.0).unwrap(), ProgressResult::End);
        let r = fetch(&ctx, m.id).unwrap().unwrap();
        assert_eq!(r.last_position, -1.0);
        assert_eq!(r.play_count, 1);
        assert!(r.last_played_date.is_some());

        assert_eq!(set_last_position(&ctx, &m, 0.5).unwrap(), ProgressResult::AsIs);
        let r = fetch(&ctx, m.id).unwrap().unwrap();
        assert!((r.last_position - 0.5).abs() < f64::EPSILON);
        assert_eq!(r.last_time, 5_000);

        assert_eq!(set_last_position(&ctx, &m, 1.5).unwrap(), ProgressResult::Error);
    }

    #[test]
    fn last_position_without_duration_stores_as_is() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        let m = create_stream(&ctx, "rtsp://x/live").unwrap();
        assert_eq!(set_last_position(&ctx, &m, 0.999).unwrap(), ProgressResult::AsIs);
        let r = fetch(&ctx, m.id).unwrap().unwrap();
        assert!((r.last_position - 0.999).abs() < f64::EPSILON);
        assert_eq!(r.play_count, 0);
    }

    #[test]
    fn forced_title_wins() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        let ctx = db.write().unwrap();
        let m = create(&ctx, MediaType::Audio, dev, dir, "t.mp3", 100).unwrap();
        assert!(set_title(&ctx, m.id, "User title", true).unwrap());
        assert!(!set_title(&ctx, m.id, "Analyzer title", false).unwrap());
        let r = fetch(&ctx, m.id).unwrap().unwrap();
        assert_eq!(r.title.as_deref(), Some("User title"));
    }

    #[test]
    fn history_and_clear() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        {
            let ctx = db.write().unwrap();
            let a = create(&ctx, MediaType::Audio, dev, dir, "a.mp3", 10_000).unwrap();
            let v = create(&ctx, MediaType::Video, dev, dir, "v.mkv", 10_000).unwrap();
            set_last_position(&ctx, &a, 1.0).unwrap();
            set_last_position(&ctx, &v, 1.0).unwrap();
        }
        assert_eq!(history(&db, None).count().unwrap(), 2);
        assert_eq!(history(&db, Some(MediaType::Audio)).count().unwrap(), 1);
        {
            let ctx = db.write().unwrap();
            clear_history(&ctx, Some(MediaType::Video)).unwrap();
        }
        assert_eq!(history(&db, None).count().unwrap(), 1);
        {
            let ctx = db.write().unwrap();
            clear_history(&ctx, None).unwrap();
        }
        assert_eq!(history(&db, None).count().unwrap(), 0);
    }

    #[test]
    fn search_uses_fts_with_prefix() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        {
            let ctx = db.write().unwrap();
            create(&ctx, MediaType::Video, dev, dir, "Holiday Trip.mkv", 100).unwrap();
            create(&ctx, MediaType::Video, dev, dir, "Concert.mkv", 100).unwrap();
        }
        let found = search(&db, "holi", None, &QueryParameters::default())
            .all()
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].filename.as_deref(), Some("Holiday Trip.mkv"));

        // Sub-3-character patterns yield an empty query.
        let empty = search(&db, "ho", None, &QueryParameters::default());
        assert_eq!(empty.count().unwrap(), 0);
    }

    #[test]
    fn list_all_filters_by_type_and_presence() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        {
            let ctx = db.write().unwrap();
            create(&ctx, MediaType::Audio, dev, dir, "a.mp3", 100).unwrap();
            create(&ctx, MediaType::Video, dev, dir, "v.mkv", 100).unwrap();
            create_external(&ctx, "x.avi", -1).unwrap();
        }
        assert_eq!(list_all(&db, None, &QueryParameters::default()).count().unwrap(), 2);
        assert_eq!(
            list_all(&db, Some(MediaType::Audio), &QueryParameters::default())
                .count()
                .unwrap(),
            1
        );
        {
            let ctx = db.write().unwrap();
            device::set_present(&ctx, dev, false).unwrap();
        }
        assert_eq!(list_all(&db, None, &QueryParameters::default()).count().unwrap(), 0);
        let include_missing = QueryParameters {
            include_missing: true,
            ..Default::default()
        };
        assert_eq!(list_all(&db, None, &include_missing).count().unwrap(), 2);
    }
}
