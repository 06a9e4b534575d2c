//! Technical track descriptors: audio, video, and subtitle streams.
//!
//! Audio and subtitle tracks may belong to an attached file (external
//! soundtrack or subtitles); at most one track row exists per
//! (media, attached file) pair.

use rusqlite::{params, Connection, Row};

use reelvault_core::Result;

use crate::sql::{self, Fk};

#[derive(Debug, Clone)]
pub struct AudioTrack {
    pub id: i64,
    pub codec: String,
    pub bitrate: i64,
    pub samplerate: i64,
    pub nb_channels: i64,
    pub language: Option<String>,
    pub description: Option<String>,
    pub media_id: i64,
    pub attached_file_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct VideoTrack {
    pub id: i64,
    pub codec: String,
    pub width: i64,
    pub height: i64,
    pub fps_num: i64,
    pub fps_den: i64,
    pub bitrate: i64,
    pub sar_num: i64,
    pub sar_den: i64,
    pub language: Option<String>,
    pub description: Option<String>,
    pub media_id: i64,
}

#[derive(Debug, Clone)]
pub struct SubtitleTrack {
    pub id: i64,
    pub codec: String,
    pub language: Option<String>,
    pub description: Option<String>,
    pub encoding: Option<String>,
    pub media_id: i64,
    pub attached_file_id: Option<i64>,
}

impl AudioTrack {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            codec: row.get(1)?,
            bitrate: row.get(2)?,
            samplerate: row.get(3)?,
            nb_channels: row.get(4)?,
            language: row.get(5)?,
            description: row.get(6)?,
            media_id: row.get(7)?,
            attached_file_id: row.get(8)?,
        })
    }
}

impl VideoTrack {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            codec: row.get(1)?,
            width: row.get(2)?,
            height: row.get(3)?,
            fps_num: row.get(4)?,
            fps_den: row.get(5)?,
            bitrate: row.get(6)?,
            sar_num: row.get(7)?,
            sar_den: row.get(8)?,
            language: row.get(9)?,
            description: row.get(10)?,
            media_id: row.get(11)?,
        })
    }
}

impl SubtitleTrack {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            codec: row.get(1)?,
            language: row.get(2)?,
            description: row.get(3)?,
            encoding: row.get(4)?,
            media_id: row.get(5)?,
            attached_file_id: row.get(6)?,
        })
    }
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

pub fn audio_schema(_version: u32) -> String {
    "CREATE TABLE audio_track(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        codec TEXT,\
        bitrate INTEGER NOT NULL DEFAULT 0,\
        samplerate INTEGER NOT NULL DEFAULT 0,\
        nb_channels INTEGER NOT NULL DEFAULT 0,\
        language TEXT,\
        description TEXT,\
        media_id INTEGER NOT NULL REFERENCES media(id) ON DELETE CASCADE,\
        attached_file_id INTEGER REFERENCES file(id) ON DELETE CASCADE,\
        UNIQUE(media_id, attached_file_id))"
        .to_owned()
}

pub fn video_schema(_version: u32) -> String {
    "CREATE TABLE video_track(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        codec TEXT,\
        width INTEGER NOT NULL DEFAULT 0,\
        height INTEGER NOT NULL DEFAULT 0,\
        fps_num INTEGER NOT NULL DEFAULT 0,\
        fps_den INTEGER NOT NULL DEFAULT 1,\
        bitrate INTEGER NOT NULL DEFAULT 0,\
        sar_num INTEGER NOT NULL DEFAULT 0,\
        sar_den INTEGER NOT NULL DEFAULT 1,\
        language TEXT,\
        description TEXT,\
        media_id INTEGER NOT NULL REFERENCES media(id) ON DELETE CASCADE)"
        .to_owned()
}

pub fn subtitle_schema(_version: u32) -> String {
    "CREATE TABLE subtitle_track(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        codec TEXT,\
        language TEXT,\
        description TEXT,\
        encoding TEXT,\
        media_id INTEGER NOT NULL REFERENCES media(id) ON DELETE CASCADE,\
        attached_file_id INTEGER REFERENCES file(id) ON DELETE CASCADE,\
        UNIQUE(media_id, attached_file_id))"
        .to_owned()
}

pub fn triggers(_version: u32) -> Vec<(&'static str, String)> {
    Vec::new()
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    vec![
        (
            "audio_track_media_idx",
            "CREATE INDEX audio_track_media_idx ON audio_track(media_id)".to_owned(),
        ),
        (
            "video_track_media_idx",
            "CREATE INDEX video_track_media_idx ON video_track(media_id)".to_owned(),
        ),
        (
            "subtitle_track_media_idx",
            "CREATE INDEX subtitle_track_media_idx ON subtitle_track(media_id)".to_owned(),
        ),
    ]
}

// ---------------------------------------------------------------------------
// operations
// ---------------------------------------------------------------------------

/// Record an audio track; `Ok(false)` when the (media, attached file)
/// pair is already described.
#[allow(clippy::too_many_arguments)]
pub fn add_audio_track(
    conn: &Connection,
    media_id: i64,
    codec: &str,
    bitrate: i64,
    samplerate: i64,
    nb_channels: i64,
    language: Option<&str>,
    description: Option<&str>,
    attached_file_id: i64,
) -> Result<bool> {
    let inserted = sql::insert_or_ignore(
        conn,
        "INSERT INTO audio_track(codec, bitrate, samplerate, nb_channels,
                language, description, media_id, attached_file_id)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            codec,
            bitrate,
            samplerate,
            nb_channels,
            language,
            description,
            media_id,
            Fk(attached_file_id),
        ],
    )?;
    Ok(inserted.is_some())
}

#[allow(clippy::too_many_arguments)]
pub fn add_video_track(
    conn: &Connection,
    media_id: i64,
    codec: &str,
    width: i64,
    height: i64,
    fps_num: i64,
    fps_den: i64,
    bitrate: i64,
    sar_num: i64,
    sar_den: i64,
    language: Option<&str>,
    description: Option<&str>,
) -> Result<bool> {
    sql::insert(
        conn,
        "INSERT INTO video_track(codec, width, height, fps_num, fps_den, bitrate,
                sar_num, sar_den, language, description, media_id)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            codec, width, height, fps_num, fps_den, bitrate, sar_num, sar_den, language,
            description, media_id,
        ],
    )?;
    Ok(true)
}

pub fn add_subtitle_track(
    conn: &Connection,
    media_id: i64,
    codec: &str,
    language: Option<&str>,
    description: Option<&str>,
    encoding: Option<&str>,
    attached_file_id: i64,
) -> Result<bool> {
    let inserted = sql::insert_or_ignore(
        conn,
        "INSERT INTO subtitle_track(codec, language, description, encoding,
                media_id, attached_file_id)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            codec,
            language,
            description,
            encoding,
            media_id,
            Fk(attached_file_id),
        ],
    )?;
    Ok(inserted.is_some())
}

pub fn audio_tracks(conn: &Connection, media_id: i64) -> Result<Vec<AudioTrack>> {
    sql::load_all(
        conn,
        "SELECT id, codec, bitrate, samplerate, nb_channels, language, description,
                media_id, attached_file_id
         FROM audio_track WHERE media_id = ?1 ORDER BY id",
        params![media_id],
        AudioTrack::from_row,
    )
}

/// Audio tracks carried by the media file itself, excluding attached
/// files.
pub fn integrated_audio_tracks(conn: &Connection, media_id: i64) -> Result<Vec<AudioTrack>> {
    sql::load_all(
        conn,
        "SELECT id, codec, bitrate, samplerate, nb_channels, language, description,
                media_id, attached_file_id
         FROM audio_track WHERE media_id = ?1 AND attached_file_id IS NULL ORDER BY id",
        params![media_id],
        AudioTrack::from_row,
    )
}

pub fn video_tracks(conn: &Connection, media_id: i64) -> Result<Vec<VideoTrack>> {
    sql::load_all(
        conn,
        "SELECT id, codec, width, height, fps_num, fps_den, bitrate, sar_num, sar_den,
                language, description, media_id
         FROM video_track WHERE media_id = ?1 ORDER BY id",
        params![media_id],
        VideoTrack::from_row,
    )
}

pub fn subtitle_tracks(conn: &Connection, media_id: i64) -> Result<Vec<SubtitleTrack>> {
    sql::load_all(
        conn,
        "SELECT id, codec, language, description, encoding, media_id, attached_file_id
         FROM subtitle_track WHERE media_id = ?1 ORDER BY id",
        params![media_id],
        SubtitleTrack::from_row,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{device, file, folder, media};
    use crate::testing;
    use reelvault_core::{FileType, MediaType};

    fn setup(db: &crate::pool::Database) -> i64 {
        let ctx = db.write().unwrap();
        let dev = device::create(&ctx, "d", "file://", false, false).unwrap();
        let dir = folder::create(&ctx, "/m/", "m", 0, dev.id, false).unwrap();
        media::create(&ctx, MediaType::Video, dev.id, dir.id, "m.mkv", 100)
            .unwrap()
            .id
    }

    #[test]
    fn multiple_embedded_tracks_allowed() {
        let db = testing::db();
        let m = setup(&db);
        let ctx = db.write().unwrap();
        assert!(add_audio_track(&ctx, m, "aac", 128, 44100, 2, Some("en"), None, 0).unwrap());
        assert!(add_audio_track(&ctx, m, "ac3", 384, 48000, 6, Some("fr"), None, 0).unwrap());
        assert_eq!(audio_tracks(&ctx, m).unwrap().len(), 2);
    }

    #[test]
    fn one_track_per_attached_file() {
        let db = testing::db();
        let m = setup(&db);
        let ctx = db.write().unwrap();
        let f = file::add_external(&ctx, m, "http://x/sub.srt", FileType::Subtitles)
            .unwrap()
            .unwrap();
        assert!(add_subtitle_track(&ctx, m, "subrip", Some("en"), None, None, f.id).unwrap());
        // Relinking the same attached file is absorbed.
        assert!(!add_subtitle_track(&ctx, m, "subrip", Some("en"), None, None, f.id).unwrap());

        let all = subtitle_tracks(&ctx, m).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].attached_file_id, Some(f.id));
    }

    #[test]
    fn integrated_tracks_exclude_attached_files() {
        let db = testing::db();
        let m = setup(&db);
        let ctx = db.write().unwrap();
        let f = file::add_external(&ctx, m, "http://x/audio.ac3", FileType::Soundtrack)
            .unwrap()
            .unwrap();
        add_audio_track(&ctx, m, "aac", 128, 44100, 2, None, None, 0).unwrap();
        add_audio_track(&ctx, m, "ac3", 384, 48000, 6, None, None, f.id).unwrap();
        assert_eq!(audio_tracks(&ctx, m).unwrap().len(), 2);
        assert_eq!(integrated_audio_tracks(&ctx, m).unwrap().len(), 1);
    }

    #[test]
    fn video_track_roundtrip() {
        let db = testing::db();
        let m = setup(&db);
        let ctx = db.write().unwrap();
        add_video_track(&ctx, m, "h264", 1920, 1080, 24000, 1001, 8_000_000, 1, 1, None, None)
            .unwrap();
        let tracks = video_tracks(&ctx, m).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!((tracks[0].width, tracks[0].height), (1920, 1080));

        media::delete(&ctx, m).unwrap();
        assert!(video_tracks(&ctx, m).unwrap().is_empty());
    }
}
