//! Domain enums and query parameters shared across the library.
//!
//! Every enum persisted to the database carries explicit integer
//! discriminants and binds/loads as that integer, so trigger SQL and
//! Rust code agree on the values forever.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

/// Generate an integer-backed database enum.
///
/// The macro produces `as_i64()`, `from_i64()`, and `ToSql`/`FromSql`
/// implementations binding the discriminant.
macro_rules! sql_enum {
    ($(#[doc = $doc:expr])* $name:ident { $($(#[doc = $vdoc:expr])* $variant:ident = $value:expr),+ $(,)? }) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[doc = $vdoc])* $variant = $value),+
        }

        impl $name {
            /// The persisted discriminant.
            pub fn as_i64(self) -> i64 {
                self as i64
            }

            /// Load from a persisted discriminant.
            pub fn from_i64(value: i64) -> Option<Self> {
                match value {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_i64()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let raw = i64::column_result(value)?;
                $name::from_i64(raw).ok_or(FromSqlError::OutOfRange(raw))
            }
        }
    };
}

sql_enum! {
    /// Broad classification of a media item.
    MediaType {
        Unknown = 0,
        Audio = 1,
        Video = 2,
    }
}

sql_enum! {
    /// Refined classification, set once the item has been analyzed.
    MediaSubtype {
        Unknown = 0,
        AlbumTrack = 1,
        Movie = 2,
        ShowEpisode = 3,
    }
}

sql_enum! {
    /// How a media item entered the catalog.
    ImportType {
        /// Discovered and imported by the library itself.
        Internal = 0,
        /// Added manually by the user; never analyzed.
        External = 1,
        /// A stream; a specific kind of external media.
        Stream = 2,
    }
}

sql_enum! {
    /// Role of a file row with regard to its owning media or playlist.
    FileType {
        /// The file containing the media itself.
        Main = 0,
        /// One part of a multi-part media.
        Part = 1,
        Soundtrack = 2,
        Subtitles = 3,
        /// A playlist file this playlist was imported from.
        Playlist = 4,
        Disc = 5,
        /// A locally cached copy of a subscription item.
        Cache = 6,
    }
}

sql_enum! {
    /// Where a thumbnail came from.
    ThumbnailOrigin {
        UserProvided = 0,
        /// Extracted from the media itself.
        Media = 1,
        /// A cover file found next to the media.
        CoverFile = 2,
        Artist = 3,
        AlbumArtist = 4,
    }
}

sql_enum! {
    /// Artwork flavor stored for an entity.
    ThumbnailSizeType {
        Thumbnail = 0,
        Banner = 1,
    }
}

sql_enum! {
    /// Generation state of a thumbnail.
    ThumbnailStatus {
        Missing = 0,
        Available = 1,
        Failure = 2,
        PersistentFailure = 3,
        /// The worker aborted mid-generation.
        Crash = 4,
    }
}

sql_enum! {
    /// Kind of entity a thumbnail linking row points at.
    ThumbnailEntity {
        Media = 0,
        Album = 1,
        Artist = 2,
        Genre = 3,
        MediaGroup = 4,
    }
}

sql_enum! {
    /// Per-media metadata slots.
    MetadataType {
        Rating = 0,
        Progress = 1,
        Speed = 2,
        Title = 3,
        Chapter = 4,
        Seen = 5,
        VideoTrack = 6,
        AspectRatio = 7,
        AudioTrack = 8,
        Gain = 9,
        AudioDelay = 10,
        SubtitleTrack = 11,
        SubtitleDelay = 12,
        ApplicationSpecific = 13,
    }
}

sql_enum! {
    /// Kind of a bookmark.
    BookmarkType {
        Simple = 0,
    }
}

// ---------------------------------------------------------------------------
// Sorting & query parameters
// ---------------------------------------------------------------------------

/// Sort criteria accepted by every listing query.
///
/// Entities map unsupported criteria onto their own default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortingCriteria {
    #[default]
    Default,
    Alpha,
    Duration,
    InsertionDate,
    LastModificationDate,
    ReleaseDate,
    TrackNumber,
    PlayCount,
    Filename,
    LastPlaybackDate,
    NbAlbum,
    NbMedia,
    NbAudio,
    NbVideo,
}

/// Parameters accepted by every listing and search query.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParameters {
    pub sort: SortingCriteria,
    /// Reverse the effective direction, applied after criterion mapping.
    pub desc: bool,
    /// Include media on absent devices.
    pub include_missing: bool,
    /// Restrict to entities exposed on the public surface.
    pub public_only: bool,
    /// Restrict to favorites.
    pub favorite_only: bool,
}

impl QueryParameters {
    pub fn sorted(sort: SortingCriteria, desc: bool) -> Self {
        Self {
            sort,
            desc,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Operation results
// ---------------------------------------------------------------------------

/// Outcome of storing a playback position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressResult {
    /// The provided position was stored as-is.
    AsIs,
    /// The position was close enough to the beginning to be discarded.
    Begin,
    /// The position was close enough to the end; playback was counted.
    End,
    Error,
}

/// Outcome of `MediaLibrary::initialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializeResult {
    Success,
    AlreadyInitialized,
    Failed,
    /// The database was out of sync and had to be recreated.
    DbReset,
    /// The database is corrupted and the library refuses further work.
    DbCorrupted,
}

/// How a folder removal should behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderRemovalBehavior {
    /// The folder disappeared from the device; cascade everything.
    RemovedFromDisk,
    /// The user banned the folder; contained media become external.
    Banned,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn enum_roundtrip_through_sqlite() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t(v INTEGER)").unwrap();
        conn.execute("INSERT INTO t(v) VALUES(?1)", [MediaType::Video])
            .unwrap();
        let loaded: MediaType = conn
            .query_row("SELECT v FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(loaded, MediaType::Video);
    }

    #[test]
    fn out_of_range_discriminant_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t(v INTEGER); INSERT INTO t VALUES(99);")
            .unwrap();
        let res: rusqlite::Result<MediaType> =
            conn.query_row("SELECT v FROM t", [], |row| row.get(0));
        assert!(res.is_err());
    }

    #[test]
    fn discriminants_are_stable() {
        // These values are baked into trigger SQL; they must never change.
        assert_eq!(MediaType::Unknown.as_i64(), 0);
        assert_eq!(MediaType::Audio.as_i64(), 1);
        assert_eq!(MediaType::Video.as_i64(), 2);
        assert_eq!(ImportType::Internal.as_i64(), 0);
        assert_eq!(ImportType::External.as_i64(), 1);
        assert_eq!(ImportType::Stream.as_i64(), 2);
        assert_eq!(FileType::Main.as_i64(), 0);
        assert_eq!(FileType::Cache.as_i64(), 6);
        assert_eq!(MediaSubtype::AlbumTrack.as_i64(), 1);
    }

    #[test]
    fn from_i64_rejects_unknown() {
        assert_eq!(MediaType::from_i64(1), Some(MediaType::Audio));
        assert_eq!(MediaType::from_i64(42), None);
    }

    #[test]
    fn query_parameters_default() {
        let params = QueryParameters::default();
        assert_eq!(params.sort, SortingCriteria::Default);
        assert!(!params.desc);
        assert!(!params.include_missing);
        assert!(!params.favorite_only);
    }
}
