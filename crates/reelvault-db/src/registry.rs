//! The schema/trigger/index registry.
//!
//! Every entity module contributes its exact CREATE statements for a
//! given model version. The registry materializes fresh databases and
//! verifies, at startup, that every live object's stored SQL matches
//! its registry form byte for byte.

use rusqlite::Connection;

use reelvault_core::{DatabaseError, Result};

use crate::entities::{
    album, album_track, artist, bookmark, chapter, device, file, folder, genre, label, media,
    media_group, metadata, movie, playlist, settings, show, subscription, thumbnail, tracks,
    video_group,
};

/// The model version this build reads and writes.
pub const DB_MODEL_VERSION: u32 = 5;

/// Every table and view of the given model, with its exact SQL.
pub fn all_tables(version: u32) -> Vec<(&'static str, String)> {
    let mut tables = vec![
        ("settings", settings::schema(version)),
        ("device", device::schema(version)),
        ("folder", folder::schema(version)),
        ("folder_fts", folder::fts_schema(version)),
        ("artist", artist::schema(version)),
        ("artist_fts", artist::fts_schema(version)),
        ("genre", genre::schema(version)),
        ("genre_fts", genre::fts_schema(version)),
        ("album", album::schema(version)),
        ("album_fts", album::fts_schema(version)),
        ("media", media::schema(version)),
        ("media_fts", media::fts_schema(version)),
        ("file", file::schema(version)),
        ("show", show::schema(version)),
        ("show_fts", show::fts_schema(version)),
        ("show_episode", show::episode_schema(version)),
        ("movie", movie::schema(version)),
        ("playlist", playlist::schema(version)),
        ("playlist_fts", playlist::fts_schema(version)),
        ("playlist_media", playlist::relation_schema(version)),
        ("label", label::schema(version)),
        ("label_media", label::relation_schema(version)),
        ("bookmark", bookmark::schema(version)),
        ("chapter", chapter::schema(version)),
        ("thumbnail", thumbnail::schema(version)),
        ("thumbnail_link", thumbnail::link_schema(version)),
        ("thumbnail_cleanup", thumbnail::cleanup_schema(version)),
        ("metadata", metadata::schema(version)),
        ("audio_track", tracks::audio_schema(version)),
        ("video_track", tracks::video_schema(version)),
        ("subtitle_track", tracks::subtitle_schema(version)),
    ];
    if version < 3 {
        tables.push(("album_track", album_track::schema(version)));
    }
    if version >= 4 {
        tables.push(("media_group", media_group::schema(version)));
        tables.push(("video_group", video_group::schema(version)));
    }
    if version >= 5 {
        tables.push(("subscription", subscription::schema(version)));
        tables.push(("subscription_media", subscription::relation_schema(version)));
    }
    tables
}

/// Every trigger of the given model.
pub fn all_triggers(version: u32) -> Vec<(&'static str, String)> {
    let mut triggers = Vec::new();
    triggers.extend(device::triggers(version));
    triggers.extend(folder::triggers(version));
    triggers.extend(artist::triggers(version));
    triggers.extend(genre::triggers(version));
    triggers.extend(album::triggers(version));
    triggers.extend(media::triggers(version));
    triggers.extend(file::triggers(version));
    triggers.extend(show::triggers(version));
    triggers.extend(playlist::triggers(version));
    triggers.extend(thumbnail::triggers(version));
    if version >= 4 {
        triggers.extend(media_group::triggers(version));
    }
    if version >= 5 {
        triggers.extend(subscription::triggers(version));
    }
    triggers
}

/// Every index of the given model.
pub fn all_indexes(version: u32) -> Vec<(&'static str, String)> {
    let mut indexes = Vec::new();
    indexes.extend(device::indexes(version));
    indexes.extend(folder::indexes(version));
    indexes.extend(album::indexes(version));
    indexes.extend(media::indexes(version));
    indexes.extend(file::indexes(version));
    indexes.extend(show::indexes(version));
    indexes.extend(playlist::indexes(version));
    indexes.extend(chapter::indexes(version));
    indexes.extend(thumbnail::indexes(version));
    indexes.extend(tracks::indexes(version));
    if version < 3 {
        indexes.extend(album_track::indexes(version));
    }
    if version >= 5 {
        indexes.extend(subscription::indexes(version));
    }
    indexes
}

/// Create every object of the given model in an empty database, plus
/// the artist sentinel rows.
pub fn create_all(conn: &Connection, version: u32) -> Result<()> {
    for (_, sql) in all_tables(version) {
        conn.execute(&sql, []).map_err(DatabaseError::from)?;
    }
    for (_, sql) in all_indexes(version) {
        conn.execute(&sql, []).map_err(DatabaseError::from)?;
    }
    for (_, sql) in all_triggers(version) {
        conn.execute(&sql, []).map_err(DatabaseError::from)?;
    }
    artist::create_sentinels(conn)?;
    Ok(())
}

/// Verify that every registry object exists in `sqlite_master` with the
/// exact SQL of the given model version.
///
/// Returns false (with error logs) on any missing or diverging object;
/// initialization treats that as a request for recovery.
pub fn check_schema(conn: &Connection, version: u32) -> Result<bool> {
    let mut ok = true;
    let objects = all_tables(version)
        .into_iter()
        .chain(all_indexes(version))
        .chain(all_triggers(version));
    for (name, expected) in objects {
        let actual: Option<String> = crate::sql::query_row_opt(
            conn,
            "SELECT sql FROM sqlite_master WHERE name = ?1",
            rusqlite::params![name],
            |row| row.get(0),
        )?;
        match actual {
            None => {
                tracing::error!("schema object {name} is missing");
                ok = false;
            }
            Some(actual) if actual != expected => {
                tracing::error!("schema mismatch for {name}: stored SQL diverges from registry");
                ok = false;
            }
            Some(_) => {}
        }
    }
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn fresh_database_matches_registry() {
        let db = testing::db();
        let ctx = db.read().unwrap();
        assert!(check_schema(&ctx, DB_MODEL_VERSION).unwrap());
    }

    #[test]
    fn trigger_names_are_unique() {
        for version in 1..=DB_MODEL_VERSION {
            let mut names: Vec<&str> = all_triggers(version).iter().map(|(n, _)| *n).collect();
            let before = names.len();
            names.sort_unstable();
            names.dedup();
            assert_eq!(before, names.len(), "duplicate trigger name at model {version}");
        }
    }

    #[test]
    fn old_models_materialize() {
        for version in 1..=DB_MODEL_VERSION {
            let db = crate::pool::Database::open_in_memory().unwrap();
            let ctx = db.write().unwrap();
            create_all(&ctx, version).unwrap();
            assert!(check_schema(&ctx, version).unwrap(), "model {version}");
        }
    }

    #[test]
    fn versioned_objects_gate_correctly() {
        let v2: Vec<&str> = all_tables(2).iter().map(|(n, _)| *n).collect();
        assert!(v2.contains(&"album_track"));
        assert!(!v2.contains(&"media_group"));
        assert!(!v2.contains(&"subscription"));

        let v5: Vec<&str> = all_tables(5).iter().map(|(n, _)| *n).collect();
        assert!(!v5.contains(&"album_track"));
        assert!(v5.contains(&"media_group"));
        assert!(v5.contains(&"video_group"));
        assert!(v5.contains(&"subscription"));
    }

    #[test]
    fn detects_schema_divergence() {
        let db = crate::pool::Database::open_in_memory().unwrap();
        let ctx = db.write().unwrap();
        create_all(&ctx, DB_MODEL_VERSION).unwrap();
        ctx.execute_batch("DROP TRIGGER media_fts_insert").unwrap();
        assert!(!check_schema(&ctx, DB_MODEL_VERSION).unwrap());
    }
}
