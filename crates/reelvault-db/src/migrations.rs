//! Model-version migrations.
//!
//! Each step rewrites what changed between two adjacent models, running
//! under a [`WeakDbContext`] (foreign keys and recursive triggers off,
//! legacy rename semantics on) and inside its own transaction. Tables
//! whose column set changed are rebuilt with the rename-to-backup
//! pattern so the final object carries the registry's exact SQL;
//! triggers and indexes are dropped wholesale and recreated from the
//! target version's registry, since table rebuilds silently take theirs
//! down. The settings version bump is the last write of every step.

use rusqlite::Connection;

use reelvault_core::{DatabaseError, Error, Result};

use crate::entities::settings;
use crate::pool::{Transaction, WeakDbContext};
use crate::registry::{self, DB_MODEL_VERSION};
use crate::sql;

const V1_MEDIA_COLS: &str = "id, type, subtype, duration, last_position, last_time, \
    play_count, last_played_date, insertion_date, release_date, title, filename, \
    is_present, device_id, nb_playlists, folder_id, import_type, forced_title";

const V1_ALBUM_COLS: &str = "id, title, artist_id, release_year, short_summary, nb_tracks, \
    nb_present_tracks, duration, nb_discs";

const V1_ARTIST_COLS: &str = "id, name, shortbio, nb_albums, nb_tracks, nb_present_tracks, mb_id";

/// Run every pending step from `from` up to [`DB_MODEL_VERSION`].
pub fn migrate(conn: &Connection, from: u32) -> Result<()> {
    if from >= DB_MODEL_VERSION {
        return Ok(());
    }
    let _weak = WeakDbContext::new(conn)?;
    let mut version = from;
    while version < DB_MODEL_VERSION {
        tracing::info!("migrating database model {version} -> {}", version + 1);
        let tx = Transaction::new(conn)?;
        match version {
            1 => migrate_v1_to_v2(conn)?,
            2 => migrate_v2_to_v3(conn)?,
            3 => migrate_v3_to_v4(conn)?,
            4 => migrate_v4_to_v5(conn)?,
            v => {
                return Err(Error::internal(format!(
                    "no migration known from model version {v}"
                )))
            }
        }
        settings::set_db_model_version(conn, version + 1)?;
        tx.commit()?;
        version += 1;
    }
    migration_epilogue(conn, from)?;
    Ok(())
}

fn drop_triggers_and_indexes(conn: &Connection, version: u32) -> Result<()> {
    for (name, _) in registry::all_triggers(version) {
        conn.execute_batch(&format!("DROP TRIGGER IF EXISTS {name}"))
            .map_err(DatabaseError::from)?;
    }
    for (name, _) in registry::all_indexes(version) {
        conn.execute_batch(&format!("DROP INDEX IF EXISTS {name}"))
            .map_err(DatabaseError::from)?;
    }
    Ok(())
}

fn create_triggers_and_indexes(conn: &Connection, version: u32) -> Result<()> {
    for (_, sql_text) in registry::all_indexes(version) {
        conn.execute(&sql_text, []).map_err(DatabaseError::from)?;
    }
    for (_, sql_text) in registry::all_triggers(version) {
        conn.execute(&sql_text, []).map_err(DatabaseError::from)?;
    }
    Ok(())
}

/// Rebuild `table` at the target version: rename to a backup, create
/// the registry text, copy `insert_cols` from `select_expr`, drop the
/// backup. Rowids are preserved through the explicit id column.
fn rebuild_table(
    conn: &Connection,
    table: &str,
    new_schema: &str,
    insert_cols: &str,
    select_expr: &str,
) -> Result<()> {
    conn.execute_batch(&format!("ALTER TABLE {table} RENAME TO {table}_backup"))
        .map_err(DatabaseError::from)?;
    conn.execute(new_schema, []).map_err(DatabaseError::from)?;
    sql::execute(
        conn,
        &format!("INSERT INTO {table}({insert_cols}) SELECT {select_expr} FROM {table}_backup"),
        [],
    )?;
    conn.execute_batch(&format!("DROP TABLE {table}_backup"))
        .map_err(DatabaseError::from)?;
    Ok(())
}

/// v1 -> v2: favorites on media/album/artist, stored mrl on playlist
/// membership.
fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
    drop_triggers_and_indexes(conn, 1)?;
    rebuild_table(
        conn,
        "media",
        &crate::entities::media::schema(2),
        V1_MEDIA_COLS,
        V1_MEDIA_COLS,
    )?;
    rebuild_table(
        conn,
        "album",
        &crate::entities::album::schema(2),
        V1_ALBUM_COLS,
        V1_ALBUM_COLS,
    )?;
    rebuild_table(
        conn,
        "artist",
        &crate::entities::artist::schema(2),
        V1_ARTIST_COLS,
        V1_ARTIST_COLS,
    )?;
    rebuild_table(
        conn,
        "playlist_media",
        &crate::entities::playlist::relation_schema(2),
        "playlist_id, media_id, position",
        "playlist_id, media_id, position",
    )?;
    create_triggers_and_indexes(conn, 2)
}

/// v2 -> v3: denormalize the album-track table onto media and drop it.
fn migrate_v2_to_v3(conn: &Connection) -> Result<()> {
    drop_triggers_and_indexes(conn, 2)?;
    conn.execute_batch("ALTER TABLE media RENAME TO media_backup")
        .map_err(DatabaseError::from)?;
    conn.execute(&crate::entities::media::schema(3), [])
        .map_err(DatabaseError::from)?;
    sql::execute(
        conn,
        "INSERT INTO media(id, type, subtype, duration, last_position, last_time,
                play_count, last_played_date, insertion_date, release_date, title,
                filename, is_favorite, is_present, device_id, nb_playlists, folder_id,
                import_type, forced_title, artist_id, genre_id, track_number, album_id,
                disc_number)
         SELECT mb.id, mb.type,
                CASE WHEN at.id IS NOT NULL THEN 1 ELSE mb.subtype END,
                mb.duration, mb.last_position, mb.last_time, mb.play_count,
                mb.last_played_date, mb.insertion_date, mb.release_date, mb.title,
                mb.filename, mb.is_favorite, mb.is_present, mb.device_id,
                mb.nb_playlists, mb.folder_id, mb.import_type, mb.forced_title,
                at.artist_id, at.genre_id, at.track_number, at.album_id, at.disc_number
         FROM media_backup mb
         LEFT JOIN album_track at ON at.media_id = mb.id",
        [],
    )?;
    conn.execute_batch("DROP TABLE media_backup; DROP TABLE album_track;")
        .map_err(DatabaseError::from)?;
    create_triggers_and_indexes(conn, 3)
}

/// v3 -> v4: media groups, the group id on media, the video-group view,
/// and the grouping prefix length in settings.
///
/// This step knowingly does not touch the folder media counters; the
/// v4 -> v5 step re-asserts them.
fn migrate_v3_to_v4(conn: &Connection) -> Result<()> {
    drop_triggers_and_indexes(conn, 3)?;
    conn.execute(&crate::entities::media_group::schema(4), [])
        .map_err(DatabaseError::from)?;
    let v3_cols = format!("{V1_MEDIA_COLS}, is_favorite, artist_id, genre_id, track_number, \
        album_id, disc_number");
    rebuild_table(
        conn,
        "media",
        &crate::entities::media::schema(4),
        &v3_cols,
        &v3_cols,
    )?;
    rebuild_settings(conn, 4)?;
    conn.execute(&crate::entities::video_group::schema(4), [])
        .map_err(DatabaseError::from)?;
    create_triggers_and_indexes(conn, 4)
}

/// v4 -> v5: subscriptions, cache accounting in settings, and the
/// folder counter repair (a no-op against a healthy v4 database).
fn migrate_v4_to_v5(conn: &Connection) -> Result<()> {
    drop_triggers_and_indexes(conn, 4)?;
    conn.execute(&crate::entities::subscription::schema(5), [])
        .map_err(DatabaseError::from)?;
    conn.execute(&crate::entities::subscription::relation_schema(5), [])
        .map_err(DatabaseError::from)?;
    rebuild_settings(conn, 5)?;
    sql::execute(
        conn,
        "UPDATE folder SET
            nb_audio = (SELECT COUNT(*) FROM media
                        WHERE folder_id = folder.id AND type = 1 AND is_present != 0),
            nb_video = (SELECT COUNT(*) FROM media
                        WHERE folder_id = folder.id AND type = 2 AND is_present != 0)",
        [],
    )?;
    create_triggers_and_indexes(conn, 5)
}

/// Settings has no stable rebuild source list across versions: read the
/// row, recreate the table from the registry, re-insert with defaults
/// for the new columns.
fn rebuild_settings(conn: &Connection, target_version: u32) -> Result<()> {
    let (model, task_attempts, link_attempts): (u32, i64, i64) = sql::query_row_opt(
        conn,
        "SELECT db_model_version, max_task_attempts, max_link_task_attempts FROM settings",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?
    .ok_or_else(|| Error::internal("settings row missing during migration"))?;
    conn.execute_batch("DROP TABLE settings")
        .map_err(DatabaseError::from)?;
    conn.execute(&settings::schema(target_version), [])
        .map_err(DatabaseError::from)?;
    match target_version {
        v if v >= 5 => sql::execute(
            conn,
            "INSERT INTO settings(db_model_version, max_task_attempts,
                    max_link_task_attempts, video_groups_prefix_length,
                    nb_cached_media_per_subscription, max_subscription_cache_size,
                    max_cache_size)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                model,
                task_attempts,
                link_attempts,
                settings::DEFAULT_VIDEO_GROUPS_PREFIX_LENGTH,
                settings::DEFAULT_NB_CACHED_MEDIA_PER_SUBSCRIPTION,
                settings::DEFAULT_MAX_SUBSCRIPTION_CACHE_SIZE,
                settings::DEFAULT_MAX_CACHE_SIZE,
            ],
        )?,
        _ => sql::execute(
            conn,
            "INSERT INTO settings(db_model_version, max_task_attempts,
                    max_link_task_attempts, video_groups_prefix_length)
             VALUES(?1, ?2, ?3, ?4)",
            rusqlite::params![
                model,
                task_attempts,
                link_attempts,
                settings::DEFAULT_VIDEO_GROUPS_PREFIX_LENGTH,
            ],
        )?,
    };
    Ok(())
}

/// Post-chain touch-ups that are not expressible as SQL steps.
fn migration_epilogue(conn: &Connection, from: u32) -> Result<()> {
    if from < 3 {
        // The denormalization rewrote most of the database; reclaim the
        // space and drop failed thumbnails so they get regenerated.
        sql::execute(
            conn,
            "DELETE FROM thumbnail WHERE status = 2 OR status = 3",
            [],
        )?;
        conn.execute_batch("VACUUM").map_err(DatabaseError::from)?;
    }
    Ok(())
}

/// Full post-migration verification: registry comparison plus SQLite's
/// own integrity and foreign-key probes. A corrupted database is fatal
/// and reported as requiring a reset.
pub fn integrity_check(conn: &Connection, version: u32) -> Result<bool> {
    if !registry::check_schema(conn, version)? {
        return Ok(false);
    }
    let status: String = sql::query_value(conn, "PRAGMA integrity_check", [])?;
    if status != "ok" {
        return Err(Error::Database(DatabaseError::Corrupt(status)));
    }
    let violations: Vec<String> = sql::load_all(conn, "PRAGMA foreign_key_check", [], |row| {
        row.get::<_, String>(0)
    })?;
    if !violations.is_empty() {
        return Err(Error::Database(DatabaseError::Corrupt(format!(
            "foreign key violations in: {}",
            violations.join(", ")
        ))));
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        album, artist, device, folder, genre, media, playlist, settings as settings_entity,
    };
    use crate::pool::Database;
    use rusqlite::params;

    /// A populated model-2 database: one artist/album with two tracks
    /// linked through the legacy album_track table, a playlist, and a
    /// banned folder.
    fn v2_fixture() -> Database {
        let db = Database::open_in_memory().unwrap();
        let ctx = db.write().unwrap();
        registry::create_all(&ctx, 2).unwrap();
        settings_entity::create_default_row(&ctx, 2).unwrap();

        let dev = device::create(&ctx, "dev", "file://", false, false).unwrap();
        let dir = folder::create(&ctx, "/music/", "music", 0, dev.id, false).unwrap();
        sql::insert(
            &ctx,
            "INSERT INTO folder(path, name, device_id, is_removable, is_banned)
             VALUES('/banned/', 'banned', ?1, 0, 1)",
            params![dev.id],
        )
        .unwrap();

        let a = artist::create(&ctx, "X").unwrap();
        // Counters stay zero here; the model-2 album_track triggers
        // fill them as the legacy rows land.
        let album_id = sql::insert(
            &ctx,
            "INSERT INTO album(title, artist_id) VALUES('A', ?1)",
            params![a.id],
        )
        .unwrap();
        let g = genre::create(&ctx, "Jazz").unwrap();
        for (name, duration, track) in [("01.flac", 100, 1), ("02.flac", 200, 2)] {
            // media::create reads back through the current-model column
            // list, so the fixture inserts model-2 rows by hand.
            let m = sql::insert(
                &ctx,
                "INSERT INTO media(type, insertion_date, title, filename, duration,
                        device_id, folder_id, import_type)
                 VALUES(?1, 0, ?2, ?2, ?3, ?4, ?5, 0)",
                params![
                    reelvault_core::MediaType::Audio,
                    name,
                    duration,
                    dev.id,
                    dir.id
                ],
            )
            .unwrap();
            sql::insert(
                &ctx,
                "INSERT INTO album_track(media_id, duration, artist_id, genre_id,
                        track_number, album_id, disc_number)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, 1)",
                params![m, duration, a.id, g.id, track, album_id],
            )
            .unwrap();
        }

        let p = playlist::create(&ctx, "mix").unwrap();
        sql::insert(
            &ctx,
            "INSERT INTO playlist_media(playlist_id, media_id, position) VALUES(?1, 1, 0)",
            params![p.id],
        )
        .unwrap();
        drop(ctx);
        db
    }

    #[test]
    fn full_chain_from_v2() {
        let db = v2_fixture();
        let ctx = db.write().unwrap();
        migrate(&ctx, 2).unwrap();

        // (a) every known trigger exists exactly once
        for (name, _) in registry::all_triggers(DB_MODEL_VERSION) {
            let count: i64 = sql::query_value(
                &ctx,
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger' AND name = ?1",
                params![name],
            )
            .unwrap();
            assert_eq!(count, 1, "trigger {name}");
        }
        // (b) the declarative schema matches the registry
        assert!(integrity_check(&ctx, DB_MODEL_VERSION).unwrap());
        // (c) the banned folder survived
        let banned = folder::banned_folders(&ctx).unwrap();
        assert_eq!(banned.len(), 1);
        assert_eq!(banned[0].path, "/banned/");
        // (d) the settings row is at the current model
        assert_eq!(
            settings_entity::load_db_model_version(&ctx).unwrap(),
            Some(DB_MODEL_VERSION)
        );
    }

    #[test]
    fn denormalization_moves_track_info_onto_media() {
        let db = v2_fixture();
        let ctx = db.write().unwrap();
        migrate(&ctx, 2).unwrap();

        let m = media::fetch(&ctx, 1).unwrap().unwrap();
        assert_eq!(m.subtype, reelvault_core::MediaSubtype::AlbumTrack);
        assert_eq!(m.track_number, Some(1));
        assert!(m.album_id.is_some());
        assert!(m.artist_id.is_some());

        let album = album::fetch(&ctx, m.album_id.unwrap()).unwrap().unwrap();
        assert_eq!(album.nb_tracks, 2);
        assert_eq!(album.duration, 300);

        // The legacy table is gone.
        let legacy: i64 = sql::query_value(
            &ctx,
            "SELECT COUNT(*) FROM sqlite_master WHERE name = 'album_track'",
            [],
        )
        .unwrap();
        assert_eq!(legacy, 0);
    }

    #[test]
    fn settings_gain_defaults() {
        let db = v2_fixture();
        let ctx = db.write().unwrap();
        migrate(&ctx, 2).unwrap();
        let s = settings_entity::load(&ctx).unwrap().unwrap();
        assert_eq!(
            s.video_groups_prefix_length,
            settings_entity::DEFAULT_VIDEO_GROUPS_PREFIX_LENGTH
        );
        assert_eq!(
            s.max_cache_size,
            settings_entity::DEFAULT_MAX_CACHE_SIZE
        );
    }

    #[test]
    fn counters_still_consistent_after_migration() {
        let db = v2_fixture();
        {
            let ctx = db.write().unwrap();
            migrate(&ctx, 2).unwrap();
        }
        // The folder repair recomputed nb_audio from live media.
        let ctx = db.write().unwrap();
        let dir = folder::fetch_by_path(&ctx, "/music/").unwrap().unwrap();
        assert_eq!(dir.nb_audio, 2);

        // Post-migration triggers are live: deleting a track cascades
        // into the album counters.
        media::delete(&ctx, 1).unwrap();
        let dir = folder::fetch_by_path(&ctx, "/music/").unwrap().unwrap();
        assert_eq!(dir.nb_audio, 1);
        let remaining = media::fetch(&ctx, 2).unwrap().unwrap();
        let album = album::fetch(&ctx, remaining.album_id.unwrap()).unwrap().unwrap();
        assert_eq!(album.nb_tracks, 1);
        assert_eq!(album.duration, 200);
    }

    #[test]
    fn migrate_is_a_noop_at_current_version() {
        let db = crate::testing::db();
        let ctx = db.write().unwrap();
        migrate(&ctx, DB_MODEL_VERSION).unwrap();
        assert!(integrity_check(&ctx, DB_MODEL_VERSION).unwrap());
    }
}
