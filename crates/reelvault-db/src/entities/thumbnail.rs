//! Thumbnails, their entity links, and the deferred cleanup queue.
//!
//! A thumbnail row is reference-counted through the linking table; the
//! last unlink deletes the row, and deleting an owned row enqueues its
//! mrl on the cleanup table so the file disappears outside the database
//! transaction (the notifier watches that table through the update
//! hook).

use rusqlite::{params, Connection, Row};

use reelvault_core::{
    Error, Result, ThumbnailEntity, ThumbnailOrigin, ThumbnailSizeType, ThumbnailStatus,
};

use crate::sql;

/// Failure→PersistentFailure ceiling.
pub const MAX_GENERATION_ATTEMPTS: i64 = 3;

/// Table watched by the notifier for cleanup requests.
pub const CLEANUP_TABLE: &str = "thumbnail_cleanup";

#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub id: i64,
    pub mrl: Option<String>,
    pub origin: ThumbnailOrigin,
    pub is_owned: bool,
    pub shared_counter: i64,
    pub refcount: i64,
    pub nb_attempts: i64,
    pub status: ThumbnailStatus,
}

const COLS: &str = "id, mrl, origin, is_owned, shared_counter, refcount, nb_attempts, status";

impl Thumbnail {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            mrl: row.get(1)?,
            origin: row.get(2)?,
            is_owned: row.get(3)?,
            shared_counter: row.get(4)?,
            refcount: row.get(5)?,
            nb_attempts: row.get(6)?,
            status: row.get(7)?,
        })
    }
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

pub fn schema(_version: u32) -> String {
    "CREATE TABLE thumbnail(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        mrl TEXT,\
        origin INTEGER NOT NULL,\
        is_owned BOOLEAN NOT NULL DEFAULT 0,\
        shared_counter INTEGER NOT NULL DEFAULT 0,\
        refcount INTEGER NOT NULL DEFAULT 0,\
        nb_attempts INTEGER NOT NULL DEFAULT 0,\
        status INTEGER NOT NULL DEFAULT 0)"
        .to_owned()
}

pub fn link_schema(_version: u32) -> String {
    "CREATE TABLE thumbnail_link(\
        entity_type INTEGER NOT NULL,\
        entity_id INTEGER NOT NULL,\
        size_type INTEGER NOT NULL,\
        thumbnail_id INTEGER NOT NULL REFERENCES thumbnail(id),\
        PRIMARY KEY(entity_type, entity_id, size_type))"
        .to_owned()
}

pub fn cleanup_schema(_version: u32) -> String {
    "CREATE TABLE thumbnail_cleanup(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        mrl TEXT NOT NULL)"
        .to_owned()
}

pub fn triggers(version: u32) -> Vec<(&'static str, String)> {
    let mut triggers = vec![
        (
            "thumbnail_increment_refcount",
            "CREATE TRIGGER thumbnail_increment_refcount AFTER INSERT ON thumbnail_link \
             BEGIN \
                 UPDATE thumbnail SET refcount = refcount + 1 WHERE id = new.thumbnail_id;\
             END"
                .to_owned(),
        ),
        (
            "thumbnail_decrement_refcount",
            "CREATE TRIGGER thumbnail_decrement_refcount AFTER DELETE ON thumbnail_link \
             BEGIN \
                 UPDATE thumbnail SET refcount = refcount - 1 WHERE id = old.thumbnail_id;\
             END"
                .to_owned(),
        ),
        (
            "thumbnail_update_refcount",
            "CREATE TRIGGER thumbnail_update_refcount \
             AFTER UPDATE OF thumbnail_id ON thumbnail_link \
             WHEN old.thumbnail_id != new.thumbnail_id \
             BEGIN \
                 UPDATE thumbnail SET refcount = refcount - 1 WHERE id = old.thumbnail_id;\
                 UPDATE thumbnail SET refcount = refcount + 1 WHERE id = new.thumbnail_id;\
             END"
                .to_owned(),
        ),
        (
            "thumbnail_delete_unused",
            "CREATE TRIGGER thumbnail_delete_unused AFTER UPDATE OF refcount ON thumbnail \
             WHEN new.refcount = 0 AND old.refcount > 0 \
             BEGIN \
                 DELETE FROM thumbnail WHERE id = new.id;\
             END"
                .to_owned(),
        ),
        (
            "thumbnail_cleanup_on_delete",
            "CREATE TRIGGER thumbnail_cleanup_on_delete AFTER DELETE ON thumbnail \
             WHEN old.is_owned != 0 AND old.mrl IS NOT NULL \
             BEGIN \
                 INSERT INTO thumbnail_cleanup(mrl) VALUES(old.mrl);\
             END"
                .to_owned(),
        ),
    ];
    // One unlink trigger per linkable entity: the linking table has no
    // foreign key to its polymorphic owner.
    let mut owners = vec![
        ("thumbnail_unlink_media", "media", 0),
        ("thumbnail_unlink_album", "album", 1),
        ("thumbnail_unlink_artist", "artist", 2),
        ("thumbnail_unlink_genre", "genre", 3),
    ];
    if version >= 4 {
        owners.push(("thumbnail_unlink_media_group", "media_group", 4));
    }
    for (name, table, entity) in owners {
        triggers.push((
            name,
            format!(
                "CREATE TRIGGER {name} AFTER DELETE ON {table} \
                 BEGIN \
                     DELETE FROM thumbnail_link \
                     WHERE entity_type = {entity} AND entity_id = old.id;\
                 END"
            ),
        ));
    }
    triggers
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    vec![(
        "thumbnail_link_idx",
        "CREATE INDEX thumbnail_link_idx ON thumbnail_link(thumbnail_id)".to_owned(),
    )]
}

// ---------------------------------------------------------------------------
// operations
// ---------------------------------------------------------------------------

/// Insert a thumbnail row, sharing an existing row with the same mrl.
pub fn insert(
    conn: &Connection,
    mrl: &str,
    origin: ThumbnailOrigin,
    is_owned: bool,
) -> Result<Thumbnail> {
    let q = format!("SELECT {COLS} FROM thumbnail WHERE mrl = ?1 AND origin = ?2");
    if let Some(existing) = sql::query_row_opt(conn, &q, params![mrl, origin], Thumbnail::from_row)?
    {
        sql::execute(
            conn,
            "UPDATE thumbnail SET shared_counter = shared_counter + 1 WHERE id = ?1",
            params![existing.id],
        )?;
        return fetch(conn, existing.id)?.ok_or_else(|| Error::not_found("thumbnail", existing.id));
    }
    let id = sql::insert(
        conn,
        "INSERT INTO thumbnail(mrl, origin, is_owned, status) VALUES(?1, ?2, ?3, ?4)",
        params![mrl, origin, is_owned, ThumbnailStatus::Available],
    )?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("thumbnail", id))
}

pub fn fetch(conn: &Connection, id: i64) -> Result<Option<Thumbnail>> {
    let q = format!("SELECT {COLS} FROM thumbnail WHERE id = ?1");
    sql::query_row_opt(conn, &q, params![id], Thumbnail::from_row)
}

/// The thumbnail currently linked to an entity, if any.
pub fn for_entity(
    conn: &Connection,
    entity: ThumbnailEntity,
    entity_id: i64,
    size_type: ThumbnailSizeType,
) -> Result<Option<Thumbnail>> {
    let q = format!(
        "SELECT t.{} FROM thumbnail t \
         INNER JOIN thumbnail_link tl ON tl.thumbnail_id = t.id \
         WHERE tl.entity_type = ?1 AND tl.entity_id = ?2 AND tl.size_type = ?3",
        COLS.replace(", ", ", t.")
    );
    sql::query_row_opt(
        conn,
        &q,
        params![entity, entity_id, size_type],
        Thumbnail::from_row,
    )
}

/// Point an entity's linking row at a thumbnail; the refcount triggers
/// absorb both the first link and a re-link.
pub fn link(
    conn: &Connection,
    entity: ThumbnailEntity,
    entity_id: i64,
    size_type: ThumbnailSizeType,
    thumbnail_id: i64,
) -> Result<()> {
    sql::execute(
        conn,
        "INSERT INTO thumbnail_link(entity_type, entity_id, size_type, thumbnail_id)
         VALUES(?1, ?2, ?3, ?4)
         ON CONFLICT(entity_type, entity_id, size_type)
         DO UPDATE SET thumbnail_id = excluded.thumbnail_id",
        params![entity, entity_id, size_type, thumbnail_id],
    )?;
    Ok(())
}

pub fn unlink(
    conn: &Connection,
    entity: ThumbnailEntity,
    entity_id: i64,
    size_type: ThumbnailSizeType,
) -> Result<bool> {
    let n = sql::execute(
        conn,
        "DELETE FROM thumbnail_link
         WHERE entity_type = ?1 AND entity_id = ?2 AND size_type = ?3",
        params![entity, entity_id, size_type],
    )?;
    Ok(n > 0)
}

/// Install a thumbnail for an entity.
///
/// With no current thumbnail the new one is inserted and linked. When
/// `should_update` accepts the current row it is mutated in place;
/// otherwise a new row is inserted and the link switched, letting the
/// refcount triggers collect the old row.
pub fn update_or_replace(
    conn: &Connection,
    entity: ThumbnailEntity,
    entity_id: i64,
    size_type: ThumbnailSizeType,
    mrl: &str,
    origin: ThumbnailOrigin,
    is_owned: bool,
    should_update: impl Fn(&Thumbnail) -> bool,
) -> Result<Thumbnail> {
    match for_entity(conn, entity, entity_id, size_type)? {
        None => {
            let thumbnail = insert(conn, mrl, origin, is_owned)?;
            link(conn, entity, entity_id, size_type, thumbnail.id)?;
            fetch(conn, thumbnail.id)?.ok_or_else(|| Error::not_found("thumbnail", thumbnail.id))
        }
        Some(current) if should_update(&current) => {
            sql::execute(
                conn,
                "UPDATE thumbnail SET mrl = ?2, origin = ?3, is_owned = ?4, status = ?5
                 WHERE id = ?1",
                params![current.id, mrl, origin, is_owned, ThumbnailStatus::Available],
            )?;
            fetch(conn, current.id)?.ok_or_else(|| Error::not_found("thumbnail", current.id))
        }
        Some(_) => {
            let thumbnail = insert(conn, mrl, origin, is_owned)?;
            link(conn, entity, entity_id, size_type, thumbnail.id)?;
            fetch(conn, thumbnail.id)?.ok_or_else(|| Error::not_found("thumbnail", thumbnail.id))
        }
    }
}

/// Albums only overwrite cover-file artwork; any other origin is kept
/// and a separate row is inserted instead.
pub fn album_should_update(current: &Thumbnail) -> bool {
    current.origin == ThumbnailOrigin::CoverFile
}

/// Artists never mutate a thumbnail shared with another entity.
pub fn artist_should_update(current: &Thumbnail) -> bool {
    current.refcount <= 1 && current.shared_counter == 0
}

// ---------------------------------------------------------------------------
// status machine
// ---------------------------------------------------------------------------

/// Record the outcome of a generation attempt.
///
/// Missing goes to Available on success or Failure otherwise; repeated
/// failures cross into PersistentFailure at the attempt ceiling.
pub fn record_generation_result(
    conn: &Connection,
    id: i64,
    success: bool,
    mrl: Option<&str>,
) -> Result<ThumbnailStatus> {
    if success {
        sql::execute(
            conn,
            "UPDATE thumbnail SET status = ?2, mrl = IFNULL(?3, mrl) WHERE id = ?1",
            params![id, ThumbnailStatus::Available, mrl],
        )?;
        return Ok(ThumbnailStatus::Available);
    }
    sql::execute(
        conn,
        "UPDATE thumbnail SET nb_attempts = nb_attempts + 1,
                status = CASE WHEN nb_attempts + 1 >= ?2 THEN ?3 ELSE ?4 END
         WHERE id = ?1",
        params![
            id,
            MAX_GENERATION_ATTEMPTS,
            ThumbnailStatus::PersistentFailure,
            ThumbnailStatus::Failure,
        ],
    )?;
    let status: ThumbnailStatus =
        sql::query_value(conn, "SELECT status FROM thumbnail WHERE id = ?1", params![id])?;
    Ok(status)
}

/// The generation worker died mid-item.
pub fn mark_crashed(conn: &Connection, id: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE thumbnail SET status = ?2 WHERE id = ?1",
        params![id, ThumbnailStatus::Crash],
    )?;
    Ok(n > 0)
}

// ---------------------------------------------------------------------------
// cleanup queue
// ---------------------------------------------------------------------------

pub fn pending_cleanups(conn: &Connection) -> Result<Vec<(i64, String)>> {
    sql::load_all(
        conn,
        "SELECT id, mrl FROM thumbnail_cleanup ORDER BY id",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
}

pub fn remove_cleanup(conn: &Connection, id: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "DELETE FROM thumbnail_cleanup WHERE id = ?1",
        params![id],
    )?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{device, folder, media};
    use crate::testing;
    use reelvault_core::MediaType;

    fn media_id(db: &crate::pool::Database) -> i64 {
        let ctx = db.write().unwrap();
        let dev = device::create(&ctx, "d", "file://", false, false).unwrap();
        let dir = folder::create(&ctx, "/m/", "m", 0, dev.id, false).unwrap();
        media::create(&ctx, MediaType::Video, dev.id, dir.id, "m.mkv", 100)
            .unwrap()
            .id
    }

    #[test]
    fn refcount_follows_links() {
        let db = testing::db();
        let m = media_id(&db);
        let ctx = db.write().unwrap();
        let t = insert(&ctx, "thumb://a.jpg", ThumbnailOrigin::Media, true).unwrap();
        link(&ctx, ThumbnailEntity::Media, m, ThumbnailSizeType::Thumbnail, t.id).unwrap();
        assert_eq!(fetch(&ctx, t.id).unwrap().unwrap().refcount, 1);

        unlink(&ctx, ThumbnailEntity::Media, m, ThumbnailSizeType::Thumbnail).unwrap();
        // Last unlink deleted the row and queued the owned file.
        assert!(fetch(&ctx, t.id).unwrap().is_none());
        let cleanups = pending_cleanups(&ctx).unwrap();
        assert_eq!(cleanups.len(), 1);
        assert_eq!(cleanups[0].1, "thumb://a.jpg");
        assert!(remove_cleanup(&ctx, cleanups[0].0).unwrap());
    }

    #[test]
    fn entity_deletion_collects_thumbnail() {
        let db = testing::db();
        let m = media_id(&db);
        let ctx = db.write().unwrap();
        let t = insert(&ctx, "thumb://b.jpg", ThumbnailOrigin::Media, true).unwrap();
        link(&ctx, ThumbnailEntity::Media, m, ThumbnailSizeType::Thumbnail, t.id).unwrap();

        media::delete(&ctx, m).unwrap();
        assert!(fetch(&ctx, t.id).unwrap().is_none());
        assert_eq!(pending_cleanups(&ctx).unwrap().len(), 1);
    }

    #[test]
    fn album_predicate_only_overwrites_cover_files() {
        let db = testing::db();
        let m = media_id(&db);
        let ctx = db.write().unwrap();
        let first = update_or_replace(
            &ctx,
            ThumbnailEntity::Media,
            m,
            ThumbnailSizeType::Thumbnail,
            "thumb://cover.jpg",
            ThumbnailOrigin::CoverFile,
            false,
            album_should_update,
        )
        .unwrap();

        // Cover-file origin: updated in place.
        let updated = update_or_replace(
            &ctx,
            ThumbnailEntity::Media,
            m,
            ThumbnailSizeType::Thumbnail,
            "thumb://cover2.jpg",
            ThumbnailOrigin::CoverFile,
            false,
            album_should_update,
        )
        .unwrap();
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.mrl.as_deref(), Some("thumb://cover2.jpg"));

        // User-provided origin is now in place; the next write must not
        // clobber it and inserts a fresh row.
        let user = update_or_replace(
            &ctx,
            ThumbnailEntity::Media,
            m,
            ThumbnailSizeType::Thumbnail,
            "thumb://user.jpg",
            ThumbnailOrigin::UserProvided,
            false,
            album_should_update,
        )
        .unwrap();
        assert_eq!(user.id, first.id);
        let replacement = update_or_replace(
            &ctx,
            ThumbnailEntity::Media,
            m,
            ThumbnailSizeType::Thumbnail,
            "thumb://cover3.jpg",
            ThumbnailOrigin::CoverFile,
            false,
            album_should_update,
        )
        .unwrap();
        assert_ne!(replacement.id, user.id);
    }

    #[test]
    fn status_machine_transitions() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        let id = sql::insert(
            &ctx,
            "INSERT INTO thumbnail(origin, status) VALUES(?1, ?2)",
            params![ThumbnailOrigin::Media, ThumbnailStatus::Missing],
        )
        .unwrap();

        assert_eq!(
            record_generation_result(&ctx, id, false, None).unwrap(),
            ThumbnailStatus::Failure
        );
        assert_eq!(
            record_generation_result(&ctx, id, false, None).unwrap(),
            ThumbnailStatus::Failure
        );
        assert_eq!(
            record_generation_result(&ctx, id, false, None).unwrap(),
            ThumbnailStatus::PersistentFailure
        );

        assert_eq!(
            record_generation_result(&ctx, id, true, Some("thumb://ok.jpg")).unwrap(),
            ThumbnailStatus::Available
        );
        assert!(mark_crashed(&ctx, id).unwrap());
        assert_eq!(
            fetch(&ctx, id).unwrap().unwrap().status,
            ThumbnailStatus::Crash
        );
    }
}
