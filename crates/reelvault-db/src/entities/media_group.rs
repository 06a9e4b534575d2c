//! Media groups: user-visible buckets of related media.
//!
//! Each group tracks typed totals (video/audio/unknown/external), a
//! seen counter, and the present-counterpart of each, all maintained by
//! triggers keyed on the media columns. A media removed from a group
//! moves into a fresh "forced singleton" group named after its title;
//! that name follows the media title by trigger until the user
//! interacts with the group.

use chrono::Utc;
use rusqlite::{params, Connection, Row};

use reelvault_core::{Error, MediaType, QueryParameters, Result, SortingCriteria};

use crate::entities::media::{self, Media};
use crate::functions::{common_prefix, strip_article};
use crate::pool::{transaction_in_progress, Database, Transaction};
use crate::query::PagedQuery;
use crate::sql;

/// Number of leading characters used to match titles into groups.
pub const AUTOMATIC_GROUP_PREFIX_SIZE: usize = 6;

#[derive(Debug, Clone)]
pub struct MediaGroup {
    pub id: i64,
    pub name: String,
    pub nb_video: i64,
    pub nb_audio: i64,
    pub nb_unknown: i64,
    pub nb_external: i64,
    pub nb_seen: i64,
    pub nb_present_video: i64,
    pub nb_present_audio: i64,
    pub nb_present_unknown: i64,
    pub nb_present_external: i64,
    pub nb_present_seen: i64,
    pub duration: i64,
    pub creation_date: i64,
    pub last_modification_date: i64,
    pub user_interacted: bool,
    pub forced_singleton: bool,
}

const COLS: &str = "id, name, nb_video, nb_audio, nb_unknown, nb_external, nb_seen, \
    nb_present_video, nb_present_audio, nb_present_unknown, nb_present_external, \
    nb_present_seen, duration, creation_date, last_modification_date, user_interacted, \
    forced_singleton";

impl MediaGroup {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            nb_video: row.get(2)?,
            nb_audio: row.get(3)?,
            nb_unknown: row.get(4)?,
            nb_external: row.get(5)?,
            nb_seen: row.get(6)?,
            nb_present_video: row.get(7)?,
            nb_present_audio: row.get(8)?,
            nb_present_unknown: row.get(9)?,
            nb_present_external: row.get(10)?,
            nb_present_seen: row.get(11)?,
            duration: row.get(12)?,
            creation_date: row.get(13)?,
            last_modification_date: row.get(14)?,
            user_interacted: row.get(15)?,
            forced_singleton: row.get(16)?,
        })
    }

    pub fn nb_total_media(&self) -> i64 {
        self.nb_video + self.nb_audio + self.nb_unknown + self.nb_external
    }
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

pub fn schema(_version: u32) -> String {
    "CREATE TABLE media_group(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        name TEXT COLLATE NOCASE,\
        nb_video INTEGER NOT NULL DEFAULT 0,\
        nb_audio INTEGER NOT NULL DEFAULT 0,\
        nb_unknown INTEGER NOT NULL DEFAULT 0,\
        nb_external INTEGER NOT NULL DEFAULT 0,\
        nb_seen INTEGER NOT NULL DEFAULT 0,\
        nb_present_video INTEGER NOT NULL DEFAULT 0,\
        nb_present_audio INTEGER NOT NULL DEFAULT 0,\
        nb_present_unknown INTEGER NOT NULL DEFAULT 0,\
        nb_present_external INTEGER NOT NULL DEFAULT 0,\
        nb_present_seen INTEGER NOT NULL DEFAULT 0,\
        duration INTEGER NOT NULL DEFAULT 0,\
        creation_date INTEGER NOT NULL,\
        last_modification_date INTEGER NOT NULL,\
        user_interacted BOOLEAN NOT NULL DEFAULT 0,\
        forced_singleton BOOLEAN NOT NULL DEFAULT 0)"
        .to_owned()
}

// The media-side contribution of a row to its group, spelled once for
// the subtract/add/delta trigger family.
const SUB_OLD: &str = "nb_video = nb_video - (old.import_type = 0 AND old.type = 2),\
    nb_audio = nb_audio - (old.import_type = 0 AND old.type = 1),\
    nb_unknown = nb_unknown - (old.import_type = 0 AND old.type = 0),\
    nb_external = nb_external - (old.import_type != 0),\
    nb_seen = nb_seen - (old.play_count > 0),\
    nb_present_video = nb_present_video - (old.import_type = 0 AND old.type = 2 AND old.is_present != 0),\
    nb_present_audio = nb_present_audio - (old.import_type = 0 AND old.type = 1 AND old.is_present != 0),\
    nb_present_unknown = nb_present_unknown - (old.import_type = 0 AND old.type = 0 AND old.is_present != 0),\
    nb_present_external = nb_present_external - (old.import_type != 0 AND old.is_present != 0),\
    nb_present_seen = nb_present_seen - (old.play_count > 0 AND old.is_present != 0),\
    duration = duration - MAX(old.duration, 0),\
    last_modification_date = strftime('%s','now')";

const ADD_NEW: &str = "nb_video = nb_video + (new.import_type = 0 AND new.type = 2),\
    nb_audio = nb_audio + (new.import_type = 0 AND new.type = 1),\
    nb_unknown = nb_unknown + (new.import_type = 0 AND new.type = 0),\
    nb_external = nb_external + (new.import_type != 0),\
    nb_seen = nb_seen + (new.play_count > 0),\
    nb_present_video = nb_present_video + (new.import_type = 0 AND new.type = 2 AND new.is_present != 0),\
    nb_present_audio = nb_present_audio + (new.import_type = 0 AND new.type = 1 AND new.is_present != 0),\
    nb_present_unknown = nb_present_unknown + (new.import_type = 0 AND new.type = 0 AND new.is_present != 0),\
    nb_present_external = nb_present_external + (new.import_type != 0 AND new.is_present != 0),\
    nb_present_seen = nb_present_seen + (new.play_count > 0 AND new.is_present != 0),\
    duration = duration + MAX(new.duration, 0),\
    last_modification_date = strftime('%s','now')";

pub fn triggers(_version: u32) -> Vec<(&'static str, String)> {
    vec![
        (
            "media_group_detach",
            format!(
                "CREATE TRIGGER media_group_detach AFTER UPDATE ON media \
                 WHEN IFNULL(old.group_id, 0) != IFNULL(new.group_id, 0) \
                      AND old.group_id IS NOT NULL \
                 BEGIN \
                     UPDATE media_group SET {SUB_OLD} WHERE id = old.group_id;\
                 END"
            ),
        ),
        (
            "media_group_attach",
            format!(
                "CREATE TRIGGER media_group_attach AFTER UPDATE ON media \
                 WHEN IFNULL(old.group_id, 0) != IFNULL(new.group_id, 0) \
                      AND new.group_id IS NOT NULL \
                 BEGIN \
                     UPDATE media_group SET {ADD_NEW} WHERE id = new.group_id;\
                 END"
            ),
        ),
        (
            "media_group_refresh",
            "CREATE TRIGGER media_group_refresh AFTER UPDATE ON media \
             WHEN IFNULL(old.group_id, 0) = IFNULL(new.group_id, 0) \
                  AND new.group_id IS NOT NULL \
                  AND (old.type != new.type OR old.import_type != new.import_type \
                       OR old.is_present != new.is_present \
                       OR old.duration != new.duration \
                       OR (old.play_count > 0) != (new.play_count > 0)) \
             BEGIN \
                 UPDATE media_group SET \
                     nb_video = nb_video \
                         + (new.import_type = 0 AND new.type = 2) \
                         - (old.import_type = 0 AND old.type = 2),\
                     nb_audio = nb_audio \
                         + (new.import_type = 0 AND new.type = 1) \
                         - (old.import_type = 0 AND old.type = 1),\
                     nb_unknown = nb_unknown \
                         + (new.import_type = 0 AND new.type = 0) \
                         - (old.import_type = 0 AND old.type = 0),\
                     nb_external = nb_external \
                         + (new.import_type != 0) - (old.import_type != 0),\
                     nb_seen = nb_seen + (new.play_count > 0) - (old.play_count > 0),\
                     nb_present_video = nb_present_video \
                         + (new.import_type = 0 AND new.type = 2 AND new.is_present != 0) \
                         - (old.import_type = 0 AND old.type = 2 AND old.is_present != 0),\
                     nb_present_audio = nb_present_audio \
                         + (new.import_type = 0 AND new.type = 1 AND new.is_present != 0) \
                         - (old.import_type = 0 AND old.type = 1 AND old.is_present != 0),\
                     nb_present_unknown = nb_present_unknown \
                         + (new.import_type = 0 AND new.type = 0 AND new.is_present != 0) \
                         - (old.import_type = 0 AND old.type = 0 AND old.is_present != 0),\
                     nb_present_external = nb_present_external \
                         + (new.import_type != 0 AND new.is_present != 0) \
                         - (old.import_type != 0 AND old.is_present != 0),\
                     nb_present_seen = nb_present_seen \
                         + (new.play_count > 0 AND new.is_present != 0) \
                         - (old.play_count > 0 AND old.is_present != 0),\
                     duration = duration + MAX(new.duration, 0) - MAX(old.duration, 0),\
                     last_modification_date = strftime('%s','now') \
                 WHERE id = new.group_id;\
             END"
                .to_owned(),
        ),
        (
            "media_group_on_media_delete",
            format!(
                "CREATE TRIGGER media_group_on_media_delete AFTER DELETE ON media \
                 WHEN old.group_id IS NOT NULL \
                 BEGIN \
                     UPDATE media_group SET {SUB_OLD} WHERE id = old.group_id;\
                 END"
            ),
        ),
        (
            "media_group_delete_empty",
            "CREATE TRIGGER media_group_delete_empty AFTER UPDATE ON media_group \
             WHEN new.nb_video + new.nb_audio + new.nb_unknown + new.nb_external = 0 \
                  AND old.nb_video + old.nb_audio + old.nb_unknown + old.nb_external > 0 \
             BEGIN \
                 DELETE FROM media_group WHERE id = new.id;\
             END"
                .to_owned(),
        ),
        (
            "media_group_rename_forced_singleton",
            "CREATE TRIGGER media_group_rename_forced_singleton \
             AFTER UPDATE OF title ON media \
             WHEN new.group_id IS NOT NULL \
             BEGIN \
                 UPDATE media_group SET name = new.title \
                 WHERE id = new.group_id AND forced_singleton != 0;\
             END"
                .to_owned(),
        ),
    ]
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    Vec::new()
}

// ---------------------------------------------------------------------------
// operations
// ---------------------------------------------------------------------------

pub fn create(
    conn: &Connection,
    name: &str,
    user_initiated: bool,
    forced_singleton: bool,
) -> Result<MediaGroup> {
    let now = Utc::now().timestamp();
    let id = sql::insert(
        conn,
        "INSERT INTO media_group(name, creation_date, last_modification_date,
                user_interacted, forced_singleton)
         VALUES(?1, ?2, ?2, ?3, ?4)",
        params![name, now, user_initiated, forced_singleton],
    )?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("media_group", id))
}

pub fn fetch(conn: &Connection, id: i64) -> Result<Option<MediaGroup>> {
    let q = format!("SELECT {COLS} FROM media_group WHERE id = ?1");
    sql::query_row_opt(conn, &q, params![id], MediaGroup::from_row)
}

/// Rename; a user rename also marks the group as interacted with, which
/// pins its name against automatic adjustments.
pub fn rename(conn: &Connection, id: i64, name: &str, user_initiated: bool) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE media_group SET name = ?2,
                user_interacted = CASE WHEN ?3 THEN 1 ELSE user_interacted END,
                last_modification_date = ?4
         WHERE id = ?1",
        params![id, name, user_initiated, Utc::now().timestamp()],
    )?;
    Ok(n > 0)
}

/// Put a media into a group. A user add onto a forced singleton clears
/// the singleton flag in the same transaction.
pub fn add(conn: &Connection, group_id: i64, media_id: i64, user_initiated: bool) -> Result<bool> {
    let tx = if transaction_in_progress() {
        None
    } else {
        Some(Transaction::new(conn)?)
    };
    let n = sql::execute(
        conn,
        "UPDATE media SET group_id = ?2 WHERE id = ?1",
        params![media_id, group_id],
    )?;
    if n == 0 {
        return Ok(false);
    }
    if user_initiated {
        sql::execute(
            conn,
            "UPDATE media_group SET forced_singleton = 0, user_interacted = 1
             WHERE id = ?1 AND forced_singleton != 0",
            params![group_id],
        )?;
    }
    if let Some(tx) = tx {
        tx.commit()?;
    }
    Ok(true)
}

/// Take a media out of its group into a fresh forced-singleton group
/// named after its title; returns the new group.
pub fn remove_media(conn: &Connection, media: &Media) -> Result<Option<MediaGroup>> {
    if media.group_id.is_none() {
        return Ok(None);
    }
    let tx = if transaction_in_progress() {
        None
    } else {
        Some(Transaction::new(conn)?)
    };
    let name = media
        .title
        .as_deref()
        .or(media.filename.as_deref())
        .unwrap_or_default();
    let group = create(conn, name, false, true)?;
    sql::execute(
        conn,
        "UPDATE media SET group_id = ?2 WHERE id = ?1",
        params![media.id, group.id],
    )?;
    if let Some(tx) = tx {
        tx.commit()?;
    }
    fetch(conn, group.id)
}

/// Groups whose name starts (case-insensitively, article skipped) with
/// the given prefix.
fn fetch_matching(conn: &Connection, prefix: &str) -> Result<Vec<MediaGroup>> {
    if prefix.chars().count() < AUTOMATIC_GROUP_PREFIX_SIZE {
        return Ok(Vec::new());
    }
    let q = format!(
        "SELECT {COLS} FROM media_group WHERE \
         LOWER(SUBSTR(CASE WHEN name LIKE 'The %' THEN SUBSTR(name, 5) ELSE name END, \
         1, LENGTH(?1))) = LOWER(?1)"
    );
    sql::load_all(conn, &q, params![prefix], MediaGroup::from_row)
}

fn title_prefix(title: &str) -> String {
    let (stripped, _) = strip_article(title);
    stripped.chars().take(AUTOMATIC_GROUP_PREFIX_SIZE).collect()
}

/// The longest case-insensitive common pattern of a group name and a
/// title, both with a leading article skipped; empty when shorter than
/// the automatic prefix size.
fn common_pattern(group_name: &str, title: &str) -> String {
    let (lhs, _) = strip_article(group_name);
    let (rhs, _) = strip_article(title);
    let pattern = common_prefix(lhs, rhs);
    if pattern.chars().count() < AUTOMATIC_GROUP_PREFIX_SIZE {
        String::new()
    } else {
        pattern.to_owned()
    }
}

/// Put an ungrouped media into the best-matching automatic group.
///
/// Candidates share the media title's prefix; the one with the longest
/// common pattern wins and, unless the user already interacted with it,
/// is renamed down to that pattern. With no candidate a new group is
/// created from the title (minus a leading article).
pub fn assign_to_group(conn: &Connection, media: &Media) -> Result<bool> {
    let title = media
        .title
        .clone()
        .or_else(|| media.filename.clone())
        .unwrap_or_default();
    let prefix = title_prefix(&title);
    let groups = fetch_matching(conn, &prefix)?;
    if groups.is_empty() {
        let (name, _) = strip_article(&title);
        let group = create(conn, name, false, false)?;
        return add(conn, group.id, media.id, false);
    }
    let mut longest = String::new();
    let mut target: Option<&MediaGroup> = None;
    for group in &groups {
        let pattern = common_pattern(&group.name, &title);
        if pattern.len() > longest.len() {
            longest = pattern;
            target = Some(group);
        }
    }
    let Some(target) = target else {
        return Ok(false);
    };
    if !target.user_interacted
        && longest.chars().count() < target.name.chars().count()
        && !rename(conn, target.id, &longest, false)?
    {
        return Ok(false);
    }
    add(conn, target.id, media.id, false)
}

// ---------------------------------------------------------------------------
// queries
// ---------------------------------------------------------------------------

fn order_by(params: &QueryParameters) -> String {
    let (column, swap) = match params.sort {
        SortingCriteria::Default | SortingCriteria::Alpha => ("name", false),
        SortingCriteria::NbVideo => ("nb_present_video", true),
        SortingCriteria::NbAudio => ("nb_present_audio", true),
        SortingCriteria::NbMedia => {
            ("nb_present_video + nb_present_audio + nb_present_unknown + nb_present_external", true)
        }
        SortingCriteria::InsertionDate => ("creation_date", false),
        SortingCriteria::LastModificationDate => ("last_modification_date", false),
        other => {
            tracing::warn!("unsupported sort criterion {other:?} for media groups, using name");
            ("name", false)
        }
    };
    let desc = params.desc ^ swap;
    format!("ORDER BY {column}{}", if desc { " DESC" } else { "" })
}

/// Groups containing at least one media of the given type.
pub fn list_all<'db>(
    db: &'db Database,
    media_type: Option<MediaType>,
    params: &QueryParameters,
) -> PagedQuery<'db, MediaGroup> {
    let filter = match media_type {
        Some(MediaType::Video) => "nb_video > 0",
        Some(MediaType::Audio) => "nb_audio > 0",
        Some(MediaType::Unknown) => "nb_unknown > 0",
        None => "nb_video + nb_audio + nb_unknown + nb_external > 0",
    };
    let base = format!("media_group WHERE {filter}");
    PagedQuery::new(db, COLS, base, order_by(params), "id", MediaGroup::from_row)
}

pub fn search<'db>(
    db: &'db Database,
    pattern: &str,
    params: &QueryParameters,
) -> PagedQuery<'db, MediaGroup> {
    if pattern.chars().count() < 3 {
        return PagedQuery::empty(db);
    }
    let like = format!("%{}%", pattern.replace('%', "\\%").replace('_', "\\_"));
    let base = "media_group WHERE name LIKE ?1 ESCAPE '\\'";
    PagedQuery::new(db, COLS, base, order_by(params), "id", MediaGroup::from_row).param(like)
}
