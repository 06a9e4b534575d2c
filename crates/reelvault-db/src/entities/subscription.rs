//! Subscriptions: remote collections whose items can be cached locally.
//!
//! `cached_size` aggregates the size of every Cache-type file of the
//! subscription's media, by trigger. Cache budgets of -1 inherit the
//! library-wide defaults from the settings row.

use rusqlite::{params, Connection, Row};

use reelvault_core::{Error, Result};

use crate::entities::media::{self, Media};
use crate::entities::settings;
use crate::sql::{self, Fk};

#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: i64,
    pub service_id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub cached_size: i64,
    pub max_cached_media: i64,
    pub max_cached_size: i64,
    pub artwork_mrl: Option<String>,
}

const COLS: &str = "id, service_id, name, parent_id, cached_size, max_cached_media, \
    max_cached_size, artwork_mrl";

impl Subscription {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            service_id: row.get(1)?,
            name: row.get(2)?,
            parent_id: row.get(3)?,
            cached_size: row.get(4)?,
            max_cached_media: row.get(5)?,
            max_cached_size: row.get(6)?,
            artwork_mrl: row.get(7)?,
        })
    }
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

pub fn schema(_version: u32) -> String {
    "CREATE TABLE subscription(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        service_id INTEGER NOT NULL,\
        name TEXT COLLATE NOCASE,\
        parent_id INTEGER REFERENCES subscription(id) ON DELETE CASCADE,\
        cached_size INTEGER NOT NULL DEFAULT 0,\
        max_cached_media INTEGER NOT NULL DEFAULT -1,\
        max_cached_size INTEGER NOT NULL DEFAULT -1,\
        artwork_mrl TEXT)"
        .to_owned()
}

pub fn relation_schema(_version: u32) -> String {
    "CREATE TABLE subscription_media(\
        subscription_id INTEGER NOT NULL REFERENCES subscription(id) ON DELETE CASCADE,\
        media_id INTEGER NOT NULL REFERENCES media(id) ON DELETE CASCADE,\
        auto_cache_handled BOOLEAN NOT NULL DEFAULT 0,\
        PRIMARY KEY(subscription_id, media_id))"
        .to_owned()
}

pub fn triggers(_version: u32) -> Vec<(&'static str, String)> {
    vec![
        (
            "subscription_cached_size_on_file_insert",
            "CREATE TRIGGER subscription_cached_size_on_file_insert \
             AFTER INSERT ON file \
             WHEN new.type = 6 AND new.media_id IS NOT NULL \
             BEGIN \
                 UPDATE subscription SET cached_size = cached_size + new.size \
                 WHERE id IN (SELECT subscription_id FROM subscription_media \
                              WHERE media_id = new.media_id);\
             END"
                .to_owned(),
        ),
        (
            "subscription_cached_size_on_file_delete",
            "CREATE TRIGGER subscription_cached_size_on_file_delete \
             AFTER DELETE ON file \
             WHEN old.type = 6 AND old.media_id IS NOT NULL \
             BEGIN \
                 UPDATE subscription SET cached_size = cached_size - old.size \
                 WHERE id IN (SELECT subscription_id FROM subscription_media \
                              WHERE media_id = old.media_id);\
             END"
                .to_owned(),
        ),
        (
            "subscription_cached_size_on_relation_delete",
            "CREATE TRIGGER subscription_cached_size_on_relation_delete \
             AFTER DELETE ON subscription_media \
             BEGIN \
                 UPDATE subscription SET cached_size = cached_size - \
                     IFNULL((SELECT SUM(size) FROM file \
                             WHERE media_id = old.media_id AND type = 6), 0) \
                 WHERE id = old.subscription_id;\
             END"
                .to_owned(),
        ),
    ]
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    vec![(
        "subscription_media_idx",
        "CREATE INDEX subscription_media_idx ON subscription_media(media_id)".to_owned(),
    )]
}

// ---------------------------------------------------------------------------
// operations
// ---------------------------------------------------------------------------

pub fn create(
    conn: &Connection,
    service_id: i64,
    name: &str,
    parent_id: i64,
) -> Result<Subscription> {
    let id = sql::insert(
        conn,
        "INSERT INTO subscription(service_id, name, parent_id) VALUES(?1, ?2, ?3)",
        params![service_id, name, Fk(parent_id)],
    )?;
    fetch(conn, id)?.ok_or_else(|| Error::not_found("subscription", id))
}

pub fn fetch(conn: &Connection, id: i64) -> Result<Option<Subscription>> {
    let q = format!("SELECT {COLS} FROM subscription WHERE id = ?1");
    sql::query_row_opt(conn, &q, params![id], Subscription::from_row)
}

pub fn children(conn: &Connection, parent_id: i64) -> Result<Vec<Subscription>> {
    let q = format!("SELECT {COLS} FROM subscription WHERE parent_id = ?1 ORDER BY name");
    sql::load_all(conn, &q, params![parent_id], Subscription::from_row)
}

pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
    let n = sql::execute(conn, "DELETE FROM subscription WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

/// Associate a media with the subscription; idempotent.
pub fn add_media(conn: &Connection, subscription_id: i64, media_id: i64) -> Result<bool> {
    let inserted = sql::insert_or_ignore(
        conn,
        "INSERT INTO subscription_media(subscription_id, media_id) VALUES(?1, ?2)",
        params![subscription_id, media_id],
    )?;
    Ok(inserted.is_some())
}

/// Drop the association; cache files are left on the media, only the
/// subscription's accounted size shrinks (by trigger).
pub fn remove_media(conn: &Connection, subscription_id: i64, media_id: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "DELETE FROM subscription_media WHERE subscription_id = ?1 AND media_id = ?2",
        params![subscription_id, media_id],
    )?;
    Ok(n > 0)
}

pub fn mark_cache_handled(
    conn: &Connection,
    subscription_id: i64,
    media_id: i64,
    handled: bool,
) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE subscription_media SET auto_cache_handled = ?3
         WHERE subscription_id = ?1 AND media_id = ?2",
        params![subscription_id, media_id, handled],
    )?;
    Ok(n > 0)
}

pub fn set_max_cached_media(conn: &Connection, id: i64, max: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE subscription SET max_cached_media = ?2 WHERE id = ?1",
        params![id, max],
    )?;
    Ok(n > 0)
}

pub fn set_max_cached_size(conn: &Connection, id: i64, max: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE subscription SET max_cached_size = ?2 WHERE id = ?1",
        params![id, max],
    )?;
    Ok(n > 0)
}

/// Media of the subscription that already have a cache file.
pub fn cached_media(conn: &Connection, subscription_id: i64) -> Result<Vec<Media>> {
    let q = format!(
        "SELECT m.{} FROM media m \
         INNER JOIN subscription_media sm ON sm.media_id = m.id \
         WHERE sm.subscription_id = ?1 \
           AND EXISTS (SELECT 1 FROM file WHERE media_id = m.id AND type = 6) \
         ORDER BY m.release_date DESC",
        media::COLS.replace(", ", ", m.")
    );
    sql::load_all(conn, &q, params![subscription_id], Media::from_row)
}

/// Media still worth caching, newest releases first.
///
/// The number of rows is bounded by the subscription's own budget, -1
/// inheriting the settings default, minus what is already cached.
pub fn uncached_media(
    conn: &Connection,
    subscription: &Subscription,
    auto_only: bool,
) -> Result<Vec<Media>> {
    let defaults = settings::load(conn)?
        .ok_or_else(|| Error::internal("settings row missing"))?;
    let budget = if subscription.max_cached_media >= 0 {
        subscription
            .max_cached_media
            .min(defaults.nb_cached_media_per_subscription)
    } else {
        defaults.nb_cached_media_per_subscription
    };
    let already_cached = cached_media(conn, subscription.id)?.len() as i64;
    let remaining = (budget - already_cached).max(0);
    if remaining == 0 {
        return Ok(Vec::new());
    }
    let mut q = format!(
        "SELECT m.{} FROM media m \
         INNER JOIN subscription_media sm ON sm.media_id = m.id \
         WHERE sm.subscription_id = ?1 \
           AND NOT EXISTS (SELECT 1 FROM file WHERE media_id = m.id AND type = 6)",
        media::COLS.replace(", ", ", m.")
    );
    if auto_only {
        q.push_str(" AND sm.auto_cache_handled = 0");
    }
    q.push_str(" ORDER BY m.release_date DESC LIMIT ?2");
    sql::load_all(conn, &q, params![subscription.id, remaining], Media::from_row)
}
