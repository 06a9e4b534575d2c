//! The singleton settings row: model version and cache budgets.

use rusqlite::{params, Connection};

use reelvault_core::Result;

use crate::sql;

pub const DEFAULT_MAX_TASK_ATTEMPTS: i64 = 2;
pub const DEFAULT_MAX_LINK_TASK_ATTEMPTS: i64 = 6;
pub const DEFAULT_VIDEO_GROUPS_PREFIX_LENGTH: i64 = 6;
pub const DEFAULT_NB_CACHED_MEDIA_PER_SUBSCRIPTION: i64 = 2;
pub const DEFAULT_MAX_SUBSCRIPTION_CACHE_SIZE: i64 = 1024 * 1024 * 1024;
pub const DEFAULT_MAX_CACHE_SIZE: i64 = 3 * DEFAULT_MAX_SUBSCRIPTION_CACHE_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_model_version: u32,
    pub max_task_attempts: i64,
    pub max_link_task_attempts: i64,
    pub video_groups_prefix_length: i64,
    pub nb_cached_media_per_subscription: i64,
    pub max_subscription_cache_size: i64,
    pub max_cache_size: i64,
}

pub fn schema(version: u32) -> String {
    let mut sql = String::from(
        "CREATE TABLE settings(\
            db_model_version INTEGER NOT NULL,\
            max_task_attempts INTEGER NOT NULL,\
            max_link_task_attempts INTEGER NOT NULL",
    );
    if version >= 4 {
        sql.push_str(",video_groups_prefix_length INTEGER NOT NULL");
    }
    if version >= 5 {
        sql.push_str(
            ",nb_cached_media_per_subscription INTEGER NOT NULL,\
             max_subscription_cache_size INTEGER NOT NULL,\
             max_cache_size INTEGER NOT NULL",
        );
    }
    sql.push(')');
    sql
}

/// Load the settings row; `None` on a freshly created database.
pub fn load(conn: &Connection) -> Result<Option<Settings>> {
    sql::query_row_opt(
        conn,
        "SELECT db_model_version, max_task_attempts, max_link_task_attempts,
                video_groups_prefix_length, nb_cached_media_per_subscription,
                max_subscription_cache_size, max_cache_size
         FROM settings",
        [],
        |row| {
            Ok(Settings {
                db_model_version: row.get(0)?,
                max_task_attempts: row.get(1)?,
                max_link_task_attempts: row.get(2)?,
                video_groups_prefix_length: row.get(3)?,
                nb_cached_media_per_subscription: row.get(4)?,
                max_subscription_cache_size: row.get(5)?,
                max_cache_size: row.get(6)?,
            })
        },
    )
}

/// Load only the stored model version, valid for any model >= 1.
pub fn load_db_model_version(conn: &Connection) -> Result<Option<u32>> {
    sql::query_row_opt(conn, "SELECT db_model_version FROM settings", [], |row| {
        row.get(0)
    })
}

/// First launch: insert the defaults at the given model version.
///
/// Settings columns appear with their model version, so the insert is
/// shaped to match the schema the fixture or fresh database carries.
pub fn create_default_row(conn: &Connection, version: u32) -> Result<Settings> {
    match version {
        v if v >= 5 => sql::insert(
            conn,
            "INSERT INTO settings(db_model_version, max_task_attempts,
                    max_link_task_attempts, video_groups_prefix_length,
                    nb_cached_media_per_subscription, max_subscription_cache_size,
                    max_cache_size)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                version,
                DEFAULT_MAX_TASK_ATTEMPTS,
                DEFAULT_MAX_LINK_TASK_ATTEMPTS,
                DEFAULT_VIDEO_GROUPS_PREFIX_LENGTH,
                DEFAULT_NB_CACHED_MEDIA_PER_SUBSCRIPTION,
                DEFAULT_MAX_SUBSCRIPTION_CACHE_SIZE,
                DEFAULT_MAX_CACHE_SIZE,
            ],
        )?,
        4 => sql::insert(
            conn,
            "INSERT INTO settings(db_model_version, max_task_attempts,
                    max_link_task_attempts, video_groups_prefix_length)
             VALUES(?1, ?2, ?3, ?4)",
            params![
                version,
                DEFAULT_MAX_TASK_ATTEMPTS,
                DEFAULT_MAX_LINK_TASK_ATTEMPTS,
                DEFAULT_VIDEO_GROUPS_PREFIX_LENGTH,
            ],
        )?,
        _ => sql::insert(
            conn,
            "INSERT INTO settings(db_model_version, max_task_attempts,
                    max_link_task_attempts)
             VALUES(?1, ?2, ?3)",
            params![
                version,
                DEFAULT_MAX_TASK_ATTEMPTS,
                DEFAULT_MAX_LINK_TASK_ATTEMPTS,
            ],
        )?,
    };
    Ok(Settings {
        db_model_version: version,
        max_task_attempts: DEFAULT_MAX_TASK_ATTEMPTS,
        max_link_task_attempts: DEFAULT_MAX_LINK_TASK_ATTEMPTS,
        video_groups_prefix_length: DEFAULT_VIDEO_GROUPS_PREFIX_LENGTH,
        nb_cached_media_per_subscription: DEFAULT_NB_CACHED_MEDIA_PER_SUBSCRIPTION,
        max_subscription_cache_size: DEFAULT_MAX_SUBSCRIPTION_CACHE_SIZE,
        max_cache_size: DEFAULT_MAX_CACHE_SIZE,
    })
}

pub fn set_db_model_version(conn: &Connection, version: u32) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE settings SET db_model_version = ?1",
        params![version],
    )?;
    Ok(n > 0)
}

pub fn set_nb_cached_media_per_subscription(conn: &Connection, nb: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE settings SET nb_cached_media_per_subscription = ?1",
        params![nb],
    )?;
    Ok(n > 0)
}

pub fn set_max_subscription_cache_size(conn: &Connection, size: i64) -> Result<bool> {
    let n = sql::execute(
        conn,
        "UPDATE settings SET max_subscription_cache_size = ?1",
        params![size],
    )?;
    Ok(n > 0)
}

pub fn set_max_cache_size(conn: &Connection, size: i64) -> Result<bool> {
    let n = sql::execute(conn, "UPDATE settings SET max_cache_size = ?1", params![size])?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn load_after_create() {
        let db = testing::db();
        let ctx = db.read().unwrap();
        let settings = load(&ctx).unwrap().unwrap();
        assert_eq!(settings.db_model_version, crate::DB_MODEL_VERSION);
        assert_eq!(settings.max_task_attempts, DEFAULT_MAX_TASK_ATTEMPTS);
        assert_eq!(
            settings.max_subscription_cache_size,
            DEFAULT_MAX_SUBSCRIPTION_CACHE_SIZE
        );
    }

    #[test]
    fn update_cache_budgets() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        assert!(set_nb_cached_media_per_subscription(&ctx, 5).unwrap());
        assert!(set_max_subscription_cache_size(&ctx, 1234).unwrap());
        assert!(set_max_cache_size(&ctx, 9999).unwrap());
        let settings = load(&ctx).unwrap().unwrap();
        assert_eq!(settings.nb_cached_media_per_subscription, 5);
        assert_eq!(settings.max_subscription_cache_size, 1234);
        assert_eq!(settings.max_cache_size, 9999);
    }

    #[test]
    fn version_bump() {
        let db = testing::db();
        let ctx = db.write().unwrap();
        assert!(set_db_model_version(&ctx, 99).unwrap());
        assert_eq!(load_db_model_version(&ctx).unwrap(), Some(99));
    }

    #[test]
    fn versioned_schema_gains_columns() {
        assert!(!schema(3).contains("video_groups_prefix_length"));
        assert!(schema(4).contains("video_groups_prefix_length"));
        assert!(!schema(4).contains("max_cache_size"));
        assert!(schema(5).contains("max_cache_size"));
    }
}
