//! Video groups: a derived view, not a table.
//!
//! Present video media are bucketed by the lowercased leading prefix of
//! their title (length taken from the settings row, a leading "The "
//! skipped). A bucket of one exposes the media title as its name.

use rusqlite::{params, Connection, Row};

use reelvault_core::{QueryParameters, Result, SortingCriteria};

use crate::pool::Database;
use crate::query::PagedQuery;
use crate::sql;

#[derive(Debug, Clone)]
pub struct VideoGroup {
    pub grp: String,
    pub count: i64,
    pub media_title: Option<String>,
}

impl VideoGroup {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            grp: row.get(0)?,
            count: row.get(1)?,
            media_title: row.get(2)?,
        })
    }

    /// The display name: the single media's title for singletons, the
    /// shared prefix otherwise.
    pub fn name(&self) -> &str {
        match &self.media_title {
            Some(title) if self.count == 1 => title,
            _ => &self.grp,
        }
    }
}

pub fn schema(_version: u32) -> String {
    "CREATE VIEW video_group AS SELECT \
     LOWER(SUBSTR(CASE WHEN title LIKE 'The %' THEN SUBSTR(title, 5) ELSE title END, 1, \
     (SELECT video_groups_prefix_length FROM settings))) AS grp, \
     COUNT() AS cnt, \
     CASE WHEN COUNT() = 1 THEN title ELSE NULL END AS media_title \
     FROM media WHERE type = 2 AND is_present != 0 GROUP BY grp"
        .to_owned()
}

pub fn triggers(_version: u32) -> Vec<(&'static str, String)> {
    Vec::new()
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    Vec::new()
}

pub fn list_all<'db>(db: &'db Database, params: &QueryParameters) -> PagedQuery<'db, VideoGroup> {
    let order = match params.sort {
        SortingCriteria::NbMedia | SortingCriteria::NbVideo => "ORDER BY cnt",
        SortingCriteria::Default | SortingCriteria::Alpha => "ORDER BY grp",
        other => {
            tracing::warn!("unsupported sort criterion {other:?} for video groups, using name");
            "ORDER BY grp"
        }
    };
    let order = if params.desc {
        format!("{order} DESC")
    } else {
        order.to_owned()
    };
    PagedQuery::with_count(
        db,
        "SELECT COUNT(*) FROM video_group",
        format!("SELECT grp, cnt, media_title FROM video_group {order}"),
        VideoGroup::from_row,
    )
}

pub fn from_name(conn: &Connection, name: &str) -> Result<Option<VideoGroup>> {
    sql::query_row_opt(
        conn,
        "SELECT grp, cnt, media_title FROM video_group
         WHERE grp = LOWER(?1) OR media_title = ?1",
        params![name],
        VideoGroup::from_row,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{device, folder, media};
    use crate::testing;
    use reelvault_core::MediaType;

    fn setup(db: &Database) -> (i64, i64) {
        let ctx = db.write().unwrap();
        let dev = device::create(&ctx, "d", "file://", false, false).unwrap();
        let dir = folder::create(&ctx, "/v/", "v", 0, dev.id, false).unwrap();
        (dev.id, dir.id)
    }

    #[test]
    fn groups_by_prefix_and_skips_article() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        {
            let ctx = db.write().unwrap();
            media::create(&ctx, MediaType::Video, dev, dir, "Picnic day one", 10).unwrap();
            media::create(&ctx, MediaType::Video, dev, dir, "The Picnic day two", 10).unwrap();
            media::create(&ctx, MediaType::Video, dev, dir, "Skiing", 10).unwrap();
            // Audio does not appear in video groups.
            media::create(&ctx, MediaType::Audio, dev, dir, "Picnic song", 10).unwrap();
        }
        let groups = list_all(&db, &QueryParameters::default()).all().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].grp, "picnic");
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[1].name(), "Skiing");

        let ctx = db.read().unwrap();
        let found = from_name(&ctx, "picnic").unwrap().unwrap();
        assert_eq!(found.count, 2);
        let media_of = media::from_video_group(&db, "picnic", &QueryParameters::default());
        drop(ctx);
        assert_eq!(media_of.count().unwrap(), 2);
    }

    #[test]
    fn absent_media_leave_the_view() {
        let db = testing::db();
        let (dev, dir) = setup(&db);
        {
            let ctx = db.write().unwrap();
            media::create(&ctx, MediaType::Video, dev, dir, "Trip.mkv", 10).unwrap();
            device::set_present(&ctx, dev, false).unwrap();
        }
        assert_eq!(list_all(&db, &QueryParameters::default()).count().unwrap(), 0);
    }
}
