//! Legacy album-track table, model versions 1 and 2 only.
//!
//! Model 3 denormalized these columns onto the media table; the
//! definitions below exist solely so the registry can materialize old
//! models for migration paths. The current model never creates them.

pub fn schema(_version: u32) -> String {
    "CREATE TABLE album_track(\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        media_id INTEGER UNIQUE REFERENCES media(id) ON DELETE CASCADE,\
        duration INTEGER NOT NULL,\
        artist_id INTEGER REFERENCES artist(id),\
        genre_id INTEGER REFERENCES genre(id),\
        track_number INTEGER,\
        album_id INTEGER NOT NULL REFERENCES album(id) ON DELETE CASCADE,\
        disc_number INTEGER NOT NULL)"
        .to_owned()
}

pub fn indexes(_version: u32) -> Vec<(&'static str, String)> {
    vec![(
        "album_track_album_genre_artist_idx",
        "CREATE INDEX album_track_album_genre_artist_idx \
         ON album_track(album_id, genre_id, artist_id)"
            .to_owned(),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_materialized_for_old_models() {
        // The registry gates on version; the SQL itself is version-blind.
        assert!(schema(2).contains("CREATE TABLE album_track"));
        assert_eq!(indexes(2).len(), 1);
    }
}
