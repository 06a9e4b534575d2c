//! reelvault: an embedded, persistent media catalog.
//!
//! The [`MediaLibrary`] owns the database, the change notifier, and the
//! on-disk artifact folders. Discovery walkers and parsers feed it
//! through the ingestion surface; applications consume it through the
//! paginated query surface. All storage semantics (schema, triggers,
//! migrations) live in the `reelvault-db` crate.

pub mod notifier;

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use reelvault_core::{Error, FileType, Result};
use reelvault_db::entities::{
    album, artist, device, file, folder, genre, media, media_group, playlist, settings, show,
    thumbnail, video_group,
};
use reelvault_db::{migrations, registry, HookReason};

use notifier::{LibraryCallbacks, Notifier};

pub use notifier::LibraryCallbacks as Callbacks;
pub use reelvault_core::{
    Error as LibraryError, InitializeResult, LibraryConfig, MediaType, ProgressResult,
    QueryParameters, SortingCriteria,
};
pub use reelvault_db::entities;
pub use reelvault_db::{Database, PagedQuery};

// ---------------------------------------------------------------------------
// lock file
// ---------------------------------------------------------------------------

/// Exclusive marker preventing two library instances over one folder.
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(path: PathBuf) -> Result<Self> {
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut f) => {
                use std::io::Write;
                let _ = write!(f, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(Error::validation(
                format!("library folder already locked: {}", path.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("failed to remove lock file {}: {e}", self.path.display());
        }
    }
}

// ---------------------------------------------------------------------------
// Discoverer
// ---------------------------------------------------------------------------

/// Indexing collaborator: walks devices and folders and feeds the
/// ingestion surface back. The library only forwards control requests.
pub trait Discoverer: Send + Sync {
    /// Index a new entry point.
    fn discover(&self, mrl: &str);
    /// Re-walk every known entry point.
    fn reload_all(&self);
    /// Re-walk one entry point.
    fn reload(&self, mrl: &str);
}

// ---------------------------------------------------------------------------
// SearchAggregate
// ---------------------------------------------------------------------------

/// One search, every entity surface.
pub struct SearchAggregate<'db> {
    pub media: PagedQuery<'db, media::Media>,
    pub albums: PagedQuery<'db, album::Album>,
    pub artists: PagedQuery<'db, artist::Artist>,
    pub genres: PagedQuery<'db, genre::Genre>,
    pub playlists: PagedQuery<'db, playlist::Playlist>,
    pub shows: PagedQuery<'db, show::Show>,
    pub folders: PagedQuery<'db, folder::Folder>,
    pub media_groups: PagedQuery<'db, media_group::MediaGroup>,
}

// ---------------------------------------------------------------------------
// MediaLibrary
// ---------------------------------------------------------------------------

/// The library context: one database, one notifier, one artifact root.
pub struct MediaLibrary {
    config: LibraryConfig,
    callbacks: Arc<dyn LibraryCallbacks>,
    db: OnceLock<Database>,
    notifier: OnceLock<Arc<Notifier>>,
    lock_file: OnceLock<LockFile>,
    discoverer: OnceLock<Arc<dyn Discoverer>>,
    initialized: AtomicBool,
}

impl MediaLibrary {
    pub fn new(config: LibraryConfig, callbacks: Arc<dyn LibraryCallbacks>) -> Self {
        Self {
            config,
            callbacks,
            db: OnceLock::new(),
            notifier: OnceLock::new(),
            lock_file: OnceLock::new(),
            discoverer: OnceLock::new(),
            initialized: AtomicBool::new(false),
        }
    }

    /// Install the indexing collaborator behind `discover`/`reload`.
    pub fn set_discoverer(&self, discoverer: Arc<dyn Discoverer>) {
        let _ = self.discoverer.set(discoverer);
    }

    /// Ask the discoverer to index a new entry point.
    pub fn discover(&self, mrl: &str) -> bool {
        match self.discoverer.get() {
            Some(d) => {
                d.discover(mrl);
                true
            }
            None => {
                tracing::warn!("discover({mrl}) requested but no discoverer is installed");
                false
            }
        }
    }

    /// Ask the discoverer to re-walk every entry point.
    pub fn reload(&self) -> bool {
        match self.discoverer.get() {
            Some(d) => {
                d.reload_all();
                true
            }
            None => false,
        }
    }

    /// Ask the discoverer to re-walk one entry point.
    pub fn reload_entry_point(&self, mrl: &str) -> bool {
        match self.discoverer.get() {
            Some(d) => {
                d.reload(mrl);
                true
            }
            None => false,
        }
    }

    /// Bring the library up: folders, lock file, database, schema
    /// creation or migration, schema verification, notifier.
    pub fn initialize(&self) -> InitializeResult {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return InitializeResult::AlreadyInitialized;
        }
        match self.initialize_inner() {
            Ok(result) => result,
            Err(e) if e.requires_db_reset() => {
                tracing::error!("database corrupted: {e}");
                InitializeResult::DbCorrupted
            }
            Err(e) => {
                tracing::error!("failed to initialize library: {e}");
                InitializeResult::Failed
            }
        }
    }

    fn initialize_inner(&self) -> Result<InitializeResult> {
        for warning in self.config.validate() {
            tracing::warn!("{warning}");
        }
        fs::create_dir_all(&self.config.ml_folder_path)?;
        fs::create_dir_all(self.config.thumbnails_dir())?;
        fs::create_dir_all(self.config.playlists_dir())?;
        fs::create_dir_all(self.config.cache_dir())?;
        if self.config.lock_file {
            let lock = LockFile::acquire(self.config.lock_file_path())?;
            let _ = self.lock_file.set(lock);
        }

        let database = if self.config.db_path.as_os_str() == ":memory:" {
            Database::open_in_memory()?
        } else {
            Database::open(&self.config.db_path.to_string_lossy())?
        };

        let mut result = InitializeResult::Success;
        {
            let ctx = database.write()?;
            // A missing settings table means either a brand new file or
            // a foreign/stale one; the latter is dropped and rebuilt.
            let stored_version = settings::load_db_model_version(&ctx).unwrap_or(None);
            match stored_version {
                None => {
                    let table_count: i64 = reelvault_db::sql::query_value(
                        &ctx,
                        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                        [],
                    )?;
                    if table_count > 0 {
                        let _weak = reelvault_db::WeakDbContext::new(&ctx)?;
                        Self::drop_all_objects(&ctx)?;
                        result = InitializeResult::DbReset;
                    }
                    registry::create_all(&ctx, registry::DB_MODEL_VERSION)?;
                    settings::create_default_row(&ctx, registry::DB_MODEL_VERSION)?;
                }
                Some(version) if version < registry::DB_MODEL_VERSION => {
                    migrations::migrate(&ctx, version)?;
                    if !migrations::integrity_check(&ctx, registry::DB_MODEL_VERSION)? {
                        return Ok(InitializeResult::DbCorrupted);
                    }
                }
                Some(version) if version > registry::DB_MODEL_VERSION => {
                    tracing::error!("database model {version} is newer than this build; refusing");
                    return Ok(InitializeResult::Failed);
                }
                Some(_) => {}
            }
            if !registry::check_schema(&ctx, registry::DB_MODEL_VERSION)? {
                return Ok(InitializeResult::DbCorrupted);
            }
        }

        let notifier = Arc::new(Notifier::start(self.callbacks.clone()));
        let hook_notifier = notifier.clone();
        database.register_hook(thumbnail::CLEANUP_TABLE, move |reason, rowid| {
            if reason == HookReason::Insert {
                hook_notifier.notify_thumbnail_cleanup_inserted(rowid);
            }
        });

        let _ = self.db.set(database);
        let _ = self.notifier.set(notifier);
        Ok(result)
    }

    fn drop_all_objects(conn: &rusqlite::Connection) -> Result<()> {
        let objects: Vec<(String, String)> = reelvault_db::sql::load_all(
            conn,
            "SELECT type, name FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        for (kind, name) in objects {
            let stmt = if kind == "view" {
                format!("DROP VIEW IF EXISTS {name}")
            } else {
                format!("DROP TABLE IF EXISTS {name}")
            };
            conn.execute_batch(&stmt)
                .map_err(reelvault_core::DatabaseError::from)?;
        }
        Ok(())
    }

    fn db(&self) -> Result<&Database> {
        self.db
            .get()
            .ok_or_else(|| Error::internal("library is not initialized"))
    }

    fn notifier(&self) -> Result<&Notifier> {
        self.notifier
            .get()
            .map(Arc::as_ref)
            .ok_or_else(|| Error::internal("library is not initialized"))
    }

    /// Direct storage access for ingestion collaborators (parsers,
    /// thumbnailers, subscription fetchers).
    pub fn database(&self) -> Result<&Database> {
        self.db()
    }

    /// Block until every pending notification batch was delivered.
    pub fn flush_notifications(&self) -> Result<()> {
        self.notifier()?.flush();
        Ok(())
    }

    /// Request scheduling priority over background workers.
    pub fn priority_access(&self) -> Result<reelvault_db::pool::PriorityAccess<'_>> {
        Ok(self.db()?.priority_access())
    }

    // -- ingestion surface ---------------------------------------------------

    /// Register (or refresh) a device by UUID; returns its id.
    pub fn on_device_seen(
        &self,
        uuid: &str,
        scheme: &str,
        is_removable: bool,
        is_network: bool,
    ) -> Result<i64> {
        let db = self.db()?;
        let ctx = db.write()?;
        if let Some(existing) = device::fetch_by_uuid(&ctx, uuid, scheme)? {
            device::set_present(&ctx, existing.id, true)?;
            return Ok(existing.id);
        }
        Ok(device::create(&ctx, uuid, scheme, is_removable, is_network)?.id)
    }

    /// A device went away; all its media flip to absent.
    pub fn on_device_lost(&self, uuid: &str, scheme: &str) -> Result<bool> {
        let db = self.db()?;
        let ctx = db.write()?;
        match device::fetch_by_uuid(&ctx, uuid, scheme)? {
            Some(dev) => device::set_present(&ctx, dev.id, false),
            None => Ok(false),
        }
    }

    /// Record a folder discovered by a walker; `parent_id` 0 for roots.
    pub fn on_discovered_folder(
        &self,
        device_id: i64,
        parent_id: i64,
        path: &str,
        name: &str,
        is_removable: bool,
    ) -> Result<i64> {
        let db = self.db()?;
        let created = {
            let ctx = db.write()?;
            if let Some(existing) = folder::fetch_by_path(&ctx, path)? {
                return Ok(existing.id);
            }
            folder::create(&ctx, path, name, parent_id, device_id, is_removable)?
        };
        self.notifier()?.notify_folder_creation(created.clone());
        Ok(created.id)
    }

    /// Insert a discovered media with its main file, in one transaction.
    #[allow(clippy::too_many_arguments)]
    pub fn on_discovered_file(
        &self,
        device_id: i64,
        folder_id: i64,
        mrl: &str,
        filename: &str,
        media_type: MediaType,
        size: i64,
        last_modification_date: i64,
        is_removable: bool,
    ) -> Result<i64> {
        let db = self.db()?;
        let created = {
            let ctx = db.write()?;
            let tx = ctx.begin()?;
            let created =
                media::create(tx.conn(), media_type, device_id, folder_id, filename, -1)?;
            file::add_to_media(
                tx.conn(),
                created.id,
                mrl,
                FileType::Main,
                folder_id,
                size,
                last_modification_date,
                is_removable,
            )?;
            tx.commit()?;
            created
        };
        self.notifier()?.notify_media_creation(created.clone());
        Ok(created.id)
    }

    /// Attach a subtitles/soundtrack file discovered next to a media.
    pub fn on_discovered_linked_file(&self, mrl: &str, file_type: FileType) -> Result<bool> {
        let stem = mrl.rsplit_once('.').map_or(mrl, |(s, _)| s);
        let db = self.db()?;
        let ctx = db.write()?;
        let linked: Option<i64> = {
            let pattern = format!("{stem}.%");
            reelvault_db::sql::query_row_opt(
                &ctx,
                "SELECT media_id FROM file
                 WHERE type = 0 AND media_id IS NOT NULL AND mrl LIKE ?1",
                rusqlite::params![pattern],
                |row| row.get(0),
            )?
        };
        match linked {
            Some(media_id) => Ok(file::add_external(&ctx, media_id, mrl, file_type)?.is_some()),
            None => Ok(false),
        }
    }

    /// Refresh a file's fs info after a change; the caller reparses.
    pub fn on_updated_file(
        &self,
        file_id: i64,
        size: i64,
        last_modification_date: i64,
    ) -> Result<bool> {
        let db = self.db()?;
        let media_id = {
            let ctx = db.write()?;
            if !file::update_fs_info(&ctx, file_id, size, last_modification_date)? {
                return Ok(false);
            }
            file::fetch(&ctx, file_id)?.and_then(|f| f.media_id)
        };
        if let Some(media_id) = media_id {
            self.notifier()?.notify_media_modification(media_id);
        }
        Ok(true)
    }

    /// Add a user-provided media outside any discovered folder.
    pub fn add_external_media(&self, mrl: &str, duration: i64) -> Result<i64> {
        let db = self.db()?;
        let created = {
            let ctx = db.write()?;
            let tx = ctx.begin()?;
            let created = media::create_external(tx.conn(), mrl, duration)?;
            file::add_external(tx.conn(), created.id, mrl, FileType::Main)?;
            tx.commit()?;
            created
        };
        self.notifier()?.notify_media_creation(created.clone());
        Ok(created.id)
    }

    /// Add a stream.
    pub fn add_stream(&self, mrl: &str) -> Result<i64> {
        let db = self.db()?;
        let created = {
            let ctx = db.write()?;
            let tx = ctx.begin()?;
            let created = media::create_stream(tx.conn(), mrl)?;
            file::add_external(tx.conn(), created.id, mrl, FileType::Main)?;
            tx.commit()?;
            created
        };
        self.notifier()?.notify_media_creation(created.clone());
        Ok(created.id)
    }

    /// Detach a media from the discovered surface.
    pub fn convert_media_to_external(&self, media_id: i64) -> Result<bool> {
        let db = self.db()?;
        let converted = {
            let ctx = db.write()?;
            media::convert_to_external(&ctx, media_id)?
        };
        if converted {
            self.notifier()?.notify_media_converted_to_external(media_id);
        }
        Ok(converted)
    }

    pub fn ban_folder(&self, mrl: &str) -> Result<bool> {
        let db = self.db()?;
        let ctx = db.write()?;
        let tx = ctx.begin()?;
        let banned = folder::ban(tx.conn(), mrl)?;
        tx.commit()?;
        Ok(banned)
    }

    pub fn unban_folder(&self, mrl: &str) -> Result<bool> {
        let db = self.db()?;
        let ctx = db.write()?;
        folder::unban(&ctx, mrl)
    }

    pub fn banned_folders(&self) -> Result<Vec<folder::Folder>> {
        let db = self.db()?;
        let ctx = db.read()?;
        folder::banned_folders(&ctx)
    }

    // -- playback state ------------------------------------------------------

    pub fn set_media_last_position(&self, media_id: i64, position: f64) -> Result<ProgressResult> {
        let db = self.db()?;
        let result = {
            let ctx = db.write()?;
            let Some(m) = media::fetch(&ctx, media_id)? else {
                return Ok(ProgressResult::Error);
            };
            media::set_last_position(&ctx, &m, position)?
        };
        if result != ProgressResult::Error {
            self.notifier()?.notify_media_modification(media_id);
        }
        Ok(result)
    }

    pub fn set_media_last_time(&self, media_id: i64, last_time: i64) -> Result<ProgressResult> {
        let db = self.db()?;
        let result = {
            let ctx = db.write()?;
            let Some(m) = media::fetch(&ctx, media_id)? else {
                return Ok(ProgressResult::Error);
            };
            media::set_last_time(&ctx, &m, last_time)?
        };
        if result != ProgressResult::Error {
            self.notifier()?.notify_media_modification(media_id);
        }
        Ok(result)
    }

    /// Erase playback history, optionally for one media type only.
    pub fn clear_history(&self, media_type: Option<MediaType>) -> Result<()> {
        let db = self.db()?;
        let ctx = db.write()?;
        media::clear_history(&ctx, media_type)
    }

    // -- query surface -------------------------------------------------------

    pub fn media(&self, id: i64) -> Result<Option<media::Media>> {
        let db = self.db()?;
        let ctx = db.read()?;
        media::fetch(&ctx, id)
    }

    pub fn media_by_mrl(&self, mrl: &str) -> Result<Option<media::Media>> {
        let db = self.db()?;
        let ctx = db.read()?;
        media::fetch_by_mrl(&ctx, mrl)
    }

    pub fn list_media(
        &self,
        media_type: Option<MediaType>,
        params: &QueryParameters,
    ) -> Result<PagedQuery<'_, media::Media>> {
        Ok(media::list_all(self.db()?, media_type, params))
    }

    pub fn audio_files(&self, params: &QueryParameters) -> Result<PagedQuery<'_, media::Media>> {
        self.list_media(Some(MediaType::Audio), params)
    }

    pub fn video_files(&self, params: &QueryParameters) -> Result<PagedQuery<'_, media::Media>> {
        self.list_media(Some(MediaType::Video), params)
    }

    pub fn search_media(
        &self,
        pattern: &str,
        params: &QueryParameters,
    ) -> Result<PagedQuery<'_, media::Media>> {
        Ok(media::search(self.db()?, pattern, None, params))
    }

    pub fn search_audio(
        &self,
        pattern: &str,
        params: &QueryParameters,
    ) -> Result<PagedQuery<'_, media::Media>> {
        Ok(media::search(self.db()?, pattern, Some(MediaType::Audio), params))
    }

    pub fn search_video(
        &self,
        pattern: &str,
        params: &QueryParameters,
    ) -> Result<PagedQuery<'_, media::Media>> {
        Ok(media::search(self.db()?, pattern, Some(MediaType::Video), params))
    }

    pub fn history(&self, media_type: Option<MediaType>) -> Result<PagedQuery<'_, media::Media>> {
        Ok(media::history(self.db()?, media_type))
    }

    pub fn audio_history(&self) -> Result<PagedQuery<'_, media::Media>> {
        self.history(Some(MediaType::Audio))
    }

    pub fn video_history(&self) -> Result<PagedQuery<'_, media::Media>> {
        self.history(Some(MediaType::Video))
    }

    pub fn albums(&self, params: &QueryParameters) -> Result<PagedQuery<'_, album::Album>> {
        Ok(album::list_all(self.db()?, params))
    }

    pub fn albums_from_artist(
        &self,
        artist_id: i64,
        params: &QueryParameters,
    ) -> Result<PagedQuery<'_, album::Album>> {
        Ok(album::from_artist(self.db()?, artist_id, params))
    }

    pub fn media_from_album(
        &self,
        album_id: i64,
        genre_id: Option<i64>,
        params: &QueryParameters,
    ) -> Result<PagedQuery<'_, media::Media>> {
        Ok(media::from_album(self.db()?, album_id, genre_id, params))
    }

    pub fn artists(&self, params: &QueryParameters) -> Result<PagedQuery<'_, artist::Artist>> {
        Ok(artist::list_all(self.db()?, params))
    }

    pub fn genres(&self, params: &QueryParameters) -> Result<PagedQuery<'_, genre::Genre>> {
        Ok(genre::list_all(self.db()?, params))
    }

    pub fn playlists(&self, params: &QueryParameters) -> Result<PagedQuery<'_, playlist::Playlist>> {
        Ok(playlist::list_all(self.db()?, params))
    }

    pub fn create_playlist(&self, name: &str) -> Result<playlist::Playlist> {
        let db = self.db()?;
        let created = {
            let ctx = db.write()?;
            playlist::create(&ctx, name)?
        };
        self.notifier()?.notify_playlist_creation(created.clone());
        Ok(created)
    }

    pub fn delete_playlist(&self, playlist_id: i64) -> Result<bool> {
        let db = self.db()?;
        let deleted = {
            let ctx = db.write()?;
            playlist::delete(&ctx, playlist_id)?
        };
        if deleted {
            self.notifier()?.notify_playlist_removal(playlist_id);
        }
        Ok(deleted)
    }

    pub fn media_groups(
        &self,
        media_type: Option<MediaType>,
        params: &QueryParameters,
    ) -> Result<PagedQuery<'_, media_group::MediaGroup>> {
        Ok(media_group::list_all(self.db()?, media_type, params))
    }

    pub fn video_groups(
        &self,
        params: &QueryParameters,
    ) -> Result<PagedQuery<'_, video_group::VideoGroup>> {
        Ok(video_group::list_all(self.db()?, params))
    }

    pub fn shows(&self, params: &QueryParameters) -> Result<PagedQuery<'_, show::Show>> {
        Ok(show::list_all(self.db()?, params))
    }

    pub fn folders_with_media(
        &self,
        media_type: Option<MediaType>,
        params: &QueryParameters,
    ) -> Result<PagedQuery<'_, folder::Folder>> {
        Ok(folder::with_media(self.db()?, media_type, params))
    }

    /// Per-entity matches for one pattern.
    pub fn search(&self, pattern: &str, params: &QueryParameters) -> Result<SearchAggregate<'_>> {
        let db = self.db()?;
        Ok(SearchAggregate {
            media: media::search(db, pattern, None, params),
            albums: album::search(db, pattern, params),
            artists: artist::search(db, pattern, params),
            genres: genre::search(db, pattern, params),
            playlists: playlist::search(db, pattern, params),
            shows: show::search(db, pattern, params),
            folders: folder::search(db, pattern, params),
            media_groups: media_group::search(db, pattern, params),
        })
    }

    // -- maintenance ---------------------------------------------------------

    /// Drop every row and recreate the schema at the current model.
    ///
    /// With `restore_playlists`, user-created playlists survive as
    /// name + mrl membership rows with NULL media ids; they re-link
    /// lazily once the media are rediscovered.
    pub fn clear_database(&self, restore_playlists: bool) -> Result<()> {
        let db = self.db()?;
        let ctx = db.write()?;
        let saved: Vec<(String, Vec<Option<String>>)> = if restore_playlists {
            let user_playlists: Vec<playlist::Playlist> = reelvault_db::sql::load_all(
                &ctx,
                "SELECT id, name, file_id, creation_date, artwork_mrl FROM playlist \
                 WHERE file_id IS NULL",
                [],
                playlist::Playlist::from_row,
            )?;
            user_playlists
                .into_iter()
                .map(|p| {
                    let mrls = reelvault_db::sql::load_all(
                        &ctx,
                        "SELECT mrl FROM playlist_media WHERE playlist_id = ?1 \
                         ORDER BY position",
                        rusqlite::params![p.id],
                        |row| row.get(0),
                    )?;
                    Ok((p.name, mrls))
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        // Foreign keys must be off while whole tables go away; the
        // pragma only applies outside a transaction.
        let weak = reelvault_db::WeakDbContext::new(&ctx)?;
        let tx = ctx.begin()?;
        Self::drop_all_objects(tx.conn())?;
        registry::create_all(tx.conn(), registry::DB_MODEL_VERSION)?;
        settings::create_default_row(tx.conn(), registry::DB_MODEL_VERSION)?;
        for (name, mrls) in saved {
            let restored = playlist::create(tx.conn(), &name)?;
            for (position, mrl) in mrls.into_iter().enumerate() {
                reelvault_db::sql::insert(
                    tx.conn(),
                    "INSERT INTO playlist_media(playlist_id, media_id, mrl, position) \
                     VALUES(?1, NULL, ?2, ?3)",
                    rusqlite::params![restored.id, mrl, position as i64],
                )?;
            }
        }
        tx.commit()?;
        drop(weak);
        Ok(())
    }

    /// Report an error caught at the outermost boundary; when the
    /// callback declines to handle it, the error is handed back.
    pub fn on_unhandled_error(&self, context: &str, error: Error) -> Result<()> {
        let reset = error.requires_db_reset();
        if self
            .callbacks
            .on_unhandled_error(context, &error.to_string(), reset)
        {
            return Ok(());
        }
        Err(error)
    }
}

impl Drop for MediaLibrary {
    fn drop(&mut self) {
        // Tear the hooks down before the notifier thread goes away.
        if let Some(db) = self.db.get() {
            db.clear_hooks();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopCallbacks;
    impl LibraryCallbacks for NoopCallbacks {}

    fn memory_config(root: &std::path::Path) -> LibraryConfig {
        LibraryConfig::new(":memory:", root)
    }

    #[test]
    fn initialize_creates_layout_and_schema() {
        let tmp = tempfile::tempdir().unwrap();
        let ml = MediaLibrary::new(memory_config(tmp.path()), Arc::new(NoopCallbacks));
        assert_eq!(ml.initialize(), InitializeResult::Success);
        assert!(tmp.path().join("thumbnails").is_dir());
        assert!(tmp.path().join("playlists").is_dir());
        assert!(tmp.path().join("cache").is_dir());

        assert_eq!(ml.initialize(), InitializeResult::AlreadyInitialized);
    }

    #[test]
    fn lock_file_blocks_second_instance() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = memory_config(tmp.path());
        config.lock_file = true;

        let first = MediaLibrary::new(config.clone(), Arc::new(NoopCallbacks));
        assert_eq!(first.initialize(), InitializeResult::Success);
        assert!(tmp.path().join(".ml.lock").exists());

        let second = MediaLibrary::new(config.clone(), Arc::new(NoopCallbacks));
        assert_eq!(second.initialize(), InitializeResult::Failed);

        drop(first);
        assert!(!tmp.path().join(".ml.lock").exists());
    }

    #[test]
    fn persistent_database_reopens() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = memory_config(tmp.path());
        config.db_path = tmp.path().join("ml.db");

        {
            let ml = MediaLibrary::new(config.clone(), Arc::new(NoopCallbacks));
            assert_eq!(ml.initialize(), InitializeResult::Success);
            ml.add_external_media("http://x/a.mp3", 1000).unwrap();
        }
        let ml = MediaLibrary::new(config, Arc::new(NoopCallbacks));
        assert_eq!(ml.initialize(), InitializeResult::Success);
        let m = ml.media_by_mrl("http://x/a.mp3").unwrap().unwrap();
        assert_eq!(m.duration, 1000);
    }

    #[test]
    fn clear_database_restores_playlists() {
        let tmp = tempfile::tempdir().unwrap();
        let ml = MediaLibrary::new(memory_config(tmp.path()), Arc::new(NoopCallbacks));
        ml.initialize();

        let m = ml.add_external_media("http://x/song.mp3", 100).unwrap();
        let p = ml.create_playlist("mine").unwrap();
        {
            let db = ml.db().unwrap();
            let ctx = db.write().unwrap();
            playlist::append(&ctx, p.id, m).unwrap();
        }

        ml.clear_database(true).unwrap();
        let playlists = ml.playlists(&QueryParameters::default()).unwrap().all().unwrap();
        assert_eq!(playlists.len(), 1);
        assert_eq!(playlists[0].name, "mine");
        // The media itself is gone; the membership row waits for it.
        assert!(ml.media(m).unwrap().is_none());

        // Rediscovering the media at the same mrl re-links lazily.
        let m2 = ml.add_external_media("http://x/song.mp3", 100).unwrap();
        let db = ml.db().unwrap();
        let ctx = db.write().unwrap();
        let content = playlist::media_of(&ctx, playlists[0].id).unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0].id, m2);
    }

    #[test]
    fn search_aggregate_bundles_surfaces() {
        let tmp = tempfile::tempdir().unwrap();
        let ml = MediaLibrary::new(memory_config(tmp.path()), Arc::new(NoopCallbacks));
        ml.initialize();
        ml.create_playlist("road trip").unwrap();

        let aggregate = ml.search("road", &QueryParameters::default()).unwrap();
        assert_eq!(aggregate.playlists.count().unwrap(), 1);
        assert_eq!(aggregate.media.count().unwrap(), 0);
    }
}
