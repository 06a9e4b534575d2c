//! Batched change notifications.
//!
//! A background thread owns one queue per entity kind (created handles,
//! modified ids, removed ids) plus a removal-only queue for thumbnail
//! cleanup requests. Producers enqueue under the state mutex and only
//! install a wake-up when none is scheduled for that queue: a pending
//! wake-up always fires within the batch window, so refreshing it would
//! only delay delivery. [`Notifier::flush`] zeroes the window and blocks
//! the caller until everything pending went out.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use reelvault_db::entities::album::Album;
use reelvault_db::entities::artist::Artist;
use reelvault_db::entities::bookmark::Bookmark;
use reelvault_db::entities::folder::Folder;
use reelvault_db::entities::genre::Genre;
use reelvault_db::entities::media::Media;
use reelvault_db::entities::media_group::MediaGroup;
use reelvault_db::entities::playlist::Playlist;

/// How long changes accumulate before a batch is delivered.
const BATCH_DELAY: Duration = Duration::from_secs(1);

/// Receiver of batched catalog change events.
///
/// Every method has an empty default body; implementors override what
/// they care about. Callbacks run on the notifier thread and must not
/// block for long.
#[allow(unused_variables)]
pub trait LibraryCallbacks: Send + Sync {
    fn on_media_added(&self, media: Vec<Media>) {}
    fn on_media_modified(&self, ids: Vec<i64>) {}
    fn on_media_deleted(&self, ids: Vec<i64>) {}

    fn on_albums_added(&self, albums: Vec<Album>) {}
    fn on_albums_modified(&self, ids: Vec<i64>) {}
    fn on_albums_deleted(&self, ids: Vec<i64>) {}

    fn on_artists_added(&self, artists: Vec<Artist>) {}
    fn on_artists_modified(&self, ids: Vec<i64>) {}
    fn on_artists_deleted(&self, ids: Vec<i64>) {}

    fn on_genres_added(&self, genres: Vec<Genre>) {}
    fn on_genres_modified(&self, ids: Vec<i64>) {}
    fn on_genres_deleted(&self, ids: Vec<i64>) {}

    fn on_playlists_added(&self, playlists: Vec<Playlist>) {}
    fn on_playlists_modified(&self, ids: Vec<i64>) {}
    fn on_playlists_deleted(&self, ids: Vec<i64>) {}

    fn on_media_groups_added(&self, groups: Vec<MediaGroup>) {}
    fn on_media_groups_modified(&self, ids: Vec<i64>) {}
    fn on_media_groups_deleted(&self, ids: Vec<i64>) {}

    fn on_bookmarks_added(&self, bookmarks: Vec<Bookmark>) {}
    fn on_bookmarks_modified(&self, ids: Vec<i64>) {}
    fn on_bookmarks_deleted(&self, ids: Vec<i64>) {}

    fn on_folders_added(&self, folders: Vec<Folder>) {}
    fn on_folders_modified(&self, ids: Vec<i64>) {}
    fn on_folders_deleted(&self, ids: Vec<i64>) {}

    /// A media converted to external leaves the discovered surface.
    fn on_media_converted_to_external(&self, ids: Vec<i64>) {}

    /// Thumbnail cleanup requests became visible; the thumbnailer
    /// should delete the files and acknowledge the rows.
    fn on_thumbnail_cleanup_requested(&self, request_ids: Vec<i64>) {}

    /// Last-resort error report. Returning true swallows the error.
    fn on_unhandled_error(&self, context: &str, what: &str, requires_db_reset: bool) -> bool {
        false
    }
}

struct Queue<T> {
    added: Vec<T>,
    modified: BTreeSet<i64>,
    removed: BTreeSet<i64>,
    deadline: Option<Instant>,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            modified: BTreeSet::new(),
            removed: BTreeSet::new(),
            deadline: None,
        }
    }
}

impl<T> Queue<T> {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Install a wake-up only when none is pending.
    fn arm(&mut self) -> bool {
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + BATCH_DELAY);
            true
        } else {
            false
        }
    }

    fn due(&self, now: Instant, flushing: bool) -> bool {
        !self.is_empty() && (flushing || self.deadline.is_some_and(|d| d <= now))
    }

    fn take(&mut self) -> (Vec<T>, Vec<i64>, Vec<i64>) {
        self.deadline = None;
        (
            std::mem::take(&mut self.added),
            std::mem::take(&mut self.modified).into_iter().collect(),
            std::mem::take(&mut self.removed).into_iter().collect(),
        )
    }
}

#[derive(Default)]
struct State {
    media: Queue<Media>,
    converted: Queue<Media>,
    albums: Queue<Album>,
    artists: Queue<Artist>,
    genres: Queue<Genre>,
    playlists: Queue<Playlist>,
    media_groups: Queue<MediaGroup>,
    bookmarks: Queue<Bookmark>,
    folders: Queue<Folder>,
    thumbnail_cleanups: Queue<()>,
    stop: bool,
    flushing: bool,
}

impl State {
    fn earliest_deadline(&self) -> Option<Instant> {
        [
            self.media.deadline,
            self.converted.deadline,
            self.albums.deadline,
            self.artists.deadline,
            self.genres.deadline,
            self.playlists.deadline,
            self.media_groups.deadline,
            self.bookmarks.deadline,
            self.folders.deadline,
            self.thumbnail_cleanups.deadline,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn all_empty(&self) -> bool {
        self.media.is_empty()
            && self.converted.is_empty()
            && self.albums.is_empty()
            && self.artists.is_empty()
            && self.genres.is_empty()
            && self.playlists.is_empty()
            && self.media_groups.is_empty()
            && self.bookmarks.is_empty()
            && self.folders.is_empty()
            && self.thumbnail_cleanups.is_empty()
    }
}

struct Inner {
    state: Mutex<State>,
    wakeup: Condvar,
    flushed: Condvar,
    callbacks: Arc<dyn LibraryCallbacks>,
}

pub struct Notifier {
    inner: Arc<Inner>,
    thread: Option<JoinHandle<()>>,
}

macro_rules! notify_fns {
    ($($queue:ident: $ty:ty => $create:ident, $modify:ident, $remove:ident;)+) => {
        $(
            pub fn $create(&self, entity: $ty) {
                let mut state = self.inner.state.lock();
                state.$queue.added.push(entity);
                if state.$queue.arm() {
                    self.inner.wakeup.notify_one();
                }
            }

            pub fn $modify(&self, id: i64) {
                let mut state = self.inner.state.lock();
                state.$queue.modified.insert(id);
                if state.$queue.arm() {
                    self.inner.wakeup.notify_one();
                }
            }

            pub fn $remove(&self, id: i64) {
                let mut state = self.inner.state.lock();
                state.$queue.removed.insert(id);
                if state.$queue.arm() {
                    self.inner.wakeup.notify_one();
                }
            }
        )+
    };
}

impl Notifier {
    pub fn start(callbacks: Arc<dyn LibraryCallbacks>) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(State::default()),
            wakeup: Condvar::new(),
            flushed: Condvar::new(),
            callbacks,
        });
        let thread_inner = inner.clone();
        let thread = std::thread::Builder::new()
            .name("reelvault-notifier".into())
            .spawn(move || run(&thread_inner))
            .expect("failed to spawn notifier thread");
        Self {
            inner,
            thread: Some(thread),
        }
    }

    notify_fns! {
        media: Media => notify_media_creation, notify_media_modification, notify_media_removal;
        albums: Album => notify_album_creation, notify_album_modification, notify_album_removal;
        artists: Artist => notify_artist_creation, notify_artist_modification, notify_artist_removal;
        genres: Genre => notify_genre_creation, notify_genre_modification, notify_genre_removal;
        playlists: Playlist => notify_playlist_creation, notify_playlist_modification, notify_playlist_removal;
        media_groups: MediaGroup => notify_media_group_creation, notify_media_group_modification, notify_media_group_removal;
        bookmarks: Bookmark => notify_bookmark_creation, notify_bookmark_modification, notify_bookmark_removal;
        folders: Folder => notify_folder_creation, notify_folder_modification, notify_folder_removal;
    }

    pub fn notify_media_converted_to_external(&self, id: i64) {
        let mut state = self.inner.state.lock();
        state.converted.modified.insert(id);
        if state.converted.arm() {
            self.inner.wakeup.notify_one();
        }
    }

    /// Called by the update hook when a cleanup request row lands.
    pub fn notify_thumbnail_cleanup_inserted(&self, request_id: i64) {
        let mut state = self.inner.state.lock();
        state.thumbnail_cleanups.removed.insert(request_id);
        if state.thumbnail_cleanups.arm() {
            self.inner.wakeup.notify_one();
        }
    }

    /// Deliver everything pending, regardless of timeouts, and wait for
    /// the delivery to finish.
    pub fn flush(&self) {
        let mut state = self.inner.state.lock();
        state.flushing = true;
        self.inner.wakeup.notify_one();
        while state.flushing || !state.all_empty() {
            self.inner.flushed.wait(&mut state);
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock();
            state.stop = true;
            self.inner.wakeup.notify_one();
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run(inner: &Inner) {
    let mut state = inner.state.lock();
    loop {
        if state.stop {
            return;
        }
        match state.earliest_deadline() {
            Some(deadline) if !state.flushing => {
                inner.wakeup.wait_until(&mut state, deadline);
            }
            None if !state.flushing => {
                inner.wakeup.wait(&mut state);
            }
            _ => {}
        }
        if state.stop {
            return;
        }

        let now = Instant::now();
        let flushing = state.flushing;

        macro_rules! deliver {
            ($queue:ident, $added:ident, $modified:ident, $removed:ident) => {
                if state.$queue.due(now, flushing) {
                    let (added, modified, removed) = state.$queue.take();
                    drop(state);
                    if !added.is_empty() {
                        inner.callbacks.$added(added);
                    }
                    if !modified.is_empty() {
                        inner.callbacks.$modified(modified);
                    }
                    if !removed.is_empty() {
                        inner.callbacks.$removed(removed);
                    }
                    state = inner.state.lock();
                }
            };
        }

        deliver!(media, on_media_added, on_media_modified, on_media_deleted);
        deliver!(albums, on_albums_added, on_albums_modified, on_albums_deleted);
        deliver!(artists, on_artists_added, on_artists_modified, on_artists_deleted);
        deliver!(genres, on_genres_added, on_genres_modified, on_genres_deleted);
        deliver!(
            playlists,
            on_playlists_added,
            on_playlists_modified,
            on_playlists_deleted
        );
        deliver!(
            media_groups,
            on_media_groups_added,
            on_media_groups_modified,
            on_media_groups_deleted
        );
        deliver!(
            bookmarks,
            on_bookmarks_added,
            on_bookmarks_modified,
            on_bookmarks_deleted
        );
        deliver!(folders, on_folders_added, on_folders_modified, on_folders_deleted);

        if state.converted.due(now, flushing) {
            let (_, modified, _) = state.converted.take();
            drop(state);
            inner.callbacks.on_media_converted_to_external(modified);
            state = inner.state.lock();
        }
        if state.thumbnail_cleanups.due(now, flushing) {
            let (_, _, removed) = state.thumbnail_cleanups.take();
            drop(state);
            inner.callbacks.on_thumbnail_cleanup_requested(removed);
            state = inner.state.lock();
        }

        if flushing {
            state.flushing = false;
            inner.flushed.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        media_added: StdMutex<Vec<i64>>,
        media_deleted: StdMutex<Vec<i64>>,
        cleanups: StdMutex<Vec<i64>>,
    }

    impl LibraryCallbacks for Recorder {
        fn on_media_added(&self, media: Vec<Media>) {
            self.media_added.lock().unwrap().extend(media.iter().map(|m| m.id));
        }

        fn on_media_deleted(&self, ids: Vec<i64>) {
            self.media_deleted.lock().unwrap().extend(ids);
        }

        fn on_thumbnail_cleanup_requested(&self, request_ids: Vec<i64>) {
            self.cleanups.lock().unwrap().extend(request_ids);
        }
    }

    fn fake_media(id: i64) -> Media {
        use reelvault_core::{ImportType, MediaSubtype, MediaType};
        Media {
            id,
            media_type: MediaType::Video,
            subtype: MediaSubtype::Unknown,
            duration: -1,
            last_position: -1.0,
            last_time: -1,
            play_count: 0,
            last_played_date: None,
            insertion_date: 0,
            release_date: None,
            title: None,
            filename: None,
            is_favorite: false,
            is_present: true,
            device_id: None,
            nb_playlists: 0,
            folder_id: None,
            import_type: ImportType::Internal,
            forced_title: false,
            artist_id: None,
            genre_id: None,
            track_number: None,
            album_id: None,
            disc_number: None,
            group_id: None,
        }
    }

    #[test]
    fn flush_delivers_pending_batches() {
        let recorder = Arc::new(Recorder::default());
        let notifier = Notifier::start(recorder.clone());

        notifier.notify_media_creation(fake_media(1));
        notifier.notify_media_creation(fake_media(2));
        notifier.notify_media_removal(9);
        notifier.flush();

        assert_eq!(*recorder.media_added.lock().unwrap(), vec![1, 2]);
        assert_eq!(*recorder.media_deleted.lock().unwrap(), vec![9]);
    }

    #[test]
    fn removals_are_deduplicated_and_ordered() {
        let recorder = Arc::new(Recorder::default());
        let notifier = Notifier::start(recorder.clone());

        notifier.notify_media_removal(5);
        notifier.notify_media_removal(3);
        notifier.notify_media_removal(5);
        notifier.flush();

        assert_eq!(*recorder.media_deleted.lock().unwrap(), vec![3, 5]);
    }

    #[test]
    fn cleanup_queue_flows_through() {
        let recorder = Arc::new(Recorder::default());
        let notifier = Notifier::start(recorder.clone());
        notifier.notify_thumbnail_cleanup_inserted(42);
        notifier.flush();
        assert_eq!(*recorder.cleanups.lock().unwrap(), vec![42]);
    }

    #[test]
    fn drop_joins_the_thread() {
        let recorder = Arc::new(Recorder::default());
        let notifier = Notifier::start(recorder.clone());
        notifier.notify_media_creation(fake_media(1));
        drop(notifier);
        // No assertion: the test passes when drop does not hang.
    }

    #[test]
    fn flush_twice_is_safe() {
        let recorder = Arc::new(Recorder::default());
        let notifier = Notifier::start(recorder);
        notifier.flush();
        notifier.flush();
    }
}
