use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};

use crate::health::ResourceChecker;
use crate::platform::{AudioBackend, CrossOrigin, MediaElement, MediaEvent, PreloadHint};
use crate::queue::{next_index, PlaybackState, QueueItem, Track};

use super::cache::{EntryState, PreloadCache, PreloadEntry};

/// Marks a track as loading for as long as it lives. Dropping it, including
/// when the owning future is cancelled, clears the mark.
struct InFlight<'a> {
    manager: &'a PreloadManager,
    track_id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut st = self.manager.lock();
        if st.in_flight.remove(&self.track_id) {
            st.preloading = !st.in_flight.is_empty();
            log::debug!("Preload of {} abandoned", self.track_id);
        }
    }
}

/// What a [`PreloadManager::preload_next`] call did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreloadOutcome {
    /// No track plays next.
    NothingNext,
    /// The next track has no source url.
    MissingSource { index: usize },
    AlreadyCached { track_id: String },
    /// Another call is already loading this track.
    InFlight { track_id: String },
    Loaded { index: usize, track_id: String },
    /// Soft failure: nothing was cached and the track will load on demand.
    Failed { track_id: String, reason: String },
}

struct PreloadState {
    cache: PreloadCache,
    in_flight: HashSet<String>,
    failed: HashSet<String>,
    preloading: bool,
}

/// Fetches the next track ahead of need and keeps the resulting handles in a
/// bounded FIFO cache.
///
/// The manager is the cache's only writer. Every failure is absorbed here:
/// a bad preload never touches the handle that is currently playing.
pub struct PreloadManager {
    state: Mutex<PreloadState>,
    checker: ResourceChecker,
    backend: Arc<dyn AudioBackend>,
    progress: watch::Sender<u8>,
}

impl PreloadManager {
    pub fn new(checker: ResourceChecker, backend: Arc<dyn AudioBackend>, capacity: usize) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            state: Mutex::new(PreloadState {
                cache: PreloadCache::new(capacity),
                in_flight: HashSet::new(),
                failed: HashSet::new(),
                preloading: false,
            }),
            checker,
            backend,
            progress,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PreloadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Preloads whatever [`next_index`] resolves to.
    ///
    /// The cached/in-flight guard is taken before the first suspension
    /// point, so a second call for the same track while one is outstanding
    /// returns [`PreloadOutcome::InFlight`] without probing or loading.
    /// Dropping the future releases the guard, so a cancelled call can be
    /// retried. A refreshed track record is handed to `on_update` together with its
    /// queue index.
    pub async fn preload_next(
        &self,
        queue: &[QueueItem],
        state: &PlaybackState,
        on_update: impl FnOnce(usize, &Track),
    ) -> PreloadOutcome {
        let Some(index) = next_index(queue.len(), state) else {
            return PreloadOutcome::NothingNext;
        };
        let Some(item) = queue.get(index) else {
            return PreloadOutcome::NothingNext;
        };
        if item.track.source_url.is_none() {
            log::debug!("Next track {} has no source url, skipping preload", item.track.id);
            return PreloadOutcome::MissingSource { index };
        }

        let track_id = item.track.id.clone();
        let guard = {
            let mut st = self.lock();
            if st.cache.contains(&track_id) {
                return PreloadOutcome::AlreadyCached { track_id };
            }
            if !st.in_flight.insert(track_id.clone()) {
                return PreloadOutcome::InFlight { track_id };
            }
            st.failed.remove(&track_id);
            st.preloading = true;
            InFlight {
                manager: self,
                track_id: track_id.clone(),
            }
        };
        self.progress.send_replace(0);
        log::info!("Preloading [{}] {} - {}", index, item.track.title, item.track.artist_line());

        let track = self
            .checker
            .check_and_refresh(&item.track, |fresh| on_update(index, fresh))
            .await;
        let Some(url) = track.source_url else {
            return self.fail(guard, "refreshed track has no source url".to_string());
        };

        match self.load(&url).await {
            Ok(handle) => {
                let evicted = {
                    let mut st = self.lock();
                    st.in_flight.remove(&track_id);
                    st.preloading = !st.in_flight.is_empty();
                    st.cache.insert(PreloadEntry {
                        track_id: track_id.clone(),
                        handle,
                    })
                };
                drop(guard);
                for id in evicted {
                    log::debug!("Preload cache over capacity, evicted {}", id);
                }
                self.progress.send_replace(100);
                log::info!("Preloaded {}", track.title);
                PreloadOutcome::Loaded { index, track_id }
            }
            Err(reason) => self.fail(guard, reason),
        }
    }

    /// Creates a handle for `url` and waits until it can play through or
    /// reports an error.
    async fn load(&self, url: &str) -> Result<Arc<dyn MediaElement>, String> {
        let element = self.backend.create_element();
        element.set_cross_origin(CrossOrigin::Anonymous);
        element.set_preload(PreloadHint::Auto);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = element.add_listener(Arc::new(move |event: &MediaEvent| {
            let _ = tx.send(event.clone());
        }));
        element.set_source(url);

        let result = loop {
            match rx.recv().await {
                Some(MediaEvent::Progress { loaded, total }) => {
                    if total > 0.0 {
                        let percent = (loaded / total * 100.0).clamp(0.0, 100.0) as u8;
                        self.progress.send_replace(percent);
                    }
                }
                Some(MediaEvent::CanPlayThrough) => break Ok(()),
                Some(MediaEvent::Error(msg)) => break Err(msg),
                Some(_) => {}
                None => break Err("element stopped reporting events".to_string()),
            }
        };
        element.remove_listener(listener);

        match result {
            Ok(()) => Ok(element),
            Err(msg) => {
                element.release();
                Err(msg)
            }
        }
    }

    fn fail(&self, guard: InFlight<'_>, reason: String) -> PreloadOutcome {
        let track_id = guard.track_id.clone();
        {
            let mut st = self.lock();
            st.in_flight.remove(&track_id);
            st.failed.insert(track_id.clone());
            st.preloading = !st.in_flight.is_empty();
        }
        drop(guard);
        self.progress.send_replace(0);
        log::warn!("Preload of {} failed, it will load on demand: {}", track_id, reason);
        PreloadOutcome::Failed { track_id, reason }
    }

    pub fn get_preloaded_audio(&self, track_id: &str) -> Option<Arc<dyn MediaElement>> {
        self.lock().cache.get(track_id).map(|e| Arc::clone(&e.handle))
    }

    /// Removes the entry for `track_id` and hands its handle to the caller
    /// without releasing it. Used when a preloaded track starts playing, so
    /// later evictions can never reach the playing handle.
    pub fn take_preloaded_audio(&self, track_id: &str) -> Option<Arc<dyn MediaElement>> {
        let handle = self.lock().cache.take(track_id);
        if handle.is_some() {
            log::debug!("Took preloaded audio for {}", track_id);
        }
        handle
    }

    /// Releases the cached handle for `track_id` and drops its entry.
    pub fn clear_preloaded_audio(&self, track_id: &str) -> bool {
        let removed = self.lock().cache.evict(track_id);
        if removed {
            log::debug!("Cleared preloaded audio for {}", track_id);
        }
        removed
    }

    pub fn clear_all_preloaded_audio(&self) {
        for track_id in self.cached_ids() {
            self.clear_preloaded_audio(&track_id);
        }
    }

    /// Evicts oldest-inserted entries until the cache is within capacity.
    pub fn limit_preload_cache(&self) {
        let evicted = self.lock().cache.trim();
        for track_id in evicted {
            log::debug!("Preload cache over capacity, evicted {}", track_id);
        }
    }

    pub fn status(&self, track_id: &str) -> Option<EntryState> {
        let st = self.lock();
        if st.cache.contains(track_id) {
            Some(EntryState::Ready)
        } else if st.in_flight.contains(track_id) {
            Some(EntryState::Pending)
        } else if st.failed.contains(track_id) {
            Some(EntryState::Failed)
        } else {
            None
        }
    }

    /// Cached track ids, oldest first.
    pub fn cached_ids(&self) -> Vec<String> {
        self.lock().cache.keys().map(str::to_string).collect()
    }

    pub fn is_preloading(&self) -> bool {
        self.lock().preloading
    }

    pub fn progress(&self) -> u8 {
        *self.progress.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }
}
